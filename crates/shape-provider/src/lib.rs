//! Compute provider client for instance-shape.
//!
//! This crate provides the [`ComputeProvider`] trait and the
//! [`HttpComputeProvider`] implementation that talks to the Linode API v4.
//! It covers:
//!
//! - Instance reads, label updates and plan resizes
//! - Disk listing, creation and resizing
//! - Boot configuration listing, creation and replacement
//! - Event queries used to wait on asynchronous actions
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              Reconciliation engine            │
//! └──────────────────────────────────────────────┘
//!                       │ ComputeProvider
//!           ┌───────────┴────────────┐
//!           ▼                        ▼
//! ┌───────────────────┐    ┌───────────────────┐
//! │ HttpComputeProvider│    │   MockProvider    │
//! │  (reqwest, paged)  │    │   (in memory)     │
//! └───────────────────┘    └───────────────────┘
//!           │
//!           ▼
//!   https://api.linode.com/v4
//! ```
//!
//! Mutating calls return as soon as the provider accepts them; completion is
//! observed through [`EventFilter`] queries.
//!
//! # Configuration
//!
//! [`ProviderConfig::from_env`] reads `LINODE_TOKEN`, `LINODE_URL`,
//! `LINODE_API_VERSION`, `LINODE_UA_PREFIX` and `LINODE_EVENT_POLL_MS`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod http;
pub mod provider;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use config::ProviderConfig;
pub use error::{ProviderError, Result};
pub use http::HttpComputeProvider;
pub use provider::ComputeProvider;
pub use types::{ConfigOptions, CreateDiskOptions, EventFilter, Page};

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{ActionBehavior, MockProvider, ProviderCall};
