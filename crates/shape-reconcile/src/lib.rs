//! Instance reconciliation engine for instance-shape.
//!
//! This crate brings a running compute instance to a declared shape through
//! the provider's imperative API. It handles:
//!
//! - Resolving label-addressed boot configuration devices to disk IDs
//! - Ordering plan changes and disk growth so only one asynchronous action
//!   is ever in flight per instance
//! - Waiting for provider events with a bounded timeout
//! - Flattening provider state for drift comparison
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Reconciler                         │
//! │   validate → rename → resize → disks → configs → flatten  │
//! └──────────────────────────────────────────────────────────┘
//!        │               │                 │            │
//!        ▼               ▼                 ▼            ▼
//! ┌────────────┐ ┌──────────────────┐ ┌──────────┐ ┌─────────┐
//! │ Accounting │ │ResizeOrchestrator│ │ Resolver │ │ Flatten │
//! └────────────┘ └────────┬─────────┘ └──────────┘ └─────────┘
//!                         │
//!                         ▼
//!                    ┌─────────┐
//!                    │ Waiter  │──── list_events ───┐
//!                    └─────────┘                    ▼
//!                                          ┌─────────────────┐
//!                                          │ ComputeProvider │
//!                                          └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use shape_core::InstanceId;
//! use shape_provider::{ComputeProvider, HttpComputeProvider, ProviderConfig};
//! use shape_reconcile::{DesiredInstance, Reconciler, Timeouts};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ProviderConfig::from_env();
//! let provider = HttpComputeProvider::new(&config)?;
//! let current = provider.get_instance(InstanceId::new(123)).await?;
//!
//! let desired = DesiredInstance {
//!     type_id: Some("g6-standard-1".to_string()),
//!     resize_disk: true,
//!     ..DesiredInstance::default()
//! };
//! let state = Reconciler::new(&provider, config.event_poll_interval())
//!     .reconcile(&desired, &current, &Timeouts::default())
//!     .await?;
//! println!("{} MB used of {} MB", state.storage_utilized, state.storage);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod accounting;
pub mod error;
pub mod flatten;
pub mod orchestrator;
pub mod phase;
pub mod reconciler;
pub mod resolver;
pub mod types;
pub mod waiter;

pub use accounting::DiskExpansion;
pub use error::{ReconcileError, Result};
pub use flatten::{FlatConfig, FlatDevice, FlatDisk, InstanceState};
pub use orchestrator::{ResizeOrchestrator, ResizeOutcome, ResizeRequest};
pub use phase::ResizePhase;
pub use reconciler::Reconciler;
pub use resolver::{DeviceSpec, DiskLabelIndex};
pub use types::{ConfigSpec, DesiredDisk, DesiredInstance, Timeouts};
pub use waiter::{PendingAction, WaitOutcome, Waiter};
