//! shapectl - reconcile compute instances to a declared shape.
//!
//! This is the entry point for the `shapectl` binary.

mod commands;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use shape_core::InstanceId;
use shape_provider::{HttpComputeProvider, ProviderConfig};
use shape_reconcile::{InstanceState, ResizeRequest, Timeouts};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Reconcile compute instances to a declared shape.
#[derive(Parser, Debug)]
#[command(name = "shapectl")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// API token.
    #[arg(long, env = "LINODE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// API base URL.
    #[arg(long, env = "LINODE_URL")]
    url: Option<String>,

    /// Delay between event polls in milliseconds.
    #[arg(long, env = "LINODE_EVENT_POLL_MS")]
    poll_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the flattened state of an instance.
    Show {
        /// Instance ID.
        id: InstanceId,
    },

    /// Move an instance to another plan.
    Resize {
        /// Instance ID.
        id: InstanceId,

        /// Target plan, e.g. `g6-standard-1`.
        #[arg(long = "type")]
        type_id: String,

        /// Grow the biggest disk into the new allowance.
        #[arg(long, default_value = "false")]
        expand: bool,

        /// Bound for each step, in seconds.
        #[arg(long, default_value = "1200")]
        timeout_secs: u64,
    },

    /// Reconcile an instance to the shape in a JSON file.
    Apply {
        /// Instance ID.
        id: InstanceId,

        /// Path to the desired shape.
        #[arg(long, short)]
        file: PathBuf,

        /// Bound for disk creation, in seconds.
        #[arg(long, default_value = "600")]
        create_timeout_secs: u64,

        /// Bound for resizes, in seconds.
        #[arg(long, default_value = "1200")]
        update_timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,shape=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Flags override the environment
    let mut config = ProviderConfig::from_env();
    if let Some(token) = args.token {
        config.token = Some(token);
    }
    if let Some(url) = args.url {
        config.base_url = url;
    }
    if let Some(poll_ms) = args.poll_ms {
        config.event_poll_ms = poll_ms;
    }

    let provider = HttpComputeProvider::new(&config)?;
    let poll = config.event_poll_interval();
    tracing::debug!(api_root = %provider.api_root(), "Provider client ready");

    let state = match args.command {
        Command::Show { id } => commands::show(&provider, id).await?,
        Command::Resize {
            id,
            type_id,
            expand,
            timeout_secs,
        } => {
            let request = ResizeRequest::new(type_id, Duration::from_secs(timeout_secs))
                .auto_expand(expand);
            commands::resize(&provider, poll, id, &request).await?
        }
        Command::Apply {
            id,
            file,
            create_timeout_secs,
            update_timeout_secs,
        } => {
            let desired = commands::load_desired(&file)?;
            let timeouts = Timeouts {
                create: Duration::from_secs(create_timeout_secs),
                update: Duration::from_secs(update_timeout_secs),
            };
            commands::apply(&provider, poll, id, &desired, &timeouts).await?
        }
    };

    print_state(&state)
}

fn print_state(state: &InstanceState) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(state)?);
    Ok(())
}
