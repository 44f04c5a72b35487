//! amqp-pipe: Redis list → AMQP fanout relay
//!
//! ## Usage
//! ```text
//! amqp-pipe [-f <config.yml>]
//! ```
//!
//! ## Configuration
//! - YAML file given with `-f` (default: amqp-pipe.yml)
//! - AMQP_PIPE__<SECTION>__<KEY>: overrides any file value
//! - AMQP_PIPE_LOG: log filter (default: info)
//! - AMQP_PIPE_LOG_FORMAT: `text` or `json` (default: text)
//!
//! Both endpoints must be reachable at startup. After that, outages of either
//! one are waited out. SIGINT, SIGTERM or SIGQUIT stops the relay cleanly.

use clap::Parser;
use tracing::{error, info};

use amqp_pipe::config::{Config, DEFAULT_CONFIG_FILE};
use amqp_pipe::pipe;
use amqp_pipe::shutdown::ShutdownSignals;
use amqp_pipe::utils::bootstrap::init_tracing;

/// Relay events from a Redis list to an AMQP fanout exchange.
#[derive(Parser, Debug)]
#[command(name = "amqp-pipe", version, about)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short = 'f', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    let config = Config::load(&args.config).map_err(|e| {
        error!(path = %args.config, error = %e, "Failed to load configuration");
        e
    })?;

    let signals = ShutdownSignals::register().map_err(|e| {
        error!(error = %e, "Failed to listen for termination signals");
        e
    })?;

    let coordinator = pipe::start_from_config(&config).await.map_err(|e| {
        error!(error = %e, "Failed to start");
        e
    })?;

    info!(
        queue = %config.redis.address(),
        key = %config.redis.key,
        exchange = %config.amqp.exchange,
        "amqp-pipe started"
    );

    coordinator.run_until(signals.wait()).await?;

    Ok(())
}
