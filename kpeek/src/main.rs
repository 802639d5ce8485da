//! kpeek - Kafka diagnostics CLI
//!
//! `kpeek check` tells whether a broker is reachable, `kpeek drain <topic>`
//! reads a topic from the beginning and reports the encoding of every payload.

use anyhow::{anyhow, Result};
use clap::Parser;
use kpeek::args::{Args, CheckArgs, Command, DrainArgs};
use kpeek::check::{check_broker, check_lines};
use kpeek::drain::{Drainer, StopReason};
use kpeek::kafka_client::KafkaClient;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// TCP connection attempts before a drain gives up on the broker
const DRAIN_CONNECT_ATTEMPTS: u32 = 3;

/// Initialize tracing subscriber for structured logging
fn setup_logging(quiet: bool) {
    let default_level = if quiet { "error" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(default_level)),
        )
        .init();
}

async fn run_check(broker: &str, args: &CheckArgs) -> ExitCode {
    let result = check_broker(broker, Duration::from_secs(args.timeout_secs), args.max_topics).await;
    for line in check_lines(broker, &result) {
        println!("{}", line);
    }
    if result.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn run_drain(broker: &str, quiet: bool, args: &DrainArgs) -> Result<()> {
    let config = args.to_config(quiet)?;
    let output_path = args.output_path();

    let client = KafkaClient::connect(broker, DRAIN_CONNECT_ATTEMPTS).await?;
    let drainer = Drainer::new(Arc::new(client), config);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let outcome = drainer.run(shutdown).await?;

    outcome.report.print_summary(args.sample_chars);

    if let Some(path) = output_path {
        outcome.report.write_json(&path)?;
        println!("Messages saved to {}", path.display());
    }

    match outcome.stop {
        StopReason::Drained => {
            info!("Topic {} fully drained", args.topic);
            Ok(())
        }
        StopReason::Interrupted => Ok(()),
        StopReason::Failed(reason) => Err(anyhow!("Drain of {} stopped early: {}", args.topic, reason)),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    setup_logging(args.quiet);

    match &args.command {
        Command::Check(check) => Ok(run_check(&args.broker, check).await),
        Command::Drain(drain) => {
            run_drain(&args.broker, args.quiet, drain).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
