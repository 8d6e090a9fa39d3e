mod args;

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};

use args::Args;
use gridmii::config::Config;
use gridmii::controller::Controller;
use gridmii::transport::fake::{FakeBrokerTransport, FakeChatTransport};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    if args.debug {
        tracing_subscriber::fmt().with_max_level(Level::TRACE).init();
    } else {
        tracing_subscriber::fmt().json().init();
    }

    let config = match Config::load_path(&args.config) {
        Ok(c) => c,
        Err(error) => {
            error!(%error, path = %args.config.display(), "failed to load configuration");
            return ExitCode::from(2);
        },
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(error) = signal::ctrl_c().await {
                warn!(%error, "something strange with ctrl-c handling!");
            }
            cancel.cancel();
        });
    }

    match run(config, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, "encountered runtime error");
            ExitCode::FAILURE
        },
    }
}

/// Wires the controller up to its chat/broker transports and drives it
/// until shutdown. This crate defines `ChatTransport`/`BrokerTransport` as
/// boundary traits (§1) and ships no concrete Discord gateway or MQTT
/// client; a real deployment substitutes its own implementations here. For
/// now this runs the real controller loop against the in-memory fakes, so
/// the process is a faithful, runnable skeleton of the production wiring.
async fn run(config: Config, cancel: CancellationToken) -> Result<()> {
    info!(broker = %config.mqtt_broker, port = config.mqtt_port, "starting gridmii");

    let mut controller = Controller::new(
        config.target_node.clone(),
        config.channel.map(|c| c.to_string()),
        config.guild,
        Duration::from_secs(config.notify_threshold_secs),
        Duration::from_secs(config.min_report_secs),
        config.relay_configured(),
        Duration::from_secs(config.unstarted_timeout_secs),
    )
    .with_banned_users(config.banned_users.iter().map(|id| id.to_string()).collect());
    let mut chat = FakeChatTransport::new();
    let mut broker = FakeBrokerTransport::new([]);

    controller
        .run(&mut chat, &mut broker, cancel, Duration::from_secs(3600))
        .await
        .context("controller loop exited with an error")
}
