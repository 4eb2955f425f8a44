//! Binary watching topics and thing shadows on an IoT broker.
//!
//! Every connect (including reconnects) re-establishes the subscriptions and
//! thing sessions given on the command line, since the broker session is
//! clean.

mod cli;

use std::{error::Error, fs};

use clap::Parser;
use thingwire::{
    client::{ConnectionBuilder, Observers, lock},
    config::{ClientMode, ConfigOverrides, ConnectionConfig},
    mqtt::drive,
    session::Registration,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

fn load_config(cli: &cli::Cli) -> Result<ConnectionConfig, Box<dyn Error>> {
    let mut config = ConnectionConfig::default();
    if let Some(path) = &cli.config {
        let source = fs::read_to_string(path)?;
        config = config.merged(ConfigOverrides::from_toml_str(&source)?);
    }
    if let Some(host) = &cli.host {
        config = config.with_host(host.clone());
    }
    if let Some(region) = &cli.region {
        config = config.with_region(region.clone());
    }
    if let Some(client_id) = &cli.client_id {
        config = config.with_client_id(client_id.clone());
    }
    Ok(config)
}

fn observers(connected: mpsc::UnboundedSender<()>) -> Observers {
    Observers::new()
        .on_connect(move || {
            info!("connected");
            let _ = connected.send(());
        })
        .on_reconnect(|| info!("reconnecting"))
        .on_offline(|| warn!("offline"))
        .on_close(|| info!("connection closed"))
        .on_error(|error| warn!(%error, "client error"))
        .on_message(|topic, text| info!(topic, text, "message"))
        .on_subscription(|granted| {
            for grant in granted {
                info!(topic = %grant.topic, qos = ?grant.qos, "subscribed");
            }
        })
        .on_thing_connected(|thing| info!(thing, "thing connected"))
        .on_delta(|thing, state| info!(thing, %state, "shadow delta"))
        .on_status(|thing, status, token, state| {
            info!(thing, status = status.as_str(), %token, %state, "shadow status");
        })
        .on_timeout(|thing, token| warn!(thing, %token, "shadow request timed out"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Enable structured logging for the binary.
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    let config = load_config(&cli)?;
    let mode = if cli.shadow {
        ClientMode::Shadow
    } else {
        ClientMode::Device
    };

    let (connected_tx, mut connected_rx) = mpsc::unbounded_channel();
    let (connection, driver) = ConnectionBuilder::new()
        .with_config(config)
        .with_mode(mode)
        .with_observers(observers(connected_tx))
        .connect_mqtt()?;
    let shared = connection.into_shared();
    let shutdown = CancellationToken::new();

    let setup = {
        let shared = shared.clone();
        let shutdown = shutdown.clone();
        let topics = cli.topics;
        let things = cli.things;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    connected = connected_rx.recv() => if connected.is_none() { break },
                }
                let mut connection = lock(&shared);
                connection.subscribe(topics.iter().cloned(), None);
                if mode != ClientMode::Shadow {
                    continue;
                }
                for thing in &things {
                    match connection.add_thing(thing, None) {
                        Registration::Invalid => warn!(thing, "skipping invalid thing name"),
                        _ => {
                            let _ = connection.get(thing);
                        }
                    }
                }
            }
        })
    };

    let driving = tokio::spawn(drive(shared, driver, shutdown.clone()));
    tokio::signal::ctrl_c().await?;
    info!("interrupted, shutting down");
    shutdown.cancel();
    driving.await?;
    setup.await?;
    Ok(())
}
