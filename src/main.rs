mod cli;

use anyhow::Context;
use clap::Parser;
use futures::StreamExt;
use tokio::io::BufReader;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::SignalKind;
use tokio::signal;

use cli::{Cli, Command};
use magbridge::clock::SystemClock;
use magbridge::sensors::mag::open_device;
use magbridge::sensors::reader::PollingSource;
use magbridge::sensors::{MagDevice, Sensor, SensorMessage};
use magbridge::{stdio, Bridge, Config, DeviceKind, Magnetometer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level).context("filtre de logs invalide")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    // stdout est réservé aux trames
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config()?;
    tracing::info!("[MAG] Capteur: {:?}, période {:?}", config.device(), config.sample_period());

    let token = CancellationToken::new();
    tokio::spawn(cancel_on_signal(token.clone()));

    let bridge = Bridge::spawn(magnetometer_source(config.clone()), SystemClock, token.child_token());

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let input = BufReader::new(tokio::io::stdin());
            stdio::serve(input, tokio::io::stdout(), bridge, token).await
        }
        Command::Read => read(bridge, &config).await,
        Command::Watch { frequency_ms } => {
            let frequency = frequency_ms.map(std::time::Duration::from_millis);
            watch(bridge, &config, frequency, token).await
        }
    }
}

/// Source de la plateforme : aucun capteur déclaré si `device` vaut `none`
fn magnetometer_source(
    config: Config,
) -> impl FnOnce(UnboundedSender<SensorMessage>) -> PollingSource<Box<dyn MagDevice>> {
    move |events| {
        let sensors = match config.device() {
            DeviceKind::None => Vec::new(),
            kind => vec![Sensor::magnetic_field(format!("{:?}", kind))],
        };
        let period = config.sample_period();

        PollingSource::new(sensors, period, events, move |_sensor| open_device(&config))
    }
}

async fn read(bridge: Bridge, config: &Config) -> anyhow::Result<()> {
    let client = Magnetometer::new(bridge.handle, bridge.frames, config.watch_frequency());
    let reading = client.current().await?;
    println!("{}", serde_json::to_string(&reading)?);
    Ok(())
}

async fn watch(
    bridge: Bridge,
    config: &Config,
    frequency: Option<std::time::Duration>,
    token: CancellationToken,
) -> anyhow::Result<()> {
    let client = Magnetometer::new(bridge.handle, bridge.frames, config.watch_frequency());
    let mut readings = client.watch(frequency);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            reading = readings.next() => match reading {
                Some(reading) => println!("{}", serde_json::to_string(&reading?)?),
                None => break,
            }
        }
    }

    client.clear_watch(readings.id());
    Ok(())
}

async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        let mut interrupt = match tokio::signal::unix::signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Impossible d'écouter SIGINT: {}", e);
                return;
            }
        };
        tokio::select! {
            _ = interrupt.recv() => {
                tracing::info!("Signal d'interruption reçu");
            },
            _ = signal::ctrl_c() => {
                tracing::info!("Signal de contrôle C reçu");
            },
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        tracing::info!("Signal de contrôle C reçu");
    }

    token.cancel();
}
