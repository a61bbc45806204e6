//! Command-line runner for the FIWARE artifacts.
//!
//! `subscribe` keeps an NGSI-LD subscription in place and prints every relayed
//! notification to stdout as one JSON line. `insert` reads JSON lines from
//! stdin, publishes them on behalf of the configured publisher, and writes the
//! resulting entities to the broker. Both run until Ctrl+C.

mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use artifact_bus::{ArtifactRuntime, BusHandle, InProcessBus};
use clap::{Parser, Subcommand};
use inserter::{InserterArtifact, InserterConfig, InserterSettings};
use subscription_manager::{ManagerSettings, SubscriptionConfig, SubscriptionManagerArtifact};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

use crate::logging::{init_logging, LoggingMode};

const DEFAULT_BROKER_URL: &str = "http://localhost:9090";

#[derive(Parser, Debug)]
#[command(
    name = "fiware-artifacts",
    about = "Run NGSI-LD subscription manager and inserter artifacts",
    version
)]
struct Cli {
    /// Where log output goes
    #[arg(long, value_enum, default_value_t = LoggingMode::Development, global = true)]
    log_mode: LoggingMode,

    /// Base URL of the context broker
    #[arg(long, default_value = DEFAULT_BROKER_URL, global = true)]
    broker_url: String,

    /// Timeout for every broker request, in seconds
    #[arg(long, global = true)]
    request_timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Maintain a subscription and print its notifications
    Subscribe {
        /// JSON subscription configuration
        #[arg(long)]
        config: PathBuf,

        /// Identity the artifact runs under
        #[arg(long, default_value = "subscriber@localhost")]
        identity: String,

        /// First port tried for the notification listener
        #[arg(long, default_value = "8000")]
        port_start: u16,

        /// Last port tried for the notification listener
        #[arg(long, default_value = "65000")]
        port_end: u16,
    },
    /// Insert JSON lines read from stdin as broker entities
    Insert {
        /// JSON inserter configuration
        #[arg(long)]
        config: PathBuf,

        /// Identity the artifact runs under
        #[arg(long, default_value = "inserter@localhost")]
        identity: String,

        /// Publisher identity, overriding the configured one
        #[arg(long)]
        publisher: Option<String>,
    },
}

impl Cli {
    /// Validate argument combinations clap cannot express.
    fn validate(&self) -> Result<()> {
        if self.broker_url.trim().is_empty() {
            return Err(anyhow::anyhow!("Broker URL cannot be empty"));
        }
        if self.request_timeout == Some(0) {
            return Err(anyhow::anyhow!("Request timeout must be greater than 0"));
        }

        match &self.command {
            Command::Subscribe {
                port_start,
                port_end,
                identity,
                ..
            } => {
                if port_start > port_end {
                    return Err(anyhow::anyhow!(
                        "Port start ({port_start}) cannot be greater than port end ({port_end})"
                    ));
                }
                if identity.trim().is_empty() {
                    return Err(anyhow::anyhow!("Identity cannot be empty"));
                }
            }
            Command::Insert {
                identity, publisher, ..
            } => {
                if identity.trim().is_empty() {
                    return Err(anyhow::anyhow!("Identity cannot be empty"));
                }
                if publisher.as_deref().is_some_and(|p| p.trim().is_empty()) {
                    return Err(anyhow::anyhow!("Publisher cannot be empty"));
                }
            }
        }
        Ok(())
    }

    fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout.map(Duration::from_secs)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.validate().context("Invalid arguments")?;

    init_logging(cli.log_mode).context("Failed to initialize logging")?;

    let result = match &cli.command {
        Command::Subscribe {
            config,
            identity,
            port_start,
            port_end,
        } => run_subscribe(&cli, config, identity, (*port_start, *port_end)).await,
        Command::Insert {
            config,
            identity,
            publisher,
        } => run_insert(&cli, config, identity, publisher.as_deref()).await,
    };

    if let Err(e) = result {
        if cli.log_mode == LoggingMode::Silent {
            eprintln!("Error: {e:#}");
        } else {
            error!("{e:#}");
        }
        std::process::exit(1);
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file {}", path.display()))
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => error!("Failed to listen for Ctrl+C: {e}"),
    }
}

async fn run_subscribe(
    cli: &Cli,
    config_path: &Path,
    identity: &str,
    port_range: (u16, u16),
) -> Result<()> {
    let config = SubscriptionConfig::from_json_str(&read_config(config_path)?)
        .context("Invalid subscription configuration")?;

    let mut settings = ManagerSettings::new()
        .with_broker_url(cli.broker_url.clone())
        .with_callback_port_range(port_range.0, port_range.1);
    if let Some(timeout) = cli.request_timeout() {
        settings = settings.with_request_timeout(timeout);
    }

    let bus = InProcessBus::new();
    let printer = spawn_notification_printer(&bus, identity).await?;

    let artifact = SubscriptionManagerArtifact::new(Arc::new(bus.handle(identity)), settings, config)
        .context("Failed to create subscription manager")?;
    info!(
        "Subscription manager {} using identifier {}",
        artifact.identity(),
        artifact.identifier()
    );

    let outcome = artifact
        .run(shutdown_signal())
        .await
        .context("Subscription manager failed")?;
    info!("Subscription manager finished: {outcome:?}");

    printer.abort();
    Ok(())
}

/// Print everything `identity` publishes, one JSON document per line.
async fn spawn_notification_printer(
    bus: &InProcessBus,
    identity: &str,
) -> Result<tokio::task::JoinHandle<()>> {
    let printer = bus.handle(format!("stdout.{identity}"));
    printer.start().await?;
    let mut publications = printer
        .link(identity)
        .await
        .with_context(|| format!("Failed to link to {identity}"))?;

    Ok(tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        loop {
            match publications.recv().await {
                Ok(publication) => {
                    let line = format!("{}\n", publication.payload);
                    if let Err(e) = stdout.write_all(line.as_bytes()).await {
                        error!("Failed to write notification: {e}");
                        break;
                    }
                    let _ = stdout.flush().await;
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Dropped {skipped} notification(s)");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }))
}

async fn run_insert(
    cli: &Cli,
    config_path: &Path,
    identity: &str,
    publisher: Option<&str>,
) -> Result<()> {
    let mut config = InserterConfig::from_json_str(&read_config(config_path)?)
        .context("Invalid inserter configuration")?;
    if let Some(publisher) = publisher {
        config.publisher = publisher.to_string();
    }

    let mut settings = InserterSettings::new().with_broker_url(cli.broker_url.clone());
    if let Some(timeout) = cli.request_timeout() {
        settings = settings.with_request_timeout(timeout);
    }

    let bus = InProcessBus::new();
    let publisher = bus.handle(config.publisher.clone());
    publisher.start().await?;

    let artifact = InserterArtifact::new(Arc::new(bus.handle(identity)), settings, config)
        .context("Failed to create inserter")?;

    let reader = tokio::spawn(publish_stdin(bus.clone(), publisher));
    artifact
        .run(shutdown_signal())
        .await
        .context("Inserter failed")?;

    reader.abort();
    Ok(())
}

/// Publish every non-empty stdin line once the inserter has linked.
async fn publish_stdin(bus: InProcessBus, publisher: BusHandle) {
    while bus.linked_count(publisher.identity()) == 0 {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    info!("Reading payloads for {} from stdin", publisher.identity());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => {
                if let Err(e) = publisher.publish(line).await {
                    error!("Failed to publish payload: {e}");
                }
            }
            Ok(None) => {
                info!("stdin closed, waiting for Ctrl+C");
                break;
            }
            Err(e) => {
                error!("Failed to read stdin: {e}");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("fiware-artifacts").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_subscribe_defaults() {
        let cli = parse(&["subscribe", "--config", "sub.json"]);

        assert_eq!(cli.broker_url, DEFAULT_BROKER_URL);
        assert_eq!(cli.log_mode, LoggingMode::Development);
        assert!(cli.request_timeout().is_none());
        match cli.command {
            Command::Subscribe {
                identity,
                port_start,
                port_end,
                ..
            } => {
                assert_eq!(identity, "subscriber@localhost");
                assert_eq!((port_start, port_end), (8000, 65000));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&[
            "insert",
            "--config",
            "insert.json",
            "--publisher",
            "sensor@localhost",
            "--broker-url",
            "http://broker:1026",
            "--log-mode",
            "json",
            "--request-timeout",
            "5",
        ]);

        assert_eq!(cli.broker_url, "http://broker:1026");
        assert_eq!(cli.log_mode, LoggingMode::Json);
        assert_eq!(cli.request_timeout(), Some(Duration::from_secs(5)));
        assert!(cli.validate().is_ok());
    }

    #[rstest]
    #[case(&["subscribe", "--config", "c.json", "--port-start", "9000", "--port-end", "8000"])]
    #[case(&["subscribe", "--config", "c.json", "--identity", " "])]
    #[case(&["insert", "--config", "c.json", "--publisher", ""])]
    #[case(&["insert", "--config", "c.json", "--request-timeout", "0"])]
    #[case(&["insert", "--config", "c.json", "--broker-url", ""])]
    fn test_invalid_arguments(#[case] args: &[&str]) {
        assert!(parse(args).validate().is_err());
    }

    #[test]
    fn test_config_is_required() {
        assert!(Cli::try_parse_from(["fiware-artifacts", "subscribe"]).is_err());
    }

    #[test]
    fn test_missing_config_file() {
        let err = read_config(Path::new("/nonexistent/fiware.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/fiware.json"));
    }
}
