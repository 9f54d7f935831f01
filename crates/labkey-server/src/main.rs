use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use labkey_hardware::AnyTransport;
use labkey_protocol::Dialect;
use labkey_reader::ReaderService;
use labkey_server::ServerConfig;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Arduino RFID reader bridge
#[derive(Parser, Debug)]
#[command(name = "labkey-bridge")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "LABKEY_CONFIG")]
    config: Option<PathBuf>,

    /// Serial port of the reader (an Arduino is discovered when unset)
    #[arg(short, long, env = "LABKEY_SERIAL_PORT")]
    port: Option<String>,

    /// Serial baud rate
    #[arg(long, env = "LABKEY_BAUD_RATE")]
    baud_rate: Option<u32>,

    /// HTTP listen address
    #[arg(long, env = "LABKEY_BIND")]
    bind: Option<SocketAddr>,

    /// Command dialect of the reader firmware (json, text)
    #[arg(long, env = "LABKEY_DIALECT")]
    dialect: Option<Dialect>,

    /// Run without serial hardware; only simulated scans work
    #[arg(long, env = "LABKEY_FORCE_MOCK")]
    force_mock: bool,

    /// Do not connect at startup or reconnect after a drop
    #[arg(long)]
    no_auto_connect: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl Args {
    /// Configuration file (or defaults) with command line overrides applied.
    fn resolve_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => ServerConfig::default(),
        };

        if let Some(port) = &self.port {
            config.reader.port = Some(port.clone());
        }
        if let Some(baud_rate) = self.baud_rate {
            config.reader.baud_rate = baud_rate;
        }
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(dialect) = self.dialect {
            config.reader.dialect = dialect;
        }
        config.reader.force_mock |= self.force_mock;
        if self.no_auto_connect {
            config.reader.auto_connect = false;
        }

        config.reader.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_format);

    let config = args.resolve_config()?;
    info!(
        version = labkey_core::VERSION,
        bind = %config.bind,
        port = ?config.reader.port,
        dialect = %config.reader.dialect,
        "Starting card reader bridge"
    );

    let transport = AnyTransport::detect(config.reader.force_mock);
    let reader = ReaderService::spawn(config.reader.clone(), transport);

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    let stopping = reader.clone();
    labkey_server::serve(listener, reader, async move {
        shutdown_signal().await;
        info!("Shutting down");
        stopping.shutdown().await;
    })
    .await
    .context("HTTP server error")?;

    info!("Card reader bridge stopped");
    Ok(())
}
