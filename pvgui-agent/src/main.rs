//! pvgui-agent entry point.
//!
//! ```text
//! pvgui-agent                    Serve the default channel
//! pvgui-agent --config <path>    Load a custom config TOML
//! pvgui-agent --domain 3         Override the peer domain
//! pvgui-agent --port 6001        Override the channel port
//! pvgui-agent --gen-config       Write default config to stdout
//! pvgui-agent --gen-config <path>  Write default config to a file
//! ```

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pvgui_agent::config::{AgentConfig, LoggingConfig};
use pvgui_agent::headless::{HeadlessDisplay, LoggingSink, spawn_repaint};
use pvgui_agent::pagemap::PagemapResolver;
use pvgui_agent::unix::UnixConnector;
use pvgui_core::{DisplayEvent, GuiError, Session};

/// How long the session gets to wind down after Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "pvgui-agent", about = "Paravirtualized GUI agent")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "pvgui-agent.toml")]
    config: PathBuf,

    /// Peer domain id (overrides the config file).
    #[arg(long)]
    domain: Option<u32>,

    /// Channel port (overrides the config file).
    #[arg(long)]
    port: Option<u32>,

    /// Print the default configuration and exit; with a path, write it
    /// there instead.
    #[arg(long, value_name = "PATH", num_args = 0..=1)]
    gen_config: Option<Option<PathBuf>>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    match &cli.gen_config {
        Some(Some(path)) => {
            AgentConfig::write_default(path)?;
            println!("wrote default configuration to {}", path.display());
            return Ok(());
        }
        Some(None) => {
            println!("{}", AgentConfig::default().to_toml()?);
            return Ok(());
        }
        None => {}
    }

    // Load config.
    let mut config = AgentConfig::load(&cli.config);
    if let Some(domain) = cli.domain {
        config.channel.domain = domain;
    }
    if let Some(port) = cli.port {
        config.channel.port = port;
    }

    init_tracing(&config.logging)?;

    info!("pvgui-agent v{}", env!("CARGO_PKG_VERSION"));
    info!("peer domain: {}", config.channel.domain);
    info!("channel port: {}", config.channel.port);
    info!(
        "framebuffer: {}x{} at {}bpp",
        config.display.width, config.display.height, config.display.bits_per_pixel
    );

    let session_config = config.to_session_config()?;
    let (events, mut rx) = mpsc::channel::<DisplayEvent>(64);

    let display = HeadlessDisplay::new(
        config.display.width,
        config.display.height,
        config.display.bits_per_pixel,
    );
    let repaint = config.repaint_interval().map(|period| {
        info!(?period, "headless repaint enabled");
        spawn_repaint(events.clone(), display.full_damage(), period)
    });

    let mut task = tokio::spawn(async move {
        let connector =
            UnixConnector::new(&config.channel.socket_dir, config.channel.ring_size);
        let sink = LoggingSink::new(config.input.absolute_pointer);
        let resolver = PagemapResolver::open()?;

        let mut session =
            Session::new(session_config, connector, display, sink, resolver).await?;
        session.run(&mut rx).await?;
        info!(reconnects = session.reconnects(), "session finished");
        Ok::<(), GuiError>(())
    });

    let joined = tokio::select! {
        res = &mut task => res,
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
            // Closing the event source ends a running session.
            if let Some(repaint) = &repaint {
                repaint.abort();
            }
            drop(events);
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await {
                Ok(res) => res,
                Err(_) => {
                    warn!("session did not stop in time, cancelling");
                    task.abort();
                    return Ok(());
                }
            }
        }
    };
    if let Some(repaint) = repaint {
        repaint.abort();
    }

    match joined? {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("agent stopped: {e}");
            Err(e.into())
        }
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if logging.file.is_empty() {
        builder.init();
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&logging.file)?;
        builder.with_ansi(false).with_writer(Mutex::new(file)).init();
    }
    Ok(())
}
