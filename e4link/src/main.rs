//! e4link — entry point.
//!
//! ```text
//! e4link                         Run one session with e4link.toml
//! e4link --config <path>         Load a custom config TOML
//! e4link --gen-config            Write default config to stdout
//! e4link --device <id>           Attach this device instead of discovering
//! e4link --window <secs>         Enable windowing
//! e4link --duration <secs>       Streaming time
//! e4link --output <path>         Readings file
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use e4link::config::E4Config;
use e4link::session::StreamingSession;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "e4link", about = "Record a session from the E4 streaming bridge")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "e4link.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Device id to attach.
    #[arg(short, long)]
    device: Option<String>,

    /// Window length in seconds (0 disables windowing).
    #[arg(short, long)]
    window: Option<f64>,

    /// Streaming duration in seconds.
    #[arg(long)]
    duration: Option<f64>,

    /// Output file for the readings.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, config: &mut E4Config) {
        if let Some(id) = &self.device {
            config.device.id = id.clone();
        }
        if let Some(window) = self.window {
            config.device.window_size_secs = window;
        }
        if let Some(duration) = self.duration {
            config.session.duration_secs = duration;
        }
        if let Some(output) = &self.output {
            config.session.output = output.clone();
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&E4Config::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = E4Config::load(&cli.config);
    cli.apply(&mut config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("e4link v{}", env!("CARGO_PKG_VERSION"));
    info!("bridge: {}", config.connection_info());
    info!("output: {}", config.session.output.display());

    let session = StreamingSession::new(config);
    let stop = session.stop_handle();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, finishing session");
        stop.notify_one();
    });

    session.run().await?;
    Ok(())
}
