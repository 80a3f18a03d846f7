use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};

pub mod commands;
pub mod error;
pub mod scene;
pub mod sync;
pub mod util;

pub use error::{FetchError, ProtocolError, Result, SyncError};
pub use scene::{DeltaPatch, MeshType, Scene, SceneItem, WorkingCopy};
pub use sync::{RenderBinder, SceneSession, SessionOptions, Smoothing, VisualScene};

use commands::config::{self, SyncConfig};
use commands::watch::WatchOptions;
use sync::Endpoints;

#[derive(Parser)]
#[command(name = "scene-sync", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch an organization's scene once and print it as JSON
    Snapshot {
        org: String,

        /// Relay base URL (defaults to the configured server)
        #[arg(long)]
        server: Option<String>,
    },

    /// Follow an organization's live scene in a headless render loop
    Watch(WatchArgs),

    /// Inspect or change the persisted settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Debug)]
struct WatchArgs {
    /// Organization to follow (defaults to the last one watched)
    org: Option<String>,

    #[arg(long)]
    server: Option<String>,

    /// Frames per second of the render loop
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    seconds: Option<f64>,

    /// Assign targets directly instead of damping toward them
    #[arg(long)]
    no_smoothing: bool,

    /// Also write a session journal into this directory
    #[arg(long)]
    journal: Option<String>,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    SetServer { url: String },
    SetOrg { org: String },
}

fn session_options(config: &SyncConfig, server: Option<&str>) -> anyhow::Result<SessionOptions> {
    let server = server.unwrap_or(&config.server_url);
    let endpoints = Endpoints::from_server(server)?;
    Ok(SessionOptions {
        endpoints,
        smoothing: config.smoothing.to_smoothing(),
        reconnect: config.reconnect.to_policy(),
        heartbeat: config.heartbeat.to_heartbeat(),
    })
}

fn run_duration(seconds: Option<f64>) -> anyhow::Result<Option<Duration>> {
    let Some(seconds) = seconds else {
        return Ok(None);
    };
    if seconds.is_nan() || seconds <= 0.0 {
        bail!("--seconds must be a positive number, got {seconds}");
    }
    match Duration::try_from_secs_f64(seconds) {
        Ok(duration) => Ok(Some(duration)),
        Err(e) => bail!("--seconds {seconds} is out of range: {e}"),
    }
}

async fn run_watch(config: SyncConfig, args: WatchArgs) -> anyhow::Result<()> {
    let Some(org) = args.org.or_else(|| config.last_org.clone()) else {
        bail!("No organization given and none remembered; pass one, e.g. `scene-sync watch my-org`");
    };
    let duration = run_duration(args.seconds)?;
    if args.fps > commands::watch::MAX_FPS {
        log::warn!(
            "--fps {} is above {}; clamping",
            args.fps,
            commands::watch::MAX_FPS
        );
    }

    let mut session = session_options(&config, args.server.as_deref())?;
    if args.no_smoothing {
        session.smoothing = Smoothing::Disabled;
    }

    let options = WatchOptions {
        org: org.clone(),
        session,
        fps: args.fps,
        duration,
        journal: args.journal.map(|dir| util::expand_tilde(&dir)),
        json: args.json,
    };

    let mut stdout = std::io::stdout().lock();
    let outcome = commands::watch::watch(options, &mut stdout)
        .await
        .with_context(|| format!("Watching org {org} failed"))?;

    if outcome.snapshot_loaded {
        if let Err(e) = config::remember_org(&org) {
            log::warn!("Could not remember org {org}: {e}");
        }
    }
    log::info!(
        "Stopped after {} frames ({:?}, {} items)",
        outcome.frames,
        outcome.status,
        outcome.items
    );
    Ok(())
}

fn run_config(mut config: SyncConfig, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            if let Some(path) = config::config_path() {
                eprintln!("{}", path.display());
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
            return Ok(());
        }
        ConfigAction::SetServer { url } => {
            Endpoints::from_server(&url)?;
            config.server_url = url;
        }
        ConfigAction::SetOrg { org } => config.last_org = Some(org),
    }
    config::save_config(&config).context("Saving config failed")?;
    Ok(())
}

/// Entry point of the `scene-sync` binary.
pub async fn run() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = config::load_or_default();

    match cli.command {
        Command::Snapshot { org, server } => {
            let server = server.unwrap_or_else(|| config.server_url.clone());
            let scene = commands::snapshot::fetch_snapshot(&server, &org)
                .await
                .with_context(|| format!("Fetching scene for org {org} from {server} failed"))?;
            println!("{}", commands::snapshot::to_pretty_json(&scene)?);
        }
        Command::Watch(args) => run_watch(config, args).await?,
        Command::Config { action } => run_config(config, action)?,
    }
    Ok(())
}
