use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use glam::{Quat, Vec3};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use holo_decor::analysis::WallDetectionClient;
use holo_decor::api::{self, DetectorAuth, DetectorPolicy, StubDetector};
use holo_decor::assets::ResourceLoader;
use holo_decor::capability::{CapabilityProber, SupportState};
use holo_decor::config::{self, PipelineConfig, TriggerPolicy};
use holo_decor::device::simulated::{
    ConsoleNotifier, ImageDirFrames, SimulatedStream, SimulatedXr, SolidFrames,
};
use holo_decor::device::{FrameSource, NotificationPermission};
use holo_decor::render::PassthroughRenderer;
use holo_decor::scene::InputSource;
use holo_decor::status::StatusLine;
use holo_decor::{Collaborators, Pipeline, PipelineHandle};

#[derive(Parser)]
#[command(name = "holo")]
#[command(about = "Detect a wall in the camera feed and place furniture on it")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline against a simulated AR device
    Run {
        /// Directory of jpg/png frames fed to the camera (mid-gray if omitted)
        #[arg(short, long)]
        frames: Option<PathBuf>,

        /// Directory that web-style model paths resolve against
        #[arg(long)]
        asset_root: Option<PathBuf>,

        /// Override the detection endpoint
        #[arg(long)]
        endpoint: Option<String>,

        /// Override the trigger policy (periodic, quality_gated, one_shot)
        #[arg(long)]
        policy: Option<String>,

        /// Simulate a device without immersive AR support
        #[arg(long)]
        no_ar: bool,
    },
    /// Only run the capability probe
    Probe {
        /// Simulate a device without any XR runtime
        #[arg(long)]
        no_xr: bool,
    },
    /// Serve a stub wall detector for local runs
    ServeDetector {
        /// Port for HTTP API
        #[arg(short, long, default_value = "8765")]
        port: u16,

        /// Verdict policy
        #[arg(long, value_enum, default_value = "brightness")]
        policy: DetectorPolicy,
    },
    /// Print the effective configuration as JSON
    Config,
}

/// Initialize tracing with output to stderr (interactive mode) or stdout
fn init_tracing(use_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "holo_decor=debug,tower_http=debug".into()),
    );

    if use_stderr {
        // Run mode: stdout carries the status line
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let use_stderr = matches!(cli.command, Commands::Run { .. });
    init_tracing(use_stderr);

    match cli.command {
        Commands::Run {
            frames,
            asset_root,
            endpoint,
            policy,
            no_ar,
        } => {
            let mut config = PipelineConfig::load();
            if let Some(endpoint) = endpoint {
                config.capture.endpoint = endpoint;
            }
            if let Some(policy) = policy {
                config.capture.trigger_policy = TriggerPolicy::parse(&policy)
                    .ok_or_else(|| anyhow::anyhow!("unknown trigger policy: {}", policy))?;
            }
            run(config, frames, asset_root, no_ar).await?;
        }
        Commands::Probe { no_xr } => {
            let config = PipelineConfig::load();
            let xr = if no_xr {
                SimulatedXr::without_xr()
            } else {
                SimulatedXr::ar_capable()
            };
            let prober = CapabilityProber::new(
                Arc::new(xr),
                Arc::new(ConsoleNotifier::new(NotificationPermission::Denied)),
                config.session.mode,
            );
            let status = StatusLine::new();
            let state = prober.probe(&status).await;
            println!("{}", status.current());
            if state != SupportState::Supported {
                std::process::exit(1);
            }
        }
        Commands::ServeDetector { port, policy } => {
            let config = PipelineConfig::load();
            let detector = StubDetector::with_gate(policy, &config.gate);
            let app = api::create_router_with_auth(detector, DetectorAuth::from_env());

            let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
            tracing::info!(
                ?policy,
                "Stub detector listening on http://127.0.0.1:{}/detect-wall",
                port
            );

            axum::serve(listener, app).await?;
        }
        Commands::Config => {
            let config = PipelineConfig::load();
            if let Ok(path) = config::config_path() {
                eprintln!("# {}", path.display());
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn run(
    config: PipelineConfig,
    frames: Option<PathBuf>,
    asset_root: Option<PathBuf>,
    no_ar: bool,
) -> anyhow::Result<()> {
    let source: Box<dyn FrameSource> = match frames {
        Some(dir) => Box::new(ImageDirFrames::open(&dir)?),
        None => Box::new(SolidFrames::gray(
            config.render.width,
            config.render.height,
            128,
        )),
    };
    let xr = if no_ar {
        SimulatedXr::inline_only()
    } else {
        SimulatedXr::ar_capable()
    };
    let mut loader = ResourceLoader::new();
    if let Some(root) = asset_root {
        loader = loader.with_asset_root(root);
    }

    let parts = Collaborators {
        xr: Arc::new(xr),
        notifier: Arc::new(ConsoleNotifier::new(NotificationPermission::Denied)),
        renderer: Box::new(PassthroughRenderer::new(source)),
        analyzer: Arc::new(WallDetectionClient::from_config(&config.capture)?),
        loader: Arc::new(loader),
        media: Some(Box::new(SimulatedStream::new())),
    };
    let handle = Pipeline::new(config, parts)?.spawn();

    eprintln!("commands: select [x y z] | zoom <dy> | resize <w> <h> | restart | status | close");
    console(&handle).await?;

    if let Some(report) = handle.close().await {
        println!("{}", report.status);
        tracing::info!(
            outcome = ?report.outcome,
            load_state = ?report.load_state,
            counters = ?report.counters,
            "Pipeline finished"
        );
    }
    Ok(())
}

/// Print status changes and forward stdin commands until `close`, EOF, or the
/// pipeline stopping on its own.
async fn console(handle: &PipelineHandle) -> anyhow::Result<()> {
    let mut status = handle.subscribe_status();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                println!("{}", status.borrow_and_update().as_str());
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(());
                };
                if !dispatch(handle, line.trim()) {
                    return Ok(());
                }
            }
        }
    }
}

/// Returns `false` when the console should stop.
fn dispatch(handle: &PipelineHandle, line: &str) -> bool {
    let mut words = line.split_whitespace();
    let command = words.next().unwrap_or_default();
    let args: Vec<f32> = words.filter_map(|w| w.parse().ok()).collect();

    match (command, args.as_slice()) {
        ("", _) => true,
        ("close" | "quit" | "exit", _) => false,
        ("select", [x, y, z]) => handle.select(InputSource::pose(Vec3::new(*x, *y, *z), Quat::IDENTITY)),
        ("select", _) => handle.select(InputSource::pose(Vec3::ZERO, Quat::IDENTITY)),
        ("zoom", [delta_y]) => handle.zoom(*delta_y),
        ("resize", [width, height]) if *width >= 1.0 && *height >= 1.0 => {
            handle.resize(*width as u32, *height as u32)
        }
        ("restart", _) => handle.restart_capture(),
        ("status", _) => {
            println!("{}", handle.status());
            true
        }
        _ => {
            eprintln!("unrecognized command: {}", line);
            true
        }
    }
}
