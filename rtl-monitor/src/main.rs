//! rtl-monitor: live threat display for RTL rear-view bike radars.

use std::io::{self, Read};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use log::{info, LevelFilter};

use rtl_core::config::{self, Config};
use rtl_core::monitor::ThreatMonitor;
use rtl_core::projector::Projector;
use rtl_core::render::{HandleAllocator, VisualId};

mod capture;
mod console;
mod pipeline;

use capture::{DemoSource, NotificationSource, ReplaySource};
use console::{ConsoleRenderer, OutputMode};
use pipeline::PipelineOptions;

/// Character columns used for the lane view.
const LANE_COLUMNS: usize = 80;

#[derive(Parser)]
#[command(name = "rtl-monitor", version, about = "RTL rear-radar threat monitor")]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file (defaults to ~/.rtl-radar/config.yaml)
    #[arg(long, global = true, env = "RTL_RADAR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a capture file and print the resulting threats
    Decode {
        /// Capture file, one hex notification per line ("-" for stdin)
        file: PathBuf,

        /// Print every frame and diff instead of the summary table
        #[arg(short, long)]
        raw: bool,
    },

    /// Run the live decode + display pipeline
    Monitor {
        /// Replay a capture file instead of the demo sensor
        #[arg(long, conflicts_with = "demo")]
        replay: Option<PathBuf>,

        /// Pace replay by the recorded timestamps
        #[arg(long, requires = "replay")]
        realtime: bool,

        /// Use the synthetic demo sensor
        #[arg(long)]
        demo: bool,

        /// Demo traffic seed
        #[arg(long, default_value = "1")]
        seed: u64,

        /// Stop the demo after this many notifications
        #[arg(long)]
        frames: Option<u64>,

        /// Demo notification interval in milliseconds
        #[arg(long, default_value = "200")]
        demo_interval_ms: u64,

        /// Display refresh period in milliseconds
        #[arg(long)]
        tick_ms: Option<u64>,

        /// Diffs buffered between decoder and display
        #[arg(long)]
        queue_depth: Option<usize>,

        /// Distance (m) mapped to the left edge of the lane
        #[arg(long)]
        reference_distance: Option<f64>,

        /// Lane width in display units
        #[arg(long)]
        screen_width: Option<f64>,

        /// Print visual changes as JSON lines instead of the lane view
        #[arg(long)]
        json: bool,
    },

    /// Show or initialise the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write the default configuration file
    Init,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    };

    match cli.command {
        Commands::Decode { file, raw } => cmd_decode(file, raw, &config),
        Commands::Monitor {
            replay,
            realtime,
            demo,
            seed,
            frames,
            demo_interval_ms,
            tick_ms,
            queue_depth,
            reference_distance,
            screen_width,
            json,
        } => {
            let mut config = config;
            apply_overrides(
                &mut config,
                Overrides {
                    tick_ms,
                    queue_depth,
                    reference_distance,
                    screen_width,
                },
            )?;
            let source = match replay {
                Some(path) => SourceChoice::Replay { path, realtime },
                None => {
                    if !demo {
                        info!("no --replay given, using the demo sensor");
                    }
                    SourceChoice::Demo {
                        seed,
                        frames,
                        interval: Duration::from_millis(demo_interval_ms),
                    }
                }
            };
            let mode = if json {
                OutputMode::Json
            } else {
                OutputMode::Lane
            };
            cmd_monitor(source, mode, &config)
        }
        Commands::Config { action } => cmd_config(action, cli.config, &config),
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default)]
struct Overrides {
    tick_ms: Option<u64>,
    queue_depth: Option<usize>,
    reference_distance: Option<f64>,
    screen_width: Option<f64>,
}

fn apply_overrides(config: &mut Config, overrides: Overrides) -> anyhow::Result<()> {
    if let Some(v) = overrides.tick_ms {
        config.display.tick_ms = v.max(1);
    }
    if let Some(v) = overrides.queue_depth {
        config.display.queue_depth = v.max(1);
    }
    if let Some(v) = overrides.reference_distance {
        config.projector.reference_distance = v;
    }
    if let Some(v) = overrides.screen_width {
        config.projector.screen_width = v;
    }
    config
        .projector
        .validate()
        .context("invalid projector settings")?;
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

fn cmd_decode(file: PathBuf, raw: bool, config: &Config) -> anyhow::Result<()> {
    let text = if file.to_str() == Some("-") {
        let mut s = String::new();
        io::stdin()
            .read_to_string(&mut s)
            .context("reading capture from stdin")?;
        s
    } else {
        std::fs::read_to_string(&file)
            .with_context(|| format!("opening capture {}", file.display()))?
    };

    let (notifications, skipped) = capture::parse_capture_text(&text);
    let projector = Projector::new(config.projector);
    let mut monitor: ThreatMonitor<VisualId> = ThreatMonitor::new(projector);
    let mut handles = HandleAllocator::new();

    for n in &notifications {
        let diff = match monitor.process(&n.payload, &mut handles) {
            Ok(d) => d,
            Err(e) => {
                if raw {
                    println!(
                        "{:.2} {} rejected: {e}",
                        n.timestamp,
                        rtl_core::hex_encode(&n.payload)
                    );
                }
                continue;
            }
        };
        if raw {
            let resolver = monitor.resolver();
            println!(
                "{:.2} seq={} threats={}",
                n.timestamp,
                resolver.last_sequence_id().unwrap_or_default(),
                resolver.last_resolved().len()
            );
            println!("  {}", serde_json::to_string(&diff)?);
        }
    }

    if !raw {
        print_summary(&monitor, skipped);
    }
    Ok(())
}

fn print_summary(monitor: &ThreatMonitor<VisualId>, skipped_lines: usize) {
    let registry = monitor.registry();
    println!();
    println!(
        "Frames: {} read, {} valid, {} rejected, {} merged continuations ({} unreadable lines)",
        monitor.total_frames,
        monitor.valid_frames,
        monitor.rejected_frames,
        monitor.resolver().merges,
        skipped_lines
    );
    println!(
        "Threats: {} seen, {} gone, {} still visible",
        registry.total_added,
        registry.total_removed,
        registry.len()
    );
    println!();

    if registry.is_empty() {
        return;
    }

    let projector = monitor.projector();
    let mut table = Table::new();
    table.set_header(vec![
        "Number", "Distance (m)", "Speed", "Class", "Position", "Updates",
    ]);
    for view in registry.views() {
        table.add_row(vec![
            Cell::new(view.number),
            Cell::new(view.distance),
            Cell::new(view.speed),
            Cell::new(view.class),
            Cell::new(format!("{:.0}", projector.position(view.distance))),
            Cell::new(view.updates),
        ]);
    }
    println!("{table}");
}

enum SourceChoice {
    Replay { path: PathBuf, realtime: bool },
    Demo {
        seed: u64,
        frames: Option<u64>,
        interval: Duration,
    },
}

fn cmd_monitor(choice: SourceChoice, mode: OutputMode, config: &Config) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating async runtime")?;

    runtime.block_on(async {
        let candidate: Box<dyn NotificationSource> = match choice {
            SourceChoice::Replay { path, realtime } => {
                let source = ReplaySource::open(&path, realtime)
                    .await
                    .with_context(|| format!("opening capture {}", path.display()))?;
                if source.skipped_lines > 0 {
                    log::warn!("{} unreadable lines skipped", source.skipped_lines);
                }
                Box::new(source)
            }
            SourceChoice::Demo {
                seed,
                frames,
                interval,
            } => Box::new(DemoSource::new(seed, interval, frames)),
        };

        let source = capture::connect(vec![candidate], &config.sensor)
            .context("sensor setup failed")?;

        let projector = Projector::new(config.projector);
        let renderer = ConsoleRenderer::new(
            io::stdout(),
            mode,
            config.projector.screen_width,
            LANE_COLUMNS,
        );
        let options = PipelineOptions {
            tick: Duration::from_millis(config.display.tick_ms),
            queue_depth: config.display.queue_depth,
        };
        let shutdown = async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        let (report, _) = pipeline::run(source, projector, renderer, options, shutdown).await?;
        info!(
            "{} threats seen, {} still visible at exit",
            report.threats_added, report.still_visible
        );
        Ok(())
    })
}

fn cmd_config(action: ConfigAction, path: Option<PathBuf>, config: &Config) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            print!("{}", config::serialize_config(config));
        }
        ConfigAction::Init => {
            let defaults = Config::default();
            let written = match path {
                Some(p) => {
                    config::save_config_to(&defaults, &p)?;
                    p
                }
                None => config::save_config(&defaults)?,
            };
            println!("Wrote {}", written.display());
        }
    }
    Ok(())
}
