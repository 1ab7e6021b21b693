//! Pose Binder CLI
//!
//! Hold a body pose steady, lock it in, and bind it to a key.

use clap::{Parser, Subcommand};
use crossbeam_channel::{unbounded, Receiver};
use pose_binder::{
    acquisition::AcquisitionWorker,
    backend::{ReplayBackend, TopologyKind},
    config::Config,
    core::{
        create_shared_engine, library::read_records, lock_engine, LiveStatus, Mode, PoseEngine,
        PoseFile,
    },
    core::trigger::{KeyTrigger, TriggerAction},
    input::{spawn_console_reader, InputEvent, OperatorCommand, OperatorSession},
    stats::{create_shared_stats_with_persistence, PersistedStats},
    CONSOLE_HELP, VERSION,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pose-binder")]
#[command(version = VERSION)]
#[command(about = "Bind held body poses to keyboard keys", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track a body and run the operator console
    Run {
        /// Recorded tracking session to replay (JSON lines)
        #[arg(long)]
        replay: PathBuf,

        /// Restart the recording when it ends
        #[arg(long = "loop")]
        looping: bool,

        /// Milliseconds between replayed frames
        #[arg(long)]
        frame_interval: Option<u64>,

        /// Pose comparison threshold
        #[arg(long)]
        threshold: Option<f32>,

        /// Mode to start in (record or execute)
        #[arg(long)]
        mode: Option<String>,

        /// Pose file to import at start and export at exit
        #[arg(long)]
        poses: Option<PathBuf>,

        /// Also serve live status over HTTP on this port (requires server feature)
        #[arg(long)]
        serve: Option<u16>,
    },

    /// List the records of a pose file
    Inspect {
        /// Pose file to read
        file: PathBuf,

        /// Skeleton layout the file was recorded with
        #[arg(long)]
        topology: Option<String>,
    },

    /// List the joints of a skeleton layout
    Joints {
        /// azure_kinect or kinect_v2
        #[arg(long)]
        topology: Option<String>,
    },

    /// Show or update the configuration
    Config {
        /// Set the comparison threshold
        #[arg(long)]
        threshold: Option<f32>,

        /// Set the excluded joints (comma separated, "none" to clear)
        #[arg(long)]
        exclude: Option<String>,

        /// Set the skeleton layout
        #[arg(long)]
        topology: Option<String>,

        /// Set the pose file
        #[arg(long)]
        pose_file: Option<PathBuf>,
    },

    /// Show cumulative session statistics
    Status,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            replay,
            looping,
            frame_interval,
            threshold,
            mode,
            poses,
            serve,
        } => {
            cmd_run(RunOptions {
                replay,
                looping,
                frame_interval,
                threshold,
                mode,
                poses,
                serve,
            });
        }
        Commands::Inspect { file, topology } => {
            cmd_inspect(&file, topology.as_deref());
        }
        Commands::Joints { topology } => {
            cmd_joints(topology.as_deref());
        }
        Commands::Config {
            threshold,
            exclude,
            topology,
            pose_file,
        } => {
            cmd_config(threshold, exclude, topology, pose_file);
        }
        Commands::Status => {
            cmd_status();
        }
    }
}

struct RunOptions {
    replay: PathBuf,
    looping: bool,
    frame_interval: Option<u64>,
    threshold: Option<f32>,
    mode: Option<String>,
    poses: Option<PathBuf>,
    serve: Option<u16>,
}

fn cmd_run(options: RunOptions) {
    println!("Pose Binder v{VERSION}");
    println!();

    // Load configuration, then apply per-run overrides
    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config, using defaults: {e}");
        Config::default()
    });
    if let Some(threshold) = options.threshold {
        config.threshold = threshold;
    }
    if let Some(ms) = options.frame_interval {
        config.frame_interval = Duration::from_millis(ms);
    }
    if let Some(ref raw) = options.mode {
        match Mode::parse(raw) {
            Some(mode) => config.mode = mode,
            None => {
                eprintln!("Error: Unknown mode '{raw}' (expected record or execute)");
                std::process::exit(1);
            }
        }
    }
    if let Some(poses) = options.poses {
        config.pose_file = poses;
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let settings = match config.compare_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let topology = config.topology();
    println!("  Topology: {:?} ({} joints)", topology.kind, topology.joint_count());
    println!("  Joints compared: {}", settings.mask.included_count());
    println!("  Threshold: {}", settings.threshold);
    println!("  Pose file: {:?}", config.pose_file);
    println!();

    let mut engine = PoseEngine::new(topology, settings, config.stability_frames);
    engine.set_mode(config.mode);
    let mut pose_file = PoseFile::new(&config.pose_file);
    match pose_file.load_into(&mut engine) {
        Ok(0) => {}
        Ok(added) => println!("Loaded {added} poses from {:?}", config.pose_file),
        Err(e) => {
            eprintln!("Warning: Could not load poses: {e}");
            eprintln!(
                "  {:?} is left untouched; poses from this run go to {:?}",
                config.pose_file,
                pose_file.save_path()
            );
        }
    }
    let engine = create_shared_engine(engine);

    let stats = create_shared_stats_with_persistence(config.stats_path());
    println!("Session ID: {}", stats.session_id());

    let mut worker = AcquisitionWorker::new(engine.clone(), stats.clone());
    let backend = ReplayBackend::new(&options.replay, topology)
        .with_frame_interval(config.frame_interval)
        .looping(options.looping);
    if let Err(e) = worker.start(Box::new(backend)) {
        tracing::error!("{e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    let mut session =
        OperatorSession::new(engine.clone(), stats.clone()).with_trigger_sink(worker.trigger_sink());

    #[cfg(feature = "server")]
    let _server = options
        .serve
        .and_then(|port| start_server(port, &engine, &stats, &worker));
    #[cfg(not(feature = "server"))]
    if options.serve.is_some() {
        eprintln!("Warning: --serve flag ignored (server feature not enabled at compile time)");
    }

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let (event_tx, event_rx) = unbounded();
    if let Err(e) = spawn_console_reader(std::io::BufReader::new(std::io::stdin()), event_tx) {
        eprintln!("Warning: Console unavailable: {e}");
    }

    println!("{CONSOLE_HELP}");
    println!();
    println!("Press Ctrl+C or type 'quit' to stop");
    println!();

    render_loop(&running, &worker, &mut session, &event_rx);

    println!();
    println!("Stopping acquisition...");
    worker.stop();

    // Write the library back for the next run
    {
        let engine = lock_engine(&engine);
        match pose_file.save_from(&engine) {
            Ok(written) => println!("Saved {} poses to {:?}", engine.library().len(), written),
            Err(e) => eprintln!("Error saving poses: {e}"),
        }
    }

    if let Err(e) = stats.save() {
        eprintln!("Warning: Could not save session stats: {e}");
    }

    println!();
    println!("{}", stats.summary());
}

/// Drain console input, key triggers and render snapshots until asked to stop.
fn render_loop(
    running: &AtomicBool,
    worker: &AcquisitionWorker,
    session: &mut OperatorSession,
    events: &Receiver<InputEvent>,
) {
    let mut last_status: Option<LiveStatus> = None;
    let mut feed_reported = false;

    while running.load(Ordering::SeqCst) {
        while let Ok(event) = events.try_recv() {
            let quit = event == InputEvent::Command(OperatorCommand::Quit);
            match session.handle(event) {
                Some(Ok(reply)) => println!("{reply}"),
                Some(Err(e)) => eprintln!("Error: {e}"),
                None => {
                    if let Some(key) = session.last_key() {
                        println!("Key {key} selected");
                    }
                }
            }
            if quit {
                return;
            }
        }

        for trigger in worker.triggers().try_iter() {
            print_trigger(&trigger);
        }

        if let Some(snapshot) = worker.take_snapshot() {
            if last_status != Some(snapshot.status) {
                let time = snapshot.timestamp.format("%H:%M:%S");
                match &snapshot.status {
                    LiveStatus::Searching => println!("[{time}] Searching..."),
                    LiveStatus::Matched => println!("[{time}] Pose held"),
                    LiveStatus::Failed { joint } => {
                        let name = lock_engine(worker.engine())
                            .topology()
                            .joint_name(*joint)
                            .unwrap_or("?");
                        println!("[{time}] Pose broken at joint {joint} ({name})");
                    }
                }
                last_status = Some(snapshot.status);
            }
        }

        if !worker.is_running() && !feed_reported {
            feed_reported = true;
            if lock_engine(worker.engine()).feed_stopped() {
                eprintln!("Tracker feed stopped. Console still accepts commands; 'quit' to exit.");
            }
        }

        std::thread::sleep(Duration::from_millis(16));
    }
}

fn print_trigger(trigger: &KeyTrigger) {
    let action = match trigger.action {
        TriggerAction::Click => "click",
        TriggerAction::Press => "press",
        TriggerAction::Release => "release",
    };
    println!("[{}] key {} {action}", trigger.at.format("%H:%M:%S%.3f"), trigger.key);
}

#[cfg(feature = "server")]
fn start_server(
    port: u16,
    engine: &pose_binder::SharedEngine,
    stats: &pose_binder::SharedSessionStats,
    worker: &AcquisitionWorker,
) -> Option<(tokio::runtime::Runtime, tokio::sync::oneshot::Sender<()>)> {
    use pose_binder::server::{run, ServerConfig, ServerState};

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Warning: Could not start server runtime: {e}");
            return None;
        }
    };
    let session = OperatorSession::new(engine.clone(), stats.clone())
        .with_trigger_sink(worker.trigger_sink());
    let state = ServerState::with_session(engine.clone(), stats.clone(), session);

    match runtime.block_on(run(ServerConfig::new(port), state)) {
        Ok((addr, shutdown)) => {
            println!("Serving live status on http://{addr}");
            Some((runtime, shutdown))
        }
        Err(e) => {
            eprintln!("Warning: Could not start server: {e}");
            None
        }
    }
}

fn cmd_inspect(file: &PathBuf, topology: Option<&str>) {
    let kind = resolve_topology(topology);
    let content = match std::fs::File::open(file) {
        Ok(f) => std::io::BufReader::new(f),
        Err(e) => {
            eprintln!("Error opening {file:?}: {e}");
            std::process::exit(1);
        }
    };

    match read_records(content, kind.topology().joint_count()) {
        Ok(records) => {
            println!("{} poses in {:?}", records.len(), file);
            println!();
            for (i, record) in records.iter().enumerate() {
                let first = record.pose.joint(0).map(|j| j.orientation).unwrap_or_default();
                println!(
                    "  [{i}] key {:>4}  {} joints  root {:?}",
                    record.key,
                    record.pose.joint_count(),
                    first
                );
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_joints(topology: Option<&str>) {
    let topology = resolve_topology(topology).topology();

    println!("{:?} joints", topology.kind);
    println!("==================");
    for (i, joint) in topology.joints.iter().enumerate() {
        let parent = joint
            .parent
            .and_then(|p| topology.joint_name(p))
            .unwrap_or("-");
        println!("  {i:>2}  {:<16} parent: {parent}", joint.name);
    }
}

fn cmd_config(
    threshold: Option<f32>,
    exclude: Option<String>,
    topology: Option<String>,
    pose_file: Option<PathBuf>,
) {
    let mut config = Config::load().unwrap_or_default();
    let updating =
        threshold.is_some() || exclude.is_some() || topology.is_some() || pose_file.is_some();

    if let Some(threshold) = threshold {
        config.threshold = threshold;
    }
    if let Some(raw) = topology {
        config.topology = resolve_topology(Some(&raw));
    }
    if let Some(raw) = exclude {
        config.excluded_joints = if raw.trim().eq_ignore_ascii_case("none") {
            Vec::new()
        } else {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        };
    }
    if let Some(path) = pose_file {
        config.pose_file = path;
    }

    if updating {
        if let Err(e) = config.compare_settings() {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
        if let Err(e) = config.save() {
            eprintln!("Error saving config: {e}");
            std::process::exit(1);
        }
        println!("Configuration updated.");
        println!();
    }

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("Pose Binder Status");
    println!("==================");
    println!();
    println!("Configuration:");
    println!("  Topology: {:?}", config.topology);
    println!("  Threshold: {}", config.threshold);
    println!("  Excluded joints: {}", config.excluded_joints.join(", "));
    println!("  Pose file: {:?}", config.pose_file);
    println!();

    let stats_path = config.stats_path();
    let persisted = std::fs::read_to_string(&stats_path)
        .ok()
        .and_then(|content| serde_json::from_str::<PersistedStats>(&content).ok());

    match persisted {
        Some(stats) => {
            println!("Cumulative Statistics:");
            println!("  Frames tracked: {}", stats.frames_received);
            println!("  Ticks without a body: {}", stats.empty_ticks);
            println!("  Poses locked: {}", stats.poses_locked);
            println!("  Poses saved: {}", stats.poses_saved);
            println!("  Key triggers fired: {}", stats.triggers_fired);
            println!("  Last updated: {}", stats.last_updated.to_rfc3339());
        }
        None => println!("No previous session data found."),
    }
}

fn resolve_topology(raw: Option<&str>) -> TopologyKind {
    match raw {
        None => Config::load().unwrap_or_default().topology,
        Some(raw) => TopologyKind::parse(raw).unwrap_or_else(|| {
            eprintln!("Error: Unknown topology '{raw}' (expected azure_kinect or kinect_v2)");
            std::process::exit(1);
        }),
    }
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: Could not set Ctrl+C handler: {e}");
    }
}
