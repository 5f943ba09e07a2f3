use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lockstep_common::{Client, ClientId, ConnectionState, LobbyInfo};
use lockstep_kernel::{DemoCommand, DemoWorld};
use lockstep_net::LocalConnection;
use lockstep_replay::{ReplayConnection, ReplayHeader, ReplayReader, ReplayWriter};
use lockstep_sync::{EngineEvent, OrderManager, SchedulerConfig, Session, Transport};

#[derive(Parser)]
#[command(name = "lockstep-cli", about = "Run, record, replay, and inspect lockstep sessions")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a local demo session and print per-frame digests
    Run {
        /// Number of frames to commit
        #[arg(short, long, default_value = "10")]
        ticks: u64,
        /// Shared random seed
        #[arg(short, long, default_value = "42")]
        seed: u64,
        /// Record the session; without a path, a timestamped filename is
        /// used
        #[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = "")]
        record: Option<PathBuf>,
    },
    /// Play a recorded session back through the full lockstep path
    Replay {
        /// Replay file to play back
        file: PathBuf,
    },
    /// Dump a replay header and record summary as JSON
    Inspect {
        /// Replay file to inspect
        file: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Run {
            ticks,
            seed,
            record,
        } => run(ticks, seed, record),
        Commands::Replay { file } => replay(&file),
        Commands::Inspect { file } => inspect(&file),
    }
}

fn run(ticks: u64, seed: u64, record: Option<PathBuf>) -> anyhow::Result<()> {
    let mut lobby = LobbyInfo::new(seed);
    lobby.clients.push(Client::new(ClientId(0), "player"));

    let mut manager = OrderManager::new(
        DemoWorld::new(),
        Transport::Local(LocalConnection::new(ClientId(0))),
        lobby.clone(),
        cosmetic_seed(),
    );

    if let Some(path) = record {
        let path = if path.as_os_str().is_empty() {
            default_replay_path()?
        } else {
            path
        };
        let header = ReplayHeader::new(seed, env!("CARGO_PKG_VERSION"), lobby.clients.clone());
        let writer = ReplayWriter::create(&path, &header)
            .with_context(|| format!("creating replay at {}", path.display()))?;
        manager.record_to(writer);
        println!("recording to {}", path.display());
    }

    let config = SchedulerConfig::default();
    let mut session = Session::new(manager, config, Duration::from_millis(16));
    session.manager_mut().start();

    // A small scripted scenario so the digests have something to bite on.
    println!("running {ticks} frames, seed {seed}");
    let start = Instant::now();
    let mut committed = 0u64;
    let mut step = 0u32;
    while committed < ticks {
        step += 1;
        match step % 4 {
            1 => session.manager_mut().issue(
                DemoCommand::Spawn {
                    x: step as i64,
                    y: -(step as i64),
                }
                .encode()?,
            )?,
            3 => session
                .manager_mut()
                .issue(DemoCommand::Scatter { range: 3 }.encode()?)?,
            _ => {}
        }
        // Simulated time: one timestep per iteration, no sleeping.
        let outcome = session.pump(start + config.timestep * step);
        for event in outcome.events {
            if let EngineEvent::FrameCommitted { report } = event {
                committed += 1;
                println!(
                    "frame {:>4}  hash {:016x}  rng calls {}",
                    report.frame, report.hash, report.shared_random_calls
                );
            }
        }
    }

    let manager = session.into_manager();
    println!(
        "done: {} frames, {} units",
        manager.current_frame(),
        manager.world().unit_count()
    );
    manager.dispose().context("finalizing session")?;
    Ok(())
}

fn replay(file: &Path) -> anyhow::Result<()> {
    let conn = ReplayConnection::open(file)
        .with_context(|| format!("opening replay {}", file.display()))?;
    let seed = conn.seed();
    println!("replaying {} (seed {seed})", file.display());

    let mut manager = OrderManager::new(
        DemoWorld::new(),
        Transport::Replay(conn),
        LobbyInfo::new(seed),
        cosmetic_seed(),
    );
    manager.start();

    while manager.connection_state() == ConnectionState::Connected {
        manager.pump_transport();
        manager.try_advance_one_frame();
        for event in manager.drain_events() {
            if let EngineEvent::FrameCommitted { report } = event {
                println!(
                    "frame {:>4}  hash {:016x}  rng calls {}",
                    report.frame, report.hash, report.shared_random_calls
                );
            }
        }
    }
    if let Some(e) = manager.take_replay_error() {
        return Err(e).context("replay playback failed");
    }

    println!(
        "done: {} frames, {} units",
        manager.current_frame(),
        manager.world().unit_count()
    );
    manager.dispose().context("closing session")?;
    Ok(())
}

fn inspect(file: &Path) -> anyhow::Result<()> {
    let mut reader = ReplayReader::open(file)
        .with_context(|| format!("opening replay {}", file.display()))?;

    let mut records = 0u64;
    let mut commands = 0u64;
    let mut first = None;
    let mut last = None;
    while let Some(record) = reader.next_record().context("reading replay record")? {
        records += 1;
        commands += record.commands.len() as u64;
        first.get_or_insert(record.frame);
        last = Some(record.frame);
    }

    let summary = serde_json::json!({
        "header": reader.header(),
        "records": records,
        "commands": commands,
        "first_frame": first,
        "last_frame": last,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn default_replay_path() -> anyhow::Result<PathBuf> {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock before unix epoch")?
        .as_secs();
    Ok(PathBuf::from(format!("lockstep-{stamp}.replay")))
}

fn cosmetic_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
        ^ u64::from(std::process::id())
}
