//! farmem command-line tools.
//!
//! This binary drives the memory window and its bridge from a shell. It provides:
//! 1. **Serve:** Run the reference memory peer on a Unix socket.
//! 2. **Peek/Poke:** Attach a window (local or bridged), then read or write one address.
//! 3. **Profile:** Replay a translate/execute trace through the hot-block profiler.

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::Display;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use farmem_core::bridge::{MemoryPeer, SyncMode, VecBackend};
use farmem_core::common::MemTx;
use farmem_core::config::Config;
use farmem_core::profiler::{HotBlocks, Translation, block_key};
use farmem_core::soc::System;

#[derive(Parser, Debug)]
#[command(
    name = "farmem",
    author,
    version,
    about = "Far-off memory window and co-simulation bridge",
    long_about = "Attach a memory window to a simulated address space, back it locally or by an external memory simulator, and profile hot blocks.\n\nExamples:\n  farmem serve --socket /tmp/mem.sock --sync\n  farmem poke --socket /tmp/mem.sock --sync 0x200000010 0xdeadbeef\n  farmem peek --socket /tmp/mem.sock --sync 0x200000010\n  farmem profile trace.jsonl --limit 10"
)]
struct Cli {
    /// JSON configuration file (window, socket, and profiler sections).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the reference memory peer.
    Serve {
        /// Socket path to listen on.
        #[arg(short, long)]
        socket: PathBuf,

        /// Backing store size in bytes.
        #[arg(long, value_parser = parse_u64, default_value = "0x4000000")]
        size: u64,

        /// Require logical-time synchronization.
        #[arg(long)]
        sync: bool,

        /// Link latency added to completions (0 selects the default).
        #[arg(long, default_value_t = 0)]
        latency: u64,

        /// Exit after the first host disconnects.
        #[arg(long)]
        once: bool,
    },

    /// Read one value from the window.
    Peek {
        /// Physical address.
        #[arg(value_parser = parse_u64)]
        addr: u64,

        /// Access width in bytes (1, 2, 4 or 8).
        #[arg(short = 'w', long, default_value_t = 8)]
        width: u32,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// Write one value to the window.
    Poke {
        /// Physical address.
        #[arg(value_parser = parse_u64)]
        addr: u64,

        /// Value; its low `width` bytes are stored.
        #[arg(value_parser = parse_u64)]
        value: u64,

        /// Access width in bytes (1, 2, 4 or 8).
        #[arg(short = 'w', long, default_value_t = 8)]
        width: u32,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// Replay a JSON-lines trace through the profiler and print the report.
    Profile {
        /// Trace file; one `{"event": "translate"|"exec", "pc": N, "insns": N}` per line.
        trace: PathBuf,

        /// Rows in the report.
        #[arg(long)]
        limit: Option<usize>,

        /// Count executions through shared counters instead of the table lock.
        #[arg(long)]
        inline: bool,

        /// Mirror the totals into the first free `output_ips_<i>.txt` in this directory.
        #[arg(long)]
        mirror_dir: Option<PathBuf>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Window overrides applied on top of the configuration file.
#[derive(Args, Debug)]
struct WindowArgs {
    /// Window base address.
    #[arg(long, value_parser = parse_u64)]
    base: Option<u64>,

    /// Window size in bytes.
    #[arg(long, value_parser = parse_u64)]
    size: Option<u64>,

    /// Bridge the window to the memory peer on this socket.
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Require logical-time synchronization with the peer.
    #[arg(long)]
    sync: bool,
}

impl WindowArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(base) = self.base {
            config.window.base = base;
        }
        if let Some(size) = self.size {
            config.window.size = size;
        }
        if let Some(socket) = &self.socket {
            config.window.uses_socket = true;
            config.socket.socket_path = Some(socket.clone());
        }
        if self.sync {
            config.socket.sync = true;
        }
    }
}

#[derive(Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
enum TraceEvent {
    Translate { pc: u64, insns: u64 },
    Exec { pc: u64, insns: u64 },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref());

    match cli.command {
        Commands::Serve {
            socket,
            size,
            sync,
            latency,
            once,
        } => cmd_serve(&socket, size, sync, latency, once),
        Commands::Peek {
            addr,
            width,
            window,
        } => {
            window.apply(&mut config);
            cmd_peek(&config, addr, width);
        }
        Commands::Poke {
            addr,
            value,
            width,
            window,
        } => {
            window.apply(&mut config);
            cmd_poke(&config, addr, value, width);
        }
        Commands::Profile {
            trace,
            limit,
            inline,
            mirror_dir,
            json,
        } => {
            if let Some(limit) = limit {
                config.profiler.limit = limit;
            }
            if inline {
                config.profiler.inline = true;
            }
            if mirror_dir.is_some() {
                config.profiler.mirror_dir = mirror_dir;
            }
            cmd_profile(&config, &trace, json);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn fail(message: impl Display) -> ! {
    eprintln!("Error: {message}");
    process::exit(1);
}

fn parse_u64(s: &str) -> Result<u64, String> {
    let s = s.replace('_', "");
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{s}': {e}"))
}

fn load_config(path: Option<&Path>) -> Config {
    match path {
        Some(path) => Config::from_file(path)
            .unwrap_or_else(|e| fail(format_args!("{}: {e}", path.display()))),
        None => Config::default(),
    }
}

/// Builds the system described by `config` and realizes its window.
fn open_system(config: &Config) -> System {
    let mut system = System::from_config(config).unwrap_or_else(|e| fail(e));
    if let Err(e) = system.realize() {
        fail(e);
    }
    system
}

/// Runs the reference memory peer; the backing store survives across sessions.
fn cmd_serve(socket: &Path, size: u64, sync: bool, latency: u64, once: bool) {
    let size = usize::try_from(size).unwrap_or_else(|_| fail("backing store too large"));
    let sync_mode = if sync {
        SyncMode::Required
    } else {
        SyncMode::Disabled
    };
    let peer = MemoryPeer::bind(socket, sync_mode, latency)
        .unwrap_or_else(|e| fail(format_args!("cannot listen on {}: {e}", socket.display())));
    let mut backend = VecBackend::new(size);

    loop {
        match peer.accept() {
            Ok(mut session) => match session.serve(&mut backend) {
                Ok(stats) => info!(
                    reads = stats.reads,
                    writes = stats.writes,
                    syncs = stats.syncs,
                    "session finished"
                ),
                Err(err) => error!(%err, "session failed"),
            },
            Err(err) => error!(%err, "host rejected"),
        }
        if once {
            break;
        }
    }
}

fn cmd_peek(config: &Config, addr: u64, width: u32) {
    let mut system = open_system(config);
    let (tx, value) = system.read(addr, width);
    drop(system);
    match tx {
        MemTx::Ok => println!("{addr:#x}: {value:#0w$x}", w = 2 + 2 * width as usize),
        MemTx::Error => fail(format_args!("read of {width} bytes at {addr:#x} failed")),
    }
}

fn cmd_poke(config: &Config, addr: u64, value: u64, width: u32) {
    let mut system = open_system(config);
    let tx = system.write(addr, width, value);
    drop(system);
    if !tx.is_ok() {
        fail(format_args!("write of {width} bytes at {addr:#x} failed"));
    }
}

fn cmd_profile(config: &Config, trace: &Path, json: bool) {
    let file = File::open(trace)
        .unwrap_or_else(|e| fail(format_args!("cannot open {}: {e}", trace.display())));
    let blocks = HotBlocks::from_config(&config.profiler);
    let mut translations: HashMap<u64, Translation> = HashMap::new();

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let lineno = index + 1;
        let line = line.unwrap_or_else(|e| fail(format_args!("{}: {e}", trace.display())));
        let Some(event) = parse_event(&line)
            .unwrap_or_else(|e| fail(format_args!("{}:{lineno}: {e}", trace.display())))
        else {
            continue;
        };
        match event {
            TraceEvent::Translate { pc, insns } => {
                let translation = blocks.on_translate(pc, insns);
                let _ = translations.insert(translation.key(), translation);
            }
            TraceEvent::Exec { pc, insns } => match translations.get(&block_key(pc, insns)) {
                Some(translation) => blocks.execute(translation),
                None => fail(format_args!(
                    "{}:{lineno}: block {pc:#x} executed before it was translated",
                    trace.display()
                )),
            },
        }
    }

    let report = blocks.report(config.profiler.limit);
    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{text}"),
            Err(e) => fail(e),
        }
    } else {
        print!("{report}");
    }

    if let Some(dir) = &config.profiler.mirror_dir {
        match report.mirror_with_slots(dir, config.profiler.mirror_slots) {
            Ok(Some(path)) => info!(path = %path.display(), "totals mirrored"),
            Ok(None) => {}
            Err(e) => fail(format_args!("cannot mirror totals into {}: {e}", dir.display())),
        }
    }
}

/// Parses one trace line; blank lines and `#` comments yield `None`.
fn parse_event(line: &str) -> Result<Option<TraceEvent>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}
