// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! pclinkd - foreground daemon for an FPGA peripheral board
//!
//! Opens the serial link, enumerates the board and dispatches packets to
//! drivers until the link drops or Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! # Board on the default port
//! pclinkd
//!
//! # Explicit port, packet dumps on
//! pclinkd --serial-port /dev/ttyACM0 --trace-packets --log-level trace
//!
//! # Using configuration file
//! pclinkd --config pclinkd.toml
//!
//! # Write an example configuration
//! pclinkd gen-config --output pclinkd.toml
//! ```

use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use pclink::{
    catalog, DaemonConfig, DriverFactory, Engine, LinkStats, Overload, RecordingSink, SerialLink,
};
use tracing_subscriber::EnvFilter;

const LINK: Token = Token(0);

/// Upper bound on one poll, so a stop request is noticed.
const MAX_WAIT: Duration = Duration::from_millis(250);

/// FPGA board link daemon
#[derive(Parser, Debug)]
#[command(name = "pclinkd")]
#[command(about = "Host daemon bridging peripheral drivers to an FPGA board over a serial link")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device (overrides the configuration)
    #[arg(short, long)]
    serial_port: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Hex-dump every packet at trace level
    #[arg(long)]
    trace_packets: bool,

    /// Static driver assignment (format: "slot:driver", can repeat)
    #[arg(short, long, value_delimiter = ',')]
    overload: Vec<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "pclinkd.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },

    /// List the peripherals known to the driver catalog
    Drivers,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Some(cmd) = args.command {
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
            Commands::Drivers => {
                cmd_drivers();
                Ok(())
            }
        };
    }

    let config = build_config(&args)?;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    run(&config)
}

fn build_config(args: &Args) -> anyhow::Result<DaemonConfig> {
    let mut config = match args.config {
        Some(ref path) => DaemonConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => DaemonConfig::default(),
    };

    if let Some(ref port) = args.serial_port {
        config.serial_port = port.clone();
    }
    if let Some(ref level) = args.log_level {
        config.log_level = level.clone();
    }
    if args.trace_packets {
        config.trace_packets = true;
    }
    for spec in &args.overload {
        let overload = parse_overload(spec)?;
        config.overloads.retain(|o| o.slot != overload.slot);
        config.overloads.push(overload);
    }

    config.validate()?;
    Ok(config)
}

fn parse_overload(spec: &str) -> anyhow::Result<Overload> {
    let Some((slot, driver)) = spec.split_once(':') else {
        bail!("invalid overload {:?} (expected slot:driver)", spec);
    };
    let slot = slot
        .trim()
        .parse()
        .with_context(|| format!("invalid slot in overload {:?}", spec))?;
    Ok(Overload {
        slot,
        driver: driver.trim().to_string(),
    })
}

fn run(config: &DaemonConfig) -> anyhow::Result<()> {
    let link = SerialLink::open(&config.serial_port)
        .with_context(|| format!("opening {}", config.serial_port))?;
    let fd = link.as_raw_fd();

    let mut poll = Poll::new().context("creating poll")?;
    let mut events = Events::with_capacity(8);
    poll.registry()
        .register(&mut SourceFd(&fd), LINK, Interest::READABLE)
        .context("registering serial link")?;

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    // No driver modules are linked in: the board is enumerated and every
    // core is reported, but only the enumerator answers.
    let factory = DriverFactory::new();
    let mut engine = Engine::new(config, Box::new(link), factory);
    let mut sink = RecordingSink::logging();

    tracing::info!(
        port = %config.serial_port,
        version = env!("CARGO_PKG_VERSION"),
        "pclinkd started"
    );
    engine.start(&mut sink, Instant::now())?;

    while running.load(Ordering::SeqCst) {
        let wait = engine
            .time_until_next(Instant::now())
            .map_or(MAX_WAIT, |d| d.min(MAX_WAIT));
        if let Err(e) = poll.poll(&mut events, Some(wait)) {
            if e.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(e).context("polling");
        }

        for event in events.iter() {
            if event.token() != LINK {
                continue;
            }
            if let Err(e) = engine.poll_link(&mut sink, Instant::now()) {
                log_stats(&engine.stats());
                return Err(e).context("serial link lost");
            }
        }
        engine.poll_timers(&mut sink, Instant::now());
        sink.drain();
    }

    tracing::info!("shutting down");
    log_stats(&engine.stats());
    Ok(())
}

fn log_stats(stats: &LinkStats) {
    tracing::info!(
        bytes_read = stats.bytes_read,
        bytes_written = stats.bytes_written,
        frames = stats.frames_decoded,
        violations = stats.protocol_violations,
        accepted = stats.packets_accepted,
        rejected = stats.packets_rejected(),
        routed = stats.packets_routed,
        unrouted = stats.routing_misses,
        sent = stats.packets_sent,
        would_block = stats.tx_would_block,
        tx_errors = stats.tx_errors,
        missing_acks = stats.missing_acks,
        "link statistics"
    );
}

fn cmd_gen_config(output: PathBuf) -> anyhow::Result<()> {
    let config = DaemonConfig {
        overloads: vec![Overload {
            slot: 8,
            driver: "tonegen".into(),
        }],
        ..DaemonConfig::default()
    };

    let content = format!(
        "# pclinkd configuration\n# Generated by pclinkd gen-config\n\n{}",
        config.to_toml()?
    );
    std::fs::write(&output, content).with_context(|| format!("writing {}", output.display()))?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(path: PathBuf) -> anyhow::Result<()> {
    match DaemonConfig::from_file(&path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Serial port: {}", config.serial_port);
            println!("Slots:       {}", config.max_slots);
            println!("Ack timeout: {} ms", config.ack_timeout_ms);
            for o in &config.overloads {
                let known = if catalog::by_name(&o.driver).is_some() {
                    ""
                } else {
                    " (not in catalog)"
                };
                println!("  slot {} -> {}{}", o.slot, o.driver, known);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_drivers() {
    println!("{:>4}  {:<10} {:<10} {:>4}  dirs", "id", "name", "hardware", "pins");
    for desc in catalog::PERIPHERALS {
        println!(
            "{:>4}  {:<10} {:<10} {:>4}  {:#04x}",
            desc.driver_id, desc.name, desc.incname, desc.npins, desc.dirs
        );
    }
}
