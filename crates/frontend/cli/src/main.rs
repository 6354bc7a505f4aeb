use anyhow::{Context, Result};
use clap::Parser;
use retro_core::logging::{LogCategory, LogConfig, LogLevel};
use retro_core::{Machine, MachineBuilder, MachineConfig, MachineError, RunOutcome};
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "retro6502", about = "Run a 6502 machine described by a JSON file")]
struct Args {
    /// Machine description (JSON)
    machine: PathBuf,

    /// Target clock rate in Hz
    #[arg(long)]
    hz: Option<u64>,

    /// Credit grants per second
    #[arg(long)]
    ticks: Option<u32>,

    /// Seconds between clock-rate reports (0 disables)
    #[arg(long)]
    report_secs: Option<u64>,

    /// Stop after this many seconds; runs until a fatal error otherwise
    #[arg(long)]
    seconds: Option<u64>,

    /// Core log level for all categories: off, error, warn, info, debug, trace
    #[arg(long, default_value = "warn")]
    log_level: LogLevel,

    /// Override the CPU category level (trace prints every instruction)
    #[arg(long)]
    log_cpu: Option<LogLevel>,

    /// Write core logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Dump the final machine state to this file as JSON
    #[arg(long)]
    state: Option<PathBuf>,
}

fn configure_logging(args: &Args) -> Result<()> {
    let config = LogConfig::global();
    config.set_global_level(args.log_level);
    // Clock-rate reports are the point of a paced run; keep them visible.
    config.set_level(LogCategory::Scheduler, args.log_level.max(LogLevel::Info));
    if let Some(level) = args.log_cpu {
        config.set_level(LogCategory::Cpu, level);
        // A full trace easily exceeds the default per-second budget.
        if level == LogLevel::Trace {
            config.set_rate_limit(usize::MAX);
        }
    }
    if let Some(path) = &args.log_file {
        config
            .set_log_file(path.clone())
            .with_context(|| format!("opening log file {}", path.display()))?;
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<MachineConfig> {
    let text = fs::read_to_string(&args.machine)
        .with_context(|| format!("reading {}", args.machine.display()))?;
    let mut config: MachineConfig = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", args.machine.display()))?;

    // ROM paths are relative to the description file.
    let base = args.machine.parent().map(PathBuf::from).unwrap_or_default();
    for rom in &mut config.roms {
        if rom.path.is_relative() {
            rom.path = base.join(&rom.path);
        }
    }

    if let Some(hz) = args.hz {
        config.scheduler.target_hz = hz;
    }
    if let Some(ticks) = args.ticks {
        config.scheduler.ticks_per_second = ticks;
    }
    if let Some(secs) = args.report_secs {
        config.scheduler.report_interval_secs = Some(secs).filter(|&s| s > 0);
    }
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    configure_logging(&args)?;

    let config = load_config(&args)?;
    log::info!(
        "{} ROM(s), target {} Hz",
        config.roms.len(),
        config.scheduler.target_hz
    );

    let mut machine: Machine = MachineBuilder::from_config(&config)?.build()?;
    let control = machine.control();

    if let Some(secs) = args.seconds {
        let control = control.clone();
        thread::Builder::new()
            .name("run-timer".into())
            .spawn(move || {
                thread::sleep(Duration::from_secs(secs));
                control.stop();
            })
            .context("starting run timer")?;
    }

    let result = machine.run(config.scheduler, &control);

    if let Some(path) = &args.state {
        let mut f = File::create(path)?;
        write!(f, "{}", serde_json::to_string_pretty(&machine.debug_state())?)?;
    }
    LogConfig::global().clear_log_file();

    match result {
        Ok(RunOutcome::Stopped { cycles }) => {
            log::info!("stopped after {} cycles", cycles);
            Ok(())
        }
        Err(MachineError::Cpu(e)) => {
            log::error!("CPU halted: {}", e);
            println!(
                "{}",
                serde_json::to_string_pretty(&machine.cpu().registers())?
            );
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}
