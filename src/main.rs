use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use trioctl::config::Config;
use trioctl::core::{format_restart_spec, parse_restart_spec, RestartResolver};
use trioctl::orchestration::{
    inspect, DryRunSubmitter, JobSubmitter, PipelineRunner, RestartOverrides, RunReport,
    SlurmSubmitter,
};
use trioctl::state::{EnvStore, JobLedger};
use trioctl::workflow::{Curriculum, GenomeRole, Iteration, Mode, PhaseEntry, RunFlags};
use trioctl::{tlog, tlog_error, Result};

/// trioctl - resumable SLURM orchestration for trio-based model retraining
#[derive(Parser, Debug)]
#[command(name = "trioctl")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    TRIOCTL_DEBUG=1     Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.trioctl/trioctl.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Config file (default: ~/.trioctl/trioctl.toml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Submit whatever the pipeline still needs
    Run {
        /// retrain, baseline, demo or benchmark
        #[arg(long, default_value = "retrain")]
        mode: Mode,

        /// Decide everything but submit nothing and persist nothing
        #[arg(long)]
        dry_run: bool,

        /// Resubmit even when outputs already exist
        #[arg(long)]
        overwrite: bool,

        /// First iteration to run (1-based)
        #[arg(long, default_value_t = 1)]
        start_itr: usize,

        /// Last iteration to run (1-based, inclusive; default: the last)
        #[arg(long)]
        stop_itr: Option<usize>,

        /// Restart spec for one phase, e.g. `shuffle:eval=12345678,1,None`
        #[arg(long = "restart", value_name = "PHASE[:ROLE]=IDS")]
        restart: Vec<String>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show which tasks a restart spec would run
    Resolve {
        /// Number of tasks the phase declares
        #[arg(long)]
        tasks: usize,

        /// Restart spec, e.g. `12345678,1,None` (empty means fresh)
        #[arg(default_value = "")]
        ids: String,
    },

    /// Show recorded jobs with their scheduler state
    Status {
        /// Only this iteration (1-based)
        #[arg(long)]
        itr: Option<usize>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    trioctl::log::init_with_debug(cli.debug);

    let result = match cli.command.clone() {
        Command::Run {
            mode,
            dry_run,
            overwrite,
            start_itr,
            stop_itr,
            restart,
            json,
        } => {
            let flags = RunFlags {
                debug: cli.debug,
                dry_run,
                overwrite,
            };
            run_pipeline(&cli, mode, flags, start_itr, stop_itr, &restart, json)
        }
        Command::Resolve { tasks, ids } => run_resolve(tasks, &ids),
        Command::Status { itr, json } => run_status(&cli, itr, json),
    };

    if let Err(e) = &result {
        tlog_error!("{}", e);
    }
    result
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

fn run_pipeline(
    cli: &Cli,
    mode: Mode,
    flags: RunFlags,
    start_itr: usize,
    stop_itr: Option<usize>,
    restart: &[String],
    json: bool,
) -> Result<()> {
    let config = Arc::new(load_config(cli)?);
    tlog!(
        "trioctl starting: run={} mode={} dry_run={} overwrite={}",
        config.run_name,
        mode,
        flags.dry_run,
        flags.overwrite
    );

    let mut overrides = RestartOverrides::new();
    for raw in restart {
        overrides.parse_arg(raw)?;
    }

    let iterations = Curriculum::new(config.clone()).iterations(mode, flags)?;
    let ledger = JobLedger::load(&config.ledger_path())?;
    let env = EnvStore::load(&config.env_path())?;

    let report = if flags.dry_run {
        execute(
            DryRunSubmitter::new(),
            ledger,
            env,
            overrides,
            &iterations,
            start_itr,
            stop_itr,
        )?
    } else {
        let submitter = SlurmSubmitter::new(config.scheduler.clone(), &config.script_dir())?;
        execute(submitter, ledger, env, overrides, &iterations, start_itr, stop_itr)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn execute<S: JobSubmitter>(
    submitter: S,
    ledger: JobLedger,
    env: EnvStore,
    overrides: RestartOverrides,
    iterations: &[Iteration],
    start: usize,
    stop: Option<usize>,
) -> Result<RunReport> {
    PipelineRunner::new(submitter, ledger, env)
        .with_overrides(overrides)
        .run(iterations, start, stop)
}

fn print_report(report: &RunReport) {
    println!();
    println!(
        "Run {}{}",
        report.run_id.short(),
        if report.dry_run { " (dry run)" } else { "" }
    );
    for itr in &report.iterations {
        println!();
        println!("  {} [{}]", itr.label, itr.mode);
        println!(
            "    {:<20} {:>6} {:>10} {:>8} {:>7}  vector",
            "phase", "tasks", "submitted", "skipped", "failed"
        );
        for o in &itr.outcomes {
            let label = format!("{}:{}", o.phase, o.role);
            println!(
                "    {:<20} {:>6} {:>10} {:>8} {:>7}  {}",
                label,
                o.task_count,
                o.submitted,
                o.skipped,
                o.failed,
                o.vector()
            );
        }
        let bypassed: Vec<String> = itr
            .history
            .iter()
            .filter(|h| h.entry == PhaseEntry::Bypassed)
            .map(|h| format!("{}:{}", h.phase, h.role))
            .collect();
        if !bypassed.is_empty() {
            println!("    bypassed: {}", bypassed.join(", "));
        }
    }

    let failed: Vec<_> = report.outcomes().filter(|o| o.failed > 0).collect();
    println!();
    println!("  {} submitted, {} failed", report.submitted(), report.failed());
    if !failed.is_empty() {
        println!("  Re-run to retry failed submissions, or pass explicitly:");
        for o in failed {
            if let Some(spec) = o.record.as_restart_spec() {
                println!(
                    "    --restart {}:{}={}",
                    o.phase,
                    o.role,
                    format_restart_spec(&spec)
                );
            }
        }
    }
}

fn run_resolve(tasks: usize, ids: &str) -> Result<()> {
    let spec = parse_restart_spec(ids)?;
    let prior = (!spec.is_empty()).then_some(spec.as_slice());
    let resolution = RestartResolver::new("resolve").resolve(prior, tasks)?;

    let fmt = |set: &std::collections::BTreeSet<usize>| {
        set.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(",")
    };
    println!("to_run:  [{}]", fmt(&resolution.to_run));
    println!("to_skip: [{}]", fmt(&resolution.to_skip));
    println!("vector:  {}", resolution.vector);
    if resolution.is_complete() {
        println!("nothing to submit");
    }
    Ok(())
}

fn run_status(cli: &Cli, itr: Option<usize>, json: bool) -> Result<()> {
    let config = Arc::new(load_config(cli)?);
    let ledger = JobLedger::load(&config.ledger_path())?;

    // Records are keyed by genome; an iteration owns its training genome's
    // records and shares the evaluation genome's.
    let prefixes = match itr {
        Some(n) => {
            let iterations =
                Curriculum::new(config.clone()).iterations(Mode::Retrain, RunFlags::default())?;
            let iteration = n.checked_sub(1).and_then(|i| iterations.get(i)).ok_or_else(|| {
                trioctl::Error::Config(format!(
                    "iteration {} is outside 1..={}",
                    n,
                    iterations.len()
                ))
            })?;
            vec![
                format!("{}/", iteration.genome_label(GenomeRole::Train)),
                format!("{}/", iteration.genome_label(GenomeRole::Eval)),
            ]
        }
        None => vec![String::new()],
    };

    let scheduler = SlurmSubmitter::with_unchecked_program(config.scheduler.clone(), &config.script_dir());
    let mut statuses = Vec::new();
    for prefix in &prefixes {
        statuses.extend(inspect(&ledger, prefix, &scheduler)?);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    if statuses.is_empty() {
        println!("No recorded jobs in {}", ledger.path().display());
        return Ok(());
    }
    for status in &statuses {
        let slots: Vec<String> = status
            .slots
            .iter()
            .map(|s| match s.state {
                Some(state) => format!("{}({})", s.slot, state),
                None => s.slot.to_string(),
            })
            .collect();
        println!("{:<40} [{}]", status.key, slots.join(", "));
        if let Some(arg) = status.restart_arg() {
            println!("    suggested: {}", arg);
        }
    }
    Ok(())
}
