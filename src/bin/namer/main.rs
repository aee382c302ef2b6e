mod config;
mod progress;

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use colored::Colorize;

use image_namer::namer::{self, DEFAULT_MESSAGE_CAPACITY, FileLogger, Namer, RunPlan, TransferDiscipline};
use image_namer::{print_bold, print_error, print_warning};

use crate::config::Config;

#[derive(Parser)]
#[command(
    author,
    version,
    name = env!("CARGO_BIN_NAME"),
    about = "Rename and sort converted images using quality tags from the raw capture folders"
)]
pub(crate) struct NamerArgs {
    /// Date folder of converted files (YYMMDD or YYYYMMDD)
    #[arg(value_hint = clap::ValueHint::DirPath, required_unless_present = "SHELL")]
    b_date: Option<PathBuf>,

    /// Raw root containing date folders, or a raw date folder
    #[arg(value_hint = clap::ValueHint::DirPath, required_unless_present = "SHELL")]
    a_root: Option<PathBuf>,

    /// Output root for sorted files
    #[arg(short, long, name = "OUT_ROOT", value_hint = clap::ValueHint::DirPath)]
    output: Option<PathBuf>,

    /// Rename files inside their own folder instead of sorting them
    #[arg(short, long)]
    in_place: bool,

    /// How files are transferred to the output root
    #[arg(short, long, value_enum, name = "DISCIPLINE")]
    discipline: Option<TransferDiscipline>,

    /// Copy files, same as `--discipline copy`
    #[arg(short, long, conflicts_with = "DISCIPLINE")]
    copy: bool,

    /// Accept a raw date folder with a different date
    #[arg(short, long)]
    force: bool,

    /// Do not write a log file
    #[arg(long)]
    no_log: bool,

    /// Print debug information
    #[arg(short = 'D', long)]
    debug: bool,

    /// Generate shell completion
    #[arg(short = 'l', long, name = "SHELL")]
    completion: Option<Shell>,

    /// Print every skipped or failed file
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = NamerArgs::parse();
    if let Some(ref shell) = args.completion {
        image_namer::generate_shell_completion(*shell, NamerArgs::command(), true, env!("CARGO_BIN_NAME"))
    } else {
        run(args)
    }
}

fn run(args: NamerArgs) -> Result<()> {
    let config = Config::from_args(args)?;
    if config.debug {
        println!("{config}");
    }

    let plan = match RunPlan::prepare(config.run_request(), &config.settings) {
        Ok(plan) => plan,
        Err(error) => {
            print_error!("{error}");
            std::process::exit(1);
        }
    };

    print_bold!("Processing {} file(s) for {}", plan.total(), plan.run_key());
    println!("  B: {}", plan.b_date_root().display());
    println!("  A: {}", plan.a_date_root().display());
    println!("  {}", plan.mode());

    let mut namer = Namer::new(plan, config.settings);
    let mut log_path = None;
    if config.log {
        match FileLogger::new() {
            Ok(logger) => {
                log_path = Some(logger.path().to_path_buf());
                namer = namer.with_logger(logger);
            }
            Err(error) => print_warning!("Log file disabled: {error:#}"),
        }
    }

    let handle = namer::spawn(namer, DEFAULT_MESSAGE_CAPACITY).context("Failed to start worker thread")?;

    let cancel = handle.cancel_flag();
    ctrlc::set_handler(move || {
        if cancel.load(Ordering::SeqCst) {
            // Second Ctrl+C - force exit
            std::process::exit(130);
        }
        eprintln!("\n{}", "Received Ctrl+C, skipping remaining files...".yellow().bold());
        cancel.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    progress::follow(&handle, config.tick, config.verbose)?;
    let report = handle.join()?;

    for warning in &report.warnings {
        print_warning!("{warning}");
    }
    if report.stats.skip_cancelled > 0 {
        println!("\n{}", "Aborted by user".bold().red());
    }
    report.stats.print_summary(report.elapsed, report.manifest_path.as_deref());
    if let Some(path) = log_path {
        println!("Log file:               {}", path.display());
    }

    Ok(())
}
