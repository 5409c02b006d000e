//! kinetrace command-line runner.
//!
//! Loads the JSON config, starts the worker pool and pushes uploaded
//! videos through the pipeline, printing one summary line per run.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{error, info, warn};

use kinetrace::config::{load_config, Config};
use kinetrace::telemetry::init_logging;
use kinetrace::{AppContext, FilesystemError, Job, KinetraceError, RunReport};

#[derive(Parser)]
#[command(
    name = "kinetrace",
    version,
    about = "Offline sports-video analysis pipeline",
    after_help = "EXAMPLES:\n  \
                  kinetrace --config kinetrace.json check\n  \
                  kinetrace run --user-id 7 --video-id 20250101120000 input/user_7/serve.mp4\n  \
                  kinetrace run --user-id 7 --video-id 20250101120000 --skip-register input/user_7/serve.mp4"
)]
struct Cli {
    /// Path to the JSON config file
    #[arg(short, long, global = true, default_value = "kinetrace.json")]
    config: PathBuf,

    /// Log at debug level regardless of the configured level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one uploaded video
    Run {
        /// The uploaded video file
        input: PathBuf,

        /// Identifier of the upload
        #[arg(long)]
        video_id: String,

        /// Owner of the upload
        #[arg(long)]
        user_id: i64,

        /// Filename for derived videos (defaults to the input's filename)
        #[arg(long)]
        filename: Option<String>,

        /// The upload is already registered in the database
        #[arg(long)]
        skip_register: bool,
    },

    /// Mark history entries past their expiry date as expired
    ExpireHistory,

    /// Validate the config file and exit
    Check,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            // Logging may not be up yet when the config itself is broken.
            eprintln!("kinetrace: {}", e);
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> Result<bool, KinetraceError> {
    let mut config = load_config(&cli.config)?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }

    if let Commands::Check = cli.command {
        println!("{}: ok", cli.config.display());
        return Ok(true);
    }

    init_logging(&config.logging)?;
    info!("Loaded config from {}", cli.config.display());

    match cli.command {
        Commands::Run {
            input,
            video_id,
            user_id,
            filename,
            skip_register,
        } => run(config, input, &video_id, user_id, filename, skip_register),
        Commands::ExpireHistory => {
            let context = AppContext::init(config)?;
            let expired = context.expire_history()?;
            println!("{} history entries expired", expired);
            context.shutdown();
            Ok(true)
        }
        Commands::Check => Ok(true),
    }
}

fn run(
    config: Config,
    input: PathBuf,
    video_id: &str,
    user_id: i64,
    filename: Option<String>,
    skip_register: bool,
) -> Result<bool, KinetraceError> {
    let job = match filename {
        Some(name) => Job::new(input, &name, video_id, user_id),
        None => Job::from_upload(input.clone(), video_id, user_id).ok_or_else(|| {
            FilesystemError::InvalidComponent {
                kind: "filename",
                value: input.display().to_string(),
            }
        })?,
    };

    let context = AppContext::init(config)?;

    if let Err(e) = context.expire_history() {
        warn!("Could not expire history entries: {}", e);
    }

    let shutdown = context.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || shutdown.shutdown()) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }

    if !skip_register {
        context.register_upload(&job)?;
    }
    context.dispatch_blocking(job)?;

    let mut reports: Vec<RunReport> = context.recv_report().into_iter().collect();
    reports.extend(context.shutdown());

    let mut all_completed = !reports.is_empty();
    for report in &reports {
        print_summary(report);
        all_completed &= report.completed();
    }
    Ok(all_completed)
}

fn print_summary(report: &RunReport) {
    let elapsed = report.finished_at - report.started_at;
    match &report.abort_reason {
        Some(reason) => println!(
            "{} {}: aborted in {} after {}ms: {}",
            report.video_id,
            report.filename,
            report.aborted_in.map(|s| s.to_string()).unwrap_or_default(),
            elapsed.num_milliseconds(),
            reason
        ),
        None => println!(
            "{} {}: {} in {}ms, {} original frames, {} pose frames, {} stage failure(s)",
            report.video_id,
            report.filename,
            report.final_state,
            elapsed.num_milliseconds(),
            report.original_frames,
            report.pose_frames,
            report.failures.len()
        ),
    }
    for warning in &report.warnings {
        println!("  warning: {}", warning);
    }
}
