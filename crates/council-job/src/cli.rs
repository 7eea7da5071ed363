//! Command-line interface

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Fan one prompt out to a council of CLI agents and follow the job
#[derive(Parser, Debug)]
#[command(name = "council-job", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a job and launch every member; prints the job directory
    Start(StartArgs),

    /// Snapshot of job and member states
    Status(StatusArgs),

    /// Block until progress moves past the previous cursor
    Wait(WaitArgs),

    /// Prompt plus each member's output
    Results(ResultsArgs),

    /// Send SIGTERM to every running member
    Stop(JobArgs),

    /// Delete the job directory
    Clean(JobArgs),

    /// Run one member (launched by `start`)
    #[command(hide = true)]
    Worker(WorkerArgs),
}

impl Cli {
    /// Whether errors should be reported as structured JSON
    pub fn wants_json(&self) -> bool {
        match &self.command {
            Command::Start(args) => args.json,
            Command::Status(args) => args.json,
            Command::Results(args) => args.json,
            Command::Wait(_) => true,
            Command::Stop(args) | Command::Clean(args) => args.json,
            Command::Worker(_) => false,
        }
    }
}

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Council config file (overrides COUNCIL_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Chairman role: auto, claude, codex, ... (overrides COUNCIL_CHAIRMAN)
    #[arg(long)]
    pub chairman: Option<String>,

    /// Root directory for job directories (overrides COUNCIL_JOBS_DIR)
    #[arg(long)]
    pub jobs_dir: Option<PathBuf>,

    /// Per-member timeout in seconds; 0 or less disables
    #[arg(long, allow_negative_numbers = true)]
    pub timeout: Option<i64>,

    /// Leave the chairman out of the member set
    #[arg(long, conflicts_with = "include_chairman")]
    pub exclude_chairman: bool,

    /// Also run the chairman as a member
    #[arg(long)]
    pub include_chairman: bool,

    /// Print the job metadata as JSON
    #[arg(long)]
    pub json: bool,

    /// The question for the council
    #[arg(required = true, trailing_var_arg = true, value_name = "PROMPT")]
    pub prompt: Vec<String>,
}

impl StartArgs {
    pub fn exclude_override(&self) -> Option<bool> {
        if self.exclude_chairman {
            Some(true)
        } else if self.include_chairman {
            Some(false)
        } else {
            None
        }
    }
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// JSON output (default)
    #[arg(long)]
    pub json: bool,

    /// One-line summary
    #[arg(long, conflicts_with = "checklist")]
    pub text: bool,

    /// Checklist with one line per member
    #[arg(long)]
    pub checklist: bool,

    /// With --text, add a line per member
    #[arg(long)]
    pub verbose: bool,

    pub job_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct WaitArgs {
    /// Cursor from the previous wait (defaults to the job's .wait_cursor)
    #[arg(long)]
    pub cursor: Option<String>,

    /// Members per progress bucket: auto or N
    #[arg(long, alias = "bucket-size")]
    pub bucket: Option<String>,

    /// Poll interval in milliseconds (minimum 50)
    #[arg(long, default_value_t = 250, allow_negative_numbers = true)]
    pub interval_ms: i64,

    /// Give up after this many milliseconds; 0 waits indefinitely
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub timeout_ms: i64,

    pub job_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct ResultsArgs {
    /// JSON output
    #[arg(long)]
    pub json: bool,

    pub job_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct JobArgs {
    /// Report errors as JSON
    #[arg(long)]
    pub json: bool,

    pub job_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct WorkerArgs {
    #[arg(long)]
    pub job_dir: PathBuf,

    #[arg(long)]
    pub member: String,

    /// Member directory name under members/
    #[arg(long)]
    pub safe_member: String,

    #[arg(long, allow_hyphen_values = true)]
    pub command: String,

    /// Feed the prompt on stdin instead of as the last argument
    #[arg(long)]
    pub stdin: bool,

    /// Timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}
