use clap::{Args, Parser, Subcommand};
use offload_config::Config;
use std::path::PathBuf;

/// Copy new photos off a camera card, convert the RAW files and upload the
/// results to a photo server.
#[derive(Parser, Debug)]
#[command(
    name = "offload",
    version,
    after_help = "EXAMPLES:\n    \
        # Write a sample config, then edit it\n    \
        offload init\n\n    \
        # See what a run would do\n    \
        offload --dry-run\n\n    \
        # Convert at most 20 new files, keeping the output\n    \
        offload --limit 20 --keep-files"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Options for the default `run` command
    #[command(flatten)]
    pub run: RunArgs,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Process and upload new files from the card (default)
    Run(RunArgs),

    /// Inspect or reset the record of processed files
    State {
        #[command(subcommand)]
        action: StateAction,
    },

    /// List mounted volumes and their labels
    Drives,

    /// Write a sample configuration file
    Init {
        /// Where to write it; defaults to the per-user config location
        #[arg(value_name = "FILE")]
        path: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateAction {
    /// Show how many files are recorded and when the last run was
    Info,
    /// Forget every processed file
    Clear,
}

/// Per-run overrides. Anything left unset keeps its configured value.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArgs {
    /// Show what would be done without doing it
    #[arg(long)]
    pub dry_run: bool,

    /// Process at most this many new files (0 = no limit)
    #[arg(short = 'n', long, value_name = "NUM")]
    pub limit: Option<usize>,

    /// Parallel conversions (default: CPU cores, at most 4)
    #[arg(short = 'j', long, value_name = "NUM")]
    pub workers: Option<usize>,

    /// Upload camera JPEGs only, skipping RAW processing
    #[arg(long)]
    pub jpg_only: bool,

    /// Convert files but don't upload them
    #[arg(long)]
    pub skip_upload: bool,

    /// Don't upload the camera's JPEG alongside each processed file
    #[arg(long)]
    pub no_camera_jpgs: bool,

    /// Keep processed files in the output directory after upload
    #[arg(long)]
    pub keep_files: bool,

    /// Processing profile
    #[arg(long, value_name = "FILE")]
    pub profile: Option<PathBuf>,

    /// Photo server URL
    #[arg(long, value_name = "URL")]
    pub server: Option<String>,

    /// Photo server API key
    #[arg(long, value_name = "KEY")]
    pub key: Option<String>,

    /// Album to upload into
    #[arg(long, value_name = "NAME")]
    pub album: Option<String>,

    /// Output directory for processed files
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Volume label of the camera card
    #[arg(long, value_name = "LABEL")]
    pub drive: Option<String>,

    /// Use this directory as the card instead of looking up its label
    #[arg(long, value_name = "DIR")]
    pub volume_path: Option<PathBuf>,

    /// Kill any external tool still running after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

impl Cli {
    /// The command to execute; `run` when none was named.
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Run(self.run))
    }
}

impl RunArgs {
    /// Layer these flags over a loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        config.dry_run |= self.dry_run;
        config.skip_upload |= self.skip_upload;
        if self.jpg_only {
            config.process_raw = false;
        }
        if self.no_camera_jpgs {
            config.upload_camera_jpegs = false;
        }
        if self.keep_files {
            config.cleanup_after_upload = false;
        }
        if let Some(limit) = self.limit {
            config.limit = Some(limit);
        }
        if let Some(workers) = self.workers {
            config.workers = Some(workers);
        }
        if let Some(profile) = &self.profile {
            config.convert.profile = Some(profile.clone());
        }
        if let Some(output) = &self.output {
            config.convert.output_directory = output.clone();
        }
        if let Some(server) = &self.server {
            config.upload.server_url = Some(server.clone());
        }
        if let Some(key) = &self.key {
            config.upload.api_key = Some(key.clone());
        }
        if let Some(album) = &self.album {
            config.upload.album = Some(album.clone());
        }
        if let Some(drive) = &self.drive {
            config.volume.label = drive.clone();
        }
        if let Some(path) = &self.volume_path {
            config.volume.path = Some(path.clone());
        }
        if let Some(timeout) = self.timeout {
            config.tools.timeout_secs = Some(timeout);
        }
    }
}
