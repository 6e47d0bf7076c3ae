//! offload: memory card in, photos converted and uploaded.
//!
//! Entry point for the CLI application.

mod cli;
mod error;

use crate::cli::{Cli, Command, RunArgs, StateAction};
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::{OptionExt, ResultExt};
use offload_card::{FixedPath, VolumeResolver};
use offload_config::{Config, Paths};
use offload_pipeline::{Pipeline, Summary, Toolbox};
use offload_state::StateStore;
use offload_tools::{
    DNG_CONVERTER, DngConverter, IMMICH_GO, ImmichGo, ImmichSettings, RAWTHERAPEE, RawTherapee, Tool, ToolSpec,
};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use time::macros::format_description;
use tracing_subscriber::EnvFilter;

const CRATES: [&str; 6] =
    ["offload", "offload_card", "offload_config", "offload_pipeline", "offload_state", "offload_tools"];

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        },
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let directives: Vec<String> = CRATES.iter().map(|c| format!("{c}={level}")).collect();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("{},warn", directives.join(","))));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

async fn execute(cli: Cli) -> Result<()> {
    let paths = Paths::discover().or_raise(|| ErrorKind::Config)?;
    let mut config = offload_config::load(cli.config.as_deref(), &paths).or_raise(|| ErrorKind::Config)?;

    let verbose = cli.verbose;
    match cli.into_command() {
        Command::Run(args) => run(&mut config, &args, verbose).await,
        Command::State { action: StateAction::Info } => state_info(&config),
        Command::State { action: StateAction::Clear } => state_clear(&config),
        Command::Drives => drives().await,
        Command::Init { path } => {
            let target = path.unwrap_or_else(|| paths.config_file.clone());
            let written = offload_config::write_sample(&target, &paths).or_raise(|| ErrorKind::Config)?;
            println!("Sample configuration created at: {}", written.display());
            println!("Edit it with your settings before the first run.");
            Ok(())
        },
    }
}

async fn run(config: &mut Config, args: &RunArgs, verbose: bool) -> Result<()> {
    args.apply(config);
    config.validate().or_raise(|| ErrorKind::Config)?;
    if config.dry_run {
        tracing::info!("Dry run: nothing will be converted, uploaded or recorded");
    }

    let mut state = StateStore::load(&config.state_file).or_raise(|| ErrorKind::State)?;
    tracing::debug!(path = %state.path().display(), files = state.len(), "Loaded state");

    // The scratch directory, if any, must outlive the run.
    let (tools, _scratch) = if config.dry_run { (Toolbox::default(), None) } else { toolbox(config, verbose)? };

    let resolver: Box<dyn VolumeResolver> = match &config.volume.path {
        Some(path) => Box::new(FixedPath::new(path)),
        None => offload_card::platform_resolver(),
    };
    let summary = Pipeline::new(config, resolver.as_ref(), tools).run(&mut state).await.or_raise(|| ErrorKind::Run)?;
    report(&summary);
    Ok(())
}

/// Locate and configure each external tool this configuration needs.
fn toolbox(config: &Config, verbose: bool) -> Result<(Toolbox, Option<TempDir>)> {
    let timeout = config.timeout();
    let mut tools = Toolbox::default();
    let mut scratch = None;

    if config.process_raw {
        let tool = discover(&RAWTHERAPEE, config.convert.executable.as_deref(), timeout)?;
        let profile = config.convert.profile.clone().ok_or_raise(|| ErrorKind::Config)?;
        let converter = RawTherapee::new(tool, profile, config.convert.quality, &config.convert.output_directory)
            .or_raise(|| ErrorKind::Tools)?;
        tools.converter = Some(Arc::new(converter));

        if config.normalize.enabled {
            let tool = discover(&DNG_CONVERTER, config.normalize.executable.as_deref(), timeout)?;
            let dir = match &config.normalize.output_directory {
                Some(dir) => dir.clone(),
                None => {
                    let dir = tempfile::Builder::new().prefix("offload-dng-").tempdir().or_raise(|| ErrorKind::Tools)?;
                    let path = dir.path().to_path_buf();
                    scratch = Some(dir);
                    path
                },
            };
            let normalizer = DngConverter::new(tool, dir)
                .or_raise(|| ErrorKind::Tools)?
                .compressed(config.normalize.compressed)
                .embed_original(config.normalize.embed_original);
            tools.normalizer = Some(Arc::new(normalizer));
        }
    }

    if !config.skip_upload {
        let tool = discover(&IMMICH_GO, config.upload.executable.as_deref(), timeout)?;
        let settings = ImmichSettings {
            server_url: config.upload.server_url.clone().unwrap_or_default(),
            api_key: config.upload.api_key.clone().unwrap_or_default(),
            album: config.upload.album.clone(),
            tags: config.upload.tags.clone(),
            show_progress: verbose,
            skip_tls_verify: config.upload.skip_tls_verify,
        };
        tools.uploader = Some(Arc::new(ImmichGo::new(tool, settings)));
    }
    Ok((tools, scratch))
}

fn discover(spec: &ToolSpec, configured: Option<&Path>, timeout: Option<Duration>) -> Result<Tool> {
    let tool = Tool::discover(spec, configured)
        .inspect_err(|e| {
            if e.is_fatal() {
                tracing::error!("Install {} or set its executable path in the config file", spec.name);
            }
        })
        .or_raise(|| ErrorKind::Tools)?;
    Ok(tool.with_timeout(timeout))
}

fn report(summary: &Summary) {
    if summary.dry_run {
        tracing::info!("Dry run complete: {} files would be processed", summary.selected.len());
        return;
    }
    tracing::info!(
        card = %summary.card,
        "Processed {} of {} new files ({} failed), {} batches uploaded ({} failed)",
        summary.succeeded,
        summary.selected.len(),
        summary.failed,
        summary.batches_uploaded,
        summary.batches_failed
    );
    if summary.cleaned.failed + summary.intermediates_cleaned.failed > 0 {
        tracing::warn!(
            "{} files could not be deleted",
            summary.cleaned.failed + summary.intermediates_cleaned.failed
        );
    }
}

fn state_info(config: &Config) -> Result<()> {
    let state = StateStore::load(&config.state_file).or_raise(|| ErrorKind::State)?;
    let stats = state.stats();
    println!("State file: {}", state.path().display());
    println!("Processed files tracked: {}", stats.count);
    if let Some(size) = stats.on_disk_size {
        println!("File size: {size} bytes");
    }
    if let Some(last_run) = stats.last_run {
        let shown = last_run
            .format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC"))
            .unwrap_or_else(|_| last_run.to_string());
        println!("Last run: {shown}");
    }
    if let Some(card) = stats.card_id {
        println!("Card: {card}");
    }
    Ok(())
}

fn state_clear(config: &Config) -> Result<()> {
    let mut state = StateStore::load(&config.state_file).or_raise(|| ErrorKind::State)?;
    let count = state.clear();
    state.save().or_raise(|| ErrorKind::State)?;
    println!("Cleared {count} processed file entries from {}", state.path().display());
    Ok(())
}

async fn drives() -> Result<()> {
    let volumes = offload_card::platform_resolver().list_all().await.or_raise(|| ErrorKind::Volumes)?;
    if volumes.is_empty() {
        println!("No volumes found");
        return Ok(());
    }
    println!("Available volumes:");
    for volume in volumes {
        println!("  {}  [{}]", volume.label, volume.path.display());
    }
    Ok(())
}
