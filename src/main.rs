//! iso-creator - command line front end
//!
//! Loads persisted defaults, applies flags on top, runs one build on a
//! worker thread and prints progress until it finishes.

use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::PathBuf;

use iso_creator::build::{BuildEvent, BuildReport, BuildRequest, spawn_build};
use iso_creator::logging;
use iso_creator::naming::InterchangeLevel;
use iso_creator::settings::Settings;

const EXIT_SUCCESS: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_CANCELLED: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "iso-creator")]
#[command(version, about = "Create an ISO-9660 image from a directory", long_about = None)]
struct Cli {
    /// Directory whose contents go into the image
    #[arg(value_name = "SOURCE")]
    source: PathBuf,

    /// Directory the image is written to
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    output: Option<PathBuf>,

    /// Volume label, also used as the image file name
    #[arg(short = 'l', long = "label")]
    label: Option<String>,

    /// Put the source directory itself at the top of the image
    #[arg(long)]
    include_root: bool,

    /// Leave out the Joliet namespace
    #[arg(long)]
    no_joliet: bool,

    /// Leave out Rock Ridge POSIX metadata
    #[arg(long)]
    no_rock_ridge: bool,

    /// ISO-9660 interchange level
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=3))]
    level: Option<u8>,

    /// Skip files that cannot be read
    #[arg(long, conflicts_with = "strict")]
    skip_errors: bool,

    /// Fail the build on the first unreadable file
    #[arg(long)]
    strict: bool,

    /// Keep symbolic links (requires Rock Ridge)
    #[arg(long)]
    symlinks: bool,

    /// Maximum Joliet name length in characters
    #[arg(long, value_name = "N")]
    joliet_max_len: Option<usize>,

    /// Fixed volume creation time, e.g. 2025-01-01T00:00:00Z
    #[arg(long, value_name = "RFC3339")]
    timestamp: Option<DateTime<Utc>>,

    /// Store the effective options as new defaults
    #[arg(long)]
    save_defaults: bool,

    /// Show debug output
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Cli {
    /// Override loaded settings with the flags given on this run
    fn apply(&self, settings: &mut Settings) {
        if let Some(dir) = &self.output {
            settings.output_directory = Some(dir.clone());
        }
        if let Some(label) = &self.label {
            settings.default_label = label.clone();
        }

        let build = &mut settings.build;
        if self.no_joliet {
            build.joliet = false;
        }
        if self.no_rock_ridge {
            build.rock_ridge = false;
        }
        if let Some(level) = self.level.and_then(|l| InterchangeLevel::try_from(l).ok()) {
            build.interchange_level = level;
        }
        if self.skip_errors {
            build.skip_on_file_error = true;
        }
        if self.strict {
            build.skip_on_file_error = false;
        }
        if self.symlinks {
            build.record_symlinks = true;
        }
        if let Some(len) = self.joliet_max_len {
            build.joliet_max_len = len;
        }
    }

    fn request(&self, settings: &Settings) -> BuildRequest {
        let output_directory = settings
            .output_directory
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        let mut request = BuildRequest::new(
            &self.source,
            output_directory,
            settings.default_label.clone(),
        );
        request.include_root = self.include_root;
        request.options = settings.build.clone();
        request.options.recorded_at = self.timestamp;
        request
    }
}

fn print_summary(report: &BuildReport) {
    println!(
        "Created {} ({} files, {} KB)",
        report.output_path.display(),
        report.files_written,
        report.image_bytes() / 1024
    );
    if !report.skipped.is_empty() {
        println!("Skipped {} unreadable files:", report.skipped.len());
        for entry in &report.skipped {
            println!("  {}: {}", entry.relative_path.display(), entry.reason);
        }
    }
    if !report.warnings.is_empty() {
        println!("Left out {} entries:", report.warnings.len());
        for warning in &report.warnings {
            println!("  {}: {}", warning.path.display(), warning.reason);
        }
    }
}

async fn run(cli: Cli) -> i32 {
    logging::init_logging(cli.verbose);

    let mut settings = Settings::load();
    cli.apply(&mut settings);
    if cli.save_defaults {
        match settings.save() {
            Ok(path) => log::info!("Saved defaults to {}", path.display()),
            Err(e) => log::warn!("Could not save defaults: {}", e),
        }
    }

    let request = cli.request(&settings);
    let mut handle = spawn_build(request);

    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling build");
            cancel.cancel();
        }
    });

    let mut outcome = None;
    while let Some(event) = handle.next_event().await {
        match event {
            BuildEvent::Progress(progress) => {
                println!(
                    "[{:>5.1}%] {}/{} files",
                    progress.percent_complete, progress.processed_files, progress.total_files
                );
            }
            BuildEvent::Finished(result) => outcome = Some(result),
        }
    }

    match outcome {
        Some(Ok(report)) => {
            print_summary(&report);
            EXIT_SUCCESS
        }
        Some(Err(failure)) if failure.is_cancelled() => {
            eprintln!("Cancelled");
            EXIT_CANCELLED
        }
        Some(Err(failure)) => {
            eprintln!("Error: {}", failure);
            for entry in &failure.skipped {
                eprintln!("  skipped {}: {}", entry.relative_path.display(), entry.reason);
            }
            EXIT_FAILURE
        }
        None => {
            eprintln!("Error: build stopped without a result");
            EXIT_FAILURE
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = run(cli).await;
    std::process::exit(code);
}
