//! Build driver - one call from source directory to finished image
//!
//! `build_image` runs synchronously on the caller's thread. `spawn_build`
//! runs it on a background thread and streams events over a channel,
//! ending with exactly one `BuildEvent::Finished`.

mod options;
mod progress;
mod result;

pub use options::BuildOptions;
pub use progress::{CancelToken, ProgressEvent};
pub use result::{BuildFailure, BuildReport, BuildResult, SkippedEntry};

use std::path::PathBuf;
use std::thread::JoinHandle;
use tokio::sync::mpsc;

use crate::error::BuildError;
use crate::image::write_image;
use crate::naming::label_or_default;
use crate::plan::build_plan;

/// Everything needed to produce one image
#[derive(Debug, Clone, PartialEq)]
pub struct BuildRequest {
    pub source_root: PathBuf,
    pub output_directory: PathBuf,
    pub volume_label: String,
    /// Put the source directory itself at the top of the image
    pub include_root: bool,
    pub options: BuildOptions,
}

impl BuildRequest {
    pub fn new(
        source_root: impl Into<PathBuf>,
        output_directory: impl Into<PathBuf>,
        volume_label: impl Into<String>,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            output_directory: output_directory.into(),
            volume_label: volume_label.into(),
            include_root: false,
            options: BuildOptions::default(),
        }
    }

    /// `<output_directory>/<label>.iso`
    pub fn output_path(&self) -> PathBuf {
        self.output_directory
            .join(format!("{}.iso", label_or_default(&self.volume_label)))
    }
}

/// Plan and write the image described by `request`
pub fn build_image<F>(request: &BuildRequest, on_progress: F, cancel: &CancelToken) -> BuildResult
where
    F: FnMut(ProgressEvent),
{
    if cancel.is_cancelled() {
        return Err(BuildError::Cancelled.into());
    }

    log::info!(
        "Building image from {} into {}",
        request.source_root.display(),
        request.output_directory.display()
    );
    let manifest = build_plan(
        &request.source_root,
        request.include_root,
        &request.options.plan_options(),
    )?;

    std::fs::create_dir_all(&request.output_directory)
        .map_err(|e| BuildError::output(&request.output_directory, e))?;

    write_image(
        &manifest,
        &request.output_path(),
        &request.volume_label,
        &request.options.write_options(),
        on_progress,
        cancel,
    )
}

#[derive(Debug)]
pub enum BuildEvent {
    Progress(ProgressEvent),
    Finished(BuildResult),
}

/// A build running on a background thread
pub struct BuildHandle {
    events: mpsc::UnboundedReceiver<BuildEvent>,
    cancel: CancelToken,
    thread: Option<JoinHandle<()>>,
}

impl BuildHandle {
    /// Next event, or `None` once the worker has finished and the stream is
    /// drained
    pub async fn next_event(&mut self) -> Option<BuildEvent> {
        self.events.recv().await
    }

    /// Blocking variant of [`next_event`](Self::next_event). Must not be
    /// called from inside an async runtime.
    pub fn blocking_next_event(&mut self) -> Option<BuildEvent> {
        self.events.blocking_recv()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drain remaining events and wait for the worker
    ///
    /// Returns `None` if the worker stopped without reporting a result.
    pub fn wait(mut self) -> Option<BuildResult> {
        let mut result = None;
        while let Some(event) = self.events.blocking_recv() {
            if let BuildEvent::Finished(finished) = event {
                result = Some(finished);
            }
        }
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            log::error!("Build thread panicked");
        }
        result
    }
}

/// Run `request` on a background thread
///
/// Returns immediately. Progress and the final result arrive through the
/// returned handle.
pub fn spawn_build(request: BuildRequest) -> BuildHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();

    let thread = std::thread::spawn(move || {
        let progress_tx = tx.clone();
        let result = build_image(
            &request,
            |event| {
                // The receiver may already be gone; the build still finishes
                let _ = progress_tx.send(BuildEvent::Progress(event));
            },
            &worker_cancel,
        );
        let _ = tx.send(BuildEvent::Finished(result));
    });

    BuildHandle {
        events: rx,
        cancel,
        thread: Some(thread),
    }
}
