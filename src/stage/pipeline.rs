use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::Context;
use buffer_queue::{Queue, QueueError};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::EncoderConfig;
use crate::stage::demuxer::Demuxer;
use crate::stage::muxer::{InputStats, MuxStats, Muxer};
use crate::stage::types::StageQueue;

/// Summary of a finished run.
#[derive(Clone, Debug, Serialize)]
pub struct PipelineReport {
    pub output: PathBuf,
    pub inputs: Vec<InputStats>,
    pub packets: u64,
    pub bytes: u64,
    pub elapsed_ms: u128,
}

/// One encoder run: a muxer thread consuming the queue while the demuxers
/// take turns producing into it, one input after another.
pub struct Pipeline {
    config: EncoderConfig,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(config: EncoderConfig, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }

    pub async fn run(&self) -> anyhow::Result<PipelineReport> {
        let started = Instant::now();
        let output = self.config.output.clone();
        let existed = output.exists();
        let file = open_output(&output, self.config.force)?;

        match self.encode(file).await {
            Ok(stats) => {
                let report = PipelineReport {
                    output,
                    inputs: stats.inputs,
                    packets: stats.packets,
                    bytes: stats.bytes,
                    elapsed_ms: started.elapsed().as_millis(),
                };
                log::info!(
                    "wrote {} ({} packets, {} bytes) in {} ms",
                    report.output.display(),
                    report.packets,
                    report.bytes,
                    report.elapsed_ms
                );
                Ok(report)
            }
            Err(e) => {
                if !existed && let Err(remove) = std::fs::remove_file(&output) {
                    log::warn!("failed to remove {}: {}", output.display(), remove);
                }
                Err(e)
            }
        }
    }

    async fn encode(&self, file: File) -> anyhow::Result<MuxStats> {
        let cancel = self.cancel.child_token();
        let queue: Arc<StageQueue> = Arc::new(Queue::new());

        let muxer_failed = Arc::new(AtomicBool::new(false));

        let muxer_task = {
            let queue = queue.clone();
            let cancel = cancel.clone();
            let muxer_failed = muxer_failed.clone();
            let mut muxer = Muxer::new(BufWriter::new(file), self.config.inputs.len())
                .stall_timeout(self.config.stall_timeout)
                .progress(self.config.progress);
            tokio::task::spawn_blocking(move || {
                let result = muxer.run(&queue, &cancel);
                if result.is_err() && !cancel.is_cancelled() {
                    // unblocks a demuxer waiting on a full pool
                    muxer_failed.store(true, Ordering::SeqCst);
                    cancel.cancel();
                }
                result
            })
        };

        let demuxed = self.demux_all(&queue, &cancel).await;
        if demuxed.is_err() {
            cancel.cancel();
        }
        let muxed = muxer_task.await.context("muxer thread panicked")?;

        first_failure(demuxed, muxed, muxer_failed.load(Ordering::SeqCst))
    }

    async fn demux_all(
        &self,
        queue: &Arc<StageQueue>,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        for (index, path) in self.config.inputs.iter().enumerate() {
            let demuxer = Demuxer::new(index, path, &self.config);
            let queue = queue.clone();
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || demuxer.run(&queue, &cancel))
                .await
                .context("demuxer thread panicked")?
                .with_context(|| format!("input {}", path.display()))?;
        }
        Ok(())
    }
}

/// Picks the error that stopped the run. The stage that failed first cancels
/// the other one, whose error is then only the cancellation.
fn first_failure(
    demuxed: anyhow::Result<()>,
    muxed: anyhow::Result<MuxStats>,
    muxer_failed: bool,
) -> anyhow::Result<MuxStats> {
    match (demuxed, muxed) {
        (Ok(()), muxed) => muxed,
        (Err(demux), Err(mux)) if muxer_failed && is_cancellation(&demux) => Err(mux),
        (Err(demux), _) => Err(demux),
    }
}

fn is_cancellation(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.downcast_ref::<QueueError>() == Some(&QueueError::Cancelled))
}

fn open_output(path: &Path, force: bool) -> anyhow::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    options.open(path).with_context(|| {
        if !force && path.exists() {
            format!("{} already exists, use --force to overwrite", path.display())
        } else {
            format!("failed to create {}", path.display())
        }
    })
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod pipeline_test;
