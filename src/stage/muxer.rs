use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use buffer_queue::{QueueError, Wait};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::stage::types::{StageBuffer, StageQueue};
use crate::status::Status;

#[derive(Clone, Debug, Default, Serialize)]
pub struct InputStats {
    pub path: PathBuf,
    pub packets: u64,
    pub bytes: u64,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct MuxStats {
    pub inputs: Vec<InputStats>,
    pub packets: u64,
    pub bytes: u64,
}

/// Consumer side of the queue. Writes every packet, in order, across all
/// producer sessions and finishes after one stop marker per input.
pub struct Muxer<W: Write> {
    writer: W,
    inputs: usize,
    stall_timeout: Option<Duration>,
    status: Status,
}

impl<W: Write> Muxer<W> {
    pub fn new(writer: W, inputs: usize) -> Self {
        Self {
            writer,
            inputs,
            stall_timeout: None,
            status: Status::new(false),
        }
    }

    pub fn stall_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stall_timeout = timeout;
        self
    }

    pub fn progress(mut self, show: bool) -> Self {
        self.status = Status::new(show);
        self
    }

    fn next_wait(&self, cancel: &CancellationToken) -> Wait {
        let wait = Wait::cancellable(cancel.clone());
        match self.stall_timeout {
            Some(timeout) => wait.with_timeout(timeout),
            None => wait,
        }
    }

    pub fn run(&mut self, queue: &StageQueue, cancel: &CancellationToken) -> anyhow::Result<MuxStats> {
        let mut stats = MuxStats::default();
        let mut current: Option<(usize, u64)> = None;
        let mut stops = 0;

        while stops < self.inputs {
            let mut slot = match queue.pull_begin_with(&self.next_wait(cancel)) {
                Ok(slot) => slot,
                Err(QueueError::TimedOut) => {
                    anyhow::bail!(
                        "muxer stalled: nothing received for {:?}",
                        self.stall_timeout.unwrap_or_default()
                    );
                }
                Err(e) => return Err(e.into()),
            };

            match &mut *slot {
                StageBuffer::Info(info) => {
                    self.status.info(format!(
                        "input {}/{}: {}",
                        info.input + 1,
                        self.inputs,
                        info.path.display()
                    ));
                    log::debug!("muxer: packets of up to {} bytes", info.packet_size);
                    current = Some((info.input, info.size));
                    stats.inputs.push(InputStats {
                        path: info.path.clone(),
                        ..Default::default()
                    });
                }
                StageBuffer::Packet(packet) => {
                    let Some(input) = stats.inputs.last_mut() else {
                        anyhow::bail!("packet received before stream info");
                    };
                    if packet.seq != input.packets || packet.offset != input.bytes {
                        anyhow::bail!(
                            "input {}: packet {} out of order, expected {}",
                            packet.input,
                            packet.seq,
                            input.packets
                        );
                    }

                    self.writer.write_all(&packet.data)?;
                    input.packets += 1;
                    input.bytes += packet.data.len() as u64;
                    stats.packets += 1;
                    stats.bytes += packet.data.len() as u64;

                    if let Some((index, size)) = current
                        && size > 0
                    {
                        self.status.progress(format!(
                            "input {}: {}%",
                            index + 1,
                            input.bytes.saturating_mul(100) / size
                        ));
                    }
                }
                StageBuffer::Stop => {
                    stops += 1;
                    if let (Some(input), Some((_, size))) = (stats.inputs.last(), current)
                        && size > 0
                        && input.bytes != size
                    {
                        self.status.warn(format!(
                            "{}: expected {} bytes, got {}",
                            input.path.display(),
                            size,
                            input.bytes
                        ));
                    }
                    if let Some(input) = stats.inputs.last() {
                        self.status.info(format!(
                            "{}: {} packets, {} bytes",
                            input.path.display(),
                            input.packets,
                            input.bytes
                        ));
                    }
                    current = None;
                }
            }
            queue.pull_end(slot)?;
        }

        self.writer.flush()?;
        Ok(stats)
    }
}
