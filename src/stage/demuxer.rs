use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;

use anyhow::Context;
use buffer_queue::{QueueError, Wait};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::EncoderConfig;
use crate::stage::types::{BufferKind, DemuxerBuffers, StageQueue};

#[derive(Clone, Debug, Default, Serialize)]
pub struct DemuxStats {
    pub packets: u64,
    pub bytes: u64,
}

/// Reads one input file and feeds it to the queue as a producer session.
pub struct Demuxer {
    index: usize,
    path: PathBuf,
    pool_size: usize,
    packet_size: usize,
}

impl Demuxer {
    pub fn new(index: usize, path: impl Into<PathBuf>, config: &EncoderConfig) -> Self {
        Self {
            index,
            path: path.into(),
            pool_size: config.pool_size,
            packet_size: config.packet_size,
        }
    }

    /// Runs the whole session on the calling thread: attach, stream info,
    /// packets, stop marker, detach.
    pub fn run(self, queue: &StageQueue, cancel: &CancellationToken) -> anyhow::Result<DemuxStats> {
        let file = File::open(&self.path)
            .with_context(|| format!("failed to open input {}", self.path.display()))?;
        let size = file.metadata().map(|m| m.len()).unwrap_or(0);
        self.run_reader(queue, cancel, BufReader::new(file), size)
    }

    /// When streaming fails halfway the session still tries to detach,
    /// waiting for the consumer to drain what was published. That wait is
    /// bounded by `cancel`; if it gives up, the session stays attached
    /// until the queue is dropped.
    fn run_reader(
        &self,
        queue: &StageQueue,
        cancel: &CancellationToken,
        reader: impl Read,
        size: u64,
    ) -> anyhow::Result<DemuxStats> {
        queue.attach_producer(DemuxerBuffers::new(self.packet_size))?;
        let wait = Wait::cancellable(cancel.clone());

        let result = self.stream(queue, &wait, reader, size);
        if let Err(e) = &result {
            log::warn!("demuxer {}: {:#}", self.index, e);
            if queue.is_attached()
                && let Err(e) = queue.detach_producer_with(&wait)
            {
                log::warn!("demuxer {}: detach after failure: {}", self.index, e);
            }
        }
        result
    }

    fn stream(
        &self,
        queue: &StageQueue,
        wait: &Wait,
        mut reader: impl Read,
        size: u64,
    ) -> anyhow::Result<DemuxStats> {
        queue.preallocate(self.pool_size, BufferKind::Packet)?;

        let mut slot = queue.push_begin_with(BufferKind::Info, wait)?;
        if let Some(info) = slot.as_info_mut() {
            info.input = self.index;
            info.path = self.path.clone();
            info.size = size;
            info.packet_size = self.packet_size;
        }
        queue.push_end(slot)?;
        log::debug!("demuxer {}: streaming {} ({} bytes)", self.index, self.path.display(), size);

        let mut stats = DemuxStats::default();
        loop {
            if wait.is_cancelled() {
                return Err(QueueError::Cancelled.into());
            }

            let mut slot = queue.push_begin_with(BufferKind::Packet, wait)?;
            let Some(packet) = slot.as_packet_mut() else {
                anyhow::bail!("pooled buffer is not a packet");
            };
            let read = packet
                .fill_from(&mut reader, self.packet_size)
                .with_context(|| format!("failed to read {}", self.path.display()))?;
            if read == 0 {
                // nothing to publish; the dropped slot goes back to the pool
                log::trace!("demuxer {}: end of input, {:?} slot unused", self.index, slot.kind());
                break;
            }

            packet.input = self.index;
            packet.seq = stats.packets;
            packet.offset = stats.bytes;
            queue.push_end(slot)?;

            stats.packets += 1;
            stats.bytes += read as u64;
        }

        let slot = queue.push_begin_with(BufferKind::Stop, wait)?;
        queue.push_end(slot)?;

        queue.detach_producer_with(wait)?;
        log::debug!(
            "demuxer {}: done, {} packets, {} bytes",
            self.index,
            stats.packets,
            stats.bytes
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, ErrorKind};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use buffer_queue::Queue;

    use super::*;
    use crate::stage::types::StageBuffer;

    /// Yields `good` bytes, then fails every read.
    struct Truncated {
        good: Cursor<Vec<u8>>,
    }

    impl Read for Truncated {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.good.read(buf)? {
                0 => Err(std::io::Error::new(ErrorKind::UnexpectedEof, "device gone")),
                n => Ok(n),
            }
        }
    }

    fn write_input(name: &str, content: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "mp4-encoder-demuxer-{}-{}",
            std::process::id(),
            name
        ));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_demuxer_publishes_info_packets_stop() -> anyhow::Result<()> {
        let path = write_input("sequence", b"abcdefghij");
        let config = EncoderConfig::builder()
            .input_file(&path)
            .pool_size(2)
            .packet_size(4)
            .build()?;
        let queue: Arc<StageQueue> = Arc::new(Queue::new());

        let consumer = {
            let queue = queue.clone();
            std::thread::spawn(move || {
                let mut seen = Vec::new();
                loop {
                    let mut slot = queue.pull_begin().unwrap();
                    let entry = match &mut *slot {
                        StageBuffer::Info(info) => format!("info:{}", info.size),
                        StageBuffer::Packet(p) => {
                            format!("{}@{}:{}", p.seq, p.offset, String::from_utf8_lossy(&p.data))
                        }
                        StageBuffer::Stop => "stop".to_string(),
                    };
                    let done = slot.kind() == BufferKind::Stop;
                    queue.pull_end(slot).unwrap();
                    seen.push(entry);
                    if done {
                        return seen;
                    }
                }
            })
        };

        let stats = Demuxer::new(0, &path, &config).run(&queue, &CancellationToken::new())?;
        let seen = consumer.join().unwrap();
        std::fs::remove_file(&path)?;

        assert_eq!(stats.packets, 3);
        assert_eq!(stats.bytes, 10);
        assert_eq!(
            seen,
            vec!["info:10", "0@0:abcd", "1@4:efgh", "2@8:ij", "stop"]
        );
        assert!(!queue.is_attached());
        assert_eq!(queue.stats().live(), 0);
        Ok(())
    }

    #[test]
    fn test_missing_input_never_attaches() -> anyhow::Result<()> {
        let config = EncoderConfig::builder().input_file("missing.dv").build()?;
        let queue: StageQueue = Queue::new();

        let err = Demuxer::new(0, "/nonexistent/missing.dv", &config)
            .run(&queue, &CancellationToken::new())
            .unwrap_err();

        assert!(format!("{:#}", err).contains("failed to open input"));
        assert!(!queue.is_attached());
        Ok(())
    }

    #[test]
    fn test_cancelled_demuxer_stops() -> anyhow::Result<()> {
        let path = write_input("cancelled", &[7u8; 64]);
        let config = EncoderConfig::builder()
            .input_file(&path)
            .pool_size(1)
            .packet_size(8)
            .build()?;
        let queue: StageQueue = Queue::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = Demuxer::new(0, &path, &config).run(&queue, &cancel).unwrap_err();
        std::fs::remove_file(&path)?;

        assert_eq!(
            err.downcast_ref::<QueueError>(),
            Some(&QueueError::Cancelled)
        );
        Ok(())
    }

    #[test]
    fn test_read_error_detaches_after_drain() -> anyhow::Result<()> {
        let config = EncoderConfig::builder()
            .input_file("broken.dv")
            .pool_size(2)
            .packet_size(4)
            .build()?;
        let queue: Arc<StageQueue> = Arc::new(Queue::new());
        let done = Arc::new(AtomicBool::new(false));

        let consumer = {
            let queue = queue.clone();
            let done = done.clone();
            std::thread::spawn(move || {
                let mut pulled = 0;
                loop {
                    match queue.pull_begin_with(&Wait::timeout(Duration::from_millis(20))) {
                        Ok(slot) => {
                            assert!(!matches!(*slot, StageBuffer::Stop));
                            queue.pull_end(slot).unwrap();
                            pulled += 1;
                        }
                        Err(QueueError::TimedOut) if done.load(Ordering::SeqCst) => return pulled,
                        Err(QueueError::TimedOut) => continue,
                        Err(e) => panic!("unexpected queue error: {}", e),
                    }
                }
            })
        };

        let reader = Truncated {
            good: Cursor::new(b"abcdefghij".to_vec()),
        };
        let err = Demuxer::new(0, "broken.dv", &config)
            .run_reader(&queue, &CancellationToken::new(), reader, 0)
            .unwrap_err();
        done.store(true, Ordering::SeqCst);
        let pulled = consumer.join().unwrap();

        assert!(format!("{:#}", err).contains("device gone"));
        // info and the two full packets; the partial one never got published
        assert_eq!(pulled, 3);
        assert!(!queue.is_attached());
        assert_eq!(queue.stats().live(), 0);
        Ok(())
    }
}
