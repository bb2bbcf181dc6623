use std::io::{ErrorKind, Read};
use std::path::PathBuf;

use buffer_queue::{BufferHandler, Queue};
use bytes::BytesMut;

/// Queue connecting the demuxer stage to the muxer stage.
pub type StageQueue = Queue<BufferKind, StageBuffer>;

/// Buffer tags used between the stages. `Packet` is the pooled kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Info,
    Packet,
    Stop,
}

pub enum StageBuffer {
    Info(StreamInfo),
    Packet(Packet),
    /// End of one input.
    Stop,
}

impl StageBuffer {
    pub fn as_info_mut(&mut self) -> Option<&mut StreamInfo> {
        match self {
            StageBuffer::Info(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_packet_mut(&mut self) -> Option<&mut Packet> {
        match self {
            StageBuffer::Packet(packet) => Some(packet),
            _ => None,
        }
    }
}

/// Sent once per input before its packets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamInfo {
    pub input: usize,
    pub path: PathBuf,
    // bytes, 0 = unknown
    pub size: u64,
    pub packet_size: usize,
}

#[derive(Debug, Default)]
pub struct Packet {
    pub input: usize,
    pub seq: u64,
    pub offset: u64,
    pub data: BytesMut,
}

impl Packet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            ..Default::default()
        }
    }

    /// Replaces the packet data with up to `limit` bytes from `reader`.
    /// Returns the number of bytes read, 0 at end of input.
    pub fn fill_from(&mut self, reader: &mut impl Read, limit: usize) -> std::io::Result<usize> {
        self.data.clear();
        self.data.resize(limit, 0);

        let mut filled = 0;
        while filled < limit {
            match reader.read(&mut self.data[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.data.clear();
                    return Err(e);
                }
            }
        }
        self.data.truncate(filled);
        Ok(filled)
    }

    pub fn reset(&mut self) {
        self.input = 0;
        self.seq = 0;
        self.offset = 0;
        self.data.clear();
    }
}

/// Buffer callbacks of a demuxer. Packet buffers keep their allocation
/// between uses; cleaning only resets them.
pub struct DemuxerBuffers {
    packet_size: usize,
}

impl DemuxerBuffers {
    pub fn new(packet_size: usize) -> Self {
        Self { packet_size }
    }
}

impl BufferHandler<BufferKind, StageBuffer> for DemuxerBuffers {
    fn allocate(&mut self, kind: BufferKind) -> StageBuffer {
        match kind {
            BufferKind::Info => StageBuffer::Info(StreamInfo::default()),
            BufferKind::Packet => StageBuffer::Packet(Packet::with_capacity(self.packet_size)),
            BufferKind::Stop => StageBuffer::Stop,
        }
    }

    fn clean(&mut self, _kind: BufferKind, buffer: &mut StageBuffer) {
        match buffer {
            StageBuffer::Info(info) => *info = StreamInfo::default(),
            StageBuffer::Packet(packet) => packet.reset(),
            StageBuffer::Stop => {}
        }
    }

    fn deallocate(&mut self, kind: BufferKind, buffer: StageBuffer) {
        log::trace!("demuxer: deallocating {:?} buffer", kind);
        drop(buffer);
    }
}
