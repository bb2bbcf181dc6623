//! Encoder stages around the buffer queue.
//!
//! ```text
//!  input 0 ─► Demuxer ─┐
//!  input 1 ─► Demuxer ─┼─(one at a time)─► StageQueue ─► Muxer ─► output
//!  input N ─► Demuxer ─┘
//! ```
//!
//! Each demuxer is a producer session with its own packet pool. The muxer
//! never sees the handover between sessions, only the `Stop` marker each
//! demuxer sends at the end of its input.

pub mod demuxer;
pub mod muxer;
pub mod pipeline;
pub mod types;
