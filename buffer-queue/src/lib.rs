//! Buffer-pool queue for handing typed buffers from one pipeline stage thread
//! to the next.
//!
//! ```text
//!  producer thread                                   consumer thread
//!  attach_producer(handler)
//!  preallocate(n, kind)
//!  loop {                                            loop {
//!      slot = push_begin(kind)   ──► filled ──►          slot = pull_begin()
//!      fill *slot                                        read *slot
//!      push_end(slot)                                    pull_end(slot)
//!  }                             ◄── dirty ◄──       }
//!  detach_producer()
//! ```
//!
//! One producer and one consumer use a queue at a time. A producer that
//! detaches can be replaced by another one without the consumer noticing.

mod buffer;
pub mod error;
pub mod handler;
mod miniqueue;
pub mod queue;
pub mod slot;
pub mod wait;

pub use error::{QueueError, Result, Violation};
pub use handler::{BufferHandler, Callbacks};
pub use queue::{Queue, QueueStats};
pub use slot::{PullSlot, PushSlot};
pub use wait::Wait;
