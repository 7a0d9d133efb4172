//! The data mover: a single bounded buffer between one input descriptor
//! and the output, moved by bounded read and write attempts under a
//! cooperative deadline regime, with a zero-copy fast path, read-error
//! skipping, sparse output, line-mode bookkeeping, and output-pipe
//! backpressure accounting.

pub mod buffer;
pub mod engine;
pub mod fd;
pub mod limiter;
pub mod pipe;
pub mod poll;
pub mod preview;
pub mod state;

use std::io;

use thiserror::Error;

/// Default transfer buffer size when the input block size is unknown.
pub const BUFFER_SIZE: usize = 409_600;
/// Ceiling for the automatically derived buffer size.
pub const BUFFER_SIZE_MAX: usize = 524_288;
/// Largest single read attempt.
pub const MAX_READ_AT_ONCE: usize = 524_288;
/// Largest single write attempt.
pub const MAX_WRITE_AT_ONCE: usize = 524_288;
/// Wall-clock budget for one read-retry sequence, in seconds.
pub const TRANSFER_READ_TIMEOUT: f64 = 0.09;
/// Wall-clock budget for one write-retry sequence, in seconds.
pub const TRANSFER_WRITE_TIMEOUT: f64 = 0.9;
/// Number of line-separator offsets remembered for pipe accounting.
pub const MAX_LINE_POSITIONS: usize = 100_000;

/// Fatal failures that end the transfer.  Transient conditions never
/// surface here; they come back as a zero-byte pass.
#[derive(Debug, Error)]
pub enum TransferError {
    /// A transfer-sized allocation failed.
    #[error("buffer allocation failed")]
    Memory,
    /// The readiness poll failed for a reason other than interruption.
    #[error("select call failed: {0}")]
    Poll(#[source] io::Error),
    /// A non-transient write failure (broken pipes are not errors).
    #[error("write failed: {0}")]
    Write(#[source] io::Error),
}

pub use engine::Engine;
pub use limiter::RateLimiter;
pub use pipe::PipeDepth;
pub use preview::Preview;
pub use state::TransferState;
