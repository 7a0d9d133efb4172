//! Mutable transfer state shared between the engine and the main loop.

use std::os::fd::RawFd;

use crate::buffer::AlignedBuffer;
use crate::{TransferError, MAX_LINE_POSITIONS};

/// Circular record of the output offsets at which line separators were
/// written, used to translate unread pipe bytes back into line counts.
#[derive(Debug)]
pub struct LineRing {
    positions: Vec<u64>,
    capacity: usize,
    head: usize,
    len: usize,
}

impl LineRing {
    pub fn new() -> Result<Self, TransferError> {
        let mut positions = Vec::new();
        positions
            .try_reserve_exact(MAX_LINE_POSITIONS)
            .map_err(|_| TransferError::Memory)?;
        positions.resize(MAX_LINE_POSITIONS, 0);
        Ok(Self {
            positions,
            capacity: MAX_LINE_POSITIONS,
            head: 0,
            len: 0,
        })
    }

    /// Records the output offset of one separator.
    pub fn push(&mut self, position: u64) {
        self.positions[self.head] = position;
        self.head = (self.head + 1) % self.capacity;
        if self.len < self.capacity {
            self.len += 1;
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of recorded separators whose offset lies strictly after
    /// `last_consumed`, walking backwards from the most recent entry.
    #[must_use]
    pub fn lines_after(&self, last_consumed: u64) -> u64 {
        let mut unconsumed = 0;
        for back in 0..self.len {
            let index = (self.head + self.capacity - back - 1) % self.capacity;
            if self.positions[index] <= last_consumed {
                break;
            }
            unconsumed += 1;
        }
        unconsumed
    }
}

/// All mutable engine state for one transfer.
#[derive(Debug, Default)]
pub struct TransferState {
    pub(crate) buffer: Option<AlignedBuffer>,
    /// Usable size of the allocated buffer.
    pub buffer_size: usize,
    /// End of valid data in the buffer.
    pub read_pos: usize,
    /// Start of unwritten data in the buffer.
    pub write_pos: usize,
    /// Bytes the current pass intends to write.
    pub to_write: usize,

    /// Bytes read since the transfer began (splice included).
    pub total_bytes_read: u64,
    /// Bytes written since the transfer began, or lines in line mode.
    pub total_written: u64,
    /// Amount delivered to the consumer: `total_written` minus whatever
    /// still sits unread in the output pipe.
    pub transferred: u64,
    /// Unread bytes in the output pipe buffer (0 for non-pipe outputs).
    pub written_but_not_consumed: u64,
    /// Total bytes ever written to the output, for line accounting.
    pub last_output_position: u64,
    /// Separator offsets, allocated lazily on the first line write.
    pub line_positions: Option<LineRing>,

    /// Transfer time so far, excluding stoppages.
    pub elapsed_seconds: f64,

    pub read_errors_in_a_row: u32,
    pub(crate) last_read_skip_fd: RawFd,
    pub(crate) read_error_warning_shown: bool,
    /// Descriptor on which splice was demoted, or -1.
    pub(crate) splice_failed_fd: RawFd,
    /// Whether the current pass moved data with splice.
    pub splice_used: bool,
    /// Set once a sparse-mode seek failed; disables the sparse path.
    pub output_not_seekable: bool,
    /// Direct-I/O setting must be (re)applied to the descriptors.
    pub direct_pending: bool,

    pub(crate) pass_written: u64,
}

impl TransferState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_read_skip_fd: -1,
            splice_failed_fd: -1,
            ..Self::default()
        }
    }

    /// Bytes of valid-but-unwritten data in the buffer.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.read_pos - self.write_pos
    }

    /// Fill level of the buffer as a fraction of its size, for the
    /// `%{buffer-percent}` directive.
    #[must_use]
    pub fn buffer_fill_fraction(&self) -> f64 {
        if self.buffer_size == 0 {
            return 0.0;
        }
        self.pending() as f64 / self.buffer_size as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_has_no_failed_descriptors() {
        let state = TransferState::new();
        assert_eq!(state.last_read_skip_fd, -1);
        assert_eq!(state.splice_failed_fd, -1);
        assert_eq!(state.pending(), 0);
    }

    #[test]
    fn line_ring_counts_unconsumed_separators() {
        let mut ring = LineRing::new().expect("allocate");
        for position in [10u64, 20, 30, 40] {
            ring.push(position);
        }
        assert_eq!(ring.lines_after(0), 4);
        assert_eq!(ring.lines_after(20), 2);
        assert_eq!(ring.lines_after(40), 0);
        assert_eq!(ring.lines_after(35), 1);
    }

    #[test]
    fn line_ring_wraps_without_losing_recent_entries() {
        let mut ring = LineRing::new().expect("allocate");
        for position in 0..(MAX_LINE_POSITIONS as u64 + 10) {
            ring.push(position);
        }
        assert_eq!(ring.len(), MAX_LINE_POSITIONS);
        // The most recent positions are still there.
        assert_eq!(ring.lines_after(MAX_LINE_POSITIONS as u64 + 4), 5);
    }
}
