//! Output-pipe depth probing.
//!
//! Asking the kernel how many written bytes the consumer has not yet
//! read lets the display reflect consumer progress instead of kernel
//! buffer acceptance.  The query is not available everywhere, so it is
//! modelled as a capability: once the ioctl fails, the probe reports
//! zero and the accounting falls back to `transferred = total_written`.

use std::os::fd::RawFd;

use crate::fd;

/// Probe for the number of unread bytes in a pipe.
#[derive(Debug)]
pub struct PipeDepth {
    fd: RawFd,
    supported: bool,
}

impl PipeDepth {
    /// Returns a probe if the descriptor is a pipe at all.
    #[must_use]
    pub fn probe(fd: RawFd) -> Option<Self> {
        if !fd::is_pipe(fd) {
            return None;
        }
        Some(Self { fd, supported: true })
    }

    /// Unread bytes currently buffered in the pipe; zero once the
    /// capability is found to be missing.
    pub fn unread(&mut self) -> u64 {
        if !self.supported {
            return 0;
        }
        let mut queued: libc::c_int = 0;
        // SAFETY: FIONREAD writes an int through the provided pointer.
        let rc = unsafe { libc::ioctl(self.fd, libc::FIONREAD, &mut queued) };
        if rc != 0 {
            tracing::debug!("FIONREAD unsupported on output, assuming drained");
            self.supported = false;
            return 0;
        }
        if queued < 0 {
            return 0;
        }
        queued as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsRawFd;

    #[test]
    fn regular_files_have_no_depth() {
        let file = tempfile::tempfile().expect("tempfile");
        assert!(PipeDepth::probe(file.as_raw_fd()).is_none());
    }

    #[test]
    fn unread_tracks_pipe_contents() {
        let (reader, writer) = rustix::pipe::pipe().expect("pipe");
        let mut depth = PipeDepth::probe(writer.as_raw_fd()).expect("probe");
        assert_eq!(depth.unread(), 0);

        rustix::io::write(&writer, b"hello").expect("write");
        assert_eq!(depth.unread(), 5);

        let mut sink = [0u8; 3];
        rustix::io::read(&reader, &mut sink).expect("read");
        assert_eq!(depth.unread(), 2);
    }
}
