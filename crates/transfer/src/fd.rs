//! Thin raw-descriptor wrappers.
//!
//! The engine works with raw descriptor numbers because stdin/stdout are
//! borrowed, input files are opened and closed across loop iterations,
//! and the same code paths must serve both.  Every wrapper borrows the
//! descriptor for the duration of one call.

use std::io;
use std::os::fd::{BorrowedFd, RawFd};

fn borrow(fd: RawFd) -> BorrowedFd<'static> {
    // SAFETY: callers pass descriptors that stay open for the duration
    // of the call; the engine never retains the borrow.
    unsafe { BorrowedFd::borrow_raw(fd) }
}

pub fn read(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    rustix::io::read(borrow(fd), buf).map_err(io::Error::from)
}

pub fn write(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    rustix::io::write(borrow(fd), buf).map_err(io::Error::from)
}

pub fn seek_current(fd: RawFd, offset: i64) -> io::Result<u64> {
    rustix::fs::seek(borrow(fd), rustix::fs::SeekFrom::Current(offset)).map_err(io::Error::from)
}

pub fn seek_set(fd: RawFd, offset: u64) -> io::Result<u64> {
    rustix::fs::seek(borrow(fd), rustix::fs::SeekFrom::Start(offset)).map_err(io::Error::from)
}

pub fn seek_end(fd: RawFd) -> io::Result<u64> {
    rustix::fs::seek(borrow(fd), rustix::fs::SeekFrom::End(0)).map_err(io::Error::from)
}

pub fn truncate(fd: RawFd, length: u64) -> io::Result<()> {
    rustix::fs::ftruncate(borrow(fd), length).map_err(io::Error::from)
}

pub fn datasync(fd: RawFd) -> io::Result<()> {
    rustix::fs::fdatasync(borrow(fd)).map_err(io::Error::from)
}

/// Moves up to `len` bytes from `fd_in` to `fd_out` without copying
/// through userspace.
#[cfg(target_os = "linux")]
pub fn splice(fd_in: RawFd, fd_out: RawFd, len: usize) -> io::Result<usize> {
    rustix::pipe::splice(
        borrow(fd_in),
        None,
        borrow(fd_out),
        None,
        len,
        rustix::pipe::SpliceFlags::MORE,
    )
    .map_err(io::Error::from)
}

/// Tells the kernel we will read this descriptor sequentially.
pub fn advise_sequential(fd: RawFd) {
    let _ = rustix::fs::fadvise(borrow(fd), 0, 0, rustix::fs::Advice::Sequential);
}

/// Sets or clears `O_DIRECT` on the descriptor.
pub fn set_direct_io(fd: RawFd, enabled: bool) -> io::Result<()> {
    // SAFETY: fcntl F_GETFL/F_SETFL on an open descriptor.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        let desired = if enabled {
            flags | libc::O_DIRECT
        } else {
            flags & !libc::O_DIRECT
        };
        if libc::fcntl(fd, libc::F_SETFL, desired) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// True if the descriptor refers to a FIFO.
pub fn is_pipe(fd: RawFd) -> bool {
    match rustix::fs::fstat(borrow(fd)) {
        Ok(stat) => (stat.st_mode & libc::S_IFMT as u32) == libc::S_IFIFO as u32,
        Err(_) => false,
    }
}

/// Preferred I/O block size of the descriptor, if it can be determined.
pub fn block_size(fd: RawFd) -> Option<u64> {
    rustix::fs::fstat(borrow(fd))
        .ok()
        .map(|stat| stat.st_blksize as u64)
        .filter(|&size| size > 0)
}

/// Size of a regular file behind the descriptor.
pub fn file_size(fd: RawFd) -> Option<u64> {
    rustix::fs::fstat(borrow(fd))
        .ok()
        .filter(|stat| (stat.st_mode & libc::S_IFMT as u32) == libc::S_IFREG as u32)
        .map(|stat| stat.st_size as u64)
}

/// Transfer alignment required for direct I/O on either descriptor:
/// the larger of the two preferred transfer alignments, floored at the
/// page size.
pub fn transfer_alignment(input_fd: Option<RawFd>, output_fd: RawFd) -> usize {
    // SAFETY: fpathconf/sysconf are simple queries.
    unsafe {
        let page = match libc::sysconf(libc::_SC_PAGESIZE) {
            size if size > 0 => size,
            _ => 8192,
        };
        let input = input_fd.map_or(-1, |fd| libc::fpathconf(fd, libc::_PC_REC_XFER_ALIGN));
        let output = libc::fpathconf(output_fd, libc::_PC_REC_XFER_ALIGN);
        input.max(output).max(page) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::os::fd::AsRawFd;

    #[test]
    fn regular_file_is_not_a_pipe() {
        let file = tempfile::tempfile().expect("tempfile");
        assert!(!is_pipe(file.as_raw_fd()));
    }

    #[test]
    fn pipe_is_a_pipe() {
        let (reader, writer) = rustix::pipe::pipe().expect("pipe");
        assert!(is_pipe(reader.as_raw_fd()));
        assert!(is_pipe(writer.as_raw_fd()));
    }

    #[test]
    fn file_size_reports_written_length() {
        let mut file = tempfile::tempfile().expect("tempfile");
        file.write_all(b"abcdef").expect("write");
        assert_eq!(file_size(file.as_raw_fd()), Some(6));
    }

    #[test]
    fn alignment_is_at_least_a_page() {
        let file = tempfile::tempfile().expect("tempfile");
        let align = transfer_alignment(None, file.as_raw_fd());
        assert!(align >= 4096);
    }
}
