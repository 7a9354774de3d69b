//! Blocking read side of the capture pipe.
//!
//! Thin wrappers over `poll(2)` / `read(2)` so the reader thread can wait
//! with a timeout and tell transient conditions (`EINTR`, `EAGAIN`) apart
//! from hard failures.

use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::time::Duration;

use tracing::{debug, info};

use crate::CaptureError;

/// Path that selects the process's standard input.
pub const STDIN_PATH: &str = "-";

/// Pipe capacity requested when the system maximum is unreadable.
const DEFAULT_PIPE_SIZE: libc::c_int = 1024 * 1024;
const PIPE_MAX_SIZE_PATH: &str = "/proc/sys/fs/pipe-max-size";

// ── Readiness / read outcomes ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readiness {
    Readable,
    TimedOut,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameRead {
    /// The buffer was filled completely.
    Complete,
    /// The writer closed the pipe part-way through a frame.
    Incomplete { bytes: usize },
    /// The writer closed the pipe on a frame boundary.
    EndOfStream,
}

// ── InputPipe ─────────────────────────────────────────────────────────────────

enum Descriptor {
    /// fd 0, borrowed from the process and never closed.
    Stdin,
    Owned(OwnedFd),
}

/// Read end of a capture pipe. Closing happens on drop, except for stdin.
pub struct InputPipe {
    path: String,
    fd: Descriptor,
}

impl InputPipe {
    /// Open `path` read-only (`"-"` is stdin).
    ///
    /// Opening a FIFO blocks until a writer shows up. If the descriptor is a
    /// FIFO its kernel buffer is raised towards the system maximum.
    pub fn open(path: &str) -> Result<Self, CaptureError> {
        let fd = if path == STDIN_PATH {
            Descriptor::Stdin
        } else {
            let file = File::open(path).map_err(|source| {
                info!("error in opening {}: {}", path, source);
                CaptureError::Open { path: path.to_owned(), source }
            })?;
            Descriptor::Owned(OwnedFd::from(file))
        };

        let pipe = Self { path: path.to_owned(), fd };
        if pipe.is_fifo() {
            pipe.grow_buffer();
        }
        Ok(pipe)
    }

    #[cfg(test)]
    pub(crate) fn from_owned_fd(fd: OwnedFd) -> Self {
        Self { path: "<test>".to_owned(), fd: Descriptor::Owned(fd) }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_stdin(&self) -> bool {
        matches!(self.fd, Descriptor::Stdin)
    }

    pub fn is_fifo(&self) -> bool {
        // SAFETY: `stat` is plain old data and `fstat` only writes into it.
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        let ret = unsafe { libc::fstat(self.as_raw_fd(), &mut st) };
        ret == 0 && (st.st_mode & libc::S_IFMT) == libc::S_IFIFO
    }

    #[cfg(target_os = "linux")]
    fn grow_buffer(&self) {
        let size = pipe_max_size();
        // SAFETY: F_SETPIPE_SZ takes an int argument and touches no memory.
        let ret = unsafe { libc::fcntl(self.as_raw_fd(), libc::F_SETPIPE_SZ, size) };
        if ret < 0 {
            debug!(
                "F_SETPIPE_SZ({}) on {} failed: {}",
                size,
                self.path,
                io::Error::last_os_error()
            );
        } else {
            debug!("Pipe {} capacity set to {} bytes", self.path, ret);
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn grow_buffer(&self) {}

    /// Wait up to `timeout` for the descriptor to become readable.
    ///
    /// Hang-up and error conditions count as readable so the following read
    /// observes them.
    pub(crate) fn wait_readable(&self, timeout: Duration) -> io::Result<Readiness> {
        let mut pfd = libc::pollfd { fd: self.as_raw_fd(), events: libc::POLLIN, revents: 0 };
        let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

        // SAFETY: `pfd` is a single valid pollfd for the duration of the call.
        let ret = unsafe { libc::poll(&mut pfd, 1, millis) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::Interrupted => Ok(Readiness::Interrupted),
                _ => Err(err),
            };
        }
        if ret == 0 {
            return Ok(Readiness::TimedOut);
        }
        if pfd.revents & libc::POLLNVAL != 0 {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }
        if pfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0 {
            Ok(Readiness::Readable)
        } else {
            Ok(Readiness::TimedOut)
        }
    }

    /// Fill `buf` completely, accumulating short reads.
    ///
    /// `EAGAIN` / `EINTR` are retried; any other error is returned as-is.
    pub(crate) fn read_frame(&self, buf: &mut [u8]) -> io::Result<FrameRead> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read_some(&mut buf[filled..]) {
                Ok(0) if filled > 0 => return Ok(FrameRead::Incomplete { bytes: filled }),
                Ok(0) => return Ok(FrameRead::EndOfStream),
                Ok(n) => filled += n,
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    ) =>
                {
                    continue
                }
                Err(err) => return Err(err),
            }
        }
        Ok(FrameRead::Complete)
    }

    fn read_some(&self, buf: &mut [u8]) -> io::Result<usize> {
        // SAFETY: `buf` is a valid writable region of `buf.len()` bytes.
        let ret = unsafe { libc::read(self.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
        if ret < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(ret as usize)
        }
    }
}

impl AsRawFd for InputPipe {
    fn as_raw_fd(&self) -> RawFd {
        match &self.fd {
            Descriptor::Stdin => libc::STDIN_FILENO,
            Descriptor::Owned(fd) => fd.as_raw_fd(),
        }
    }
}

impl std::fmt::Debug for InputPipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputPipe")
            .field("path", &self.path)
            .field("fd", &self.as_raw_fd())
            .finish()
    }
}

fn pipe_max_size() -> libc::c_int {
    std::fs::read_to_string(PIPE_MAX_SIZE_PATH)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(DEFAULT_PIPE_SIZE)
}
