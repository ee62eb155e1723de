//! Wakeup signal built on the self-pipe trick.
//!
//! Workers write one byte per completed task. The thread owning the executor
//! registers the read end with its own readiness mechanism (`poll(2)`,
//! `select(2)`, an fd-based event loop) and takes one byte per completion it
//! dispatches. Both ends are non-blocking so neither side can ever stall on
//! the pipe itself.

use std::io;
use std::os::unix::io::{IntoRawFd, RawFd};
use std::thread;
use std::time::Duration;

/// Create a connected wakeup pair with both endpoints non-blocking.
///
/// `retry_limit` and `retry_delay` bound the writer's back-off loop when the
/// pipe is momentarily full.
pub(crate) fn pair(
    retry_limit: u32,
    retry_delay: Duration,
) -> io::Result<(WakeupReader, WakeupWriter)> {
    let (read, write) = os_pipe::pipe()?;
    let reader = WakeupReader {
        fd: read.into_raw_fd(),
    };
    let writer = WakeupWriter {
        fd: write.into_raw_fd(),
        retry_limit,
        retry_delay,
    };
    set_nonblocking(reader.fd)?;
    set_nonblocking(writer.fd)?;
    Ok((reader, writer))
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Read end of the wakeup pair. Owned by the executor's thread.
pub(crate) struct WakeupReader {
    fd: RawFd,
}

impl WakeupReader {
    /// The fd a readiness-based event loop registers for reading.
    pub(crate) fn read_fd(&self) -> RawFd {
        self.fd
    }

    /// Consume one pending wakeup byte without blocking.
    ///
    /// Returns `Ok(true)` if a byte was taken, `Ok(false)` if none was
    /// pending or the write side is already gone.
    pub(crate) fn try_take(&self) -> io::Result<bool> {
        let mut buf = [0u8; 1];
        loop {
            let n = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut _, 1) };
            if n == 1 {
                return Ok(true);
            }
            if n == 0 {
                // Write side closed; nothing can arrive any more.
                return Ok(false);
            }
            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::WouldBlock => return Ok(false),
                io::ErrorKind::Interrupted => continue,
                _ => return Err(err),
            }
        }
    }
}

impl Drop for WakeupReader {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

/// Write end of the wakeup pair. Shared by all workers.
pub(crate) struct WakeupWriter {
    fd: RawFd,
    retry_limit: u32,
    retry_delay: Duration,
}

impl WakeupWriter {
    /// Queue exactly one wakeup byte.
    ///
    /// A full pipe means the reader already has a long backlog of unconsumed
    /// wakeups, so after `retry_limit` attempts the byte is surrendered: the
    /// fd is readable either way and the reader re-checks readability after
    /// every completion it dispatches.
    pub(crate) fn notify(&self) {
        let buf = [1u8];
        let mut attempts = 0;
        loop {
            let n = unsafe { libc::write(self.fd, buf.as_ptr() as *const _, 1) };
            if n == 1 {
                return;
            }
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                if err.kind() != io::ErrorKind::WouldBlock {
                    log::error!("wakeup pipe write failed: {}", err);
                    return;
                }
            }
            // Zero-byte write or a full pipe: back off briefly and retry.
            attempts += 1;
            if attempts > self.retry_limit {
                log::warn!(
                    "wakeup pipe still unwritable after {} retries; dropping the byte",
                    self.retry_limit
                );
                return;
            }
            thread::sleep(self.retry_delay);
        }
    }
}

impl Drop for WakeupWriter {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}
