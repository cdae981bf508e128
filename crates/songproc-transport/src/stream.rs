use std::io::{Read, Write};
use std::net::Shutdown;
use std::time::Duration;

use crate::error::Result;

/// A connected local stream between the supervisor and the worker.
///
/// Reads and writes block unless a timeout has been set with
/// [`set_read_timeout`](Self::set_read_timeout) or
/// [`set_write_timeout`](Self::set_write_timeout).
pub struct IpcStream {
    inner: StreamInner,
}

enum StreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    #[cfg(not(unix))]
    Unsupported(std::convert::Infallible),
}

impl Read for IpcStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.read(buf),
            #[cfg(not(unix))]
            StreamInner::Unsupported(never) => match *never {},
        }
    }
}

impl Write for IpcStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.write(buf),
            #[cfg(not(unix))]
            StreamInner::Unsupported(never) => match *never {},
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.flush(),
            #[cfg(not(unix))]
            StreamInner::Unsupported(never) => match *never {},
        }
    }
}

impl IpcStream {
    #[cfg(unix)]
    pub(crate) fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: StreamInner::Unix(stream),
        }
    }

    /// Bound every blocking read. `None` blocks indefinitely.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(not(unix))]
            StreamInner::Unsupported(never) => match *never {},
        }
    }

    /// Bound every blocking write. `None` blocks indefinitely.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            #[cfg(not(unix))]
            StreamInner::Unsupported(never) => match *never {},
        }
    }

    /// Duplicate the handle so reading and writing can be owned separately.
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            #[cfg(unix)]
            StreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
            #[cfg(not(unix))]
            StreamInner::Unsupported(never) => match *never {},
        }
    }

    /// Close both halves of the stream. Errors from an already-closed peer are ignored.
    pub fn close(&self) {
        match &self.inner {
            #[cfg(unix)]
            StreamInner::Unix(stream) => {
                let _ = stream.shutdown(Shutdown::Both);
            }
            #[cfg(not(unix))]
            StreamInner::Unsupported(never) => match *never {},
        }
    }

    /// Process id of the connected peer, when the platform exposes it.
    #[cfg(target_os = "linux")]
    pub fn peer_pid(&self) -> Option<u32> {
        use std::os::fd::AsRawFd;

        let fd = match &self.inner {
            StreamInner::Unix(stream) => stream.as_raw_fd(),
        };

        let mut cred = libc::ucred {
            pid: 0,
            uid: 0,
            gid: 0,
        };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

        // SAFETY: `cred` and `len` are valid writable pointers sized for `ucred`,
        // and `fd` is an open Unix socket owned by this stream.
        let rc = unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                (&mut cred as *mut libc::ucred).cast::<libc::c_void>(),
                &mut len,
            )
        };

        if rc == 0 && len as usize == std::mem::size_of::<libc::ucred>() && cred.pid > 0 {
            Some(cred.pid as u32)
        } else {
            None
        }
    }

    /// Process id of the connected peer, when the platform exposes it.
    #[cfg(not(target_os = "linux"))]
    pub fn peer_pid(&self) -> Option<u32> {
        None
    }
}

impl std::fmt::Debug for IpcStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            #[cfg(unix)]
            StreamInner::Unix(_) => f.debug_struct("IpcStream").field("kind", &"unix").finish(),
            #[cfg(not(unix))]
            StreamInner::Unsupported(never) => match *never {},
        }
    }
}
