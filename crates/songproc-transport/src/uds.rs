use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::IpcStream;

/// Filesystem Unix domain socket used by the worker to accept its supervisor.
///
/// The socket file is owned by the listener: a stale socket left behind by a
/// crashed worker is replaced on bind, and the file is removed on drop as long
/// as it is still the one this listener created.
pub struct UnixDomainSocket {
    listener: UnixListener,
    path: PathBuf,
    identity: Option<(u64, u64)>,
}

impl UnixDomainSocket {
    /// Permission mode applied to freshly bound socket files.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;

    /// `sockaddr_un.sun_path` capacity, including the trailing NUL.
    #[cfg(target_os = "linux")]
    pub const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    pub const MAX_PATH_LEN: usize = 104;

    /// Reject paths that cannot be stored in `sockaddr_un`.
    pub fn check_path(path: &Path) -> Result<()> {
        let len = path.as_os_str().len();
        if len >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path: path.to_path_buf(),
                len,
                max: Self::MAX_PATH_LEN,
            });
        }
        Ok(())
    }

    /// Bind and listen at `path` with [`DEFAULT_SOCKET_MODE`](Self::DEFAULT_SOCKET_MODE).
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, Self::DEFAULT_SOCKET_MODE)
    }

    /// Bind and listen at `path` with an explicit permission mode.
    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        Self::check_path(&path)?;

        let bind_err = |source: std::io::Error| TransportError::Bind {
            path: path.clone(),
            source,
        };

        if let Ok(metadata) = std::fs::symlink_metadata(&path) {
            if !metadata.file_type().is_socket() {
                return Err(bind_err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                )));
            }
            debug!(?path, "removing stale worker socket");
            std::fs::remove_file(&path).map_err(bind_err)?;
        }

        let listener = UnixListener::bind(&path).map_err(bind_err)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).map_err(bind_err)?;
        let created = std::fs::symlink_metadata(&path).map_err(bind_err)?;

        info!(?path, "worker socket listening");

        Ok(Self {
            listener,
            identity: Some((created.dev(), created.ino())),
            path,
        })
    }

    /// Block until the next client connects.
    pub fn accept(&self) -> Result<IpcStream> {
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(path = ?self.path, "accepted worker connection");
        Ok(IpcStream::from_unix(stream))
    }

    /// Connect to a listening socket at `path`.
    pub fn connect(path: impl AsRef<Path>) -> Result<IpcStream> {
        let path = path.as_ref();
        Self::check_path(path)?;
        let stream = UnixStream::connect(path).map_err(|source| TransportError::Connect {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(?path, "connected to worker socket");
        Ok(IpcStream::from_unix(stream))
    }

    /// Path of the bound socket file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UnixDomainSocket {
    fn drop(&mut self) {
        let Some((dev, ino)) = self.identity else {
            return;
        };
        match std::fs::symlink_metadata(&self.path) {
            Ok(metadata)
                if metadata.file_type().is_socket()
                    && metadata.dev() == dev
                    && metadata.ino() == ino =>
            {
                debug!(path = ?self.path, "removing worker socket");
                let _ = std::fs::remove_file(&self.path);
            }
            Ok(_) => debug!(path = ?self.path, "socket path replaced; leaving it alone"),
            Err(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!(
            "/tmp/sp-uds-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("scratch dir should be creatable");
        dir
    }

    #[test]
    fn bind_accept_connect_exchange_bytes() {
        let dir = scratch_dir("xchg");
        let sock_path = dir.join("w.sock");
        let listener = UnixDomainSocket::bind(&sock_path).unwrap();

        let client_path = sock_path.clone();
        let client = std::thread::spawn(move || {
            let mut stream = UnixDomainSocket::connect(&client_path).unwrap();
            stream.write_all(b"song").unwrap();
        });

        let mut server = listener.accept().unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"song");
        client.join().unwrap();

        drop(listener);
        assert!(!sock_path.exists(), "socket file should be removed on drop");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn connect_without_listener_is_connect_error() {
        let dir = scratch_dir("nolisten");
        let result = UnixDomainSocket::connect(dir.join("absent.sock"));
        assert!(matches!(result, Err(TransportError::Connect { .. })));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn overlong_path_rejected_for_bind_and_connect() {
        let long_path = PathBuf::from(format!("/tmp/{}.sock", "x".repeat(200)));
        assert!(matches!(
            UnixDomainSocket::bind(&long_path),
            Err(TransportError::PathTooLong { .. })
        ));
        assert!(matches!(
            UnixDomainSocket::connect(&long_path),
            Err(TransportError::PathTooLong { .. })
        ));
    }

    #[test]
    fn socket_mode_is_owner_only() {
        let dir = scratch_dir("mode");
        let sock_path = dir.join("m.sock");
        let listener = UnixDomainSocket::bind(&sock_path).unwrap();
        let mode = std::fs::metadata(&sock_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn stale_socket_is_replaced() {
        let dir = scratch_dir("stale");
        let sock_path = dir.join("s.sock");
        let first = UnixDomainSocket::bind(&sock_path).unwrap();
        // Simulate a crashed worker: the file stays behind.
        std::mem::forget(first);

        let second = UnixDomainSocket::bind(&sock_path);
        assert!(second.is_ok());
        drop(second);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn regular_file_is_never_removed() {
        let dir = scratch_dir("regular");
        let sock_path = dir.join("r.sock");
        std::fs::write(&sock_path, b"not a socket").unwrap();

        let result = UnixDomainSocket::bind(&sock_path);
        assert!(matches!(result, Err(TransportError::Bind { .. })));
        assert!(sock_path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn drop_skips_replaced_path() {
        let dir = scratch_dir("replaced");
        let sock_path = dir.join("d.sock");
        let listener = UnixDomainSocket::bind(&sock_path).unwrap();

        std::fs::remove_file(&sock_path).unwrap();
        std::fs::write(&sock_path, b"someone else").unwrap();

        drop(listener);
        assert!(sock_path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn peer_pid_reports_own_process() {
        let dir = scratch_dir("pid");
        let sock_path = dir.join("p.sock");
        let listener = UnixDomainSocket::bind(&sock_path).unwrap();

        let client_path = sock_path.clone();
        let client = std::thread::spawn(move || UnixDomainSocket::connect(&client_path).unwrap());
        let server = listener.accept().unwrap();
        let _client = client.join().unwrap();

        assert_eq!(server.peer_pid(), Some(std::process::id()));
        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
