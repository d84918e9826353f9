//! Unix socket listener: bind, accept loop, shutdown.

use std::fs;
use std::future::Future;
use std::io;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::os::unix::net::{UnixListener as StdUnixListener, UnixStream as StdUnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::UnixListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::app_state::ServerState;

use super::session::Session;
use super::ListenerError;

/// Longest socket path accepted (`sun_path` is 104 bytes on the BSDs).
pub const MAX_SOCKET_PATH_BYTES: usize = 103;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// A bound listener. Nothing is accepted until [`Server::run_until`] or
/// [`Server::spawn`].
pub struct Server {
    state: ServerState,
    listener: UnixListener,
    socket: SocketFile,
}

impl Server {
    /// Bind `state.cfg().server.socket_path`.
    ///
    /// A stale socket file left by a dead server is removed; a live one, or
    /// a path that is not a socket, is refused. Must run inside a tokio
    /// runtime.
    pub fn bind(state: ServerState) -> Result<Self, ListenerError> {
        let path = state.cfg().server.socket_path.clone();
        let mode = state.cfg().server.socket_mode;

        let std_listener = bind_unix(&path, mode)?;
        let socket = SocketFile { path };
        std_listener
            .set_nonblocking(true)
            .map_err(|source| ListenerError::Runtime { source })?;
        let listener =
            UnixListener::from_std(std_listener).map_err(|source| ListenerError::Runtime { source })?;

        Ok(Self {
            state,
            listener,
            socket,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket.path
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// Serve until `shutdown` resolves, then stop accepting, remove the
    /// socket file and wait for open sessions to finish.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let (tx, rx) = watch::channel(false);
        let serve = self.serve(rx);
        tokio::pin!(serve);
        tokio::select! {
            _ = &mut serve => return,
            _ = shutdown => {}
        }
        let _ = tx.send(true);
        serve.await;
    }

    /// Serve on a background task.
    pub fn spawn(self) -> ServerHandle {
        let (tx, rx) = watch::channel(false);
        let socket_path = self.socket.path.clone();
        let task = tokio::spawn(self.serve(rx));
        ServerHandle {
            shutdown: tx,
            task,
            socket_path,
        }
    }

    async fn serve(self, mut shutdown: watch::Receiver<bool>) {
        let Server {
            state,
            listener,
            socket,
        } = self;
        info!(path = %socket.path.display(), "cmit listener active");

        let session_shutdown = shutdown.clone();
        let mut sessions = JoinSet::new();
        let mut next_sid: u64 = 0;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        next_sid += 1;
                        let session = Session::new(state.clone(), stream, next_sid)
                            .with_shutdown(session_shutdown.clone());
                        sessions.spawn(session.run());
                    }
                    Err(error) => {
                        warn!(error = %error, "socket accept error");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    log_session_exit(joined);
                }
            }
        }

        drop(listener);
        drop(socket);

        let open = sessions.len();
        if open > 0 {
            debug!(open, "waiting for sessions to finish");
            let drained = tokio::time::timeout(DRAIN_GRACE, async {
                while let Some(joined) = sessions.join_next().await {
                    log_session_exit(joined);
                }
            })
            .await;
            if drained.is_err() {
                warn!(open = sessions.len(), "aborting sessions still open after grace period");
                sessions.shutdown().await;
            }
        }
        info!("cmit listener stopped");
    }
}

fn log_session_exit(joined: Result<(), tokio::task::JoinError>) {
    if let Err(error) = joined {
        if error.is_panic() {
            warn!(error = %error, "session task panicked");
        }
    }
}

/// Handle to a server running on a background task.
#[derive(Debug)]
pub struct ServerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    socket_path: PathBuf,
}

impl ServerHandle {
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Ask the server to stop. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Wait for the server task. The socket file is gone once this returns.
    pub async fn join(self) -> Result<(), ListenerError> {
        self.task.await.map_err(|_| ListenerError::TaskPanic)
    }

    /// `shutdown` followed by `join`.
    pub async fn stop(self) -> Result<(), ListenerError> {
        self.shutdown();
        self.join().await
    }
}

/// Removes the socket path when dropped.
#[derive(Debug)]
struct SocketFile {
    path: PathBuf,
}

impl Drop for SocketFile {
    fn drop(&mut self) {
        if let Err(error) = fs::remove_file(&self.path) {
            if error.kind() != io::ErrorKind::NotFound {
                warn!(
                    error = %error,
                    path = %self.path.display(),
                    "failed to remove unix socket file"
                );
            }
        }
    }
}

/// Reject paths the kernel would truncate or that could smuggle control
/// characters into logs.
pub fn validate_socket_path(path: &Path) -> Result<(), ListenerError> {
    let invalid = |reason| ListenerError::InvalidPath {
        path: path.display().to_string(),
        reason,
    };
    let text = path.to_str().ok_or_else(|| invalid("not valid UTF-8"))?;
    if text.is_empty() {
        return Err(invalid("empty"));
    }
    if text.chars().any(char::is_control) {
        return Err(invalid("contains control characters"));
    }
    if text.len() > MAX_SOCKET_PATH_BYTES {
        return Err(invalid("too long for a unix socket address"));
    }
    Ok(())
}

fn bind_unix(path: &Path, mode: u32) -> Result<StdUnixListener, ListenerError> {
    validate_socket_path(path)?;
    let shown = || path.display().to_string();

    match fs::symlink_metadata(path) {
        Ok(metadata) => remove_stale_socket(path, &metadata)?,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(ListenerError::Metadata {
                path: shown(),
                source,
            })
        }
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ListenerError::CreateDir {
            path: parent.display().to_string(),
            source,
        })?;
    }

    let listener = StdUnixListener::bind(path).map_err(|source| ListenerError::Bind {
        path: shown(),
        source,
    })?;
    if let Err(source) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
        let _ = fs::remove_file(path);
        return Err(ListenerError::Permissions {
            path: shown(),
            source,
        });
    }
    debug!(path = %path.display(), mode = %format!("{mode:o}"), "unix socket bound");
    Ok(listener)
}

fn remove_stale_socket(path: &Path, metadata: &fs::Metadata) -> Result<(), ListenerError> {
    let shown = || path.display().to_string();
    if !metadata.file_type().is_socket() {
        return Err(ListenerError::NotSocket { path: shown() });
    }
    match StdUnixStream::connect(path) {
        Ok(_stream) => Err(ListenerError::InUse { path: shown() }),
        Err(error)
            if error.kind() == io::ErrorKind::ConnectionRefused
                || error.kind() == io::ErrorKind::NotFound =>
        {
            info!(path = %path.display(), "removing stale unix socket");
            fs::remove_file(path).map_err(|source| ListenerError::Cleanup {
                path: shown(),
                source,
            })
        }
        Err(source) => Err(ListenerError::Connect {
            path: shown(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn socket_path_checks() {
        assert!(validate_socket_path(Path::new("/tmp/cmit.sock")).is_ok());
        assert!(validate_socket_path(Path::new("")).is_err());
        assert!(validate_socket_path(Path::new("/tmp/cm\nit.sock")).is_err());
        let long = format!("/tmp/{}.sock", "x".repeat(120));
        assert!(validate_socket_path(Path::new(&long)).is_err());
    }

    #[test]
    fn refuses_regular_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("plain");
        fs::write(&path, b"not a socket").expect("write file");

        let err = bind_unix(&path, 0o600).expect_err("must refuse");
        assert!(matches!(err, ListenerError::NotSocket { .. }));
        assert!(path.exists());
    }

    #[test]
    fn cleans_stale_socket_and_applies_mode() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("stale.sock");
        {
            let _stale = StdUnixListener::bind(&path).expect("bind stale listener");
        }
        assert!(path.exists());

        let _listener = bind_unix(&path, 0o600).expect("rebind over stale socket");
        let mode = fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn refuses_live_socket() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("live.sock");
        let _live = StdUnixListener::bind(&path).expect("bind live listener");

        let err = bind_unix(&path, 0o600).expect_err("must refuse");
        assert!(matches!(err, ListenerError::InUse { .. }));
    }

    #[test]
    fn creates_missing_parent_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested/dir/cmit.sock");
        let _listener = bind_unix(&path, 0o600).expect("bind");
        assert!(path.exists());
    }
}
