use crate::config::SftpTarget;
use crate::error::RemoteError;
use crate::services::remote::RemoteEndpoint;
use async_trait::async_trait;
use ssh2::{ErrorCode, Session, Sftp};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

// libssh2 SFTP status codes
const SFTP_NO_SUCH_FILE: i32 = 2;
const SFTP_NO_SUCH_PATH: i32 = 10;
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;

/// Blocking-call limit on the SSH session when no operation timeout is configured.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(300);

struct Connection {
    session: Session,
    sftp: Sftp,
}

/// SFTP endpoint over a single blocking libssh2 session. Every call runs on
/// the blocking thread pool.
pub struct SftpRemote {
    inner: Arc<Mutex<Option<Connection>>>,
}

impl SftpRemote {
    /// Opens the session. Every blocking libssh2 call on it fails with a
    /// disconnect once it has waited `timeout`.
    pub async fn connect(target: &SftpTarget, timeout: Duration) -> Result<Self, RemoteError> {
        let target = target.clone();
        let connection = tokio::task::spawn_blocking(move || open(&target, timeout))
            .await
            .map_err(|e| RemoteError::Disconnected(format!("connect task failed: {}", e)))??;
        Ok(Self {
            inner: Arc::new(Mutex::new(Some(connection))),
        })
    }

    async fn with_sftp<T, F>(&self, op: F) -> Result<T, RemoteError>
    where
        F: FnOnce(&Sftp) -> Result<T, RemoteError> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let guard = inner
                .lock()
                .map_err(|_| RemoteError::Disconnected("session lock poisoned".to_string()))?;
            let connection = guard
                .as_ref()
                .ok_or_else(|| RemoteError::Disconnected("connection closed".to_string()))?;
            op(&connection.sftp)
        })
        .await
        .map_err(|e| RemoteError::Disconnected(format!("sftp task failed: {}", e)))?
    }
}

fn open(target: &SftpTarget, timeout: Duration) -> Result<Connection, RemoteError> {
    let addr = format!("{}:{}", target.host, target.port);
    let tcp = TcpStream::connect(&addr)
        .map_err(|e| RemoteError::Disconnected(format!("TCP connect to {} failed: {}", addr, e)))?;

    let mut session = Session::new().map_err(classify)?;
    session.set_tcp_stream(tcp);
    session.set_timeout(session_timeout_ms(timeout));
    session
        .handshake()
        .map_err(|e| RemoteError::Disconnected(format!("SSH handshake with {} failed: {}", addr, e)))?;

    let mut auth_errors = Vec::new();
    if let Some(key) = target.private_key.as_deref().filter(|k| !k.is_empty()) {
        if let Err(e) = session.userauth_pubkey_file(
            &target.username,
            None,
            Path::new(key),
            target.private_key_pass.as_deref(),
        ) {
            auth_errors.push(format!("key {}: {}", key, e));
        }
    }
    if !session.authenticated() {
        if let Some(password) = target.password.as_deref().filter(|p| !p.is_empty()) {
            if let Err(e) = session.userauth_password(&target.username, password) {
                auth_errors.push(format!("password: {}", e));
            }
        }
    }
    if !session.authenticated() {
        return Err(RemoteError::Auth(format!(
            "{}@{}: {}",
            target.username,
            addr,
            auth_errors.join("; ")
        )));
    }

    let sftp = session.sftp().map_err(classify)?;
    info!("🔐 SFTP Connection: {}@{}", target.username, addr);
    Ok(Connection { session, sftp })
}

/// SFTP status codes are per-operation failures; libssh2 session codes mean
/// the transport itself is gone.
fn classify(err: ssh2::Error) -> RemoteError {
    match err.code() {
        ErrorCode::SFTP(SFTP_NO_SUCH_FILE) | ErrorCode::SFTP(SFTP_NO_SUCH_PATH) => {
            RemoteError::NotFound(err.message().to_string())
        }
        ErrorCode::SFTP(_) => RemoteError::Operation(err.message().to_string()),
        ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT) => {
            RemoteError::Disconnected(format!("timed out: {}", err.message()))
        }
        ErrorCode::Session(_) => RemoteError::Disconnected(err.message().to_string()),
    }
}

/// Writes go through `std::io`, where libssh2 timeouts surface as `TimedOut`.
fn classify_write(remote: &str, err: std::io::Error) -> RemoteError {
    if err.kind() == std::io::ErrorKind::TimedOut {
        RemoteError::Disconnected(format!("writing {} timed out: {}", remote, err))
    } else {
        RemoteError::Operation(format!("writing {} failed: {}", remote, err))
    }
}

/// libssh2 treats 0 as "no timeout", so the value is kept at 1ms or more.
fn session_timeout_ms(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX).max(1)
}

#[async_trait]
impl RemoteEndpoint for SftpRemote {
    async fn exists(&self, path: &str) -> Result<bool, RemoteError> {
        let path = PathBuf::from(path);
        self.with_sftp(move |sftp| match sftp.stat(&path) {
            Ok(_) => Ok(true),
            Err(e) => match classify(e) {
                RemoteError::NotFound(_) => Ok(false),
                other => Err(other),
            },
        })
        .await
    }

    async fn mkdir(&self, path: &str) -> Result<(), RemoteError> {
        let path = PathBuf::from(path);
        self.with_sftp(move |sftp| sftp.mkdir(&path, 0o755).map_err(classify))
            .await
    }

    async fn chdir(&self, path: &str) -> Result<(), RemoteError> {
        let path = PathBuf::from(path);
        self.with_sftp(move |sftp| {
            let stat = sftp.stat(&path).map_err(classify)?;
            if stat.is_dir() {
                Ok(())
            } else {
                Err(RemoteError::Operation(format!(
                    "{} is not a directory",
                    path.display()
                )))
            }
        })
        .await
    }

    async fn put(&self, local: &Path, remote: &str, confirm: bool) -> Result<u64, RemoteError> {
        let local = local.to_path_buf();
        let remote = remote.to_string();
        self.with_sftp(move |sftp| {
            let mut source = std::fs::File::open(&local)?;
            let expected = source.metadata()?.len();

            let mut destination = sftp.create(Path::new(&remote)).map_err(classify)?;
            std::io::copy(&mut source, &mut destination)
                .map_err(|e| classify_write(&remote, e))?;
            drop(destination);

            if confirm {
                let stat = sftp.stat(Path::new(&remote)).map_err(classify)?;
                let actual = stat.size.unwrap_or(0);
                if actual != expected {
                    return Err(RemoteError::Unconfirmed {
                        path: remote,
                        expected,
                        actual,
                    });
                }
                debug!("Confirmed {} ({} bytes)", remote, actual);
            }
            Ok(expected)
        })
        .await
    }

    async fn close(&self) -> Result<(), RemoteError> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut guard = inner
                .lock()
                .map_err(|_| RemoteError::Disconnected("session lock poisoned".to_string()))?;
            let Some(connection) = guard.take() else {
                return Err(RemoteError::Disconnected("already closed".to_string()));
            };
            let Connection { session, sftp } = connection;
            drop(sftp);
            if let Err(e) = session.disconnect(None, "worker shutting down", None) {
                warn!("SSH disconnect failed: {}", e);
            }
            Ok(())
        })
        .await
        .map_err(|e| RemoteError::Disconnected(format!("close task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_sftp_status() {
        let missing = classify(ssh2::Error::new(ErrorCode::SFTP(SFTP_NO_SUCH_FILE), "no such file"));
        assert!(matches!(missing, RemoteError::NotFound(_)));

        let denied = classify(ssh2::Error::new(ErrorCode::SFTP(3), "permission denied"));
        assert!(matches!(denied, RemoteError::Operation(_)));
        assert!(!denied.is_disconnect());
    }

    #[test]
    fn test_session_timeout_is_a_disconnect() {
        let err = classify(ssh2::Error::new(
            ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT),
            "Timed out waiting on socket",
        ));
        assert!(err.is_disconnect());

        let stalled = classify_write(
            "/upload/a.bin",
            std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out"),
        );
        assert!(stalled.is_disconnect());

        let refused = classify_write(
            "/upload/a.bin",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!refused.is_disconnect());
    }

    #[test]
    fn test_session_timeout_ms() {
        assert_eq!(session_timeout_ms(Duration::from_secs(30)), 30_000);
        assert_eq!(session_timeout_ms(Duration::ZERO), 1);
        assert_eq!(session_timeout_ms(Duration::from_secs(u64::MAX)), u32::MAX);
    }
}
