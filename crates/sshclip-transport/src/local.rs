//! The local endpoint (spec §6): a Unix domain socket that short-lived CLI
//! clients connect to, served by the listen loop (C7) on the agent side.
//!
//! Unlike the remote [`crate::tcp`] transport, this endpoint carries no
//! multiplexing or out-of-band channel — it is a single plain byte stream
//! per connection, read directly by the request handler.

use std::path::{Path, PathBuf};

use tokio::net::{UnixListener, UnixStream};

use crate::error::TransportError;

/// A bound local Unix-domain-socket listener.
pub struct LocalListener {
    listener: UnixListener,
    path: PathBuf,
}

impl LocalListener {
    /// Bind a listener at `path`, unlinking any stale socket left behind by
    /// a previous, uncleanly terminated process.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] if the stale socket cannot be
    /// removed or the bind fails.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let path = path.as_ref().to_path_buf();
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(TransportError::Network(err)),
        }
        let listener = UnixListener::bind(&path)?;
        Ok(Self { listener, path })
    }

    /// The socket path this listener is bound to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept one client connection.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] on accept failure.
    pub async fn accept(&self) -> Result<UnixStream, TransportError> {
        let (stream, _addr) = self.listener.accept().await?;
        Ok(stream)
    }
}

impl Drop for LocalListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Connect to a local endpoint, optionally bounded by a dial timeout (the
/// only timeout the core honors — spec §5).
///
/// # Errors
///
/// Returns [`TransportError::Network`] on connection failure, or if
/// `timeout` elapses first.
pub async fn connect(
    path: impl AsRef<Path>,
    timeout: Option<std::time::Duration>,
) -> Result<UnixStream, TransportError> {
    let connect = UnixStream::connect(path.as_ref());
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| {
                TransportError::Network(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "local dial timed out",
                ))
            })?
            .map_err(TransportError::from),
        None => connect.await.map_err(TransportError::from),
    }
}
