//! Collision-resistant endpoint naming and socket-file cleanup.
//!
//! Every server instance listens on a freshly generated socket path so that
//! a companion process can only reach the instance that handed it the path
//! out-of-band (via stdout or an environment variable), never a fixed,
//! guessable location.

use log::{debug, warn};
use rand::Rng;
use std::path::{Path, PathBuf};

/// Default directory for generated sockets.
///
/// `$XDG_RUNTIME_DIR` when available, the system temp dir otherwise.
pub fn default_socket_dir() -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

/// Generate a fresh socket path under `dir`.
///
/// The 64-bit random nonce makes the name collision-resistant and
/// non-guessable; callers retry with a new nonce on the (unlikely) event of
/// a bind collision.
pub fn generate_socket_path(dir: &Path, prefix: &str) -> PathBuf {
    let nonce: u64 = rand::thread_rng().gen();
    dir.join(format!("{}-{:016x}.sock", prefix, nonce))
}

/// Owns a bound socket path and unlinks it on drop.
///
/// Keeping cleanup in `Drop` guarantees the socket file is removed on every
/// exit path of the server, including a start that failed after binding.
#[derive(Debug)]
pub struct SocketGuard(PathBuf);

impl SocketGuard {
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.0) {
            Ok(()) => debug!("socket file {} removed", self.0.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("failed to remove socket file {}: {}", self.0.display(), e),
        }
    }
}
