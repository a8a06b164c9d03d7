use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

use super::Credential;
use crate::error::{AuthError, AuthResult};
use crate::persist::write_atomic;

/// Persistence for the single credential this tool works with.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> AuthResult<Option<Credential>>;
    fn save(&self, credential: &Credential) -> AuthResult<()>;
    fn delete(&self) -> AuthResult<()>;
}

/// JSON file on disk, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> AuthResult<Option<Credential>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AuthError::Store(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };
        // serde_json errors carry positions only, never the offending text.
        let credential = serde_json::from_str(&content).map_err(|e| {
            AuthError::Store(format!("{} is not a valid token file: {}", self.path.display(), e))
        })?;
        Ok(Some(credential))
    }

    fn save(&self, credential: &Credential) -> AuthResult<()> {
        let json = serde_json::to_vec_pretty(credential)
            .map_err(|e| AuthError::Store(format!("failed to serialize credential: {}", e)))?;
        write_atomic(&self.path, &json).map_err(|e| {
            AuthError::Store(format!("failed to write {}: {}", self.path.display(), e))
        })?;
        debug!(path = %self.path.display(), generation = credential.generation, "credential persisted");
        Ok(())
    }

    fn delete(&self) -> AuthResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::Store(format!(
                "failed to delete {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

/// In-process store, for tests and callers that manage persistence elsewhere.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    credential: Mutex<Option<Credential>>,
    saves: AtomicUsize,
}

impl MemoryTokenStore {
    pub fn with(credential: Credential) -> Self {
        Self {
            credential: Mutex::new(Some(credential)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of successful saves so far.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> AuthResult<Option<Credential>> {
        Ok(self
            .credential
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    fn save(&self, credential: &Credential) -> AuthResult<()> {
        *self.credential.lock().unwrap_or_else(|e| e.into_inner()) = Some(credential.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self) -> AuthResult<()> {
        *self.credential.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}
