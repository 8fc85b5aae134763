//! Credential store for the FMU settings API token.
//!
//! The token is discovered in the launch URL fragment (`#token=...`) or in
//! persisted storage. Comparisons between tokens are constant-time.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use reqwest::Url;
use subtle::ConstantTimeEq;

use crate::errors::ClientError;

/// Fragment prefix carrying the token in a launch URL (`#token=...`).
pub const FRAGMENT_TOKEN_PREFIX: &str = "token=";

/// Lifecycle of the credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    NoToken,
    PresentUnverified,
    Valid,
    Invalid,
}

/// Persistence backend for the credential.
pub trait TokenStorage: Send + Sync {
    fn load(&self) -> Result<Option<String>, ClientError>;
    fn save(&self, token: &str) -> Result<(), ClientError>;
    fn clear(&self) -> Result<(), ClientError>;
}

/// Stores the token in a single file.
#[derive(Debug, Clone)]
pub struct FileTokenStorage {
    path: PathBuf,
}

impl FileTokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TokenStorage for FileTokenStorage {
    fn load(&self) -> Result<Option<String>, ClientError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, token: &str) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, token)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keeps the token in memory only.
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStorage {
    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_string())),
        }
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn load(&self) -> Result<Option<String>, ClientError> {
        Ok(self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, token: &str) -> Result<(), ClientError> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

#[derive(Debug)]
struct TokenState {
    credential: String,
    status: TokenStatus,
}

/// Process-wide holder of the credential and its status.
#[derive(Clone)]
pub struct TokenStore {
    state: Arc<RwLock<TokenState>>,
    storage: Arc<dyn TokenStorage>,
}

impl TokenStore {
    /// Create an empty store backed by `storage`.
    pub fn new(storage: Arc<dyn TokenStorage>) -> Self {
        Self {
            state: Arc::new(RwLock::new(TokenState {
                credential: String::new(),
                status: TokenStatus::NoToken,
            })),
            storage,
        }
    }

    /// Discover the credential at startup.
    ///
    /// A token in the launch URL fragment wins over persisted storage; it is
    /// persisted and erased from `launch_url`.
    pub fn load(
        storage: Arc<dyn TokenStorage>,
        launch_url: Option<&mut Url>,
    ) -> Result<Self, ClientError> {
        let store = Self::new(storage);

        let fragment_token = launch_url.and_then(take_fragment_token);
        let token = match fragment_token {
            Some(token) => {
                tracing::info!("Using API token from launch URL fragment");
                store.storage.save(&token)?;
                Some(token)
            }
            None => store.storage.load()?,
        };

        if let Some(token) = token {
            let mut state = store.write();
            state.credential = token;
            state.status = TokenStatus::PresentUnverified;
        }

        Ok(store)
    }

    pub fn credential(&self) -> String {
        self.read().credential.clone()
    }

    pub fn status(&self) -> TokenStatus {
        self.read().status
    }

    pub fn has_credential(&self) -> bool {
        !self.read().credential.is_empty()
    }

    /// Replace the credential and persist it.
    ///
    /// Returns `false` when the new token equals the current one. An empty
    /// token clears the store.
    pub fn set(&self, token: &str) -> Result<bool, ClientError> {
        if token.is_empty() {
            let had_token = self.has_credential();
            self.clear()?;
            return Ok(had_token);
        }

        {
            let state = self.read();
            if constant_time_compare(&state.credential, token) {
                return Ok(false);
            }
        }

        self.storage.save(token)?;
        let mut state = self.write();
        state.credential = token.to_string();
        state.status = TokenStatus::PresentUnverified;
        Ok(true)
    }

    /// Record a successful session-scoped response. Returns true on transition.
    pub fn mark_valid(&self) -> bool {
        let mut state = self.write();
        if state.status == TokenStatus::PresentUnverified {
            state.status = TokenStatus::Valid;
            true
        } else {
            false
        }
    }

    /// The server rejected the credential: drop it everywhere.
    pub fn invalidate(&self) -> Result<(), ClientError> {
        {
            let mut state = self.write();
            state.status = TokenStatus::Invalid;
        }
        tracing::warn!("API token rejected by the server, clearing it");
        self.clear()
    }

    fn clear(&self) -> Result<(), ClientError> {
        {
            let mut state = self.write();
            state.credential.clear();
            state.status = TokenStatus::NoToken;
        }
        self.storage.clear()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, TokenState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, TokenState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("has_credential", &self.has_credential())
            .field("status", &self.status())
            .finish()
    }
}

/// Read the token from a `#token=...` fragment.
pub fn token_from_fragment(url: &Url) -> Option<String> {
    url.fragment()
        .and_then(|fragment| fragment.strip_prefix(FRAGMENT_TOKEN_PREFIX))
        .filter(|token| !token.is_empty())
        .map(|token| token.to_string())
}

/// Read the fragment token and erase the fragment from the URL.
pub fn take_fragment_token(url: &mut Url) -> Option<String> {
    let token = token_from_fragment(url)?;
    url.set_fragment(None);
    Some(token)
}

/// Perform constant-time string comparison.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    // Constant-time comparison
    a_bytes.ct_eq(b_bytes).into()
}
