//! FMU Settings Client
//!
//! Client-side core of the FMU settings front-end: credential and session
//! handling with a single authorization retry, project lock expiry tracking,
//! and snapshot history with diff and restore.

pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
pub mod history;
pub mod lock;
pub mod models;
pub mod notify;
pub mod query;
pub mod session;

use std::sync::Arc;

use reqwest::Url;

use api::ApiClient;
use auth::{FileTokenStorage, TokenStore};
use config::Config;
use errors::ClientError;
use history::HistoryViewer;
use lock::LockMonitor;
use notify::Notifier;
use query::QueryCache;
use session::SessionContext;

/// Application state shared across all components.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub api: ApiClient,
    pub queries: QueryCache,
    pub session: Arc<SessionContext>,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    /// Wire the components around an already loaded token store.
    ///
    /// The session interceptor is installed if the store holds a credential.
    pub fn new(
        config: Config,
        tokens: TokenStore,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ClientError> {
        let api = ApiClient::new(&config, tokens)?;
        let queries = QueryCache::new();
        let session = Arc::new(SessionContext::new(
            api.clone(),
            queries.clone(),
            Arc::clone(&notifier),
        ));
        session.install();

        Ok(Self {
            config: Arc::new(config),
            api,
            queries,
            session,
            notifier,
        })
    }

    /// Load the credential from the launch URL or the token file, then wire up.
    pub fn from_config(config: Config, notifier: Arc<dyn Notifier>) -> Result<Self, ClientError> {
        let mut launch_url = match config.launch_url.as_deref() {
            Some(url) => Some(
                Url::parse(url)
                    .map_err(|e| ClientError::InvalidState(format!("Invalid launch URL: {}", e)))?,
            ),
            None => None,
        };

        let storage = Arc::new(FileTokenStorage::new(config.token_path.clone()));
        let tokens = TokenStore::load(storage, launch_url.as_mut())?;
        if let Some(url) = &launch_url {
            tracing::debug!("Launch URL after token extraction: {}", url);
        }

        Self::new(config, tokens, notifier)
    }

    pub fn lock_monitor(&self) -> LockMonitor {
        LockMonitor::new(
            &self.config,
            self.api.clone(),
            Arc::clone(&self.session),
            self.queries.clone(),
            Arc::clone(&self.notifier),
        )
    }

    pub fn history_viewer(&self) -> HistoryViewer {
        HistoryViewer::new(
            self.api.clone(),
            Arc::clone(&self.session),
            self.queries.clone(),
            Arc::clone(&self.notifier),
        )
    }
}
