//! Session context: owns the session interceptor for the current credential.
//!
//! The interceptor is only registered while a non-empty credential exists.
//! On a 401 from a resource endpoint it recreates the server-side session
//! once, so the caller's single retry can succeed. On a 401 from a session
//! endpoint the credential itself is bad and is dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use async_trait::async_trait;

use crate::api::{paths, ApiClient, ApiRequest, InterceptorGuard, ResponseContext, ResponseInterceptor, Transport};
use crate::auth::{TokenStatus, TokenStore};
use crate::errors::ClientError;
use crate::models::{AccessToken, Message};
use crate::notify::{self, Notifier};
use crate::query::QueryCache;

pub const SESSION_ERROR_PREFIX: &str = "Error creating session";
pub const ACCESS_TOKEN_ERROR_PREFIX: &str = "Error adding access token to session";

type RegistrationSlot = Mutex<Option<InterceptorGuard>>;

fn release(slot: &RegistrationSlot) {
    let guard = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    if guard.is_some() {
        tracing::info!("Session interceptor uninstalled");
    }
}

struct SessionInterceptor {
    transport: Transport,
    tokens: TokenStore,
    notifier: Arc<dyn Notifier>,
    registration: Weak<RegistrationSlot>,
}

impl SessionInterceptor {
    fn drop_credential(&self) {
        if let Err(e) = self.tokens.invalidate() {
            tracing::warn!("Failed to clear stored API token: {}", e);
        }
        if let Some(slot) = self.registration.upgrade() {
            release(&slot);
        }
    }

    async fn recreate_session(&self) {
        match self
            .transport
            .call::<Message>(&ApiRequest::post(paths::SESSION))
            .await
        {
            Ok(_) => {
                self.tokens.mark_valid();
                tracing::info!("Session recreated");
            }
            Err(error) => {
                if error.is_unauthorized() {
                    self.drop_credential();
                }
                notify::report_error(self.notifier.as_ref(), SESSION_ERROR_PREFIX, &error);
            }
        }
    }
}

#[async_trait]
impl ResponseInterceptor for SessionInterceptor {
    async fn on_fulfilled(&self, ctx: &ResponseContext) {
        if paths::is_session(ctx.path) && self.tokens.mark_valid() {
            tracing::info!("API token verified");
        }
    }

    async fn on_rejected(&self, ctx: &ResponseContext, error: ClientError) -> ClientError {
        if !error.is_unauthorized() || ctx.is_external_api {
            return error;
        }

        if paths::is_session(ctx.path) {
            self.drop_credential();
            return error;
        }

        // Only the first attempt may recreate the session; the retry is final.
        if ctx.attempt == 0 && self.tokens.has_credential() {
            tracing::debug!("Recreating session after 401 on {}", ctx.path);
            self.recreate_session().await;
        }
        error
    }
}

/// Owner of the session interceptor registration.
pub struct SessionContext {
    api: ApiClient,
    queries: QueryCache,
    notifier: Arc<dyn Notifier>,
    registration: Arc<RegistrationSlot>,
    access_token_sent: AtomicBool,
}

impl SessionContext {
    pub fn new(api: ApiClient, queries: QueryCache, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            api,
            queries,
            notifier,
            registration: Arc::new(Mutex::new(None)),
            access_token_sent: AtomicBool::new(false),
        }
    }

    pub fn tokens(&self) -> &TokenStore {
        self.api.tokens()
    }

    pub fn token_status(&self) -> TokenStatus {
        self.tokens().status()
    }

    /// (Re)register the interceptor for the current credential.
    ///
    /// Returns false, leaving nothing registered, when there is no credential.
    /// Every cached read is invalidated on success since it may have been
    /// fetched without the session retry.
    pub fn install(&self) -> bool {
        let mut slot = self
            .registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        slot.take();

        if !self.tokens().has_credential() {
            tracing::debug!("No API token, session interceptor not installed");
            return false;
        }

        let interceptor = SessionInterceptor {
            transport: self.api.transport().clone(),
            tokens: self.tokens().clone(),
            notifier: Arc::clone(&self.notifier),
            registration: Arc::downgrade(&self.registration),
        };
        *slot = Some(self.api.interceptors().register(Arc::new(interceptor)));
        drop(slot);

        let invalidated = self.queries.invalidate_all();
        tracing::info!(
            "Session interceptor installed, invalidated {} cached read(s)",
            invalidated
        );
        true
    }

    pub fn uninstall(&self) {
        release(&self.registration);
    }

    pub fn is_installed(&self) -> bool {
        self.registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Gate for calls that depend on the session retry.
    pub fn ensure_ready(&self) -> Result<(), ClientError> {
        if self.is_installed() {
            Ok(())
        } else {
            Err(ClientError::SessionNotReady)
        }
    }

    /// Replace the credential. A different token reinstalls the interceptor,
    /// an empty one tears it down.
    pub fn set_credential(&self, token: &str) -> Result<(), ClientError> {
        if !self.tokens().set(token)? {
            return Ok(());
        }
        self.access_token_sent.store(false, Ordering::SeqCst);
        if self.tokens().has_credential() {
            self.install();
        } else {
            self.uninstall();
        }
        Ok(())
    }

    /// Create the server-side session for the current credential.
    pub async fn create_session(&self) -> Result<Message, ClientError> {
        if !self.tokens().has_credential() {
            return Err(ClientError::InvalidState("No API token available".to_string()));
        }
        self.api.create_session().await.map_err(|error| {
            notify::report_error(self.notifier.as_ref(), SESSION_ERROR_PREFIX, &error);
            error
        })
    }

    /// Send an external access token into the session.
    pub async fn patch_access_token(&self, token: &AccessToken) -> Result<Message, ClientError> {
        self.ensure_ready()?;
        match self.api.patch_access_token(token).await {
            Ok(message) => {
                self.access_token_sent.store(true, Ordering::SeqCst);
                Ok(message)
            }
            Err(error) => {
                notify::report_error(self.notifier.as_ref(), ACCESS_TOKEN_ERROR_PREFIX, &error);
                Err(error)
            }
        }
    }

    pub fn has_sent_access_token(&self) -> bool {
        self.access_token_sent.load(Ordering::SeqCst)
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.uninstall();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryTokenStorage;
    use crate::config::Config;
    use crate::notify::TracingNotifier;
    use crate::query::QueryKey;

    fn context(token: Option<&str>) -> SessionContext {
        let storage = match token {
            Some(token) => MemoryTokenStorage::with_token(token),
            None => MemoryTokenStorage::default(),
        };
        let tokens = TokenStore::load(Arc::new(storage), None).unwrap();
        let api = ApiClient::new(&Config::default(), tokens).unwrap();
        SessionContext::new(api, QueryCache::new(), Arc::new(TracingNotifier))
    }

    #[test]
    fn test_no_interceptor_without_credential() {
        let session = context(None);
        assert!(!session.install());
        assert!(!session.is_installed());
        assert!(session.api.interceptors().is_empty());
        assert_eq!(session.ensure_ready(), Err(ClientError::SessionNotReady));
    }

    #[test]
    fn test_install_invalidates_cached_reads() {
        let session = context(Some("token"));
        session.queries.set(QueryKey::Project, &"project").unwrap();

        assert!(session.install());
        assert!(session.is_installed());
        assert_eq!(session.api.interceptors().len(), 1);
        assert_eq!(session.queries.is_stale(&QueryKey::Project), Some(true));
    }

    #[test]
    fn test_reinstall_replaces_registration() {
        let session = context(Some("token"));
        session.install();
        session.set_credential("other-token").unwrap();
        assert_eq!(session.api.interceptors().len(), 1);

        // Same token again: nothing changes.
        session.set_credential("other-token").unwrap();
        assert_eq!(session.api.interceptors().len(), 1);

        session.set_credential("").unwrap();
        assert!(!session.is_installed());
        assert!(session.api.interceptors().is_empty());
    }

    #[test]
    fn test_drop_uninstalls() {
        let session = context(Some("token"));
        session.install();
        let registry = Arc::clone(session.api.interceptors());
        assert_eq!(registry.len(), 1);

        drop(session);
        assert!(registry.is_empty());
    }
}
