//! Response interceptors run on every API response.
//!
//! Registration returns an [`InterceptorGuard`]; dropping the guard ejects the
//! interceptor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use async_trait::async_trait;
use reqwest::Method;

use crate::errors::ClientError;

/// What an interceptor gets to see about a response.
#[derive(Debug, Clone)]
pub struct ResponseContext {
    pub method: Method,
    pub path: &'static str,
    pub status: u16,
    /// 0 for the first attempt of a call, 1 for its retry
    pub attempt: u32,
    pub is_external_api: bool,
    pub request_id: String,
}

#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    async fn on_fulfilled(&self, _ctx: &ResponseContext) {}

    async fn on_rejected(&self, _ctx: &ResponseContext, error: ClientError) -> ClientError {
        error
    }
}

type Entry = (u64, Arc<dyn ResponseInterceptor>);

#[derive(Default)]
pub struct InterceptorRegistry {
    next_id: AtomicU64,
    entries: RwLock<Vec<Entry>>,
}

impl InterceptorRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(self: &Arc<Self>, interceptor: Arc<dyn ResponseInterceptor>) -> InterceptorGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, interceptor));
        tracing::debug!("Registered response interceptor {}", id);

        InterceptorGuard {
            id,
            registry: Arc::downgrade(self),
        }
    }

    fn eject(&self, id: u64) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        let removed = entries.len() != before;
        if removed {
            tracing::debug!("Ejected response interceptor {}", id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current interceptors; the lock is not held while they run.
    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn ResponseInterceptor>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, interceptor)| Arc::clone(interceptor))
            .collect()
    }
}

/// Keeps an interceptor registered for as long as it lives.
#[derive(Debug)]
pub struct InterceptorGuard {
    id: u64,
    registry: Weak<InterceptorRegistry>,
}

impl InterceptorGuard {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for InterceptorGuard {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.eject(self.id);
        }
    }
}
