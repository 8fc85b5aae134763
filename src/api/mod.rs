//! Typed client for the FMU settings REST API.
//!
//! One file per endpoint group. Every call goes through [`ApiClient::call`],
//! which runs the registered response interceptors and applies the retry
//! policy for authorization failures.

mod cache;
mod config;
mod fmu;
mod health;
pub mod interceptor;
mod project;
mod session;
pub mod transport;

use std::sync::Arc;

use serde::de::DeserializeOwned;

pub use interceptor::{InterceptorGuard, InterceptorRegistry, ResponseContext, ResponseInterceptor};
pub use transport::{ApiRequest, RawResponse, Transport};

use crate::auth::TokenStore;
use crate::config::Config;
use crate::errors::ClientError;

/// Header carrying a per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Marks a response whose error originates from an upstream API behind the server.
pub const EXTERNAL_API_HEADER: &str = "x-upstream-source";

/// Retries granted to a call rejected with 401 on a non-session endpoint.
pub const MAX_AUTH_RETRIES: u32 = 1;

/// Route templates of the FMU settings API.
pub mod paths {
    pub const FMU: &str = "/api/v1/fmu/";
    pub const FMU_INIT: &str = "/api/v1/fmu/init";
    pub const CONFIG: &str = "/api/v1/config/";
    pub const SESSION: &str = "/api/v1/session/";
    pub const SESSION_ACCESS_TOKEN: &str = "/api/v1/session/access_token";
    pub const PROJECT: &str = "/api/v1/project/";
    pub const LOCK_STATUS: &str = "/api/v1/project/lock_status";
    pub const LOCK_REFRESH: &str = "/api/v1/project/lock_refresh";
    pub const CACHE: &str = "/api/v1/project/cache";
    pub const CACHE_DIFF: &str = "/api/v1/project/cache/diff";
    pub const CACHE_RESTORE: &str = "/api/v1/project/cache/restore";
    pub const HEALTH_V1: &str = "/api/v1/health";
    pub const HEALTH: &str = "/health";

    const SESSION_PREFIX: &str = "/api/v1/session";

    /// Session-scoped endpoints: a 401 here means the credential itself is bad.
    pub fn is_session(path: &str) -> bool {
        path.starts_with(SESSION_PREFIX)
    }
}

/// Whether a failed call may be sent again.
///
/// Only a 401 from a non-session, non-upstream endpoint is retried, and only
/// [`MAX_AUTH_RETRIES`] times: the session interceptor recreates the session
/// in between. Everything else is final.
pub fn should_retry(failure_count: u32, error: &ClientError, ctx: Option<&ResponseContext>) -> bool {
    match ctx {
        Some(ctx) if error.is_unauthorized() && !paths::is_session(ctx.path) && !ctx.is_external_api => {
            failure_count < MAX_AUTH_RETRIES
        }
        _ => false,
    }
}

struct AttemptError {
    error: ClientError,
    ctx: Option<ResponseContext>,
}

/// API client shared by all components.
#[derive(Clone)]
pub struct ApiClient {
    transport: Transport,
    interceptors: Arc<InterceptorRegistry>,
}

impl ApiClient {
    pub fn new(config: &Config, tokens: TokenStore) -> Result<Self, ClientError> {
        Ok(Self {
            transport: Transport::new(config, tokens)?,
            interceptors: InterceptorRegistry::new(),
        })
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn tokens(&self) -> &TokenStore {
        self.transport.tokens()
    }

    pub fn interceptors(&self) -> &Arc<InterceptorRegistry> {
        &self.interceptors
    }

    async fn attempt(&self, request: &ApiRequest, attempt: u32) -> Result<RawResponse, AttemptError> {
        let raw = self
            .transport
            .send(request)
            .await
            .map_err(|error| AttemptError { error, ctx: None })?;

        let ctx = ResponseContext {
            method: request.method.clone(),
            path: request.path,
            status: raw.status,
            attempt,
            is_external_api: raw.is_external_api,
            request_id: raw.request_id.clone(),
        };
        let interceptors = self.interceptors.snapshot();

        if raw.is_success() {
            for interceptor in &interceptors {
                interceptor.on_fulfilled(&ctx).await;
            }
            return Ok(raw);
        }

        let mut error = raw.error(request.path);
        for interceptor in &interceptors {
            error = interceptor.on_rejected(&ctx, error).await;
        }
        Err(AttemptError {
            error,
            ctx: Some(ctx),
        })
    }

    /// Send a request through the interceptor chain and decode the response.
    pub async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ClientError> {
        let mut failures = 0;
        loop {
            match self.attempt(&request, failures).await {
                Ok(raw) => return raw.decode(),
                Err(AttemptError { error, ctx }) => {
                    if should_retry(failures, &error, ctx.as_ref()) {
                        failures += 1;
                        tracing::debug!("Retrying {} {} after {}", request.method, request.path, error);
                        continue;
                    }
                    return Err(error);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(path: &'static str, is_external_api: bool) -> ResponseContext {
        ResponseContext {
            method: reqwest::Method::GET,
            path,
            status: 401,
            attempt: 0,
            is_external_api,
            request_id: "test".to_string(),
        }
    }

    fn unauthorized(path: &str) -> ClientError {
        ClientError::Unauthorized {
            path: path.to_string(),
            detail: None,
        }
    }

    #[test]
    fn test_session_paths() {
        assert!(paths::is_session(paths::SESSION));
        assert!(paths::is_session(paths::SESSION_ACCESS_TOKEN));
        assert!(!paths::is_session(paths::CONFIG));
        assert!(!paths::is_session(paths::LOCK_STATUS));
    }

    #[test]
    fn test_retry_once_on_resource_401() {
        let err = unauthorized(paths::CONFIG);
        let ctx = ctx(paths::CONFIG, false);
        assert!(should_retry(0, &err, Some(&ctx)));
        assert!(!should_retry(1, &err, Some(&ctx)));
    }

    #[test]
    fn test_no_retry_for_session_external_or_other_errors() {
        let err = unauthorized(paths::SESSION);
        assert!(!should_retry(0, &err, Some(&ctx(paths::SESSION, false))));

        let err = unauthorized(paths::CONFIG);
        assert!(!should_retry(0, &err, Some(&ctx(paths::CONFIG, true))));

        let err = ClientError::Validation(vec![]);
        assert!(!should_retry(0, &err, Some(&ctx(paths::FMU, false))));

        let err = ClientError::Transport("connection refused".to_string());
        assert!(!should_retry(0, &err, None));
    }
}
