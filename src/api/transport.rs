//! Low-level HTTP transport: request description, credential header, raw responses.

use reqwest::header::HeaderName;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use super::{EXTERNAL_API_HEADER, REQUEST_ID_HEADER};
use crate::auth::TokenStore;
use crate::config::Config;
use crate::errors::{ClientError, ErrorBody};

/// Description of a single API call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Route template, also used to classify the endpoint
    pub path: &'static str,
    /// Trailing path segment, percent-encoded when sent
    pub path_param: Option<String>,
    pub query: Vec<(&'static str, String)>,
    pub body: Option<serde_json::Value>,
    /// Attach the credential header
    pub authorized: bool,
}

impl ApiRequest {
    fn new(method: Method, path: &'static str) -> Self {
        Self {
            method,
            path,
            path_param: None,
            query: Vec::new(),
            body: None,
            authorized: true,
        }
    }

    pub fn get(path: &'static str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: &'static str) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: &'static str) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: &'static str) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.path_param = Some(param.into());
        self
    }

    pub fn with_query(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }

    pub fn with_json<T: Serialize>(mut self, body: &T) -> Result<Self, ClientError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Health checks go out without the credential.
    pub fn unauthenticated(mut self) -> Self {
        self.authorized = false;
        self
    }
}

/// Response as received, before any interpretation.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub is_external_api: bool,
    pub request_id: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Map a non-success response to a [`ClientError`].
    pub fn error(&self, path: &str) -> ClientError {
        let body: ErrorBody = serde_json::from_slice(&self.body).unwrap_or_default();
        ClientError::from_response(self.status, path, body)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        if self.body.is_empty() {
            return Ok(serde_json::from_slice(b"null")?);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// HTTP transport bound to one API base URL and one credential store.
#[derive(Clone)]
pub struct Transport {
    http: reqwest::Client,
    base_url: String,
    token_header: HeaderName,
    tokens: TokenStore,
}

impl Transport {
    pub fn new(config: &Config, tokens: TokenStore) -> Result<Self, ClientError> {
        Url::parse(&config.api_url).map_err(|e| {
            ClientError::InvalidState(format!("Invalid API URL {}: {}", config.api_url, e))
        })?;
        let token_header = HeaderName::from_bytes(config.token_header.as_bytes()).map_err(|e| {
            ClientError::InvalidState(format!(
                "Invalid token header name {}: {}",
                config.token_header, e
            ))
        })?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token_header,
            tokens,
        })
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    fn url_for(&self, request: &ApiRequest) -> Result<Url, ClientError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, request.path))
            .map_err(|e| ClientError::InvalidState(format!("Invalid request URL: {}", e)))?;

        if let Some(param) = &request.path_param {
            url.path_segments_mut()
                .map_err(|_| ClientError::InvalidState("API URL cannot be a base".to_string()))?
                .pop_if_empty()
                .push(param);
        }
        if !request.query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(request.query.iter().map(|(k, v)| (*k, v.as_str())));
        }

        Ok(url)
    }

    /// Send the request. Only transport failures are errors here.
    pub async fn send(&self, request: &ApiRequest) -> Result<RawResponse, ClientError> {
        let url = self.url_for(request)?;
        let request_id = Uuid::new_v4().to_string();

        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .header(REQUEST_ID_HEADER, request_id.as_str());

        if request.authorized {
            let credential = self.tokens.credential();
            if !credential.is_empty() {
                builder = builder.header(self.token_header.clone(), credential);
            }
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let is_external_api = response.headers().contains_key(EXTERNAL_API_HEADER);
        let body = response.bytes().await?.to_vec();

        tracing::debug!(
            request_id = %request_id,
            method = %request.method,
            path = request.path,
            status,
            "API response"
        );

        Ok(RawResponse {
            status,
            body,
            is_external_api,
            request_id,
        })
    }

    /// Send and decode without running any interceptor.
    pub async fn call<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ClientError> {
        let raw = self.send(request).await?;
        if raw.is_success() {
            raw.decode()
        } else {
            Err(raw.error(request.path))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::auth::MemoryTokenStorage;

    fn transport(api_url: &str) -> Transport {
        let config = Config {
            api_url: api_url.to_string(),
            ..Config::default()
        };
        Transport::new(&config, TokenStore::new(Arc::new(MemoryTokenStorage::default()))).unwrap()
    }

    #[test]
    fn test_url_with_param_and_query() {
        let transport = transport("http://localhost:8001/");
        let request = ApiRequest::get("/api/v1/project/cache/diff")
            .with_param("20240102T030405.123456Z-abc.json")
            .with_query("resource", "config.json");

        let url = transport.url_for(&request).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8001/api/v1/project/cache/diff/20240102T030405.123456Z-abc.json?resource=config.json"
        );
    }

    #[test]
    fn test_param_is_encoded_as_one_segment() {
        let transport = transport("http://localhost:8001/prefix");
        let request = ApiRequest::post("/api/v1/project/cache/restore").with_param("a/b c");

        let url = transport.url_for(&request).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8001/prefix/api/v1/project/cache/restore/a%2Fb%20c"
        );
    }

    #[test]
    fn test_invalid_header_name_rejected() {
        let config = Config {
            token_header: "bad header".to_string(),
            ..Config::default()
        };
        let result = Transport::new(&config, TokenStore::new(Arc::new(MemoryTokenStorage::default())));
        assert!(matches!(result, Err(ClientError::InvalidState(_))));
    }

    #[test]
    fn test_raw_response_decoding() {
        let raw = RawResponse {
            status: 404,
            body: br#"{"detail": "Cache revision not found"}"#.to_vec(),
            is_external_api: false,
            request_id: "id".to_string(),
        };
        assert!(!raw.is_success());
        assert_eq!(
            raw.error("/api/v1/project/cache/diff"),
            ClientError::NotFound("Cache revision not found".to_string())
        );

        let empty = RawResponse {
            status: 200,
            body: Vec::new(),
            is_external_api: false,
            request_id: "id".to_string(),
        };
        empty.decode::<()>().unwrap();
        assert_eq!(empty.decode::<Option<String>>().unwrap(), None);
    }
}
