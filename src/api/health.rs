//! Health check endpoints. Sent without the credential header.

use super::{paths, ApiClient, ApiRequest};
use crate::errors::ClientError;
use crate::models::HealthStatus;

impl ApiClient {
    /// GET /health
    pub async fn health(&self) -> Result<HealthStatus, ClientError> {
        self.call(ApiRequest::get(paths::HEALTH).unauthenticated())
            .await
    }

    /// GET /api/v1/health
    pub async fn health_v1(&self) -> Result<HealthStatus, ClientError> {
        self.call(ApiRequest::get(paths::HEALTH_V1).unauthenticated())
            .await
    }
}
