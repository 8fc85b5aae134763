//! Configuration endpoint.

use super::{paths, ApiClient, ApiRequest};
use crate::errors::ClientError;
use crate::models::FmuConfig;

impl ApiClient {
    /// GET /api/v1/config/ - Configuration of the open directory session.
    pub async fn get_config(&self) -> Result<FmuConfig, ClientError> {
        self.call(ApiRequest::get(paths::CONFIG)).await
    }
}
