//! Project and lock endpoints.

use super::{paths, ApiClient, ApiRequest};
use crate::errors::ClientError;
use crate::models::{FmuProject, LockStatus, Message};

impl ApiClient {
    /// GET /api/v1/project/ - Current project state.
    pub async fn get_project(&self) -> Result<FmuProject, ClientError> {
        self.call(ApiRequest::get(paths::PROJECT)).await
    }

    /// GET /api/v1/project/lock_status - Lock status of the project.
    pub async fn get_lock_status(&self) -> Result<LockStatus, ClientError> {
        self.call(ApiRequest::get(paths::LOCK_STATUS)).await
    }

    /// POST /api/v1/project/lock_refresh - Extend the lock.
    pub async fn refresh_lock(&self) -> Result<Message, ClientError> {
        self.call(ApiRequest::post(paths::LOCK_REFRESH)).await
    }
}
