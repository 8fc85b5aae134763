//! Session endpoints.

use super::{paths, ApiClient, ApiRequest};
use crate::errors::ClientError;
use crate::models::{AccessToken, Message};

impl ApiClient {
    /// POST /api/v1/session/ - Create a session for the current credential.
    pub async fn create_session(&self) -> Result<Message, ClientError> {
        self.call(ApiRequest::post(paths::SESSION)).await
    }

    /// PATCH /api/v1/session/access_token - Add an external access token to the session.
    pub async fn patch_access_token(&self, token: &AccessToken) -> Result<Message, ClientError> {
        self.call(ApiRequest::patch(paths::SESSION_ACCESS_TOKEN).with_json(token)?)
            .await
    }
}
