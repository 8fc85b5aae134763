//! Snapshot (cache revision) endpoints.

use super::{paths, ApiClient, ApiRequest};
use crate::errors::ClientError;
use crate::models::{CacheResource, CacheRevisions, FieldDiff, Message};

impl ApiClient {
    /// GET /api/v1/project/cache?resource= - Revision ids, oldest first.
    pub async fn list_cache(&self, resource: CacheResource) -> Result<CacheRevisions, ClientError> {
        self.call(ApiRequest::get(paths::CACHE).with_query("resource", resource.as_str()))
            .await
    }

    /// GET /api/v1/project/cache/diff/{revision_id}?resource= - Diff against current state.
    pub async fn get_cache_diff(
        &self,
        resource: CacheResource,
        revision_id: &str,
    ) -> Result<Vec<FieldDiff>, ClientError> {
        self.call(
            ApiRequest::get(paths::CACHE_DIFF)
                .with_param(revision_id)
                .with_query("resource", resource.as_str()),
        )
        .await
    }

    /// POST /api/v1/project/cache/restore/{revision_id}?resource= - Restore a snapshot.
    pub async fn restore_cache(
        &self,
        resource: CacheResource,
        revision_id: &str,
    ) -> Result<Message, ClientError> {
        self.call(
            ApiRequest::post(paths::CACHE_RESTORE)
                .with_param(revision_id)
                .with_query("resource", resource.as_str()),
        )
        .await
    }
}
