//! Snapshot browser: list, diff and restore for one resource at a time.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::{AbortHandle, JoinHandle};

use super::format::{format_cache_date_time, snapshot_label};
use crate::api::ApiClient;
use crate::errors::ClientError;
use crate::models::{CacheResource, FieldDiff, Message};
use crate::notify::{self, Notification, Notifier};
use crate::query::{FetchPolicy, QueryCache, QueryKey};
use crate::session::SessionContext;

pub const LIST_ERROR_PREFIX: &str = "Error loading cache history";
pub const DIFF_ERROR_PREFIX: &str = "Error loading cache details";
pub const RESTORE_ERROR_PREFIX: &str = "Error restoring cache";

pub const HISTORY_FAILED_MESSAGE: &str = "Unable to load cache history.";
pub const DIFF_FAILED_MESSAGE: &str = "Unable to load differences for this cache.";
pub const NO_DIFFERENCES_MESSAGE: &str =
    "No differences found between current state and this snapshot.";
pub const RESTORE_SUCCESS_MESSAGE: &str =
    "Restore successful. An auto-backup of your previous state has been saved at the top of the list.";

const PRE_RESTORE_SUFFIX: &str = " (pre-restore)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub cache_id: String,
    pub label: String,
    pub date_time_label: String,
    pub is_auto_backup: bool,
}

/// Derive display entries from revisions ordered newest first.
pub fn build_entries(revisions: &[String], last_restored: Option<&str>) -> Vec<CacheEntry> {
    revisions
        .iter()
        .enumerate()
        .map(|(index, cache_id)| {
            let is_auto_backup = last_restored.is_some() && index == 0;
            let mut label = snapshot_label(index);
            if is_auto_backup {
                label.push_str(PRE_RESTORE_SUFFIX);
            }
            CacheEntry {
                cache_id: cache_id.clone(),
                label,
                date_time_label: format_cache_date_time(cache_id),
                is_auto_backup,
            }
        })
        .collect()
}

/// Keep the selection if it is still listed, otherwise fall back to the newest.
pub fn reconcile_selection(revisions: &[String], selected: Option<&str>) -> Option<String> {
    match selected {
        Some(id) if revisions.iter().any(|r| r == id) => Some(id.to_string()),
        _ => revisions.first().cloned(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiffView {
    Differences(Vec<FieldDiff>),
    NoDifferences,
    Failed,
}

impl DiffView {
    pub fn from_result(result: &Result<Vec<FieldDiff>, ClientError>) -> Self {
        match result {
            Ok(diffs) if diffs.is_empty() => DiffView::NoDifferences,
            Ok(diffs) => DiffView::Differences(diffs.clone()),
            Err(_) => DiffView::Failed,
        }
    }

    /// Inline text shown instead of a diff list.
    pub fn message(&self) -> Option<&'static str> {
        match self {
            DiffView::Differences(_) => None,
            DiffView::NoDifferences => Some(NO_DIFFERENCES_MESSAGE),
            DiffView::Failed => Some(DIFF_FAILED_MESSAGE),
        }
    }
}

#[derive(Debug)]
struct ViewerState {
    resource: CacheResource,
    /// Newest first
    revisions: Vec<String>,
    list_failed: bool,
    selected: Option<String>,
    last_restored: Option<String>,
    diff_open: bool,
    restore_open: bool,
    diff: Option<DiffView>,
    list_generation: u64,
    diff_generation: u64,
}

impl ViewerState {
    fn new(resource: CacheResource) -> Self {
        Self {
            resource,
            revisions: Vec::new(),
            list_failed: false,
            selected: None,
            last_restored: None,
            diff_open: false,
            restore_open: false,
            diff: None,
            list_generation: 0,
            diff_generation: 0,
        }
    }

    fn close_dialogs(&mut self) {
        self.diff_open = false;
        self.restore_open = false;
        self.diff = None;
        self.diff_generation += 1;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn join<T>(handle: JoinHandle<Result<T, ClientError>>) -> Result<T, ClientError> {
    match handle.await {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Err(ClientError::Cancelled),
        Err(e) => Err(ClientError::InvalidState(format!("Fetch task failed: {}", e))),
    }
}

fn replace_task(slot: &Mutex<Option<AbortHandle>>, handle: Option<AbortHandle>) {
    if let Some(previous) = std::mem::replace(&mut *lock(slot), handle) {
        previous.abort();
    }
}

/// Coordinates snapshot listing, diffing and restoring for a project.
pub struct HistoryViewer {
    api: ApiClient,
    session: Arc<SessionContext>,
    queries: QueryCache,
    notifier: Arc<dyn Notifier>,
    state: Mutex<ViewerState>,
    list_task: Mutex<Option<AbortHandle>>,
    diff_task: Mutex<Option<AbortHandle>>,
}

impl HistoryViewer {
    pub fn new(
        api: ApiClient,
        session: Arc<SessionContext>,
        queries: QueryCache,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            api,
            session,
            queries,
            notifier,
            state: Mutex::new(ViewerState::new(CacheResource::Config)),
            list_task: Mutex::new(None),
            diff_task: Mutex::new(None),
        }
    }

    pub fn resource(&self) -> CacheResource {
        lock(&self.state).resource
    }

    pub fn entries(&self) -> Vec<CacheEntry> {
        let state = lock(&self.state);
        build_entries(&state.revisions, state.last_restored.as_deref())
    }

    pub fn selected(&self) -> Option<String> {
        lock(&self.state).selected.clone()
    }

    pub fn last_restored(&self) -> Option<String> {
        lock(&self.state).last_restored.clone()
    }

    pub fn is_diff_open(&self) -> bool {
        lock(&self.state).diff_open
    }

    pub fn is_restore_open(&self) -> bool {
        lock(&self.state).restore_open
    }

    pub fn diff_view(&self) -> Option<DiffView> {
        lock(&self.state).diff.clone()
    }

    /// Inline text for a failed snapshot list.
    pub fn list_message(&self) -> Option<&'static str> {
        lock(&self.state)
            .list_failed
            .then_some(HISTORY_FAILED_MESSAGE)
    }

    pub fn can_restore(&self, read_only: bool) -> bool {
        !read_only && lock(&self.state).selected.is_some()
    }

    /// Switch resource and load its snapshots. Clears the pre-restore marker.
    pub async fn set_resource(&self, resource: CacheResource) -> Result<Vec<CacheEntry>, ClientError> {
        {
            let mut state = lock(&self.state);
            if state.resource != resource {
                let generation = state.list_generation + 1;
                let diff_generation = state.diff_generation;
                *state = ViewerState::new(resource);
                state.list_generation = generation;
                state.diff_generation = diff_generation + 1;
            }
        }
        replace_task(&self.list_task, None);
        replace_task(&self.diff_task, None);
        self.refresh_snapshots().await
    }

    /// Refetch the snapshot list of the current resource.
    ///
    /// A newer refresh aborts this one; its result is then `Cancelled`.
    pub async fn refresh_snapshots(&self) -> Result<Vec<CacheEntry>, ClientError> {
        self.session.ensure_ready()?;

        let (resource, generation) = {
            let mut state = lock(&self.state);
            state.list_generation += 1;
            (state.resource, state.list_generation)
        };

        let api = self.api.clone();
        let queries = self.queries.clone();
        let handle = tokio::spawn(async move {
            queries
                .fetch(QueryKey::CacheList(resource), FetchPolicy::Always, || async move {
                    api.list_cache(resource).await
                })
                .await
        });
        replace_task(&self.list_task, Some(handle.abort_handle()));
        let result = join(handle).await;

        let mut state = lock(&self.state);
        if state.list_generation != generation || state.resource != resource {
            return Err(ClientError::Cancelled);
        }
        match result {
            Ok(revisions) => {
                state.revisions = revisions.revisions.into_iter().rev().collect();
                state.list_failed = false;
                state.selected = reconcile_selection(&state.revisions, state.selected.as_deref());
                tracing::debug!("Loaded {} snapshot(s) of {}", state.revisions.len(), resource);
                Ok(build_entries(&state.revisions, state.last_restored.as_deref()))
            }
            Err(ClientError::Cancelled) => Err(ClientError::Cancelled),
            Err(error) => {
                state.list_failed = true;
                drop(state);
                notify::report_error(self.notifier.as_ref(), LIST_ERROR_PREFIX, &error);
                Err(error)
            }
        }
    }

    pub fn select(&self, cache_id: &str) {
        lock(&self.state).selected = Some(cache_id.to_string());
    }

    /// Open the diff dialog for a snapshot and fetch its diff fresh.
    ///
    /// Failures are rendered inline through [`DiffView::Failed`].
    pub async fn open_diff(&self, cache_id: &str) -> Result<DiffView, ClientError> {
        self.session.ensure_ready()?;

        let (resource, generation) = {
            let mut state = lock(&self.state);
            state.selected = Some(cache_id.to_string());
            state.diff_open = true;
            state.diff = None;
            state.diff_generation += 1;
            (state.resource, state.diff_generation)
        };

        let api = self.api.clone();
        let queries = self.queries.clone();
        let revision_id = cache_id.to_string();
        let handle = tokio::spawn(async move {
            let key = QueryKey::cache_diff(resource, revision_id.clone());
            queries
                .fetch(key, FetchPolicy::Always, || async move {
                    api.get_cache_diff(resource, &revision_id).await
                })
                .await
        });
        replace_task(&self.diff_task, Some(handle.abort_handle()));
        let result = join(handle).await;

        if matches!(result, Err(ClientError::Cancelled)) {
            return Err(ClientError::Cancelled);
        }
        let mut state = lock(&self.state);
        if state.diff_generation != generation || !state.diff_open {
            return Err(ClientError::Cancelled);
        }
        if let Err(error) = &result {
            tracing::warn!(
                "{}",
                notify::error_message(DIFF_ERROR_PREFIX, error)
            );
        }
        let view = DiffView::from_result(&result);
        state.diff = Some(view.clone());
        Ok(view)
    }

    pub fn close_diff(&self) {
        {
            let mut state = lock(&self.state);
            state.diff_open = false;
            state.diff = None;
            state.diff_generation += 1;
        }
        replace_task(&self.diff_task, None);
    }

    pub fn open_restore_dialog(&self, cache_id: &str) {
        let mut state = lock(&self.state);
        state.selected = Some(cache_id.to_string());
        state.restore_open = true;
    }

    /// Move from the diff dialog to the restore confirmation.
    pub fn open_restore_from_diff(&self) {
        self.close_diff();
        let mut state = lock(&self.state);
        if state.selected.is_some() {
            state.restore_open = true;
        }
    }

    pub fn cancel_restore(&self) {
        lock(&self.state).restore_open = false;
    }

    /// Restore the selected snapshot and invalidate everything it affects.
    pub async fn restore_selected(&self, read_only: bool) -> Result<Message, ClientError> {
        if read_only {
            return Err(ClientError::InvalidState(
                "Project is read-only, restore is disabled".to_string(),
            ));
        }
        self.session.ensure_ready()?;

        let (resource, revision_id) = {
            let state = lock(&self.state);
            let Some(selected) = state.selected.clone() else {
                return Err(ClientError::InvalidState("No snapshot selected".to_string()));
            };
            (state.resource, selected)
        };

        let message = match self.api.restore_cache(resource, &revision_id).await {
            Ok(message) => message,
            Err(error) => {
                notify::report_error(self.notifier.as_ref(), RESTORE_ERROR_PREFIX, &error);
                return Err(error);
            }
        };
        tracing::info!("Restored {} from {}", resource, revision_id);

        // An in-flight diff must not write pre-restore data after the cascade
        {
            let mut state = lock(&self.state);
            state.last_restored = Some(revision_id);
            state.close_dialogs();
            state.selected = None;
        }
        replace_task(&self.diff_task, None);

        self.queries.invalidate(&QueryKey::Project);
        self.queries.invalidate(&QueryKey::CacheList(resource));
        self.queries.invalidate_resource_diffs(resource);
        self.notifier.notify(Notification::info(RESTORE_SUCCESS_MESSAGE));

        if let Err(e) = self.refresh_snapshots().await {
            tracing::debug!("Snapshot list refresh after restore failed: {}", e);
        }
        Ok(message)
    }
}

impl Drop for HistoryViewer {
    fn drop(&mut self) {
        replace_task(&self.list_task, None);
        replace_task(&self.diff_task, None);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::ScalarFieldDiff;

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_entries_labels() {
        let revisions = ids(&["20240103T000000.000000Z-c.json", "20240102T000000.000000Z-b.json"]);

        let entries = build_entries(&revisions, None);
        assert_eq!(entries[0].label, "Snapshot 1");
        assert_eq!(entries[1].label, "Snapshot 2");
        assert!(entries.iter().all(|e| !e.is_auto_backup));

        let entries = build_entries(&revisions, Some("20240102T000000.000000Z-b.json"));
        assert_eq!(entries[0].label, "Snapshot 1 (pre-restore)");
        assert!(entries[0].is_auto_backup);
        assert_eq!(entries[1].label, "Snapshot 2");
        assert!(!entries[1].is_auto_backup);

        assert!(build_entries(&[], Some("x")).is_empty());
        assert_eq!(build_entries(&ids(&["junk"]), None)[0].date_time_label, "Unknown date");
    }

    #[test]
    fn test_reconcile_selection() {
        let revisions = ids(&["c", "b", "a"]);
        assert_eq!(reconcile_selection(&[], Some("a")), None);
        assert_eq!(reconcile_selection(&revisions, None), Some("c".to_string()));
        assert_eq!(reconcile_selection(&revisions, Some("b")), Some("b".to_string()));
        assert_eq!(reconcile_selection(&revisions, Some("gone")), Some("c".to_string()));
    }

    #[test]
    fn test_diff_view() {
        assert_eq!(DiffView::from_result(&Ok(vec![])), DiffView::NoDifferences);
        assert_eq!(DiffView::NoDifferences.message(), Some(NO_DIFFERENCES_MESSAGE));

        let failed = DiffView::from_result(&Err(ClientError::NotFound("missing".to_string())));
        assert_eq!(failed, DiffView::Failed);
        assert_eq!(failed.message(), Some("Unable to load differences for this cache."));

        let diff = FieldDiff::Scalar(ScalarFieldDiff {
            field_path: "model.name".to_string(),
            before: Some(json!("a")),
            after: Some(json!("b")),
        });
        let view = DiffView::from_result(&Ok(vec![diff.clone()]));
        assert_eq!(view, DiffView::Differences(vec![diff]));
        assert_eq!(view.message(), None);
    }
}
