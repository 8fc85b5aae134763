//! Snapshot history of project resources.

pub mod format;
mod viewer;

pub use format::DiffKind;
pub use viewer::{
    build_entries, reconcile_selection, CacheEntry, DiffView, HistoryViewer, DIFF_ERROR_PREFIX,
    DIFF_FAILED_MESSAGE, HISTORY_FAILED_MESSAGE, LIST_ERROR_PREFIX, NO_DIFFERENCES_MESSAGE,
    RESTORE_ERROR_PREFIX, RESTORE_SUCCESS_MESSAGE,
};
