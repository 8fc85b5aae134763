//! Session request models.

use serde::{Deserialize, Serialize};

/// External access token patched into the server-side session.
///
/// `id` names the scope the token is valid for (e.g. `smda_api`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessToken {
    pub id: String,
    pub key: String,
}
