//! Lock status model for the project write lock.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Information about the lock held on the project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LockInfo {
    #[serde(
        default,
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<i64>,
}

/// Lock status as polled from the server.
///
/// When `is_lock_acquired` is false the project is read-only for this client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LockStatus {
    pub is_lock_acquired: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_file_exists: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_info: Option<LockInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_lock_acquire_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_lock_refresh_error: Option<String>,
}

impl LockStatus {
    pub fn is_read_only(&self) -> bool {
        !self.is_lock_acquired
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.lock_info.as_ref().and_then(|info| info.expires_at)
    }
}

/// Accepts either an RFC 3339 string or a unix timestamp in seconds.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Seconds(f64),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Text(text)) => DateTime::parse_from_rfc3339(&text)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom),
        Some(Raw::Seconds(seconds)) => {
            let millis = (seconds * 1000.0).round() as i64;
            Utc.timestamp_millis_opt(millis)
                .single()
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expires_at_from_rfc3339() {
        let status: LockStatus = serde_json::from_str(
            r#"{"is_lock_acquired": true, "lock_info": {"expires_at": "2024-01-02T03:04:05Z"}}"#,
        )
        .unwrap();
        assert_eq!(
            status.expires_at().unwrap().to_rfc3339(),
            "2024-01-02T03:04:05+00:00"
        );
        assert!(!status.is_read_only());
    }

    #[test]
    fn test_expires_at_from_unix_seconds() {
        let status: LockStatus = serde_json::from_str(
            r#"{"is_lock_acquired": true, "lock_info": {"expires_at": 1704164645.5}}"#,
        )
        .unwrap();
        assert_eq!(status.expires_at().unwrap().timestamp_millis(), 1_704_164_645_500);
    }

    #[test]
    fn test_missing_lock_info() {
        let status: LockStatus = serde_json::from_str(r#"{"is_lock_acquired": false}"#).unwrap();
        assert!(status.is_read_only());
        assert!(status.expires_at().is_none());
    }
}
