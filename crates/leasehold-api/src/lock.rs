//! Lock operation models

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Outcome reported in every response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStatus {
    Held,
    Denied,
    TimedOut,
    Cancelled,
    Renewed,
    Released,
    Unavailable,
    InvalidArgument,
}

impl LockStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LockStatus::Held => "held",
            LockStatus::Denied => "denied",
            LockStatus::TimedOut => "timed_out",
            LockStatus::Cancelled => "cancelled",
            LockStatus::Renewed => "renewed",
            LockStatus::Released => "released",
            LockStatus::Unavailable => "unavailable",
            LockStatus::InvalidArgument => "invalid_argument",
        }
    }

    /// Whether the request achieved what it asked for
    pub fn is_success(self) -> bool {
        matches!(
            self,
            LockStatus::Held | LockStatus::Renewed | LockStatus::Released
        )
    }
}

impl Display for LockStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long an acquire may wait for a held lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WaitPolicyModel {
    #[default]
    NoWait,
    WaitUpTo {
        #[serde(rename = "waitMillis")]
        wait_millis: u64,
    },
    WaitForever,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquireRequest {
    pub lock_name: String,
    pub holder_id: String,
    pub ttl_millis: u64,
    #[serde(default)]
    pub wait_policy: WaitPolicyModel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquireResponse {
    pub status: LockStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denied_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_holder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AcquireResponse {
    fn with_status(status: LockStatus) -> Self {
        Self {
            status,
            token: None,
            expires_at: None,
            denied_reason: None,
            current_holder: None,
            message: None,
        }
    }

    pub fn held(token: u64, expires_at: i64) -> Self {
        Self {
            token: Some(token),
            expires_at: Some(expires_at),
            ..Self::with_status(LockStatus::Held)
        }
    }

    pub fn denied(reason: impl Into<String>, current_holder: Option<String>, expires_at: Option<i64>) -> Self {
        Self {
            denied_reason: Some(reason.into()),
            current_holder,
            expires_at,
            ..Self::with_status(LockStatus::Denied)
        }
    }

    pub fn timed_out(current_holder: Option<String>, expires_at: Option<i64>) -> Self {
        Self {
            current_holder,
            expires_at,
            ..Self::with_status(LockStatus::TimedOut)
        }
    }

    pub fn cancelled() -> Self {
        Self::with_status(LockStatus::Cancelled)
    }

    pub fn error(status: LockStatus, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::with_status(status)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewRequest {
    pub lock_name: String,
    pub holder_id: String,
    pub token: u64,
    pub ttl_millis: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewResponse {
    pub status: LockStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denied_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RenewResponse {
    pub fn renewed(new_expires_at: i64) -> Self {
        Self {
            status: LockStatus::Renewed,
            new_expires_at: Some(new_expires_at),
            denied_reason: None,
            message: None,
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            status: LockStatus::Denied,
            new_expires_at: None,
            denied_reason: Some(reason.into()),
            message: None,
        }
    }

    pub fn error(status: LockStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            new_expires_at: None,
            denied_reason: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRequest {
    pub lock_name: String,
    pub holder_id: String,
    pub token: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseResponse {
    pub status: LockStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denied_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ReleaseResponse {
    pub fn released() -> Self {
        Self {
            status: LockStatus::Released,
            denied_reason: None,
            message: None,
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            status: LockStatus::Denied,
            denied_reason: Some(reason.into()),
            message: None,
        }
    }

    pub fn error(status: LockStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            denied_reason: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectRequest {
    pub lock_name: String,
}

/// Read-only view of a stored lease. `found == false` means absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectResponse {
    pub found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    /// Expired but not yet reclaimed
    #[serde(default)]
    pub expired: bool,
}

impl InspectResponse {
    pub fn absent() -> Self {
        Self::default()
    }
}
