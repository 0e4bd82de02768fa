use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub type UserId = Uuid;

/// Structured payload attached to an audit entry.
pub type AuditDetails = Map<String, Value>;

/// One row of the append-only audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Assigned by the store, strictly increasing
    pub id: i64,
    /// `None` for system or background actions
    pub actor: Option<UserId>,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub details: AuditDetails,
    pub ip_address: Option<String>,
}

impl AuditLogEntry {
    /// Value of a detail key, if it is a string.
    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.get(key).and_then(Value::as_str)
    }
}

/// An audit entry that has not been written yet.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub actor: Option<UserId>,
    pub action: String,
    pub details: AuditDetails,
    pub ip_address: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl NewAuditEntry {
    pub fn new(actor: Option<UserId>, action: impl Into<String>) -> Self {
        Self {
            actor,
            action: action.into(),
            details: AuditDetails::new(),
            ip_address: None,
            timestamp: Utc::now(),
        }
    }

    pub fn detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn with_ip(mut self, ip_address: Option<String>) -> Self {
        self.ip_address = ip_address;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
