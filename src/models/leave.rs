//! Leave request payloads and status types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Workflow status of a leave request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

/// A leave request as seen by list screens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Leave {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub employee: String,
    #[serde(default)]
    pub leave_type: String,
    pub status: LeaveStatus,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub remarks: Option<String>,
}

/// Server push: a leave request changed status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveStatusChange {
    pub leave_id: String,
    pub old_status: LeaveStatus,
    pub new_status: LeaveStatus,
    #[serde(default)]
    pub remarks: Option<String>,
}

/// Server push: a leave request was removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveDeleted {
    pub leave_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leave_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&LeaveStatus::Approved).unwrap(), r#""approved""#);
        let s: LeaveStatus = serde_json::from_str(r#""rejected""#).unwrap();
        assert_eq!(s, LeaveStatus::Rejected);
    }

    #[test]
    fn status_change_deserializes_camel_case() {
        let c: LeaveStatusChange = serde_json::from_str(
            r#"{"leaveId":"L1","oldStatus":"pending","newStatus":"approved","remarks":"ok"}"#,
        )
        .unwrap();
        assert_eq!(c.leave_id, "L1");
        assert_eq!(c.old_status, LeaveStatus::Pending);
        assert_eq!(c.new_status, LeaveStatus::Approved);
        assert_eq!(c.remarks.as_deref(), Some("ok"));
    }
}
