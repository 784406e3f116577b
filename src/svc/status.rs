//! # Status module
//!
//! This module provides the status sub-document written back onto every
//! reconciled custom resource: its phase, the reason for the last
//! transition and the two timestamps tracking when it last changed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::svc::cr::CustomResourceView;

// -----------------------------------------------------------------------------
// Phase enumeration

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum Phase {
    #[default]
    #[serde(rename = "")]
    None,
    Applying,
    Applied,
    Failed,
}

// -----------------------------------------------------------------------------
// Reason enumeration

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Debug)]
pub enum Reason {
    Unknown,
    CustomResourceAdded,
    CustomResourceUpdated,
    ApplySuccessful,
    ApplyFailed,
}

// -----------------------------------------------------------------------------
// ReleaseStatus enumeration

/// mirrors the revision status a chart release can be in, as tracked by the
/// release store
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum ReleaseStatus {
    #[default]
    Unknown,
    Deployed,
    Deleted,
    Deleting,
    Failed,
    PendingInstall,
    PendingUpgrade,
    PendingRollback,
}

// -----------------------------------------------------------------------------
// ReleaseSnapshot structure

/// the slice of a [`crate::svc::reconciler::chart::release::Release`] the
/// chart reconciler writes back onto the custom resource it produced it for
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct ReleaseSnapshot {
    pub name: String,
    pub revision: u64,
    pub status: ReleaseStatus,
}

// -----------------------------------------------------------------------------
// CustomResourceStatus structure

/// the `.status` sub-document written back onto the custom resource after
/// every reconciliation
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
pub struct CustomResourceStatus {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<Reason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
    /// snapshot of the helm release tracked for this resource, only set by
    /// the chart reconciler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<ReleaseSnapshot>,
}

impl CustomResourceStatus {
    /// reads the status sub-document off the given custom resource. A
    /// missing or empty status decodes as the zero value. A status present
    /// but not shaped like [`CustomResourceStatus`] degrades to a `Failed`
    /// status carrying the decode error, rather than being discarded
    pub fn read(cr: &CustomResourceView) -> Self {
        match cr.status() {
            Value::Null => Self::default(),
            value => match serde_json::from_value(value.to_owned()) {
                Ok(status) => status,
                Err(err) => Self {
                    phase: Phase::Failed,
                    reason: Some(Reason::ApplyFailed),
                    message: Some(err.to_string()),
                    ..Self::default()
                },
            },
        }
    }

    /// returns the status with the phase, reason and message updated. The
    /// `last_update_time` timestamp always advances; `last_transition_time`
    /// only advances when the phase actually changes
    pub fn set_phase(&self, now: DateTime<Utc>, phase: Phase, reason: Reason, message: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.last_update_time = Some(now);

        if next.phase != phase {
            next.phase = phase;
            next.last_transition_time = Some(now);
        }

        next.reason = Some(reason);
        next.message = Some(message.into());
        next
    }

    /// returns the status with the release snapshot attached, or cleared
    /// when `release` is `None`
    pub fn with_release(&self, release: Option<ReleaseSnapshot>) -> Self {
        let mut next = self.clone();
        next.release = release;
        next
    }

    /// serializes the status back to a json value, suitable for a status
    /// sub-resource patch
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use kube::core::{DynamicObject, ObjectMeta};
    use serde_json::json;

    use super::*;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).unwrap()
    }

    #[test]
    fn read_defaults_to_none_phase_when_status_missing() {
        let cr = CustomResourceView::from(DynamicObject {
            types: None,
            metadata: ObjectMeta::default(),
            data: json!({}),
        });

        let status = CustomResourceStatus::read(&cr);
        assert_eq!(status.phase, Phase::None);
    }

    #[test]
    fn read_degrades_to_failed_on_malformed_status() {
        let cr = CustomResourceView::from(DynamicObject {
            types: None,
            metadata: ObjectMeta::default(),
            data: json!({ "status": { "phase": 42 } }),
        });

        let status = CustomResourceStatus::read(&cr);
        assert_eq!(status.phase, Phase::Failed);
        assert_eq!(status.reason, Some(Reason::ApplyFailed));
    }

    #[test]
    fn set_phase_always_advances_last_update_time() {
        let status = CustomResourceStatus::default();
        let next = status.set_phase(at(10), Phase::Applying, Reason::CustomResourceAdded, "applying");

        assert_eq!(next.last_update_time, Some(at(10)));
        assert_eq!(next.last_transition_time, Some(at(10)));
    }

    #[test]
    fn set_phase_only_advances_transition_time_on_phase_change() {
        let status = CustomResourceStatus::default().set_phase(at(10), Phase::Applying, Reason::CustomResourceAdded, "applying");
        let next = status.set_phase(at(20), Phase::Applying, Reason::CustomResourceUpdated, "still applying");

        assert_eq!(next.last_update_time, Some(at(20)));
        assert_eq!(next.last_transition_time, Some(at(10)));
    }

    #[test]
    fn set_phase_advances_transition_time_when_phase_changes() {
        let status = CustomResourceStatus::default().set_phase(at(10), Phase::Applying, Reason::CustomResourceAdded, "applying");
        let next = status.set_phase(at(20), Phase::Applied, Reason::ApplySuccessful, "applied");

        assert_eq!(next.last_transition_time, Some(at(20)));
    }

    #[test]
    fn read_write_round_trips_through_an_unstructured_value() {
        let status = CustomResourceStatus::default()
            .set_phase(at(10), Phase::Applied, Reason::ApplySuccessful, "applied")
            .with_release(Some(ReleaseSnapshot {
                name: "manifest-operator-dory".to_string(),
                revision: 2,
                status: ReleaseStatus::Deployed,
            }));

        let cr = CustomResourceView::from(DynamicObject {
            types: None,
            metadata: ObjectMeta::default(),
            data: json!({ "status": status.to_value() }),
        });

        assert_eq!(CustomResourceStatus::read(&cr), status);
    }
}
