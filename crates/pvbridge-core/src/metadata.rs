//! Normative-type metadata groups attached to a variable update.
//!
//! Each group mirrors the structure of the same name in the control system's
//! normative types. Field names serialize in camelCase as the browser
//! clients expect, and unset optional fields are omitted rather than
//! written as `null`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alarm state of a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    pub severity: i32,
    pub status: i32,
    pub message: String,
}

impl Alarm {
    /// The "no alarm" state: severity 0, status 0.
    pub fn none() -> Self {
        Self {
            severity: 0,
            status: 0,
            message: "NO_ALARM".to_string(),
        }
    }
}

impl Default for Alarm {
    fn default() -> Self {
        Self::none()
    }
}

/// Time at which the value was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeStamp {
    pub seconds_past_epoch: i64,
    pub nanoseconds: i32,
    pub user_tag: i32,
}

impl TimeStamp {
    /// Builds a timestamp from a UTC instant.
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self {
            seconds_past_epoch: at.timestamp(),
            nanoseconds: i32::try_from(at.timestamp_subsec_nanos()).unwrap_or(0),
            user_tag: 0,
        }
    }

    /// The current wall-clock time.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }
}

/// Display hints: limits, units, formatting and enum choices.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Display {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
}

/// Control limits applied to writes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Control {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_step: Option<f64>,
}

/// Value alarm thresholds and the severities raised when crossing them.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueAlarm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_alarm_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_warning_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_warning_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_alarm_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_alarm_severity: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_warning_severity: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_warning_severity: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_alarm_severity: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hysteresis: Option<f64>,
}
