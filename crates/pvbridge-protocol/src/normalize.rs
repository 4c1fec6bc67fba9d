//! Update normalization: raw provider snapshots to wire-ready updates.
//!
//! Pure and deterministic. Non-empty numeric arrays move out of `value` into
//! exactly one packed array field; everything else passes through. Numbers
//! JSON cannot carry (NaN, infinities) are dropped from the output instead of
//! turning into `null`.

use pvbridge_core::{Alarm, Control, Display, PvValue, RawUpdate, TimeStamp, ValueAlarm};
use serde::Serialize;

use crate::codec::EncodedArray;

/// Normalized form of a [`RawUpdate`].
///
/// Absent fields are omitted from the serialized object. At most one packed
/// array is present, and when it is, `value` is not.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<PvValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alarm: Option<Alarm>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_stamp: Option<TimeStamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<Display>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control: Option<Control>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_alarm: Option<ValueAlarm>,
    #[serde(flatten)]
    pub array: Option<EncodedArray>,
}

/// Normalizes a raw update.
pub fn normalize(raw: RawUpdate) -> CanonicalUpdate {
    let (value, array) = split_value(raw.value);

    CanonicalUpdate {
        value,
        array,
        alarm: raw.alarm,
        time_stamp: raw.time_stamp,
        display: raw.display.map(sanitize_display),
        control: raw.control.map(sanitize_control),
        value_alarm: raw.value_alarm.map(sanitize_value_alarm),
    }
}

/// Decides between the direct value field and a packed array.
fn split_value(value: Option<PvValue>) -> (Option<PvValue>, Option<EncodedArray>) {
    match value {
        Some(PvValue::DoubleArray(values)) if !values.is_empty() => {
            (None, Some(EncodedArray::from_doubles(&values)))
        }
        Some(PvValue::IntArray(values)) if !values.is_empty() => {
            (None, EncodedArray::from_ints(&values))
        }
        Some(PvValue::Double(v)) if !v.is_finite() => (None, None),
        // Scalars, string arrays and empty arrays stay as they are.
        other => (other, None),
    }
}

fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

fn sanitize_display(display: Display) -> Display {
    Display {
        limit_low: finite(display.limit_low),
        limit_high: finite(display.limit_high),
        ..display
    }
}

fn sanitize_control(control: Control) -> Control {
    Control {
        limit_low: finite(control.limit_low),
        limit_high: finite(control.limit_high),
        min_step: finite(control.min_step),
    }
}

fn sanitize_value_alarm(alarm: ValueAlarm) -> ValueAlarm {
    ValueAlarm {
        low_alarm_limit: finite(alarm.low_alarm_limit),
        low_warning_limit: finite(alarm.low_warning_limit),
        high_warning_limit: finite(alarm.high_warning_limit),
        high_alarm_limit: finite(alarm.high_alarm_limit),
        hysteresis: finite(alarm.hysteresis),
        ..alarm
    }
}
