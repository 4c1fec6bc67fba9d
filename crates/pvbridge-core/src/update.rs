//! Raw variable updates as produced by a provider.

use crate::metadata::{Alarm, Control, Display, TimeStamp, ValueAlarm};
use crate::value::PvValue;

/// Snapshot of one variable at one instant, as handed over by the provider.
///
/// Every group is optional: providers fill in what the underlying channel
/// carries. Transient - consumed by the normalizer right after the hand-off.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawUpdate {
    pub value: Option<PvValue>,
    pub alarm: Option<Alarm>,
    pub time_stamp: Option<TimeStamp>,
    pub display: Option<Display>,
    pub control: Option<Control>,
    pub value_alarm: Option<ValueAlarm>,
}

impl RawUpdate {
    /// Creates an update carrying only a value.
    pub fn with_value(value: impl Into<PvValue>) -> Self {
        Self {
            value: Some(value.into()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn alarm(mut self, alarm: Alarm) -> Self {
        self.alarm = Some(alarm);
        self
    }

    #[must_use]
    pub fn time_stamp(mut self, time_stamp: TimeStamp) -> Self {
        self.time_stamp = Some(time_stamp);
        self
    }

    #[must_use]
    pub fn display(mut self, display: Display) -> Self {
        self.display = Some(display);
        self
    }

    #[must_use]
    pub fn control(mut self, control: Control) -> Self {
        self.control = Some(control);
        self
    }

    #[must_use]
    pub fn value_alarm(mut self, value_alarm: ValueAlarm) -> Self {
        self.value_alarm = Some(value_alarm);
        self
    }
}
