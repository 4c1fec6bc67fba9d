//! In-process provider with local and simulated variables.
//!
//! - `sim://ramp`, `sim://sine`, `sim://wave` produce a new sample every
//!   second and are read-only.
//! - Any other name is a local variable: created as `0.0` on first
//!   subscribe or write, and updated by writes.
//!
//! Useful for running the bridge without a control system and as a test
//! double.

use std::collections::HashMap;
use std::f64::consts::TAU;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::debug;

use pvbridge_core::{Alarm, Display, PvValue, RawUpdate, TimeStamp, VariableName};

use super::{ProviderError, PvProvider, UpdateSink};

/// Name prefix of simulated variables.
pub const SIM_PREFIX: &str = "sim://";

const SIM_PERIOD: Duration = Duration::from_secs(1);
const RAMP_STEPS: u64 = 100;
const SINE_PERIOD_TICKS: f64 = 60.0;
const WAVE_POINTS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Simulation {
    Ramp,
    Sine,
    Wave,
}

impl Simulation {
    fn parse(name: &str) -> Option<Self> {
        match name.strip_prefix(SIM_PREFIX)? {
            "ramp" => Some(Self::Ramp),
            "sine" => Some(Self::Sine),
            "wave" => Some(Self::Wave),
            _ => None,
        }
    }

    fn sample(self, tick: u64) -> RawUpdate {
        let update = match self {
            Self::Ramp => RawUpdate::with_value((tick % RAMP_STEPS) as f64).display(Display {
                limit_low: Some(0.0),
                limit_high: Some((RAMP_STEPS - 1) as f64),
                precision: Some(0),
                ..Default::default()
            }),
            Self::Sine => {
                let phase = TAU * tick as f64 / SINE_PERIOD_TICKS;
                RawUpdate::with_value(phase.sin()).display(Display {
                    limit_low: Some(-1.0),
                    limit_high: Some(1.0),
                    precision: Some(3),
                    ..Default::default()
                })
            }
            Self::Wave => {
                let shift = TAU * tick as f64 / WAVE_POINTS as f64;
                let points: Vec<f64> = (0..WAVE_POINTS)
                    .map(|i| (TAU * i as f64 / WAVE_POINTS as f64 + shift).sin())
                    .collect();
                RawUpdate::with_value(PvValue::DoubleArray(points))
            }
        };

        update.alarm(Alarm::none()).time_stamp(TimeStamp::now())
    }
}

/// An active upstream subscription.
struct Feed {
    sink: UpdateSink,
    ticker: Option<JoinHandle<()>>,
}

impl Drop for Feed {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

#[derive(Default)]
struct LocalState {
    values: HashMap<VariableName, PvValue>,
    feeds: HashMap<VariableName, Feed>,
}

/// In-memory provider.
#[derive(Clone, Default)]
pub struct LocalProvider {
    state: Arc<Mutex<LocalState>>,
}

impl LocalProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stored value of a local variable.
    pub async fn value(&self, variable: &VariableName) -> Option<PvValue> {
        self.state.lock().await.values.get(variable).cloned()
    }

    /// Whether `variable` has an active upstream subscription.
    pub async fn is_monitored(&self, variable: &VariableName) -> bool {
        self.state.lock().await.feeds.contains_key(variable)
    }
}

fn local_update(value: PvValue) -> RawUpdate {
    RawUpdate::with_value(value)
        .alarm(Alarm::none())
        .time_stamp(TimeStamp::now())
}

fn spawn_ticker(simulation: Simulation, variable: VariableName, sink: UpdateSink) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(SIM_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tick: u64 = 0;

        loop {
            ticker.tick().await;
            sink.push(variable.clone(), simulation.sample(tick));
            if sink.is_closed() {
                debug!(pv = %variable, "Simulation stopping: dispatcher gone");
                break;
            }
            tick = tick.wrapping_add(1);
        }
    })
}

#[async_trait]
impl PvProvider for LocalProvider {
    async fn subscribe(
        &self,
        variable: &VariableName,
        updates: UpdateSink,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        if state.feeds.contains_key(variable) {
            return Ok(());
        }

        let feed = if variable.as_str().starts_with(SIM_PREFIX) {
            let simulation = Simulation::parse(variable.as_str())
                .ok_or_else(|| ProviderError::UnknownChannel(variable.clone()))?;
            let ticker = spawn_ticker(simulation, variable.clone(), updates.clone());
            Feed {
                sink: updates,
                ticker: Some(ticker),
            }
        } else {
            let current = state
                .values
                .entry(variable.clone())
                .or_insert(PvValue::Double(0.0))
                .clone();
            updates.push(variable.clone(), local_update(current));
            Feed {
                sink: updates,
                ticker: None,
            }
        };

        debug!(pv = %variable, "Monitoring started");
        state.feeds.insert(variable.clone(), feed);
        Ok(())
    }

    async fn unsubscribe(&self, variable: &VariableName) -> Result<(), ProviderError> {
        if self.state.lock().await.feeds.remove(variable).is_some() {
            debug!(pv = %variable, "Monitoring stopped");
        }
        Ok(())
    }

    async fn write(&self, variable: &VariableName, value: PvValue) -> Result<(), ProviderError> {
        if variable.as_str().starts_with(SIM_PREFIX) {
            return Err(ProviderError::ReadOnly(variable.clone()));
        }

        let mut state = self.state.lock().await;
        state.values.insert(variable.clone(), value.clone());
        if let Some(feed) = state.feeds.get(variable) {
            feed.sink.push(variable.clone(), local_update(value));
        }
        Ok(())
    }
}
