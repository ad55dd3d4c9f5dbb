//! Simulated sensors feeding the routing pipeline
//!
//! Each registered device runs one producer task that ticks on a fixed
//! interval and sends a [`SensorMessage`] into the pipeline's bounded
//! channel. A full channel blocks the producer until the pipeline catches up.

mod sine;
mod temp_humidity;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::Error;

pub use sine::SineCurve;
pub use temp_humidity::TemperatureHumidity;

/// One reading from a sensor
#[derive(Debug, Clone, PartialEq)]
pub struct SensorMessage {
    /// UID of the producing device, the root of every field's subject
    pub sensor_uid: String,
    /// Field key to value
    pub data: Map<String, Value>,
    /// Semantic-graph context describing the fields
    pub schema: Value,
}

/// A source of readings
pub trait Sensor: Send + 'static {
    /// Schema attached to every reading
    fn schema(&self) -> Value;

    /// Produce the next reading
    fn read(&mut self) -> Map<String, Value>;
}

/// Device types the node can simulate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceKind {
    /// Emits `value` following a sine curve
    FakeSine,
    /// Emits `temp` and `humidity` random walks
    FakeTempHumidity,
}

impl DeviceKind {
    /// Wire name of the kind
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FakeSine => "fake-sine",
            Self::FakeTempHumidity => "fake-temp-humidity",
        }
    }

    /// Human-readable description used for the device's metadata record
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::FakeSine => "fake device producing a sine curve",
            Self::FakeTempHumidity => "fake device producing temperature and humidity values",
        }
    }

    /// Build a fresh sensor of this kind
    #[must_use]
    pub fn sensor(self) -> Box<dyn Sensor> {
        match self {
            Self::FakeSine => Box::new(SineCurve::new()),
            Self::FakeTempHumidity => Box::new(TemperatureHumidity::new()),
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fake-sine" => Ok(Self::FakeSine),
            "fake-temp-humidity" => Ok(Self::FakeTempHumidity),
            other => Err(Error::Validation(format!("unknown device type: {other}"))),
        }
    }
}

/// Run a sensor as a producer task
///
/// The first reading is sent one full `period` after spawning. The task ends
/// when `cancel` fires or the pipeline drops its receiver.
pub fn spawn_producer(
    mut sensor: Box<dyn Sensor>,
    sensor_uid: String,
    period: Duration,
    tx: mpsc::Sender<SensorMessage>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let schema = sensor.schema();
        let mut interval = tokio::time::interval(period);
        // Skip the first immediate tick
        interval.tick().await;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let msg = SensorMessage {
                sensor_uid: sensor_uid.clone(),
                data: sensor.read(),
                schema: schema.clone(),
            };

            let sent = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                sent = tx.send(msg) => sent,
            };
            if sent.is_err() {
                tracing::debug!(sensor = %sensor_uid, "pipeline closed, stopping sensor");
                break;
            }
        }

        tracing::debug!(sensor = %sensor_uid, "sensor stopped");
    })
}

/// Schema shared by the simulated sensors: an `m3-lite` sensor in `domain`
fn sensor_schema(terms: &[(&str, &str)], domain: &str) -> Value {
    let mut context = Map::new();
    context.insert("decode".into(), "http://decode.eu#".into());
    context.insert("m3-lite".into(), "http://purl.org/iot/vocab/m3-lite#".into());
    context.insert("domain".into(), "decode:hasDomain".into());
    for (term, iri) in terms {
        context.insert((*term).to_string(), (*iri).into());
    }

    serde_json::json!({
        "@context": context,
        "@type": "m3-lite:Sensor",
        "domain": {"@type": domain},
    })
}
