//! Temperature and humidity sensor

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value};

use super::{Sensor, sensor_schema};

/// Emits `temp` and `humidity` as a shared random walk
#[derive(Debug)]
pub struct TemperatureHumidity {
    rng: StdRng,
    temp: f64,
    humidity: f64,
}

impl TemperatureHumidity {
    #[must_use]
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    fn with_rng(mut rng: StdRng) -> Self {
        let temp = rng.gen_range(0.0..22.0);
        let humidity = rng.gen_range(0.0..34.0);
        Self { rng, temp, humidity }
    }
}

impl Default for TemperatureHumidity {
    fn default() -> Self {
        Self::new()
    }
}

impl Sensor for TemperatureHumidity {
    fn schema(&self) -> Value {
        sensor_schema(
            &[
                ("humidity", "m3-lite:AirHumidity"),
                ("temp", "m3-lite:AirTemperature"),
            ],
            "m3-lite:Environment",
        )
    }

    fn read(&mut self) -> Map<String, Value> {
        let diff: f64 = self.rng.gen_range(0.0..1.0);
        let delta = if diff > 0.5 { diff } else { -diff };
        self.temp += delta;
        self.humidity += delta;

        let mut data = Map::new();
        data.insert("temp".to_string(), Value::from(self.temp));
        data.insert("humidity".to_string(), Value::from(self.humidity));
        data
    }
}
