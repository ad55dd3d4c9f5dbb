//! Sine-curve sensor

use std::f64::consts::PI;

use serde_json::{Map, Value};

use super::{Sensor, sensor_schema};

/// Phase advance per reading
const STEP: f64 = PI / 18.0;

/// Emits `value` swinging between 60 and 300
#[derive(Debug, Default)]
pub struct SineCurve {
    phase: f64,
}

impl SineCurve {
    #[must_use]
    pub const fn new() -> Self {
        Self { phase: 0.0 }
    }
}

impl Sensor for SineCurve {
    fn schema(&self) -> Value {
        sensor_schema(
            &[
                ("xsd", "http://www.w3.org/2001/XMLSchema#"),
                ("value", "xsd:float"),
            ],
            "decode:Fun",
        )
    }

    fn read(&mut self) -> Map<String, Value> {
        let value = 120.0f64.mul_add(-self.phase.sin(), 180.0);
        self.phase += STEP;

        let mut data = Map::new();
        data.insert("value".to_string(), Value::from(value));
        data
    }
}
