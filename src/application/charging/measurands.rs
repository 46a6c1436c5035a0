//! MeterValues sample parsing
//!
//! Payloads are decoded leniently: unknown measurands, units, phases and
//! non-numeric values are skipped instead of failing the whole message.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

use crate::domain::MeterReading;

pub const ENERGY_REGISTER: &str = "Energy.Active.Import.Register";
pub const POWER: &str = "Power.Active.Import";
pub const VOLTAGE: &str = "Voltage";
pub const CURRENT: &str = "Current.Import";
pub const SOC: &str = "SoC";
pub const TEMPERATURE: &str = "Temperature";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterValue {
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sampled_value: Vec<SampledValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampledValue {
    /// Chargers send this as a string; some send a bare number.
    pub value: Value,
    pub measurand: Option<String>,
    pub unit: Option<String>,
    pub phase: Option<String>,
    pub context: Option<String>,
}

impl SampledValue {
    fn numeric(&self) -> Option<f64> {
        match &self.value {
            Value::String(s) => s.trim().parse().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
        .filter(|v: &f64| v.is_finite())
    }

    fn scaled(&self, kilo_unit: &str) -> Option<f64> {
        let value = self.numeric()?;
        match self.unit.as_deref() {
            Some(unit) if unit.eq_ignore_ascii_case(kilo_unit) => Some(value * 1000.0),
            _ => Some(value),
        }
    }

    /// Per-phase sample (L1, L2, L3); neutral and unphased samples are not.
    fn is_line_phase(&self) -> bool {
        self.phase
            .as_deref()
            .is_some_and(|p| p.len() == 2 && p.starts_with('L'))
    }
}

/// Fold MeterValue entries into one reading.
///
/// * energy register in kWh becomes Wh and power in kW becomes W
/// * a sample without a measurand is an energy register reading
/// * phased currents are summed, phased voltages averaged
/// * the last entry wins for everything else
pub fn parse_meter_values(values: &[MeterValue]) -> MeterReading {
    let mut reading = MeterReading::default();

    for meter_value in values {
        let mut phase_current: Option<f64> = None;
        let mut phase_voltages: Vec<f64> = Vec::new();

        for sample in &meter_value.sampled_value {
            let measurand = sample.measurand.as_deref().unwrap_or(ENERGY_REGISTER);
            match measurand {
                ENERGY_REGISTER => {
                    if let Some(wh) = sample.scaled("kWh") {
                        reading.meter_value = Some(wh);
                    }
                }
                POWER => {
                    if let Some(w) = sample.scaled("kW") {
                        reading.power = Some(w);
                    }
                }
                VOLTAGE => {
                    if let Some(v) = sample.numeric() {
                        if sample.is_line_phase() {
                            phase_voltages.push(v);
                        } else {
                            reading.voltage = Some(v);
                        }
                    }
                }
                CURRENT => {
                    if let Some(a) = sample.numeric() {
                        if sample.is_line_phase() {
                            *phase_current.get_or_insert(0.0) += a;
                        } else {
                            reading.current = Some(a);
                        }
                    }
                }
                SOC => {
                    if let Some(v) = sample.numeric() {
                        reading.soc = Some(v);
                    }
                }
                TEMPERATURE => {
                    if let Some(v) = sample.numeric() {
                        reading.temperature = Some(v);
                    }
                }
                other => trace!(measurand = other, "Ignoring measurand"),
            }
        }

        if let Some(total) = phase_current {
            reading.current = Some(total);
        }
        if !phase_voltages.is_empty() {
            let sum: f64 = phase_voltages.iter().sum();
            reading.voltage = Some(sum / phase_voltages.len() as f64);
        }
        if meter_value.timestamp.is_some() {
            reading.timestamp = meter_value.timestamp;
        }
    }

    reading
}
