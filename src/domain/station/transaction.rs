//! Transaction lifecycle model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A live charging session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: i32,
    pub id_tag: String,
    pub start_time: DateTime<Utc>,
    /// Wh
    pub meter_start: f64,
    /// Wh, never decreases within one transaction
    pub meter_value: f64,
    /// W
    pub power: f64,
    /// kWh delivered so far
    pub energy: f64,
    pub voltage: f64,
    pub current: f64,
    pub soc: Option<f64>,
    pub temperature: Option<f64>,
}

/// One telemetry update, produced by real MeterValues parsing or by the
/// simulator's meter tick. Absent fields leave the transaction unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeterReading {
    pub timestamp: Option<DateTime<Utc>>,
    /// Energy.Active.Import.Register in Wh
    pub meter_value: Option<f64>,
    pub power: Option<f64>,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub soc: Option<f64>,
    pub temperature: Option<f64>,
}

impl MeterReading {
    pub fn is_empty(&self) -> bool {
        self.meter_value.is_none()
            && self.power.is_none()
            && self.voltage.is_none()
            && self.current.is_none()
            && self.soc.is_none()
            && self.temperature.is_none()
    }
}

/// A bounded meter-history entry (same shape for real and simulated stations).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterSample {
    pub timestamp: DateTime<Utc>,
    pub meter_value: f64,
    pub power: f64,
    pub energy: f64,
    pub voltage: f64,
    pub current: f64,
    pub soc: Option<f64>,
    pub temperature: Option<f64>,
}

/// A finished transaction as kept in session history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedSession {
    pub id: i32,
    pub id_tag: String,
    pub start_time: DateTime<Utc>,
    pub stop_time: DateTime<Utc>,
    pub meter_start: f64,
    pub meter_stop: f64,
    /// kWh, two decimals
    pub energy_delivered: String,
    pub duration_secs: i64,
    /// kW, two decimals
    pub avg_power: String,
    /// Currency units at the station price, two decimals
    pub cost: String,
    pub final_soc: Option<f64>,
}

impl Transaction {
    pub fn new(
        id: i32,
        id_tag: impl Into<String>,
        meter_start: f64,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            id_tag: id_tag.into(),
            start_time,
            meter_start,
            meter_value: meter_start,
            power: 0.0,
            energy: 0.0,
            voltage: 0.0,
            current: 0.0,
            soc: None,
            temperature: None,
        }
    }

    pub fn with_soc(mut self, soc: Option<f64>) -> Self {
        self.soc = soc.map(|s| s.clamp(0.0, 100.0));
        self
    }

    /// Fold a reading into the live fields. A register value below the current
    /// one is ignored so `meter_value` stays monotonic.
    pub fn apply_reading(&mut self, reading: &MeterReading) {
        if let Some(value) = reading.meter_value {
            if value >= self.meter_value {
                self.meter_value = value;
            }
        }
        if let Some(power) = reading.power {
            self.power = power.max(0.0);
        }
        if let Some(voltage) = reading.voltage {
            self.voltage = voltage;
        }
        if let Some(current) = reading.current {
            self.current = current;
        }
        if let Some(soc) = reading.soc {
            self.soc = Some(soc.clamp(0.0, 100.0));
        }
        if let Some(temperature) = reading.temperature {
            self.temperature = Some(temperature);
        }
        self.energy = energy_kwh(self.meter_start, self.meter_value);
    }

    pub fn sample(&self, timestamp: DateTime<Utc>) -> MeterSample {
        MeterSample {
            timestamp,
            meter_value: self.meter_value,
            power: self.power,
            energy: self.energy,
            voltage: self.voltage,
            current: self.current,
            soc: self.soc,
            temperature: self.temperature,
        }
    }

    /// Close the transaction.
    pub fn finalize(
        self,
        meter_stop: f64,
        stop_time: DateTime<Utc>,
        price_per_kwh: f64,
    ) -> CompletedSession {
        let meter_stop = meter_stop.max(self.meter_start);
        let energy = energy_kwh(self.meter_start, meter_stop);
        let duration_secs = (stop_time - self.start_time).num_seconds().max(0);
        let avg_power = if duration_secs > 0 {
            energy / (duration_secs as f64 / 3600.0)
        } else {
            0.0
        };

        CompletedSession {
            id: self.id,
            id_tag: self.id_tag,
            start_time: self.start_time,
            stop_time,
            meter_start: self.meter_start,
            meter_stop,
            energy_delivered: format!("{:.2}", energy),
            duration_secs,
            avg_power: format!("{:.2}", avg_power),
            cost: format!("{:.2}", energy * price_per_kwh),
            final_soc: self.soc,
        }
    }
}

/// kWh between two register readings, never negative.
pub fn energy_kwh(meter_start: f64, meter_value: f64) -> f64 {
    ((meter_value - meter_start) / 1000.0).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn register_never_goes_backwards() {
        let mut tx = Transaction::new(1, "TAG", 1_000.0, Utc::now());
        tx.apply_reading(&MeterReading {
            meter_value: Some(2_500.0),
            ..Default::default()
        });
        tx.apply_reading(&MeterReading {
            meter_value: Some(2_000.0),
            power: Some(7_000.0),
            ..Default::default()
        });
        assert_eq!(tx.meter_value, 2_500.0);
        assert_eq!(tx.power, 7_000.0);
        assert!((tx.energy - 1.5).abs() < 1e-9);
    }

    #[test]
    fn zero_energy_session_costs_nothing() {
        let start = Utc::now();
        let tx = Transaction::new(7, "TAG", 5_000.0, start);
        let done = tx.finalize(5_000.0, start + Duration::seconds(60), 0.35);
        assert_eq!(done.energy_delivered, "0.00");
        assert_eq!(done.cost, "0.00");
        assert_eq!(done.avg_power, "0.00");
        assert_eq!(done.duration_secs, 60);
    }

    #[test]
    fn finalize_computes_avg_power_and_cost() {
        let start = Utc::now();
        let tx = Transaction::new(8, "TAG", 0.0, start);
        let done = tx.finalize(11_000.0, start + Duration::minutes(30), 0.40);
        assert_eq!(done.energy_delivered, "11.00");
        assert_eq!(done.avg_power, "22.00");
        assert_eq!(done.cost, "4.40");
    }

    #[test]
    fn meter_stop_below_start_clamps_to_zero_energy() {
        let start = Utc::now();
        let tx = Transaction::new(9, "TAG", 3_000.0, start);
        let done = tx.finalize(2_000.0, start, 0.35);
        assert_eq!(done.energy_delivered, "0.00");
        assert_eq!(done.meter_stop, 3_000.0);
    }
}
