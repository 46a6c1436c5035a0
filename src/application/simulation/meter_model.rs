//! Simulated charging curve
//!
//! One tick turns the current transaction state into the next meter reading.
//! Pure apart from the injected RNG, so a seeded `StdRng` makes it repeatable.

use rand::Rng;

use crate::domain::MeterReading;

/// Seconds to ramp from zero to rated power.
const RAMP_SECS: f64 = 30.0;
const START_TEMPERATURE: f64 = 25.0;
const TARGET_TEMPERATURE: f64 = 45.0;
const TEMPERATURE_APPROACH: f64 = 0.02;
/// Rated power from which the station is treated as a three-phase DC unit (400 V).
const HIGH_VOLTAGE_FROM_KW: f64 = 50.0;

#[derive(Debug, Clone, PartialEq)]
pub struct MeterModel {
    rated_power_w: f64,
    pack_wh: f64,
    tick_secs: f64,
}

/// Transaction state a tick starts from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickInput {
    /// Seconds since the simulated transaction started, including this tick
    pub elapsed_secs: f64,
    /// Wh
    pub meter_value: f64,
    pub soc: f64,
    pub temperature: Option<f64>,
}

impl MeterModel {
    pub fn new(rated_power_kw: f64, pack_kwh: f64, tick_secs: f64) -> Self {
        Self {
            rated_power_w: rated_power_kw.max(0.0) * 1000.0,
            pack_wh: pack_kwh.max(1.0) * 1000.0,
            tick_secs,
        }
    }

    fn nominal_voltage(&self) -> f64 {
        if self.rated_power_w >= HIGH_VOLTAGE_FROM_KW * 1000.0 {
            400.0
        } else {
            230.0
        }
    }

    /// Power before jitter: linear ramp, then tapering at high SoC.
    pub fn target_power(&self, elapsed_secs: f64, soc: f64) -> f64 {
        let ramp = (elapsed_secs / RAMP_SECS).clamp(0.0, 1.0);
        let taper = if soc > 90.0 {
            0.25
        } else if soc > 80.0 {
            0.5
        } else {
            1.0
        };
        self.rated_power_w * ramp * taper
    }

    pub fn tick<R: Rng + ?Sized>(&self, input: TickInput, rng: &mut R) -> MeterReading {
        let power = (self.target_power(input.elapsed_secs, input.soc)
            * (1.0 + rng.gen_range(-0.03..=0.03)))
        .max(0.0);
        let energy_wh = power * self.tick_secs / 3600.0;

        let voltage = self.nominal_voltage() + rng.gen_range(-5.0..=5.0);
        let current = if voltage > 0.0 { power / voltage } else { 0.0 };

        let soc = (input.soc + energy_wh / self.pack_wh * 100.0).min(100.0);

        let temperature = input.temperature.unwrap_or(START_TEMPERATURE);
        let temperature = temperature
            + (TARGET_TEMPERATURE - temperature) * TEMPERATURE_APPROACH
            + rng.gen_range(-0.2..=0.2);

        MeterReading {
            timestamp: None,
            meter_value: Some(input.meter_value + energy_wh),
            power: Some(power),
            voltage: Some(voltage),
            current: Some(current),
            soc: Some(soc),
            temperature: Some(temperature),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn input(elapsed_secs: f64, soc: f64) -> TickInput {
        TickInput {
            elapsed_secs,
            meter_value: 10_000.0,
            soc,
            temperature: None,
        }
    }

    #[test]
    fn ramps_then_holds() {
        let model = MeterModel::new(22.0, 60.0, 2.0);
        assert_eq!(model.target_power(0.0, 20.0), 0.0);
        assert!((model.target_power(15.0, 20.0) - 11_000.0).abs() < 1e-6);
        assert_eq!(model.target_power(30.0, 20.0), 22_000.0);
        assert_eq!(model.target_power(300.0, 20.0), 22_000.0);
    }

    #[test]
    fn tapers_at_high_soc() {
        let model = MeterModel::new(22.0, 60.0, 2.0);
        assert_eq!(model.target_power(60.0, 85.0), 11_000.0);
        assert_eq!(model.target_power(60.0, 95.0), 5_500.0);
    }

    #[test]
    fn tick_stays_within_jitter_bounds() {
        let model = MeterModel::new(22.0, 60.0, 2.0);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let r = model.tick(input(60.0, 20.0), &mut rng);
            let power = r.power.unwrap();
            assert!((21_340.0..=22_660.0).contains(&power));
            let added = r.meter_value.unwrap() - 10_000.0;
            assert!((added - power * 2.0 / 3600.0).abs() < 1e-9);
            let v = r.voltage.unwrap();
            assert!((225.0..=235.0).contains(&v));
            assert!((r.current.unwrap() - power / v).abs() < 1e-9);
            let t = r.temperature.unwrap();
            assert!((25.2..=25.6).contains(&t));
        }
    }

    #[test]
    fn dc_stations_run_at_400_volts() {
        let model = MeterModel::new(150.0, 60.0, 2.0);
        let mut rng = StdRng::seed_from_u64(1);
        let v = model.tick(input(60.0, 20.0), &mut rng).voltage.unwrap();
        assert!((395.0..=405.0).contains(&v));
    }

    #[test]
    fn soc_is_capped() {
        let model = MeterModel::new(350.0, 1.0, 60.0);
        let mut rng = StdRng::seed_from_u64(3);
        let r = model.tick(input(60.0, 99.9), &mut rng);
        assert_eq!(r.soc, Some(100.0));
    }

    #[test]
    fn seeded_runs_repeat() {
        let model = MeterModel::new(22.0, 60.0, 2.0);
        let a = model.tick(input(10.0, 50.0), &mut StdRng::seed_from_u64(9));
        let b = model.tick(input(10.0, 50.0), &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }
}
