//! Vital-sign models.

use serde::{Deserialize, Serialize};

use crate::ClinicError;

/// Inclusive plausibility range for a single vital sign.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VitalRange {
    pub min: f64,
    pub max: f64,
}

impl VitalRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Beats per minute
pub const HEART_RATE_RANGE: VitalRange = VitalRange::new(30.0, 220.0);
/// Oxygen saturation, percent
pub const SPO2_RANGE: VitalRange = VitalRange::new(50.0, 100.0);
/// Degrees Celsius
pub const TEMPERATURE_RANGE: VitalRange = VitalRange::new(30.0, 43.0);
/// mmHg
pub const SYSTOLIC_RANGE: VitalRange = VitalRange::new(50.0, 260.0);
/// mmHg
pub const DIASTOLIC_RANGE: VitalRange = VitalRange::new(30.0, 150.0);
/// Breaths per minute
pub const RESPIRATORY_RATE_RANGE: VitalRange = VitalRange::new(4.0, 60.0);

/// Raw vital-sign input as captured by the intake form or a sensor.
///
/// Any field may be missing, zero, negative or non-finite. Nothing is
/// validated here; see [`crate::triage::VitalsNormalizer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVitals {
    pub heart_rate: Option<f64>,
    pub spo2: Option<f64>,
    pub temperature_c: Option<f64>,
    pub blood_pressure_systolic: Option<f64>,
    pub blood_pressure_diastolic: Option<f64>,
    pub respiratory_rate: Option<f64>,
}

impl RawVitals {
    /// Raw input with the five core readings present.
    pub fn new(heart_rate: f64, spo2: f64, temperature_c: f64, systolic: f64, diastolic: f64) -> Self {
        Self {
            heart_rate: Some(heart_rate),
            spo2: Some(spo2),
            temperature_c: Some(temperature_c),
            blood_pressure_systolic: Some(systolic),
            blood_pressure_diastolic: Some(diastolic),
            respiratory_rate: None,
        }
    }
}

/// Canonical, clamped vital-sign record.
///
/// `None` means the reading is unknown; the scorer treats it as
/// contributing nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalsRecord {
    pub heart_rate: Option<u32>,
    pub spo2: Option<u32>,
    pub temperature_c: Option<f64>,
    pub blood_pressure_systolic: Option<u32>,
    pub blood_pressure_diastolic: Option<u32>,
    pub respiratory_rate: Option<u32>,
}

impl VitalsRecord {
    /// Check whether at least one reading is known.
    pub fn has_any(&self) -> bool {
        self.heart_rate.is_some()
            || self.spo2.is_some()
            || self.temperature_c.is_some()
            || self.blood_pressure_systolic.is_some()
            || self.blood_pressure_diastolic.is_some()
            || self.respiratory_rate.is_some()
    }

    /// Verify every known reading lies inside its plausibility range.
    ///
    /// Records produced by the normalizer always pass. This guards records
    /// that arrive already built, e.g. deserialized from a UI payload.
    pub fn validate(&self) -> Result<(), ClinicError> {
        fn check(name: &str, value: Option<f64>, range: VitalRange) -> Result<(), ClinicError> {
            match value {
                Some(v) if !v.is_finite() => Err(ClinicError::Validation(format!(
                    "{} is not a finite number",
                    name
                ))),
                Some(v) if !range.contains(v) => Err(ClinicError::Validation(format!(
                    "{} {} outside [{}, {}]",
                    name, v, range.min, range.max
                ))),
                _ => Ok(()),
            }
        }

        check("heartRate", self.heart_rate.map(f64::from), HEART_RATE_RANGE)?;
        check("spo2", self.spo2.map(f64::from), SPO2_RANGE)?;
        check("temperatureC", self.temperature_c, TEMPERATURE_RANGE)?;
        check(
            "bloodPressureSystolic",
            self.blood_pressure_systolic.map(f64::from),
            SYSTOLIC_RANGE,
        )?;
        check(
            "bloodPressureDiastolic",
            self.blood_pressure_diastolic.map(f64::from),
            DIASTOLIC_RANGE,
        )?;
        check(
            "respiratoryRate",
            self.respiratory_rate.map(f64::from),
            RESPIRATORY_RATE_RANGE,
        )?;
        Ok(())
    }
}
