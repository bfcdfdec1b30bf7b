//! Vital-sign normalizer.
//!
//! Handles:
//! - Missing, zero, negative and non-finite readings (→ unknown)
//! - Clamping into physiologically plausible ranges (lossy, never rejects)
//! - Rounding integer-valued vitals

use crate::models::{
    RawVitals, VitalRange, VitalsRecord, DIASTOLIC_RANGE, HEART_RATE_RANGE,
    RESPIRATORY_RATE_RANGE, SPO2_RANGE, SYSTOLIC_RANGE, TEMPERATURE_RANGE,
};

/// Normalizer for raw vital-sign input. Total: every input yields a record.
#[derive(Debug, Clone, Copy, Default)]
pub struct VitalsNormalizer;

impl VitalsNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize a raw reading set into a canonical record.
    pub fn normalize(&self, raw: &RawVitals) -> VitalsRecord {
        VitalsRecord {
            heart_rate: clamp_whole(raw.heart_rate, HEART_RATE_RANGE),
            spo2: clamp_whole(raw.spo2, SPO2_RANGE),
            temperature_c: clamp(raw.temperature_c, TEMPERATURE_RANGE),
            blood_pressure_systolic: clamp_whole(raw.blood_pressure_systolic, SYSTOLIC_RANGE),
            blood_pressure_diastolic: clamp_whole(raw.blood_pressure_diastolic, DIASTOLIC_RANGE),
            respiratory_rate: clamp_whole(raw.respiratory_rate, RESPIRATORY_RATE_RANGE),
        }
    }
}

/// A form field left at zero means the reading was not taken.
fn clamp(value: Option<f64>, range: VitalRange) -> Option<f64> {
    let v = value?;
    if !v.is_finite() || v <= 0.0 {
        return None;
    }
    Some(v.clamp(range.min, range.max))
}

fn clamp_whole(value: Option<f64>, range: VitalRange) -> Option<u32> {
    // Range bounds are whole numbers, so the rounded value stays in range.
    clamp(value, range).map(|v| v.round() as u32)
}
