//! Weighted additive risk scorer.
//!
//! Every component is a step function that never decreases as its input
//! becomes more dangerous, and the sum is clamped to `[0, 100]`, so the
//! final score is monotonic in each input.

use serde::{Deserialize, Serialize};

use crate::models::{ComplaintFlags, SymptomFlag, VitalsRecord};

/// Upper bound of the risk score.
pub const MAX_SCORE: u8 = 100;

/// Points contributed by each scoring factor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub temperature: u32,
    pub spo2: u32,
    pub heart_rate: u32,
    pub blood_pressure: u32,
    pub symptoms: u32,
}

impl ScoreBreakdown {
    /// Sum of all factors, clamped to `[0, MAX_SCORE]`.
    pub fn total(&self) -> u8 {
        let sum = self.temperature + self.spo2 + self.heart_rate + self.blood_pressure + self.symptoms;
        sum.min(u32::from(MAX_SCORE)) as u8
    }
}

/// Risk scorer over normalized vitals and symptom flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskScorer;

impl RiskScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score in `[0, 100]`. Unknown readings contribute 0.
    pub fn score(&self, vitals: &VitalsRecord, flags: &ComplaintFlags) -> u8 {
        self.breakdown(vitals, flags).total()
    }

    /// Per-factor contribution, before clamping.
    pub fn breakdown(&self, vitals: &VitalsRecord, flags: &ComplaintFlags) -> ScoreBreakdown {
        ScoreBreakdown {
            temperature: vitals.temperature_c.map_or(0, temperature_points),
            spo2: vitals.spo2.map_or(0, spo2_points),
            heart_rate: vitals.heart_rate.map_or(0, heart_rate_points),
            blood_pressure: blood_pressure_points(
                vitals.blood_pressure_systolic,
                vitals.blood_pressure_diastolic,
            ),
            symptoms: flags.iter().map(flag_points).sum(),
        }
    }
}

fn temperature_points(temp: f64) -> u32 {
    if temp >= 39.5 {
        30
    } else if temp >= 38.5 {
        22
    } else if temp >= 37.6 {
        12
    } else {
        4
    }
}

fn spo2_points(spo2: u32) -> u32 {
    if spo2 <= 90 {
        35
    } else if spo2 <= 93 {
        25
    } else if spo2 <= 95 {
        12
    } else {
        2
    }
}

fn heart_rate_points(hr: u32) -> u32 {
    if hr >= 145 {
        28
    } else if hr >= 125 {
        18
    } else if hr >= 110 {
        10
    } else {
        3
    }
}

const BLOOD_PRESSURE_POINTS: u32 = 15;

/// Hypertension and hypotension are both penalised, at most once per reading.
fn blood_pressure_points(systolic: Option<u32>, diastolic: Option<u32>) -> u32 {
    let high = |v: Option<u32>, limit: u32| v.is_some_and(|x| x >= limit);
    let low = |v: Option<u32>, limit: u32| v.is_some_and(|x| x <= limit);

    // A single component cannot be both high and low.
    debug_assert!(!(high(systolic, 160) && low(systolic, 90)));
    debug_assert!(!(high(diastolic, 110) && low(diastolic, 55)));

    let hypertensive = high(systolic, 160) || high(diastolic, 110);
    let hypotensive = low(systolic, 90) || low(diastolic, 55);

    if hypertensive || hypotensive {
        BLOOD_PRESSURE_POINTS
    } else {
        0
    }
}

fn flag_points(flag: SymptomFlag) -> u32 {
    match flag {
        SymptomFlag::Respiratory | SymptomFlag::Neuro => 18,
        SymptomFlag::Fever => 10,
        SymptomFlag::Gastrointestinal => 8,
        SymptomFlag::Trauma => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vitals(hr: u32, spo2: u32, temp: f64, sys: u32, dia: u32) -> VitalsRecord {
        VitalsRecord {
            heart_rate: Some(hr),
            spo2: Some(spo2),
            temperature_c: Some(temp),
            blood_pressure_systolic: Some(sys),
            blood_pressure_diastolic: Some(dia),
            respiratory_rate: None,
        }
    }

    #[test]
    fn test_normal_vitals_score_low() {
        let score = RiskScorer::new().score(&vitals(72, 98, 36.8, 118, 76), &ComplaintFlags::new());
        assert_eq!(score, 9); // 3 + 2 + 4
    }

    #[test]
    fn test_unknown_vitals_contribute_nothing() {
        let score = RiskScorer::new().score(&VitalsRecord::default(), &ComplaintFlags::new());
        assert_eq!(score, 0);
    }

    #[test]
    fn test_breakdown_thresholds() {
        let breakdown = RiskScorer::new().breakdown(&vitals(128, 94, 38.9, 130, 84), &ComplaintFlags::new());
        assert_eq!(
            breakdown,
            ScoreBreakdown {
                temperature: 22,
                spo2: 12,
                heart_rate: 18,
                blood_pressure: 0,
                symptoms: 0,
            }
        );
    }

    #[test]
    fn test_blood_pressure_not_double_counted() {
        // Systolic high while diastolic low still counts once.
        assert_eq!(blood_pressure_points(Some(170), Some(50)), 15);
        assert_eq!(blood_pressure_points(Some(85), Some(70)), 15);
        assert_eq!(blood_pressure_points(Some(120), Some(115)), 15);
        assert_eq!(blood_pressure_points(Some(120), Some(80)), 0);
        assert_eq!(blood_pressure_points(None, Some(50)), 15);
        assert_eq!(blood_pressure_points(None, None), 0);
    }

    #[test]
    fn test_flag_points() {
        let flags: ComplaintFlags = SymptomFlag::ALL.into_iter().collect();
        let breakdown = RiskScorer::new().breakdown(&VitalsRecord::default(), &flags);
        assert_eq!(breakdown.symptoms, 18 + 18 + 10 + 6 + 8);
    }

    #[test]
    fn test_score_clamped_at_max() {
        let flags: ComplaintFlags = SymptomFlag::ALL.into_iter().collect();
        let score = RiskScorer::new().score(&vitals(200, 60, 42.0, 250, 140), &flags);
        assert_eq!(score, MAX_SCORE);
    }
}
