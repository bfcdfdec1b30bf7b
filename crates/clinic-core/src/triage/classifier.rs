//! Score → band classification.

use crate::models::Band;

/// Lower bounds of each band, checked from high to low.
pub const BAND_THRESHOLDS: [(u8, Band); 3] = [
    (80, Band::Critical),
    (60, Band::High),
    (35, Band::Medium),
];

/// Total classifier: every score maps to exactly one band.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriageClassifier;

impl TriageClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, score: u8) -> Band {
        BAND_THRESHOLDS
            .iter()
            .find(|(min, _)| score >= *min)
            .map_or(Band::Low, |(_, band)| *band)
    }
}
