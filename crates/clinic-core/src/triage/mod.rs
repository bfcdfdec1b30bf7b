//! Triage decision engine.
//!
//! Pipeline: Complaint + Vitals → Normalization → Scoring → Classification → Recommendation
//!
//! Every stage is a pure, total function. Nothing here returns an error;
//! bad input degrades by clamping.

mod classifier;
mod complaint;
mod normalizer;
mod recommendation;
mod scorer;

pub use classifier::*;
pub use complaint::*;
pub use normalizer::*;
pub use recommendation::*;
pub use scorer::*;

use chrono::{DateTime, Utc};

use crate::models::{RawVitals, TriageResult, VitalsRecord};

/// Main engine that coordinates the full triage pipeline.
#[derive(Debug, Clone, Default)]
pub struct TriageEngine {
    normalizer: VitalsNormalizer,
    analyzer: ComplaintAnalyzer,
    scorer: RiskScorer,
    classifier: TriageClassifier,
    builder: RecommendationBuilder,
}

impl TriageEngine {
    /// Create an engine with the default keyword table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with a customised complaint analyzer.
    pub fn with_analyzer(analyzer: ComplaintAnalyzer) -> Self {
        Self {
            analyzer,
            ..Self::default()
        }
    }

    /// Normalize raw readings into a canonical record.
    pub fn normalize(&self, raw: &RawVitals) -> VitalsRecord {
        self.normalizer.normalize(raw)
    }

    /// Run the full pipeline on already-normalized vitals.
    pub fn evaluate(&self, complaint: &str, vitals: &VitalsRecord, produced_at: DateTime<Utc>) -> TriageResult {
        // Step 1: Derive symptom flags from the complaint
        let flags = self.analyzer.analyze(complaint);

        // Step 2: Score and classify
        let breakdown = self.scorer.breakdown(vitals, &flags);
        let score = breakdown.total();
        let band = self.classifier.classify(score);

        tracing::debug!(?breakdown, score, %band, "triage scored");

        // Step 3: Build the recommendation
        let rec = self.builder.build(band, &flags, vitals);

        TriageResult::new(
            score,
            band,
            rec.decision_code,
            rec.recommendation,
            rec.red_flags,
            flags,
            produced_at,
        )
    }

    /// Normalize raw readings, then evaluate.
    pub fn assess(
        &self,
        complaint: &str,
        raw: &RawVitals,
        produced_at: DateTime<Utc>,
    ) -> (VitalsRecord, TriageResult) {
        let vitals = self.normalize(raw);
        let result = self.evaluate(complaint, &vitals, produced_at);
        (vitals, result)
    }

    pub fn analyzer(&self) -> &ComplaintAnalyzer {
        &self.analyzer
    }

    pub fn scorer(&self) -> &RiskScorer {
        &self.scorer
    }
}
