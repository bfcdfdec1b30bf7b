//! Triage output models.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Symptom tag derived from the complaint text.
///
/// Declaration order is the output priority order used when flags drive
/// recommendation ordering: Respiratory > Neuro > Fever > Trauma > GI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SymptomFlag {
    Respiratory,
    Neuro,
    Fever,
    Trauma,
    #[serde(rename = "GI")]
    Gastrointestinal,
}

impl SymptomFlag {
    /// All flags in priority order.
    pub const ALL: [SymptomFlag; 5] = [
        SymptomFlag::Respiratory,
        SymptomFlag::Neuro,
        SymptomFlag::Fever,
        SymptomFlag::Trauma,
        SymptomFlag::Gastrointestinal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SymptomFlag::Respiratory => "Respiratory",
            SymptomFlag::Neuro => "Neuro",
            SymptomFlag::Fever => "Fever",
            SymptomFlag::Trauma => "Trauma",
            SymptomFlag::Gastrointestinal => "GI",
        }
    }
}

impl std::fmt::Display for SymptomFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deduplicated set of symptom flags. Iterates in priority order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComplaintFlags(BTreeSet<SymptomFlag>);

impl ComplaintFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, flag: SymptomFlag) -> bool {
        self.0.insert(flag)
    }

    pub fn contains(&self, flag: SymptomFlag) -> bool {
        self.0.contains(&flag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Flags in priority order.
    pub fn iter(&self) -> impl Iterator<Item = SymptomFlag> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<SymptomFlag> for ComplaintFlags {
    fn from_iter<I: IntoIterator<Item = SymptomFlag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Priority band. Ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Band {
    Low,
    Medium,
    High,
    Critical,
}

impl Band {
    pub const ALL: [Band; 4] = [Band::Low, Band::Medium, Band::High, Band::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Band::Low => "LOW",
            Band::Medium => "MEDIUM",
            Band::High => "HIGH",
            Band::Critical => "CRITICAL",
        }
    }

    /// Display label shown next to the score.
    pub fn label(&self) -> &'static str {
        match self {
            Band::Low => "منخفض",
            Band::Medium => "متوسط",
            Band::High => "عالي",
            Band::Critical => "حرج",
        }
    }

    pub fn is_urgent(&self) -> bool {
        matches!(self, Band::High | Band::Critical)
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete next-step category attached to a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionCode {
    SelfCare,
    FollowUp,
    VirtualVisit,
    EscalateReferral,
}

impl DecisionCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionCode::SelfCare => "SELF_CARE",
            DecisionCode::FollowUp => "FOLLOW_UP",
            DecisionCode::VirtualVisit => "VIRTUAL_VISIT",
            DecisionCode::EscalateReferral => "ESCALATE_REFERRAL",
        }
    }

    /// Whether this decision on its own justifies requesting a visit.
    pub fn warrants_visit(&self) -> bool {
        matches!(self, DecisionCode::VirtualVisit | DecisionCode::EscalateReferral)
    }
}

impl std::fmt::Display for DecisionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one triage run. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageResult {
    score: u8,
    band: Band,
    decision_code: DecisionCode,
    recommendation: Vec<String>,
    red_flags: Vec<String>,
    flags: ComplaintFlags,
    produced_at: DateTime<Utc>,
}

impl TriageResult {
    pub(crate) fn new(
        score: u8,
        band: Band,
        decision_code: DecisionCode,
        recommendation: Vec<String>,
        red_flags: Vec<String>,
        flags: ComplaintFlags,
        produced_at: DateTime<Utc>,
    ) -> Self {
        Self {
            score,
            band,
            decision_code,
            recommendation,
            red_flags,
            flags,
            produced_at,
        }
    }

    /// Risk score in `[0, 100]`.
    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn band(&self) -> Band {
        self.band
    }

    pub fn decision_code(&self) -> DecisionCode {
        self.decision_code
    }

    pub fn recommendation(&self) -> &[String] {
        &self.recommendation
    }

    pub fn red_flags(&self) -> &[String] {
        &self.red_flags
    }

    pub fn flags(&self) -> &ComplaintFlags {
        &self.flags
    }

    pub fn produced_at(&self) -> DateTime<Utc> {
        self.produced_at
    }
}
