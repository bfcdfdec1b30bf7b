//! Rest and referral slips issued by the doctor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of slip. Determines how the case concludes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlipKind {
    /// Rest at home; case is resolved
    Rest,
    /// Onward referral; case is referred
    Referral,
}

impl SlipKind {
    pub const ALL: [SlipKind; 2] = [SlipKind::Rest, SlipKind::Referral];

    pub fn as_str(&self) -> &'static str {
        match self {
            SlipKind::Rest => "REST",
            SlipKind::Referral => "REFERRAL",
        }
    }
}

impl std::str::FromStr for SlipKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SlipKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown slip kind: {}", s))
    }
}

/// A slip linked to a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slip {
    pub id: String,
    pub case_id: String,
    pub kind: SlipKind,
    /// Days of rest or validity, at least 1
    pub days: u32,
    pub notes: String,
    pub issued_at: DateTime<Utc>,
}

impl Slip {
    pub fn new(case_id: String, kind: SlipKind, days: u32, notes: String, issued_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            case_id,
            kind,
            days: days.max(1),
            notes,
            issued_at,
        }
    }
}
