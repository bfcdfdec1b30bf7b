//! Per-case summaries for the student and parent portals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::escape_csv;
use crate::models::{id_suffix, Band, Case, CaseState, ConsentState, DecisionCode, Slip, SlipKind};

/// Banner tone of a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusTone {
    Info,
    Ok,
    Warn,
    Danger,
}

/// Message shown to the student for a case state.
pub fn status_message(state: CaseState) -> (StatusTone, &'static str) {
    match state {
        CaseState::Draft => (StatusTone::Info, "لم يتم إرسال الشكوى بعد."),
        CaseState::Open => (StatusTone::Info, "تم استلام شكواك وجاري مراجعتها من الطبيب."),
        CaseState::Triaged => (StatusTone::Info, "تم تقييم حالتك. اتبع التوصيات المعروضة."),
        CaseState::VisitRequested => (StatusTone::Info, "تم طلب زيارة افتراضية. بانتظار الطبيب."),
        CaseState::VisitActive => (StatusTone::Ok, "تم فتح زيارة افتراضية. الرجاء الدخول فورًا."),
        CaseState::FollowUp => (
            StatusTone::Info,
            "حالتك تحت المتابعة. الرجاء البقاء قريبًا من العيادة.",
        ),
        CaseState::Resolved => (StatusTone::Ok, "تم إغلاق الحالة. يمكنك الاطلاع على التقرير."),
        CaseState::Referred => (
            StatusTone::Danger,
            "حالتك تحتاج إحالة. الرجاء اتباع التوجيهات فورًا.",
        ),
        CaseState::Closed => (StatusTone::Info, "تم إغلاق الملف من الإدارة."),
    }
}

/// Message about parental consent, if there is anything to say.
pub fn consent_message(consent: ConsentState) -> Option<(StatusTone, &'static str)> {
    match consent {
        ConsentState::NotRequired => None,
        ConsentState::Required => Some((StatusTone::Warn, "بانتظار موافقة ولي الأمر على الإجراء.")),
        ConsentState::Granted => Some((StatusTone::Ok, "تمت موافقة ولي الأمر. سيتم تنفيذ الخطة.")),
        ConsentState::Declined => Some((
            StatusTone::Warn,
            "لم تتم الموافقة. تم تحويلك للمتابعة داخل المدرسة.",
        )),
    }
}

/// Flattened view of one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseSummary {
    pub case_id: String,
    /// Last six characters of the id, for display
    pub short_id: String,
    pub subject: String,
    pub state: CaseState,
    pub status_tone: StatusTone,
    pub status_message: String,
    pub consent: ConsentState,
    pub consent_message: Option<String>,
    pub score: Option<u8>,
    pub band: Option<Band>,
    pub band_label: Option<String>,
    pub decision_code: Option<DecisionCode>,
    pub red_flags: Vec<String>,
    /// Latest slip kind and days
    pub slip: Option<(SlipKind, u32)>,
    pub created_at: DateTime<Utc>,
}

impl CaseSummary {
    /// Summarize a case. `slips` may contain slips of other cases.
    pub fn from_case(case: &Case, slips: &[Slip]) -> Self {
        let (status_tone, status_message) = status_message(case.state());
        let triage = case.current_triage();
        let slip = slips
            .iter()
            .filter(|s| s.case_id == case.id())
            .max_by_key(|s| s.issued_at)
            .map(|s| (s.kind, s.days));

        let id = case.id();
        let short_id = id_suffix(id, 6);

        Self {
            case_id: id.to_string(),
            short_id,
            subject: case.subject().to_string(),
            state: case.state(),
            status_tone,
            status_message: status_message.to_string(),
            consent: case.consent(),
            consent_message: consent_message(case.consent()).map(|(_, m)| m.to_string()),
            score: triage.map(|t| t.score()),
            band: triage.map(|t| t.band()),
            band_label: triage.map(|t| t.band().label().to_string()),
            decision_code: triage.map(|t| t.decision_code()),
            red_flags: triage.map(|t| t.red_flags().to_vec()).unwrap_or_default(),
            slip,
            created_at: case.created_at(),
        }
    }

    /// Export to JSON format.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Export summaries to CSV, one row per case.
pub fn summaries_to_csv(summaries: &[CaseSummary]) -> String {
    let mut csv = String::new();

    csv.push_str("case_id,subject,state,consent,score,band,decision_code,red_flags,created_at\n");

    for s in summaries {
        csv.push_str(&format!(
            "{},{},{},{},{},{},{},{},{}\n",
            escape_csv(&s.case_id),
            escape_csv(&s.subject),
            s.state,
            s.consent,
            s.score.map(|v| v.to_string()).unwrap_or_default(),
            s.band.map(|b| b.as_str()).unwrap_or_default(),
            s.decision_code.map(|d| d.as_str()).unwrap_or_default(),
            escape_csv(&s.red_flags.join("; ")),
            s.created_at.to_rfc3339(),
        ));
    }

    csv
}
