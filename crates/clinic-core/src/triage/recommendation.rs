//! Recommendation builder.
//!
//! The decision code depends on the band alone. Flags only add lines to
//! the recommendation; red flags are evaluated independently of the band
//! and are never suppressed.

use serde::{Deserialize, Serialize};

use crate::models::{Band, ComplaintFlags, DecisionCode, SymptomFlag, VitalsRecord};

/// Airway line appended for respiratory complaints at HIGH/CRITICAL.
pub const AIRWAY_MONITORING: &str = "مراقبة مجرى الهواء والتنفس باستمرار (SpO₂ كل 5 دقائق)";

pub const RED_FLAG_HYPOXIA: &str = "SpO₂ ≤ 90%: نقص أكسجين";
pub const RED_FLAG_HYPERPYREXIA: &str = "حرارة ≥ 40°C";
pub const RED_FLAG_TACHYCARDIA: &str = "نبض ≥ 150/دقيقة";
pub const RED_FLAG_NEURO: &str = "أعراض عصبية مع أولوية عالية";

/// Output of the builder, before it is stamped into a `TriageResult`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub decision_code: DecisionCode,
    pub recommendation: Vec<String>,
    pub red_flags: Vec<String>,
}

/// Builds recommendations from band, flags and vitals. No hidden state.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecommendationBuilder;

impl RecommendationBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, band: Band, flags: &ComplaintFlags, vitals: &VitalsRecord) -> Recommendation {
        let mut recommendation: Vec<String> =
            protocol(band).iter().map(|line| line.to_string()).collect();
        recommendation.extend(flags.iter().map(|flag| flag_line(flag, band).to_string()));

        Recommendation {
            decision_code: decision_for(band),
            recommendation,
            red_flags: red_flags(band, flags, vitals),
        }
    }
}

/// Strict function of the band.
pub fn decision_for(band: Band) -> DecisionCode {
    match band {
        Band::Low => DecisionCode::SelfCare,
        Band::Medium => DecisionCode::FollowUp,
        Band::High => DecisionCode::VirtualVisit,
        Band::Critical => DecisionCode::EscalateReferral,
    }
}

/// Base clinic protocol checklist for a band.
pub fn protocol(band: Band) -> &'static [&'static str] {
    match band {
        Band::Low => &[
            "تأكيد عدم وجود علامات إنذار",
            "إرشاد صحي + راحة قصيرة",
            "تحديد متى يرجع الطالب إذا ساءت الأعراض",
        ],
        Band::Medium => &[
            "تقييم مختصر + قراءة ثانية إذا استمرت الأعراض",
            "إرشاد صحي + متابعة خلال 30–60 دقيقة",
            "إشعار ولي الأمر عند الحاجة",
        ],
        Band::High => &[
            "بدء زيارة افتراضية خلال دقائق",
            "طلب قراءة ثانية للتأكيد (SpO₂/HR/Temp)",
            "إشعار ولي الأمر + موافقة إذا لزم إجراء",
            "قرار: راحة/متابعة/إحالة حسب الاستجابة",
        ],
        Band::Critical => &[
            "تصعيد فوري + عدم ترك الطالب وحده",
            "قياسات متكررة + تجهيز إحالة حسب البروتوكول",
            "إشعار ولي الأمر فورًا",
            "توثيق كامل",
        ],
    }
}

fn flag_line(flag: SymptomFlag, band: Band) -> &'static str {
    match (flag, band.is_urgent()) {
        (SymptomFlag::Respiratory, true) => AIRWAY_MONITORING,
        (SymptomFlag::Respiratory, false) => "إعادة قياس SpO₂ إذا استمرت الكحة أو الضيق",
        (SymptomFlag::Neuro, true) => "مراقبة مستوى الوعي وعدم ترك الطالب وحده",
        (SymptomFlag::Neuro, false) => "مراقبة الدوخة والعودة فورًا عند التفاقم",
        (SymptomFlag::Fever, _) => "قياس الحرارة كل 30 دقيقة + سوائل",
        (SymptomFlag::Trauma, _) => "تقييم الإصابة + إيقاف النزيف وتثبيت الطرف عند الحاجة",
        (SymptomFlag::Gastrointestinal, _) => "سوائل بكميات صغيرة + مراقبة علامات الجفاف",
    }
}

fn red_flags(band: Band, flags: &ComplaintFlags, vitals: &VitalsRecord) -> Vec<String> {
    let mut out = Vec::new();

    if vitals.spo2.is_some_and(|s| s <= 90) {
        out.push(RED_FLAG_HYPOXIA.to_string());
    }
    if vitals.temperature_c.is_some_and(|t| t >= 40.0) {
        out.push(RED_FLAG_HYPERPYREXIA.to_string());
    }
    if vitals.heart_rate.is_some_and(|hr| hr >= 150) {
        out.push(RED_FLAG_TACHYCARDIA.to_string());
    }
    if flags.contains(SymptomFlag::Neuro) && band.is_urgent() {
        out.push(RED_FLAG_NEURO.to_string());
    }

    out
}
