//! Complaint analyzer.
//!
//! Maps free-text complaints to symptom flags by substring matching
//! against a fixed keyword table. Arabic and English keywords are both
//! recognised; English matching is case-insensitive.

use crate::models::{ComplaintFlags, SymptomFlag};

/// Keyword matcher for complaint text.
#[derive(Debug, Clone)]
pub struct ComplaintAnalyzer {
    /// Keyword table: flag → lowercase substrings
    keywords: Vec<(SymptomFlag, Vec<String>)>,
}

impl Default for ComplaintAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl ComplaintAnalyzer {
    /// Create an analyzer with the default keyword table.
    pub fn new() -> Self {
        Self {
            keywords: Self::default_keywords(),
        }
    }

    /// Derive the flag set for a complaint. Same text, same flags.
    pub fn analyze(&self, complaint: &str) -> ComplaintFlags {
        let text = complaint.trim().to_lowercase();
        if text.is_empty() {
            return ComplaintFlags::new();
        }

        self.keywords
            .iter()
            .filter(|(_, words)| words.iter().any(|w| text.contains(w.as_str())))
            .map(|(flag, _)| *flag)
            .collect()
    }

    /// Add a custom keyword for a flag.
    pub fn add_keyword(&mut self, flag: SymptomFlag, keyword: &str) {
        let keyword = keyword.trim().to_lowercase();
        if keyword.is_empty() {
            return;
        }
        match self.keywords.iter_mut().find(|(f, _)| *f == flag) {
            Some((_, words)) => words.push(keyword),
            None => self.keywords.push((flag, vec![keyword])),
        }
    }

    /// Default keyword table.
    fn default_keywords() -> Vec<(SymptomFlag, Vec<String>)> {
        fn words(list: &[&str]) -> Vec<String> {
            list.iter().map(|w| w.to_string()).collect()
        }

        vec![
            (
                SymptomFlag::Respiratory,
                words(&[
                    "ضيق", "تنفس", "كحة", "كتمة", "صفير", "ربو", "اختناق", "صدر",
                    "breath", "cough", "wheez", "asthma", "chest",
                ]),
            ),
            (
                SymptomFlag::Fever,
                words(&["حمى", "حرارة", "سخونة", "قشعريرة", "fever", "chills"]),
            ),
            (
                SymptomFlag::Gastrointestinal,
                words(&[
                    "مغص", "اسهال", "إسهال", "قيء", "استفراغ", "غثيان",
                    "vomit", "diarrh", "nausea", "stomach",
                ]),
            ),
            // A plain headache ("صداع") is not a neuro flag on its own.
            (
                SymptomFlag::Neuro,
                words(&[
                    "دوخة", "اغماء", "إغماء", "تشنج", "تشوش", "نوبة", "صداع شديد",
                    "dizz", "faint", "seizure", "confus", "severe headache",
                ]),
            ),
            (
                SymptomFlag::Trauma,
                words(&[
                    "ألم", "وجع", "جرح", "نزيف", "كسر", "التواء",
                    "pain", "injur", "wound", "bleed", "fractur", "sprain",
                ]),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_complaint_has_no_flags() {
        let analyzer = ComplaintAnalyzer::new();
        assert!(analyzer.analyze("").is_empty());
        assert!(analyzer.analyze("   ").is_empty());
    }

    #[test]
    fn test_mild_headache_is_not_flagged() {
        let analyzer = ComplaintAnalyzer::new();
        assert!(analyzer.analyze("صداع خفيف").is_empty());
    }

    #[test]
    fn test_arabic_respiratory() {
        let flags = ComplaintAnalyzer::new().analyze("ضيق تنفس");
        assert!(flags.contains(SymptomFlag::Respiratory));
        assert_eq!(flags.len(), 1);
    }

    #[test]
    fn test_multiple_flags_deduplicated() {
        let flags = ComplaintAnalyzer::new().analyze("كحة وضيق تنفس مع حرارة وقيء");
        let ordered: Vec<_> = flags.iter().collect();
        assert_eq!(
            ordered,
            vec![
                SymptomFlag::Respiratory,
                SymptomFlag::Fever,
                SymptomFlag::Gastrointestinal
            ]
        );
    }

    #[test]
    fn test_english_case_insensitive() {
        let flags = ComplaintAnalyzer::new().analyze("Severe Headache and DIZZINESS after a fall, knee pain");
        assert!(flags.contains(SymptomFlag::Neuro));
        assert!(flags.contains(SymptomFlag::Trauma));
        assert!(!flags.contains(SymptomFlag::Fever));
    }

    #[test]
    fn test_deterministic() {
        let analyzer = ComplaintAnalyzer::new();
        let text = "نزيف من الأنف ودوخة";
        assert_eq!(analyzer.analyze(text), analyzer.analyze(text));
    }

    #[test]
    fn test_custom_keyword() {
        let mut analyzer = ComplaintAnalyzer::new();
        assert!(analyzer.analyze("rash").is_empty());

        analyzer.add_keyword(SymptomFlag::Fever, "Rash");
        assert!(analyzer.analyze("a red rash").contains(SymptomFlag::Fever));
    }
}
