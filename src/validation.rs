use serde::Serialize;

use crate::concept::VideoConcept;
use crate::config::ConceptLimits;

const BRIEF_MIN_WORDS: usize = 300;
const BRIEF_MAX_WORDS: usize = 500;

#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

pub fn validate_concept(concept: &VideoConcept, limits: &ConceptLimits) -> ValidationReport {
    let mut report = ValidationReport::default();

    for (field, value) in [
        ("title", &concept.title),
        ("brief", &concept.brief),
        ("target_audience", &concept.target_audience),
        ("language", &concept.language),
    ] {
        if value.trim().is_empty() {
            report
                .errors
                .push(format!("Concept field '{field}' is required"));
        }
    }

    report.merge(validate_duration(concept.duration_seconds, limits));

    let words = concept.brief_word_count();
    if words > 0 && !(BRIEF_MIN_WORDS..=BRIEF_MAX_WORDS).contains(&words) {
        report.warnings.push(format!(
            "Brief has {words} word(s); {BRIEF_MIN_WORDS}-{BRIEF_MAX_WORDS} gives the script generator the most to work with"
        ));
    }

    report
}

fn validate_duration(seconds: f64, limits: &ConceptLimits) -> ValidationReport {
    let mut report = ValidationReport::default();
    if !seconds.is_finite() {
        report
            .errors
            .push("Duration must be a finite number of seconds".into());
    } else if seconds < limits.min_duration_seconds || seconds > limits.max_duration_seconds {
        report.errors.push(format!(
            "Duration {seconds}s is outside the allowed range {}-{}s",
            limits.min_duration_seconds, limits.max_duration_seconds
        ));
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concept() -> VideoConcept {
        VideoConcept::new("Launch", "A short brief", "Buyers")
    }

    #[test]
    fn well_formed_concept_passes_with_brief_warning() {
        let report = validate_concept(&concept(), &ConceptLimits::default());
        assert!(report.is_ok(), "{:?}", report.errors);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn duration_bounds_are_inclusive() {
        let limits = ConceptLimits::default();
        assert!(validate_concept(&concept().with_duration(10.0), &limits).is_ok());
        assert!(validate_concept(&concept().with_duration(600.0), &limits).is_ok());
        assert!(!validate_concept(&concept().with_duration(9.5), &limits).is_ok());
        assert!(!validate_concept(&concept().with_duration(601.0), &limits).is_ok());
        assert!(!validate_concept(&concept().with_duration(f64::NAN), &limits).is_ok());
    }

    #[test]
    fn blank_fields_are_reported_individually() {
        let mut blank = concept();
        blank.title = "  ".into();
        blank.target_audience = String::new();
        let report = validate_concept(&blank, &ConceptLimits::default());
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].contains("title"));
        assert!(report.errors[1].contains("target_audience"));
    }
}
