use chrono::Datelike;
use log::warn;
use crate::models::MrzResult;
use crate::utils::{countries, ErrorCode, OcrError};

const PASSPORT_NUMBER_MIN: usize = 6;
const PASSPORT_NUMBER_MAX: usize = 12;
/// One failed check is tolerated as noise; two or more mean the whole
/// read is unreliable.
const REJECTION_THRESHOLD: usize = 2;

/// ResultValidator runs the plausibility battery over an extracted result
/// and decides accept/reject.
pub struct ResultValidator;

impl ResultValidator {
    /// Cross-check the extracted fields. A single violation is logged and
    /// tolerated (some are legitimate edge cases, like an expired document
    /// being digitized); two or more reject the result as a systemic
    /// quality problem.
    pub fn validate(result: &MrzResult, nationality_code: &str) -> Result<(), OcrError> {
        let violations = Self::collect_violations(result, nationality_code);

        if violations.len() >= REJECTION_THRESHOLD {
            return Err(OcrError::with_technical(
                ErrorCode::PoorImageQuality,
                format!("{} plausibility violations: {}", violations.len(), violations.join("; ")),
            ));
        }
        for violation in &violations {
            warn!("tolerating isolated plausibility violation: {}", violation);
        }
        Ok(())
    }

    fn collect_violations(result: &MrzResult, nationality_code: &str) -> Vec<String> {
        let mut violations = Vec::new();
        let number = &result.passport_number;

        if number.len() < PASSPORT_NUMBER_MIN || number.len() > PASSPORT_NUMBER_MAX {
            violations.push(format!("passport number length {} outside bounds", number.len()));
        }
        if Self::is_suspicious_number(number) {
            violations.push(format!("passport number '{}' has a suspicious shape", number));
        }
        if !number.chars().any(|c| c.is_ascii_alphabetic()) {
            violations.push("passport number has no letter".to_string());
        }
        if !number.chars().any(|c| c.is_ascii_digit()) {
            violations.push("passport number has no digit".to_string());
        }
        if !countries::is_known_code(nationality_code) {
            violations.push(format!("unknown nationality code '{}'", nationality_code));
        }
        if result.birth_date.is_empty() {
            violations.push("birth date missing".to_string());
        }
        if result.expiry_date.is_empty() {
            violations.push("expiry date missing".to_string());
        }

        let current_year = chrono::Utc::now().year();
        if let Some(year) = iso_year(&result.birth_date) {
            if year < 1900 || year > current_year - 10 {
                violations.push(format!("birth year {} implausible", year));
            }
        }
        if let Some(year) = iso_year(&result.expiry_date) {
            if year < current_year - 20 || year > current_year + 20 {
                violations.push(format!("expiry year {} implausible", year));
            }
        }

        violations
    }

    /// All letters, all digits, all filler, or too short to mean anything.
    fn is_suspicious_number(number: &str) -> bool {
        number.len() <= 3
            || number.chars().all(|c| c.is_ascii_alphabetic())
            || number.chars().all(|c| c.is_ascii_digit())
            || number.chars().all(|c| c == '<')
    }
}

fn iso_year(date: &str) -> Option<i32> {
    date.get(0..4)?.parse().ok()
}
