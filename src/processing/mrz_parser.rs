use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use crate::models::MrzResult;
use crate::processing::td3::{self, Td3Parse};
use crate::utils::{countries, ErrorCode, OcrError};

lazy_static! {
    /// Letter-prefixed digit run, the common shape of passport numbers.
    static ref PASSPORT_NUMBER_RE: Regex = Regex::new(r"[A-Z]{1,3}[0-9]{6,9}").unwrap();
    /// Birth and expiry dates anchored on the gender marker between them:
    /// birth(6) check(1) sex expiry(6).
    static ref GENDER_DATE_RE: Regex =
        Regex::new(r"([0-9]{6})[0-9][MF<]([0-9]{6})").unwrap();
    /// Last-resort: any 6-digit run.
    static ref SIX_DIGIT_RE: Regex = Regex::new(r"[0-9]{6}").unwrap();
}

const MRZ_LINE_LEN: usize = 44;
const MIN_USABLE_LINE: usize = 20;
const FILLER: char = '<';
/// Synthesized first line used when only one usable line was recognized.
/// `XXX` is the sentinel nationality the heuristics refuse to report.
const PLACEHOLDER_SENTINEL: &str = "XXX";

/// Pre-validation parse output. Keeps the raw nationality code alongside
/// the display name because the validator checks code membership.
#[derive(Debug, Clone)]
pub struct ParsedMrz {
    pub result: MrzResult,
    pub nationality_code: String,
}

/// Fields recovered by the pattern-matching fallback tier, independently
/// of the grammar parse.
#[derive(Debug, Clone, Default)]
pub struct HeuristicFields {
    pub passport_number: Option<String>,
    pub nationality_code: Option<String>,
    pub birth_date: Option<String>,
    pub expiry_date: Option<String>,
}

/// MrzParser turns raw OCR text into identity fields using a two-tier
/// strategy: the TD3 grammar parse wins where its check digits verify, and
/// fixed-offset/regex heuristics fill the gaps.
pub struct MrzParser;

impl MrzParser {
    pub fn parse(raw_text: &str) -> Result<ParsedMrz, OcrError> {
        let lines = Self::clean_text(raw_text);
        if lines.is_empty() {
            return Err(OcrError::with_technical(
                ErrorCode::NoMrzDetected,
                "no usable lines after cleaning",
            ));
        }

        let (line1, line2, degraded) = Self::normalize_lines(&lines);
        if degraded {
            debug!("single usable MRZ line; entering degraded parse mode");
        }

        let grammar = td3::parse(&line1, &line2, true);
        let heuristic = Self::extract_heuristics(&line1, &line2, raw_text);
        let merged = merge_fields(&grammar, &heuristic);

        let recovered_any = merged.passport_number.is_some()
            || merged.birth_date.is_some()
            || merged.expiry_date.is_some();
        if !recovered_any {
            // Distinguish a checksum-rejected read from plain garbage.
            if grammar.failed_checks.iter().any(|c| *c != "line_length") {
                return Err(OcrError::with_technical(
                    ErrorCode::InvalidChecksum,
                    format!("failed checks: {:?}", grammar.failed_checks),
                ));
            }
            return Err(OcrError::with_technical(
                ErrorCode::NoMrzDetected,
                "no fields recoverable from either tier",
            ));
        }

        let nationality_code = merged
            .nationality_code
            .unwrap_or_default()
            .trim_matches(FILLER)
            .to_uppercase();
        let nationality = countries::country_name(&nationality_code)
            .map(str::to_string)
            .unwrap_or_else(|| nationality_code.clone());

        let birth_date = merged
            .birth_date
            .map(|d| mrz_date_to_iso(&d, DateKind::Birth))
            .unwrap_or_default();
        let expiry_date = merged
            .expiry_date
            .map(|d| mrz_date_to_iso(&d, DateKind::Expiry))
            .unwrap_or_default();

        Ok(ParsedMrz {
            result: MrzResult {
                passport_number: merged.passport_number.unwrap_or_default(),
                nationality,
                birth_date,
                expiry_date,
            },
            nationality_code,
        })
    }

    /// Strip everything outside the MRZ alphabet, split into lines and
    /// discard fragments too short to carry MRZ content.
    fn clean_text(raw: &str) -> Vec<String> {
        raw.to_uppercase()
            .lines()
            .map(|line| {
                line.chars()
                    .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || *c == FILLER)
                    .collect::<String>()
            })
            .filter(|line| line.len() >= MIN_USABLE_LINE)
            .collect()
    }

    /// Reconstruct exactly two logical 44-character MRZ lines. Returns the
    /// pair plus a flag marking the degraded single-line mode.
    fn normalize_lines(lines: &[String]) -> (String, String, bool) {
        // One very long line usually means the engine joined both rows.
        if lines.len() == 1 && lines[0].len() >= 2 * MRZ_LINE_LEN {
            let (first, second) = lines[0].split_at(MRZ_LINE_LEN);
            return (
                Self::pad_line(first),
                Self::pad_line(&second[..second.len().min(MRZ_LINE_LEN)]),
                false,
            );
        }

        if lines.len() >= 2 {
            return (Self::pad_line(&lines[0]), Self::pad_line(&lines[1]), false);
        }

        // Single usable line: treat it as the data line and synthesize a
        // placeholder first line so the fixed offsets still apply.
        let placeholder = format!(
            "P{}{}{}",
            FILLER,
            PLACEHOLDER_SENTINEL,
            FILLER.to_string().repeat(MRZ_LINE_LEN - 5)
        );
        (placeholder, Self::pad_line(&lines[0]), true)
    }

    /// Pad to 44 with filler, or shrink to 44. Overlong lines lose trailing
    /// filler first so a real trailing check digit is not cut off.
    fn pad_line(line: &str) -> String {
        let mut line = line.to_string();
        while line.len() > MRZ_LINE_LEN && line.ends_with(FILLER) {
            line.pop();
        }
        line.truncate(MRZ_LINE_LEN);
        while line.len() < MRZ_LINE_LEN {
            line.push(FILLER);
        }
        line
    }

    /// Pattern-extraction tier, computed independently of the grammar
    /// result. Fixed offsets first, regex fallbacks after.
    fn extract_heuristics(line1: &str, line2: &str, raw_text: &str) -> HeuristicFields {
        let cleaned: String = raw_text
            .to_uppercase()
            .chars()
            .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || *c == FILLER || *c == '\n')
            .collect();

        let (birth_date, expiry_date) = Self::heuristic_dates(line2, &cleaned);
        HeuristicFields {
            passport_number: Self::heuristic_passport_number(line2, &cleaned),
            nationality_code: Self::heuristic_nationality(line1),
            birth_date,
            expiry_date,
        }
    }

    /// Document number from the fixed offset on line 2, else the first
    /// letter-prefixed digit run anywhere in the text.
    fn heuristic_passport_number(line2: &str, cleaned: &str) -> Option<String> {
        if line2.len() >= 10 {
            let candidate = line2[1..10].trim_matches(FILLER);
            if candidate.len() >= 6 && has_letter_and_digit(candidate) {
                return Some(candidate.to_string());
            }
        }
        PASSPORT_NUMBER_RE
            .find(cleaned)
            .map(|m| m.as_str().to_string())
    }

    /// Issuing-state code near the start of line 1. The synthesized
    /// placeholder sentinel is never reported.
    fn heuristic_nationality(line1: &str) -> Option<String> {
        if line1.len() < 5 {
            return None;
        }
        let code = &line1[2..5];
        if code == PLACEHOLDER_SENTINEL || !code.chars().all(|c| c.is_ascii_uppercase()) {
            return None;
        }
        Some(code.to_string())
    }

    /// Birth and expiry from the fixed offsets on line 2, then the
    /// gender-anchored regex, then the first two 6-digit runs in the text.
    fn heuristic_dates(line2: &str, cleaned: &str) -> (Option<String>, Option<String>) {
        if line2.len() >= 27 {
            let birth = &line2[13..19];
            let expiry = &line2[21..27];
            if is_plausible_mrz_date(birth) && is_plausible_mrz_date(expiry) {
                return (Some(birth.to_string()), Some(expiry.to_string()));
            }
        }

        if let Some(caps) = GENDER_DATE_RE.captures(cleaned) {
            let birth = caps.get(1).map(|m| m.as_str().to_string());
            let expiry = caps.get(2).map(|m| m.as_str().to_string());
            if birth.as_deref().map_or(false, is_plausible_mrz_date)
                && expiry.as_deref().map_or(false, is_plausible_mrz_date)
            {
                return (birth, expiry);
            }
        }

        // Lowest-confidence path: positionally blind, can swap the two
        // dates. Flag it so downstream consumers know the read is a guess.
        let mut runs = SIX_DIGIT_RE
            .find_iter(cleaned)
            .map(|m| m.as_str().to_string())
            .filter(|d| is_plausible_mrz_date(d));
        let first = runs.next();
        let second = runs.next();
        if first.is_some() || second.is_some() {
            warn!("dates recovered from bare 6-digit runs; birth/expiry order is unverified");
        }
        (first, second)
    }
}

/// Tie-break between the grammar parse and the heuristic extraction.
///
/// Grammar fields win where their check digits verified; heuristics fill
/// the gaps. One deliberate exception: when the heuristic passport number
/// is strictly longer than the grammar one, the heuristic wins, because
/// the grammar parse over-truncates numbers that run into the filler.
pub fn merge_fields(grammar: &Td3Parse, heuristic: &HeuristicFields) -> HeuristicFields {
    let passport_number = match (&grammar.document_number, &heuristic.passport_number) {
        (Some(g), Some(h)) if h.len() > g.len() => Some(h.clone()),
        (Some(g), _) => Some(g.clone()),
        (None, h) => h.clone(),
    };

    HeuristicFields {
        passport_number,
        nationality_code: grammar
            .nationality
            .clone()
            .or_else(|| heuristic.nationality_code.clone()),
        birth_date: grammar
            .birth_date
            .clone()
            .or_else(|| heuristic.birth_date.clone()),
        expiry_date: grammar
            .expiry_date
            .clone()
            .or_else(|| heuristic.expiry_date.clone()),
    }
}

fn has_letter_and_digit(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_alphabetic()) && s.chars().any(|c| c.is_ascii_digit())
}

/// Month 1-12, day 1-31, six digits.
fn is_plausible_mrz_date(date: &str) -> bool {
    if date.len() != 6 || !date.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let month: u32 = date[2..4].parse().unwrap_or(0);
    let day: u32 = date[4..6].parse().unwrap_or(0);
    (1..=12).contains(&month) && (1..=31).contains(&day)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateKind {
    Birth,
    Expiry,
}

/// Expand a 6-digit `YYMMDD` to ISO `YYYY-MM-DD`. Birth years above the
/// pivot (29) read as 1900s, otherwise 2000s; expiry dates always read as
/// 2000s. Returns an empty string for anything that is not a real
/// calendar date.
pub fn mrz_date_to_iso(date: &str, kind: DateKind) -> String {
    if date.len() != 6 || !date.chars().all(|c| c.is_ascii_digit()) {
        return String::new();
    }
    let yy: i32 = date[0..2].parse().unwrap_or(-1);
    let month: u32 = date[2..4].parse().unwrap_or(0);
    let day: u32 = date[4..6].parse().unwrap_or(0);
    if yy < 0 {
        return String::new();
    }

    let year = match kind {
        DateKind::Birth if yy > 29 => 1900 + yy,
        _ => 2000 + yy,
    };

    match chrono::NaiveDate::from_ymd_opt(year, month, day) {
        Some(d) => d.format("%Y-%m-%d").to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPECIMEN_TEXT: &str =
        "P<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<\nL898902C36UTO7408122F1204159ZE184226B<<<<<10\n";

    #[test]
    fn test_happy_path_specimen() {
        let parsed = MrzParser::parse(SPECIMEN_TEXT).unwrap();
        assert_eq!(parsed.result.passport_number, "L898902C3");
        assert_eq!(parsed.result.birth_date, "1974-08-12");
        assert_eq!(parsed.result.expiry_date, "2012-04-15");
        // UTO has no display mapping; the raw code degrades through.
        assert_eq!(parsed.nationality_code, "UTO");
        assert_eq!(parsed.result.nationality, "UTO");
    }

    #[test]
    fn test_known_nationality_resolves_to_name() {
        let text =
            "P<NLDERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<\nL898902C36NLD7408122F1204159ZE184226B<<<<<10";
        let parsed = MrzParser::parse(text).unwrap();
        assert_eq!(parsed.result.nationality, "Netherlands");
        assert_eq!(parsed.nationality_code, "NLD");
    }

    #[test]
    fn test_noise_lines_are_discarded() {
        let noisy = format!("REPUBLIC OF UTOPIA\npassport\n{}", SPECIMEN_TEXT);
        let parsed = MrzParser::parse(&noisy).unwrap();
        assert_eq!(parsed.result.passport_number, "L898902C3");
    }

    #[test]
    fn test_joined_double_line_is_split() {
        let joined = SPECIMEN_TEXT.replace('\n', "");
        let parsed = MrzParser::parse(&joined).unwrap();
        assert_eq!(parsed.result.passport_number, "L898902C3");
        assert_eq!(parsed.result.birth_date, "1974-08-12");
    }

    #[test]
    fn test_single_line_degraded_mode() {
        // Only the data line survived OCR; best-effort extraction applies
        // and the sentinel nationality is not reported.
        let parsed = MrzParser::parse("L898902C36UTO7408122F1204159ZE184226B<<<<<10").unwrap();
        assert_eq!(parsed.result.passport_number, "L898902C3");
        assert_eq!(parsed.result.birth_date, "1974-08-12");
        assert_eq!(parsed.result.expiry_date, "2012-04-15");
        // Grammar still reads the nationality from the data line; the
        // placeholder sentinel on the synthesized line is never reported.
        assert_eq!(parsed.nationality_code, "UTO");
    }

    #[test]
    fn test_empty_text_is_no_mrz() {
        let err = MrzParser::parse("just a cat photo").unwrap_err();
        assert_eq!(err.code, ErrorCode::NoMrzDetected);
    }

    #[test]
    fn test_heuristics_rescue_broken_checksums() {
        // All check digits zeroed out: the grammar tier withholds every
        // field, the offset heuristics still recover a best-effort read.
        // The offset read starts one character into the line, so the
        // recovered number drops the leading letter.
        let text =
            "P<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<\nL898902C30UTO7408120F1204150ZE184226B<<<<<00";
        let parsed = MrzParser::parse(text).unwrap();
        assert_eq!(parsed.result.passport_number, "898902C30");
        assert_eq!(parsed.result.birth_date, "1974-08-12");
        assert_eq!(parsed.result.expiry_date, "2012-04-15");
    }

    #[test]
    fn test_unrecoverable_check_failures_are_invalid_checksum() {
        // Two well-formed 44-character lines, but line 2 carries no
        // digits at all: every check digit fails and neither the fixed
        // offsets nor the regexes can recover a single field.
        let text =
            "P<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<\nABCDEFGHIJKLMNOPQRSTUVWXYZABCDEFGHIJKLMNOPQR";
        let err = MrzParser::parse(text).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidChecksum);
    }

    #[test]
    fn test_merge_prefers_longer_heuristic_number() {
        let grammar = Td3Parse {
            document_number: Some("AB12".to_string()),
            ..Default::default()
        };
        let heuristic = HeuristicFields {
            passport_number: Some("AB123456".to_string()),
            ..Default::default()
        };
        let merged = merge_fields(&grammar, &heuristic);
        assert_eq!(merged.passport_number.as_deref(), Some("AB123456"));
    }

    #[test]
    fn test_merge_grammar_wins_when_not_shorter() {
        let grammar = Td3Parse {
            document_number: Some("L898902C3".to_string()),
            birth_date: Some("740812".to_string()),
            ..Default::default()
        };
        let heuristic = HeuristicFields {
            passport_number: Some("L898902".to_string()),
            birth_date: Some("999999".to_string()),
            expiry_date: Some("120415".to_string()),
            ..Default::default()
        };
        let merged = merge_fields(&grammar, &heuristic);
        assert_eq!(merged.passport_number.as_deref(), Some("L898902C3"));
        assert_eq!(merged.birth_date.as_deref(), Some("740812"));
        // Heuristic fills the gap the grammar left.
        assert_eq!(merged.expiry_date.as_deref(), Some("120415"));
    }

    #[test]
    fn test_date_pivot_rule() {
        assert_eq!(mrz_date_to_iso("740812", DateKind::Birth), "1974-08-12");
        assert_eq!(mrz_date_to_iso("050812", DateKind::Birth), "2005-08-12");
        assert_eq!(mrz_date_to_iso("290812", DateKind::Birth), "2029-08-12");
        assert_eq!(mrz_date_to_iso("300812", DateKind::Birth), "1930-08-12");
        // Expiry always reads as 2000s, even above the pivot.
        assert_eq!(mrz_date_to_iso("740812", DateKind::Expiry), "2074-08-12");
        assert_eq!(mrz_date_to_iso("120415", DateKind::Expiry), "2012-04-15");
    }

    #[test]
    fn test_date_round_trip_is_stable() {
        for raw in ["740812", "001231", "290101", "990615"] {
            let iso = mrz_date_to_iso(raw, DateKind::Birth);
            let day = chrono::NaiveDate::parse_from_str(&iso, "%Y-%m-%d").unwrap();
            assert_eq!(day.format("%y%m%d").to_string(), raw);
        }
    }

    #[test]
    fn test_impossible_date_yields_empty() {
        assert_eq!(mrz_date_to_iso("990231", DateKind::Birth), "");
        assert_eq!(mrz_date_to_iso("74081", DateKind::Birth), "");
        assert_eq!(mrz_date_to_iso("ABCDEF", DateKind::Birth), "");
    }

    #[test]
    fn test_pad_line_preserves_trailing_check_digit() {
        // 46 chars ending in filler then a digit: trailing filler is
        // dropped before truncation so the digit survives... but here the
        // digit is last, so only the overlong filler inside is cut.
        let long = format!("{}<<", "L898902C36UTO7408122F1204159ZE184226B<<<<<10");
        assert_eq!(
            MrzParser::pad_line(&long),
            "L898902C36UTO7408122F1204159ZE184226B<<<<<10"
        );
    }
}
