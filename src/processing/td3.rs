//! ICAO Doc 9303 TD3 grammar parser.
//!
//! Consumes two reconstructed 44-character MRZ lines and extracts the
//! identity fields at their fixed offsets, validating each check digit.
//! A field is only reported when its check digit verifies, so callers can
//! trust whatever comes back from here; recovering fields from lines that
//! fail validation is the heuristic layer's job.

/// Per-field outcome of a TD3 parse. Fields are `Some` only when the
/// corresponding check digit verified.
#[derive(Debug, Clone, Default)]
pub struct Td3Parse {
    /// True when every check digit (document number, birth, expiry,
    /// composite) verified.
    pub valid: bool,
    /// Document number, filler-trimmed.
    pub document_number: Option<String>,
    /// 3-letter nationality code from line 2.
    pub nationality: Option<String>,
    /// Birth date as raw `YYMMDD`.
    pub birth_date: Option<String>,
    /// Expiry date as raw `YYMMDD`.
    pub expiry_date: Option<String>,
    /// Names of the checks that failed, for diagnostics.
    pub failed_checks: Vec<&'static str>,
}

const LINE_LEN: usize = 44;
const FILLER: char = '<';

/// Parse a TD3 line pair. With `autocorrect` enabled, common OCR
/// substitutions are repaired per subfield before check-digit validation
/// (digit-shaped letters in numeric fields, letter-shaped digits in alpha
/// fields).
pub fn parse(line1: &str, line2: &str, autocorrect: bool) -> Td3Parse {
    let l2: Vec<char> = line2.chars().collect();
    if line1.chars().count() != LINE_LEN || l2.len() != LINE_LEN {
        return Td3Parse {
            failed_checks: vec!["line_length"],
            ..Default::default()
        };
    }

    let mut parse = Td3Parse::default();

    let doc_field = correct(&slice(&l2, 0, 9), Alphabet::Mixed, autocorrect);
    let doc_check = correct(&slice(&l2, 9, 10), Alphabet::Numeric, autocorrect);
    let nationality = correct(&slice(&l2, 10, 13), Alphabet::Alpha, autocorrect);
    let birth_field = correct(&slice(&l2, 13, 19), Alphabet::Numeric, autocorrect);
    let birth_check = correct(&slice(&l2, 19, 20), Alphabet::Numeric, autocorrect);
    let expiry_field = correct(&slice(&l2, 21, 27), Alphabet::Numeric, autocorrect);
    let expiry_check = correct(&slice(&l2, 27, 28), Alphabet::Numeric, autocorrect);
    let personal_field = correct(&slice(&l2, 28, 42), Alphabet::Mixed, autocorrect);
    let personal_check = correct(&slice(&l2, 42, 43), Alphabet::Numeric, autocorrect);
    let composite_check = correct(&slice(&l2, 43, 44), Alphabet::Numeric, autocorrect);

    let doc_ok = digit_matches(&doc_field, &doc_check);
    if doc_ok {
        let trimmed = doc_field.trim_matches(FILLER).to_string();
        if !trimmed.is_empty() {
            parse.document_number = Some(trimmed);
        }
    } else {
        parse.failed_checks.push("document_number");
    }

    let birth_ok = digit_matches(&birth_field, &birth_check) && is_six_digits(&birth_field);
    if birth_ok {
        parse.birth_date = Some(birth_field.clone());
    } else {
        parse.failed_checks.push("birth_date");
    }

    let expiry_ok = digit_matches(&expiry_field, &expiry_check) && is_six_digits(&expiry_field);
    if expiry_ok {
        parse.expiry_date = Some(expiry_field.clone());
    } else {
        parse.failed_checks.push("expiry_date");
    }

    // Nationality has no check digit of its own; gate it on shape alone.
    if nationality.len() == 3 && nationality.chars().all(|c| c.is_ascii_alphabetic() || c == FILLER)
    {
        parse.nationality = Some(nationality);
    }

    // Composite digit spans document number, birth and expiry groups plus
    // the personal number field (positions 1-10, 14-20, 22-43).
    let composite_data = format!(
        "{}{}{}{}{}{}{}{}",
        doc_field,
        doc_check,
        birth_field,
        birth_check,
        expiry_field,
        expiry_check,
        personal_field,
        personal_check
    );
    let composite_ok = digit_matches(&composite_data, &composite_check);
    if !composite_ok {
        parse.failed_checks.push("composite");
    }

    parse.valid = doc_ok && birth_ok && expiry_ok && composite_ok;
    parse
}

/// ICAO 9303 check digit: character values (0-9 as-is, A=10..Z=35, `<`=0)
/// weighted 7,3,1 repeating, summed modulo 10.
pub fn check_digit(data: &str) -> Option<u32> {
    const WEIGHTS: [u32; 3] = [7, 3, 1];
    let mut sum = 0u32;
    for (i, c) in data.chars().enumerate() {
        let value = match c {
            '0'..='9' => c as u32 - '0' as u32,
            'A'..='Z' => c as u32 - 'A' as u32 + 10,
            FILLER => 0,
            _ => return None,
        };
        sum += value * WEIGHTS[i % 3];
    }
    Some(sum % 10)
}

fn digit_matches(data: &str, check: &str) -> bool {
    let expected = match check.chars().next().and_then(|c| c.to_digit(10)) {
        Some(d) => d,
        None => return false,
    };
    check_digit(data) == Some(expected)
}

fn is_six_digits(s: &str) -> bool {
    s.len() == 6 && s.chars().all(|c| c.is_ascii_digit())
}

fn slice(chars: &[char], start: usize, end: usize) -> String {
    chars[start..end].iter().collect()
}

enum Alphabet {
    Numeric,
    Alpha,
    Mixed,
}

/// Repair the OCR confusions that matter for the given subfield alphabet.
/// Mixed fields (document number, personal number) are left alone because
/// either reading could be correct there.
fn correct(field: &str, alphabet: Alphabet, enabled: bool) -> String {
    if !enabled {
        return field.to_string();
    }
    match alphabet {
        Alphabet::Numeric => field
            .chars()
            .map(|c| match c {
                'O' | 'Q' | 'D' => '0',
                'I' | 'L' => '1',
                'Z' => '2',
                'S' => '5',
                'G' => '6',
                'B' => '8',
                _ => c,
            })
            .collect(),
        Alphabet::Alpha => field
            .chars()
            .map(|c| match c {
                '0' => 'O',
                '1' => 'I',
                '2' => 'Z',
                '5' => 'S',
                '6' => 'G',
                '8' => 'B',
                _ => c,
            })
            .collect(),
        Alphabet::Mixed => field.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ICAO Doc 9303 specimen (Utopia / Anna Maria Eriksson).
    const SPECIMEN_L1: &str = "P<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<";
    const SPECIMEN_L2: &str = "L898902C36UTO7408122F1204159ZE184226B<<<<<10";

    #[test]
    fn test_check_digit_specimen_values() {
        assert_eq!(check_digit("L898902C3"), Some(6));
        assert_eq!(check_digit("740812"), Some(2));
        assert_eq!(check_digit("120415"), Some(9));
        assert_eq!(check_digit("<<<<<<"), Some(0));
    }

    #[test]
    fn test_specimen_parses_valid() {
        let parse = parse(SPECIMEN_L1, SPECIMEN_L2, false);
        assert!(parse.valid, "failed checks: {:?}", parse.failed_checks);
        assert_eq!(parse.document_number.as_deref(), Some("L898902C3"));
        assert_eq!(parse.nationality.as_deref(), Some("UTO"));
        assert_eq!(parse.birth_date.as_deref(), Some("740812"));
        assert_eq!(parse.expiry_date.as_deref(), Some("120415"));
    }

    #[test]
    fn test_autocorrect_repairs_numeric_field() {
        // Birth date with OCR substitutions: 74O8I2 should read as 740812.
        let garbled = "L898902C36UTO74O8I22F1204159ZE184226B<<<<<10";
        let strict = parse(SPECIMEN_L1, garbled, false);
        assert!(strict.birth_date.is_none());

        let corrected = parse(SPECIMEN_L1, garbled, true);
        assert_eq!(corrected.birth_date.as_deref(), Some("740812"));
    }

    #[test]
    fn test_bad_check_digit_withholds_field() {
        // Flip the document number check digit from 6 to 7.
        let tampered = "L898902C37UTO7408122F1204159ZE184226B<<<<<10";
        let parse = parse(SPECIMEN_L1, tampered, false);
        assert!(!parse.valid);
        assert!(parse.document_number.is_none());
        assert!(parse.failed_checks.contains(&"document_number"));
        // Unrelated fields still verify.
        assert_eq!(parse.birth_date.as_deref(), Some("740812"));
    }

    #[test]
    fn test_wrong_line_length_rejected() {
        let parse = parse("P<UTO", "L898902C3", true);
        assert!(!parse.valid);
        assert_eq!(parse.failed_checks, vec!["line_length"]);
    }
}
