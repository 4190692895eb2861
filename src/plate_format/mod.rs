//! PlateFormat - Sri Lankan License Plate Normalization
//!
//! ## Responsibilities
//!
//! - Canonicalize raw OCR text into a formatted plate string
//! - Validate against the known plate grammars
//! - Correct common OCR character confusions (O/0, I/1, ...)
//!
//! Grammars are an ordered table of (pattern, canonicalizer) pairs, tried
//! most-specific first. The first grammar that matches wins. Unmatched input
//! is returned cleaned but unformatted with `valid = false`; normalization
//! never fails.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Sri Lankan province codes and names
pub const PROVINCE_CODES: &[(&str, &str)] = &[
    ("WP", "Western Province"),
    ("CP", "Central Province"),
    ("SP", "Southern Province"),
    ("NW", "North Western Province"),
    ("NC", "North Central Province"),
    ("UP", "Uva Province"),
    ("SG", "Sabaragamuwa Province"),
    ("EP", "Eastern Province"),
    ("NP", "Northern Province"),
];

/// Letters commonly misread for digits by the OCR engine
const CHAR_TO_DIGIT: &[(char, char)] = &[
    ('O', '0'),
    ('Q', '0'),
    ('D', '0'),
    ('I', '1'),
    ('L', '1'),
    ('Z', '2'),
    ('J', '3'),
    ('A', '4'),
    ('S', '5'),
    ('G', '6'),
    ('T', '7'),
    ('B', '8'),
];

/// Digits commonly misread for letters by the OCR engine
const DIGIT_TO_CHAR: &[(char, char)] = &[
    ('0', 'O'),
    ('1', 'I'),
    ('2', 'Z'),
    ('3', 'J'),
    ('4', 'A'),
    ('5', 'S'),
    ('6', 'G'),
    ('7', 'T'),
    ('8', 'B'),
];

/// Plate grammar family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlateKind {
    /// Modern format: `WP CA-1234` / `WP CAB-1234`
    Modern,
    /// Provincial numeric format: `WP 1234`
    Provincial,
    /// Old series format: `12-3456` / `123-4567`
    Old,
    /// Special vehicle format: `CAR 1234`, `GOV 1234`
    Special,
    /// No grammar matched
    Unknown,
}

/// Result of normalizing a raw OCR reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPlate {
    /// Canonical plate string, or the cleaned input when no grammar matched
    pub canonical: String,
    /// Whether a grammar matched
    pub valid: bool,
    /// Which grammar matched
    pub kind: PlateKind,
}

/// Expected character class at a position, used for OCR correction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Letter,
    Digit,
}

struct Grammar {
    pattern: Regex,
    kind: PlateKind,
    format: fn(&regex::Captures) -> Option<String>,
}

/// Ordered plate grammar table
///
/// Construction compiles the pattern table once; share a single instance.
pub struct PlateFormats {
    grammars: Vec<Grammar>,
}

impl PlateFormats {
    /// Build the grammar table, most-specific grammar first
    pub fn new() -> Self {
        let grammars = vec![
            Grammar {
                pattern: Regex::new(r"^([A-Z]{2})([A-Z]{2,3})([0-9]{4})$")
                    .expect("modern plate pattern"),
                kind: PlateKind::Modern,
                format: format_modern,
            },
            Grammar {
                pattern: Regex::new(r"^([A-Z]{2})([0-9]{4})$")
                    .expect("provincial plate pattern"),
                kind: PlateKind::Provincial,
                format: format_provincial,
            },
            Grammar {
                pattern: Regex::new(r"^([0-9]{2,3})([0-9]{4})$").expect("old plate pattern"),
                kind: PlateKind::Old,
                format: format_old,
            },
            Grammar {
                pattern: Regex::new(r"^([A-Z]{3})([0-9]{4})$").expect("special plate pattern"),
                kind: PlateKind::Special,
                format: format_special,
            },
        ];

        Self { grammars }
    }

    /// Normalize a raw OCR reading into a canonical plate string.
    ///
    /// Deterministic and total: identical input always yields the identical
    /// result and no input is an error. When no grammar matches even after
    /// OCR correction, the cleaned input is returned with `valid = false`.
    pub fn normalize(&self, raw: &str) -> NormalizedPlate {
        let cleaned = clean(raw);

        if cleaned.len() < 4 {
            return NormalizedPlate {
                canonical: cleaned,
                valid: false,
                kind: PlateKind::Unknown,
            };
        }

        if let Some(plate) = self.try_grammars(&cleaned) {
            return plate;
        }

        // Direct match failed; retry with OCR confusion correction against
        // the shapes plausible for this length.
        for candidate in correction_candidates(&cleaned) {
            if let Some(plate) = self.try_grammars(&candidate) {
                return plate;
            }
        }

        NormalizedPlate {
            canonical: cleaned,
            valid: false,
            kind: PlateKind::Unknown,
        }
    }

    fn try_grammars(&self, cleaned: &str) -> Option<NormalizedPlate> {
        for grammar in &self.grammars {
            if let Some(caps) = grammar.pattern.captures(cleaned) {
                if let Some(canonical) = (grammar.format)(&caps) {
                    return Some(NormalizedPlate {
                        canonical,
                        valid: true,
                        kind: grammar.kind,
                    });
                }
            }
        }
        None
    }
}

impl Default for PlateFormats {
    fn default() -> Self {
        Self::new()
    }
}

/// Look up the province name for a plate or province prefix
pub fn province_name(plate: &str) -> Option<&'static str> {
    let cleaned = clean(plate);
    let code = cleaned.get(0..2)?;
    PROVINCE_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

fn is_province(code: &str) -> bool {
    PROVINCE_CODES.iter().any(|(c, _)| *c == code)
}

/// Uppercase and strip everything that is not A-Z or 0-9
fn clean(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn format_modern(caps: &regex::Captures) -> Option<String> {
    let (province, letters, digits) = (&caps[1], &caps[2], &caps[3]);
    if !is_province(province) {
        return None;
    }
    Some(format!("{} {}-{}", province, letters, digits))
}

fn format_provincial(caps: &regex::Captures) -> Option<String> {
    let (province, digits) = (&caps[1], &caps[2]);
    if !is_province(province) {
        return None;
    }
    Some(format!("{} {}", province, digits))
}

fn format_old(caps: &regex::Captures) -> Option<String> {
    Some(format!("{}-{}", &caps[1], &caps[2]))
}

fn format_special(caps: &regex::Captures) -> Option<String> {
    Some(format!("{} {}", &caps[1], &caps[2]))
}

/// Rewrite characters whose class disagrees with the expected shape
fn correct(input: &str, classes: &[CharClass]) -> String {
    input
        .chars()
        .zip(classes.iter())
        .map(|(c, class)| match class {
            CharClass::Digit => CHAR_TO_DIGIT
                .iter()
                .find(|(from, _)| *from == c)
                .map(|(_, to)| *to)
                .unwrap_or(c),
            CharClass::Letter => DIGIT_TO_CHAR
                .iter()
                .find(|(from, _)| *from == c)
                .map(|(_, to)| *to)
                .unwrap_or(c),
        })
        .collect()
}

/// Corrected rewrites of the cleaned input, ordered by shape likelihood
fn correction_candidates(cleaned: &str) -> Vec<String> {
    let len = cleaned.len();
    let mut candidates = Vec::new();

    let shape = |letters: usize, digits: usize| {
        let mut classes = vec![CharClass::Letter; letters];
        classes.extend(std::iter::repeat(CharClass::Digit).take(digits));
        classes
    };

    if len >= 8 {
        // Modern: everything before the trailing four digits is letters
        candidates.push(correct(cleaned, &shape(len - 4, 4)));
    } else if len == 7 {
        // Special: three letters, four digits
        candidates.push(correct(cleaned, &shape(3, 4)));
        // Old series: all digits
        candidates.push(correct(cleaned, &shape(0, 7)));
    } else if len == 6 {
        // Provincial: two letters, four digits
        candidates.push(correct(cleaned, &shape(2, 4)));
        // Old series: all digits
        candidates.push(correct(cleaned, &shape(0, 6)));
    }

    candidates.dedup();
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modern_format() {
        let formats = PlateFormats::new();
        let plate = formats.normalize("WPCA1234");
        assert_eq!(plate.canonical, "WP CA-1234");
        assert!(plate.valid);
        assert_eq!(plate.kind, PlateKind::Modern);
    }

    #[test]
    fn test_modern_three_letter_series() {
        let formats = PlateFormats::new();
        let plate = formats.normalize("WP CAB-1234");
        assert_eq!(plate.canonical, "WP CAB-1234");
        assert!(plate.valid);
    }

    #[test]
    fn test_special_not_shadowed_by_modern() {
        let formats = PlateFormats::new();
        let plate = formats.normalize("CAR1234");
        assert_eq!(plate.canonical, "CAR 1234");
        assert_eq!(plate.kind, PlateKind::Special);
    }

    #[test]
    fn test_provincial_numeric() {
        let formats = PlateFormats::new();
        let plate = formats.normalize("WP1234");
        assert_eq!(plate.canonical, "WP 1234");
        assert_eq!(plate.kind, PlateKind::Provincial);
    }

    #[test]
    fn test_old_series() {
        let formats = PlateFormats::new();
        assert_eq!(formats.normalize("123456").canonical, "12-3456");
        assert_eq!(formats.normalize("1234567").canonical, "123-4567");
    }

    #[test]
    fn test_unknown_province_is_invalid() {
        let formats = PlateFormats::new();
        let plate = formats.normalize("XXCA1234");
        assert!(!plate.valid);
        assert_eq!(plate.kind, PlateKind::Unknown);
    }

    #[test]
    fn test_unmatched_returns_cleaned_input() {
        let formats = PlateFormats::new();
        let plate = formats.normalize("XX99");
        assert_eq!(plate.canonical, "XX99");
        assert!(!plate.valid);
    }

    #[test]
    fn test_noise_stripped_before_matching() {
        let formats = PlateFormats::new();
        let plate = formats.normalize("wp ca-1234");
        assert_eq!(plate.canonical, "WP CA-1234");
        assert!(plate.valid);
    }

    #[test]
    fn test_empty_input() {
        let formats = PlateFormats::new();
        let plate = formats.normalize("");
        assert_eq!(plate.canonical, "");
        assert!(!plate.valid);
    }

    #[test]
    fn test_ocr_confusion_corrected_modern() {
        let formats = PlateFormats::new();
        // Trailing digit misread as a letter
        let plate = formats.normalize("WPCAI234");
        assert_eq!(plate.canonical, "WP CA-1234");
        assert!(plate.valid);
    }

    #[test]
    fn test_ocr_confusion_corrected_provincial() {
        let formats = PlateFormats::new();
        let plate = formats.normalize("WPI234");
        assert_eq!(plate.canonical, "WP 1234");
        assert!(plate.valid);
    }

    #[test]
    fn test_deterministic() {
        let formats = PlateFormats::new();
        for raw in ["WPCA1234", "XX99", "", "CAR1234", "??!!"] {
            assert_eq!(formats.normalize(raw), formats.normalize(raw));
        }
    }

    #[test]
    fn test_province_name() {
        assert_eq!(province_name("WP CA-1234"), Some("Western Province"));
        assert_eq!(province_name("ZZ 1234"), None);
    }
}
