//! Script validation for text-to-speech pitfalls.
//!
//! The validator only reports. It never rewrites the script.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Category of a flagged token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Acronym,
    CompoundTerm,
    Number,
    BrandName,
}

impl IssueKind {
    pub fn display_name(&self) -> &str {
        match self {
            IssueKind::Acronym => "ACRONYM",
            IssueKind::CompoundTerm => "COMPOUND",
            IssueKind::Number => "NUMBER",
            IssueKind::BrandName => "BRAND",
        }
    }
}

/// Whether a human has to look at the issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredAction {
    /// Cosmetic; the engine reads it acceptably.
    Auto,
    /// Pick one of several pronunciations.
    Choose,
    /// Confirm the suggested pronunciation.
    Confirm,
}

impl fmt::Display for RequiredAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequiredAction::Auto => "auto",
            RequiredAction::Choose => "choose",
            RequiredAction::Confirm => "confirm",
        };
        f.write_str(name)
    }
}

/// A potential pronunciation problem found in a script.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub matched_text: String,
    pub suggestion: String,
    pub required_action: RequiredAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phonetic_hint: Option<String>,
}

/// (acronym, IPA, suggestion)
const ACRONYMS: &[(&str, &str, &str)] = &[
    ("LAUSD", "lˈɔːzd", "Pronounce as 'LAWZD'"),
    ("SFUSD", "ɛs ɛf juː ɛs dˈiː", "Spell out 'S.F.U.S.D.'"),
    ("NYCDOE", "ɛn waɪ siː diː oʊ ˈiː", "Spell out"),
    ("SSO", "ɛs ɛs ˈoʊ", "Spell out 'S.S.O.'"),
    ("LTI", "ɛl tiː ˈaɪ", "Spell out 'L.T.I.'"),
    ("SAML", "sˈæməl", "Pronounce as 'SAM-ul'"),
    ("FERPA", "fˈɜːpə", "Pronounce as 'FUR-pah'"),
    ("COPPA", "kˈɑːpə", "Pronounce as 'COP-ah'"),
    ("API", "ˌeɪ piː ˈaɪ", "Spell out 'A.P.I.'"),
    ("PII", "piː aɪ ˈaɪ", "Spell out 'P.I.I.'"),
];

/// (compound, joined replacement, IPA)
const COMPOUNDS: &[(&str, &str, &str)] = &[
    ("data breach", "databreach", "dˈeɪɾəbɹˌiːtʃ"),
    ("on boarding", "onboarding", "ˈɑːnbˌɔːɹdɪŋ"),
    ("sign on", "signon", "sˈaɪnˌɑːn"),
];

/// (brand, IPA)
const BRANDS: &[(&str, &str)] = &[
    ("PowerSchool", "pˈaʊɚ skˈuːl"),
    ("SchoolDay", "skˈuːl dˈeɪ"),
    ("Clever", "klˈɛvɚ"),
    ("OneRoster", "wˈʌn ɹˈɑːstɚ"),
    ("Ed-Fi", "ˈɛdfˌaɪ"),
    ("OpenID", "ˈoʊpən aɪdˈiː"),
];

static NUMBER_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\$\d+(?:\.\d+)?", "currency"),
        (r"(?i)\d+\s*(?:million|billion|thousand)", "large number"),
        (r"\d+(?:\.\d+)?\s*%", "percentage"),
        (r"\d{1,3}(?:,\d{3})+", "formatted number"),
    ]
    .into_iter()
    .filter_map(|(pattern, label)| Regex::new(pattern).ok().map(|re| (re, label)))
    .collect()
});

/// Scan a script and report tokens a TTS engine is likely to misread.
///
/// Issues come back grouped: acronyms, compound terms, numbers (in text
/// order), then brand names.
pub fn analyze(text: &str) -> Vec<Issue> {
    let mut issues = Vec::new();

    for (acronym, ipa, suggestion) in ACRONYMS {
        if text.contains(acronym) {
            issues.push(Issue {
                kind: IssueKind::Acronym,
                matched_text: acronym.to_string(),
                suggestion: suggestion.to_string(),
                required_action: RequiredAction::Choose,
                phonetic_hint: Some(ipa.to_string()),
            });
        }
    }

    let lowered = text.to_lowercase();
    for (compound, replacement, ipa) in COMPOUNDS {
        if lowered.contains(compound) {
            issues.push(Issue {
                kind: IssueKind::CompoundTerm,
                matched_text: compound.to_string(),
                suggestion: format!("Use '{}' (no pause)", replacement),
                required_action: RequiredAction::Confirm,
                phonetic_hint: Some(ipa.to_string()),
            });
        }
    }

    let mut numbers: Vec<(usize, usize, Issue)> = Vec::new();
    for (order, (re, label)) in NUMBER_PATTERNS.iter().enumerate() {
        for m in re.find_iter(text) {
            numbers.push((
                m.start(),
                order,
                Issue {
                    kind: IssueKind::Number,
                    matched_text: m.as_str().to_string(),
                    suggestion: format!("Will be spoken naturally ({})", label),
                    required_action: RequiredAction::Auto,
                    phonetic_hint: None,
                },
            ));
        }
    }
    numbers.sort_by_key(|(start, order, _)| (*start, *order));
    issues.extend(numbers.into_iter().map(|(_, _, issue)| issue));

    for (brand, ipa) in BRANDS {
        if text.contains(brand) {
            issues.push(Issue {
                kind: IssueKind::BrandName,
                matched_text: brand.to_string(),
                suggestion: "Standard pronunciation".to_string(),
                required_action: RequiredAction::Confirm,
                phonetic_hint: Some(ipa.to_string()),
            });
        }
    }

    issues
}

/// True when any issue needs a human decision.
pub fn needs_review(issues: &[Issue]) -> bool {
    issues
        .iter()
        .any(|issue| issue.required_action != RequiredAction::Auto)
}
