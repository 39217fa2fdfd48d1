//! Pure extractors over OpenFDA label results.

use crate::entities::disease::DiseaseMedication;
use crate::entities::drug::AllergySummary;
use crate::sources::openfda::LabelResult;

pub(crate) const INDICATIONS_UNAVAILABLE: &str = "Indication information not available";

const ALLERGY_MARKERS: &[&str] = &["allerg", "hypersensitivity"];
const SEVERE_ALLERGY_MARKERS: &[&str] = &["allerg", "hypersensitivity", "anaphyla"];

const EXCERPT_BEFORE: usize = 50;
const EXCERPT_AFTER: usize = 150;

fn non_empty(values: &[String]) -> Vec<String> {
    values
        .iter()
        .filter(|v| !v.trim().is_empty())
        .cloned()
        .collect()
}

/// Non-blank `indications_and_usage`, else non-blank `purpose`, else the
/// placeholder.
pub(crate) fn indications(label: Option<&LabelResult>) -> Vec<String> {
    let Some(label) = label else {
        return vec![INDICATIONS_UNAVAILABLE.to_string()];
    };

    let usage = non_empty(label.indications_and_usage.as_slice());
    if !usage.is_empty() {
        return usage;
    }
    let purpose = non_empty(label.purpose.as_slice());
    if !purpose.is_empty() {
        return purpose;
    }
    vec![INDICATIONS_UNAVAILABLE.to_string()]
}

fn mentions_any(text: &str, markers: &[&str]) -> bool {
    let lower = text.to_lowercase();
    markers.iter().any(|m| lower.contains(m))
}

fn matching(values: &[String], markers: &[&str]) -> Vec<String> {
    values
        .iter()
        .filter(|v| mentions_any(v, markers))
        .cloned()
        .collect()
}

pub(crate) fn allergy_summary(label: Option<&LabelResult>) -> AllergySummary {
    let Some(label) = label else {
        return AllergySummary::default();
    };

    let mut warnings = matching(label.warnings.as_slice(), ALLERGY_MARKERS);
    warnings.extend(matching(label.contraindications.as_slice(), ALLERGY_MARKERS));

    AllergySummary {
        common_reactions: label.adverse_reactions.as_slice().to_vec(),
        severe_reactions: matching(label.boxed_warning.as_slice(), SEVERE_ALLERGY_MARKERS),
        warnings,
    }
}

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Case-insensitive mention of `disease` with up to 50 characters of context
/// before it and 150 after it, wrapped in ellipses. Offsets count characters,
/// not bytes.
pub(crate) fn disease_excerpt(text: &str, disease: &str) -> Option<String> {
    let needle: Vec<char> = disease.trim().chars().map(fold).collect();
    if needle.is_empty() {
        return None;
    }
    let haystack: Vec<char> = text.chars().collect();
    let pos = haystack
        .windows(needle.len())
        .position(|window| window.iter().map(|c| fold(*c)).eq(needle.iter().copied()))?;

    let start = pos.saturating_sub(EXCERPT_BEFORE);
    let end = (pos + needle.len() + EXCERPT_AFTER).min(haystack.len());
    let excerpt: String = haystack[start..end].iter().collect();
    Some(format!("...{excerpt}..."))
}

fn first_trimmed(values: &[String]) -> Option<String> {
    values
        .first()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Product summary for a label that matched a disease search; `None` when the
/// label names neither a brand nor a generic product.
pub(crate) fn disease_medication(label: &LabelResult, disease: &str) -> Option<DiseaseMedication> {
    let brand_name = first_trimmed(label.openfda.brand_name.as_slice());
    let generic_name = first_trimmed(label.openfda.generic_name.as_slice());
    if brand_name.is_none() && generic_name.is_none() {
        return None;
    }

    let text = label.indications_and_usage.as_slice().join(" ");
    Some(DiseaseMedication {
        brand_name,
        generic_name,
        manufacturer: first_trimmed(label.openfda.manufacturer_name.as_slice()),
        relevance: disease_excerpt(&text, disease),
    })
}

/// Strips the `[EPC]`/`[MoA]`/`[CS]`/`[PE]` suffix OpenFDA appends to class tags.
pub(crate) fn clean_class_tag(value: &str) -> String {
    let trimmed = value.trim();
    let trimmed = ["[EPC]", "[MoA]", "[CS]", "[PE]"]
        .iter()
        .find_map(|suffix| trimmed.strip_suffix(suffix))
        .unwrap_or(trimmed);
    trimmed.trim().to_string()
}
