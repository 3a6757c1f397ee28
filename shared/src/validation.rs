//! Validation and normalization utilities for the warehouse engine
//!
//! Codes and slugs entered by operators are normalized here before they
//! reach storage or SKU composition.

use crate::error::{DomainError, DomainResult};

// ============================================================================
// Codes
// ============================================================================

/// Uppercase and strip everything outside `[A-Z0-9-]`
pub fn normalize_code(raw: &str) -> String {
    raw.trim()
        .chars()
        .flat_map(char::to_uppercase)
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || *c == '-')
        .collect()
}

/// Normalize a code and reject it if nothing is left
pub fn require_code(field: &str, raw: &str) -> DomainResult<String> {
    let code = normalize_code(raw);
    if code.trim_matches('-').is_empty() {
        return Err(DomainError::validation(
            field,
            "Code must contain at least one letter or digit",
        ));
    }
    Ok(code)
}

// ============================================================================
// Slugs
// ============================================================================

/// Transliterate Cyrillic to Latin; other characters pass through
pub fn transliterate(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars().flat_map(char::to_lowercase) {
        let mapped = match c {
            'а' => "a",
            'б' => "b",
            'в' => "v",
            'г' => "g",
            'д' => "d",
            'е' | 'ё' => "e",
            'ж' => "zh",
            'з' => "z",
            'и' => "i",
            'й' => "y",
            'к' => "k",
            'л' => "l",
            'м' => "m",
            'н' => "n",
            'о' => "o",
            'п' => "p",
            'р' => "r",
            'с' => "s",
            'т' => "t",
            'у' => "u",
            'ф' => "f",
            'х' => "h",
            'ц' => "ts",
            'ч' => "ch",
            'ш' => "sh",
            'щ' => "sch",
            'ъ' | 'ь' => "",
            'ы' => "y",
            'э' => "e",
            'ю' => "yu",
            'я' => "ya",
            ' ' => "_",
            other => {
                out.push(other);
                continue;
            }
        };
        out.push_str(mapped);
    }
    out
}

/// Lowercase and map anything outside `[a-z0-9_]` to `_`.
/// Returns `None` when the result has no letters or digits.
pub fn normalize_slug(raw: &str) -> Option<String> {
    let slug: String = raw
        .trim()
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let slug = slug.trim_matches('_').to_string();
    if slug.is_empty() {
        None
    } else {
        Some(slug)
    }
}

/// Slug for a display name, e.g. "Размер обуви" -> "razmer_obuvi"
pub fn derive_slug(name: &str) -> Option<String> {
    normalize_slug(&transliterate(name))
}

// ============================================================================
// General
// ============================================================================

/// Trimmed non-empty text
pub fn require_text<'a>(field: &str, value: &'a str) -> DomainResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(field, format!("{} must not be empty", field)));
    }
    Ok(trimmed)
}

/// Validate a `#RRGGBB` color swatch
pub fn validate_hex(hex: &str) -> DomainResult<()> {
    let valid = hex.len() == 7
        && hex.starts_with('#')
        && hex[1..].chars().all(|c| c.is_ascii_hexdigit());
    if valid {
        Ok(())
    } else {
        Err(DomainError::validation("hex", "Color must be in #RRGGBB form"))
    }
}

/// Validate stock thresholds: both non-negative
pub fn validate_thresholds(low: i32, critical: i32) -> DomainResult<()> {
    if low < 0 {
        return Err(DomainError::validation(
            "low_stock_threshold",
            "Threshold cannot be negative",
        ));
    }
    if critical < 0 {
        return Err(DomainError::validation(
            "critical_stock_threshold",
            "Threshold cannot be negative",
        ));
    }
    Ok(())
}
