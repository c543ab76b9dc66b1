//! Station name normalization
//!
//! The historical export, the real-time arrival feed and the category tables
//! spell station names differently ("서울역" vs "서울", "Seoul-station" vs
//! "Seoul"). Lookups and joins go through [`join_key`]; output keeps the
//! caller's trimmed label.

const KOREAN_SUFFIX: char = '역';
const ENGLISH_SUFFIX: &str = "station";
const SEPARATORS: &[char] = &['-', '_', ' '];

/// Trimmed label, preserved for output keys
pub fn display_name(raw: &str) -> String {
    raw.trim().to_string()
}

/// Remove parenthesized qualifiers such as line numbers: "서울역(1)" -> "서울역"
pub fn clean_label(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    let mut depth = 0usize;
    for c in raw.chars() {
        match c {
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => cleaned.push(c),
            _ => {}
        }
    }
    cleaned.trim().to_string()
}

/// Normalized key used for category lookups and historical joins
///
/// Strips surrounding whitespace and one trailing station token:
/// "역" (attached), or "station" separated by '-', '_' or a space.
/// A name that would become empty is returned trimmed but otherwise intact.
pub fn join_key(raw: &str) -> String {
    let trimmed = raw.trim();

    if let Some(stem) = trimmed.strip_suffix(KOREAN_SUFFIX) {
        let stem = stem.trim_end();
        if !stem.is_empty() {
            return stem.to_string();
        }
        return trimmed.to_string();
    }

    if trimmed.len() > ENGLISH_SUFFIX.len() {
        let split = trimmed.len() - ENGLISH_SUFFIX.len();
        if trimmed.is_char_boundary(split)
            && trimmed[split..].eq_ignore_ascii_case(ENGLISH_SUFFIX)
        {
            let head = &trimmed[..split];
            if head.ends_with(SEPARATORS) {
                let stem = head.trim_end_matches(SEPARATORS);
                if !stem.is_empty() {
                    return stem.to_string();
                }
            }
        }
    }

    trimmed.to_string()
}

/// Query text for place search: the station name with "역" attached
pub fn search_label(raw: &str) -> String {
    format!("{}{}", join_key(raw), KOREAN_SUFFIX)
}
