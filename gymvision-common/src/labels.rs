//! Label normalization helpers
//!
//! Model vocabularies spell the same equipment many ways ("Lat Pull Down",
//! "lat-pull-down", "LAT_PULL_DOWN"). Everything that compares labels goes
//! through [`normalize_label`] first.

/// Normalize arbitrary label text into a token of lowercase alphanumerics
/// separated by single underscores.
///
/// Runs of any other characters collapse into one separator and the token
/// never starts or ends with an underscore. Empty input yields an empty token.
/// Normalizing an already-normalized token returns it unchanged.
///
/// # Examples
/// ```
/// use gymvision_common::labels::normalize_label;
///
/// assert_eq!(normalize_label("Lat Pull Down"), "lat_pull_down");
/// assert_eq!(normalize_label("  T-Bar Row "), "t_bar_row");
/// assert_eq!(normalize_label(""), "");
/// ```
pub fn normalize_label(text: &str) -> String {
    let mut token = String::with_capacity(text.len());
    let mut pending_separator = false;

    for ch in text.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            if pending_separator && !token.is_empty() {
                token.push('_');
            }
            pending_separator = false;
            token.push(ch);
        } else {
            pending_separator = true;
        }
    }

    token
}

/// Turn a canonical key back into a human readable title
///
/// `"lat_pulldown"` becomes `"Lat Pulldown"`. Used when the catalog has no
/// display name for a key.
pub fn display_from_key(key: &str) -> String {
    key.split(|c: char| c == '_' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strip everything except alphanumerics and lowercase the rest
///
/// Used to match illustration file stems ("Pull-Up" and "pull_up" both
/// become `"pullup"`).
pub fn slugify(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Uppercase the first character, lowercase the remainder
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
