use std::fmt::Display;

use unicode_normalization::UnicodeNormalization;

/// Strips accents and punctuation from already lower-cased text.
///
/// The text is decomposed (NFKD) so accented letters split into a base letter plus
/// combining marks, then every character outside `[alphanumeric, whitespace, _]` is
/// dropped, which removes the marks along with punctuation. Whitespace is kept as-is,
/// including at the edges of the value.
pub fn normalize(text: &str) -> String {
    text.nfkd()
        .filter(|ch| ch.is_alphanumeric() || ch.is_whitespace() || *ch == '_')
        .collect()
}

/// Lower-cases the display form of any value, then [`normalize`]s it.
pub fn normalize_value(value: impl Display) -> String {
    normalize(&value.to_string().to_lowercase())
}
