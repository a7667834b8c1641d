use regex::Regex;
use std::sync::LazyLock;

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("valid slug pattern"));

/// Replace each run of non-letter, non-digit characters with `_`, lower-case,
/// then trim leading and trailing `_`.
pub fn slug(input: &str) -> String {
    NON_WORD
        .replace_all(input, "_")
        .to_lowercase()
        .trim_matches('_')
        .to_string()
}
