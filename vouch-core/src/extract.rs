//! Normalizes raw scanned, typed, or upload-decoded text into a canonical
//! [`Token`]. One extraction contract for all three input sources.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;
use vouch_model::Token;

// Tolerates loose query fragments (`batch=...&token=...`) that are not
// valid absolute URLs.
static LOOSE_PARAM_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[?&]?(?:token|t)=([^&\s]+)").expect("loose param pattern should compile")
});

/// Extract a voucher token from arbitrary input. Pure and total: any shape
/// that does not contain a token yields `None`, never an error — absence is
/// a user-input problem, not a fault.
///
/// Tried in order: the trimmed input as a bare token; a parseable URL's
/// `t`/`token` query parameter (`t` preferred); a permissive query-fragment
/// match against the raw string.
pub fn extract(input: &str) -> Option<Token> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(token) = Token::parse(trimmed) {
        return Some(token);
    }

    if let Ok(url) = Url::parse(trimmed) {
        let preferred = url
            .query_pairs()
            .find(|(key, _)| key == "t")
            .or_else(|| url.query_pairs().find(|(key, _)| key == "token"))
            .map(|(_, value)| value.into_owned());
        if let Some(candidate) = preferred
            && let Some(token) = Token::parse(&candidate)
        {
            return Some(token);
        }
    }

    LOOSE_PARAM_PATTERN
        .captures(trimmed)
        .and_then(|caps| Token::parse(&caps[1]))
}
