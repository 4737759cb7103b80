//! Presentation helpers for confirmed redemptions. The view layer renders
//! the strings; the rules live here so every surface masks consistently.

use serde_json::Value;

use crate::outcome::ValidationResponse;

/// Mask the local part of an email address, keeping its first and last
/// character: `jane.doe@x.test` becomes `j***e@x.test`. Strings without a
/// domain part are returned unchanged.
pub fn mask_email(email: &str) -> String {
    let Some((name, domain)) = email.split_once('@') else {
        return email.to_owned();
    };
    let first = name.chars().next().map(String::from).unwrap_or_default();
    let last = name.chars().last().map(String::from).unwrap_or_default();
    format!("{first}***{last}@{domain}")
}

/// One-line summary of a confirmed redemption: name, masked email, and the
/// metadata batch id when present, joined with " · ".
pub fn receipt_summary(response: &ValidationResponse) -> String {
    let mut pieces = Vec::new();
    if let Some(name) = response.name.as_deref() {
        pieces.push(name.to_owned());
    }
    if let Some(email) = response.email.as_deref() {
        pieces.push(mask_email(email));
    }
    if let Some(batch) = batch_id(response) {
        pieces.push(format!("Batch: {batch}"));
    }
    pieces.join(" · ")
}

fn batch_id(response: &ValidationResponse) -> Option<String> {
    let batch = response.extra.get("meta")?.get("batch")?;
    match batch {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
