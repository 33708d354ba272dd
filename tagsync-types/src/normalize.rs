//! Node identifier normalization.
//!
//! Address-space identifiers such as `ns=3;s="001-RO03-Acionamento"."Motor"`
//! carry quotes, dots, namespace markers and other characters that are not
//! legal in unquoted SQL identifiers. [`normalize`] maps them onto a stable,
//! lower-case `[a-z][a-z0-9_]*` name that can be used both as a column name
//! and as a table name.
//!
//! The mapping is deterministic and idempotent:
//! `normalize(&normalize(x)) == normalize(x)` for every input.

/// Longest identifier PostgreSQL accepts without truncating it silently.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Name used when nothing usable survives normalization.
const FALLBACK_NAME: &str = "tag";

/// Prefix added to names that would otherwise start with a digit.
const LEADING_PREFIX: &str = "tag_";

/// Normalizes a raw node identifier into a storage-safe name.
///
/// Never fails: an input with no usable characters yields `"tag"`.
#[must_use]
pub fn normalize(raw: &str) -> String {
    let stripped = strip_markers(raw.trim());

    let mut out = String::with_capacity(stripped.len());
    for c in stripped.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }

    if out.is_empty() {
        return FALLBACK_NAME.to_string();
    }
    if !out.starts_with(|c: char| c.is_ascii_lowercase()) {
        out.insert_str(0, LEADING_PREFIX);
    }

    // Output is pure ASCII, so byte truncation is a char boundary.
    if out.len() > MAX_IDENTIFIER_LEN {
        out.truncate(MAX_IDENTIFIER_LEN);
        while out.ends_with('_') {
            out.pop();
        }
    }
    out
}

/// Returns true if `name` is already in normalized form.
#[must_use]
pub fn is_normalized(name: &str) -> bool {
    !name.is_empty() && normalize(name) == name
}

/// Strips a leading `ns=<n>;` namespace marker and a node-id type marker
/// (`s=`, `i=`, `g=`, `b=`).
fn strip_markers(raw: &str) -> &str {
    let mut rest = raw;

    if let Some(after_ns) = rest.strip_prefix("ns=") {
        let digits = after_ns.bytes().take_while(u8::is_ascii_digit).count();
        if digits > 0 {
            if let Some(after) = after_ns[digits..].strip_prefix(';') {
                rest = after;
            }
        }
    }

    for marker in ["s=", "i=", "g=", "b="] {
        if let Some(after) = rest.strip_prefix(marker) {
            return after;
        }
    }
    rest
}
