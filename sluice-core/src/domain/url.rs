//! Best-effort URL normalization for cache keys.
//!
//! This is not a canonicalization: percent-encoding, dot segments and default
//! ports are left alone. Two spellings of the same absolute URL that differ
//! only in the case of the scheme or host, or in an empty versus `/` path,
//! normalize to the same key.

/// Normalizes `raw` for use as a cache key.
///
/// The scheme and host are lower-cased and an empty path becomes `/`.
/// Inputs without a `scheme://` prefix are returned unchanged.
///
/// ```
/// use sluice_core::normalize_url;
///
/// assert_eq!(normalize_url("HTTP://Example.org?q=1"), "http://example.org/?q=1");
/// assert_eq!(normalize_url("/relative"), "/relative");
/// ```
pub fn normalize_url(raw: &str) -> String {
    let Some((scheme, rest)) = raw.split_once("://") else {
        return raw.to_string();
    };
    if !is_scheme(scheme) {
        return raw.to_string();
    }

    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(authority_end);

    // Userinfo is case-sensitive, only the host part after it is folded.
    let authority = match authority.rsplit_once('@') {
        Some((userinfo, host)) => format!("{userinfo}@{}", host.to_ascii_lowercase()),
        None => authority.to_ascii_lowercase(),
    };

    let mut out = String::with_capacity(raw.len() + 1);
    out.push_str(&scheme.to_ascii_lowercase());
    out.push_str("://");
    out.push_str(&authority);
    if !tail.starts_with('/') {
        out.push('/');
    }
    out.push_str(tail);
    out
}

fn is_scheme(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
