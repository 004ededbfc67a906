//! Shared-secret check for the log-read endpoint.
//!
//! The secret is read from `?token=`, or from `Authorization: Bearer` when the
//! query carries none.

/// Byte-wise comparison whose running time only depends on `expected`.
fn same_secret(provided: &[u8], expected: &[u8]) -> bool {
    let mut diff = provided.len() ^ expected.len();
    for (i, byte) in expected.iter().enumerate() {
        let other = provided.get(i).copied().unwrap_or(!*byte);
        diff |= usize::from(other ^ byte);
    }
    diff == 0
}

/// `Authorization` value to token, when it uses the Bearer scheme.
fn bearer(authorization: &str) -> Option<&str> {
    let (scheme, token) = authorization.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}

/// Whether a log-read request carries the configured secret.
///
/// With no secret configured the endpoint stays closed.
pub fn is_authorized(
    query_token: Option<&str>,
    authorization: Option<&str>,
    expected: Option<&str>,
) -> bool {
    let Some(expected) = expected.filter(|e| !e.is_empty()) else {
        return false;
    };

    match query_token
        .filter(|t| !t.is_empty())
        .or_else(|| authorization.and_then(bearer))
    {
        Some(token) => same_secret(token.as_bytes(), expected.as_bytes()),
        None => false,
    }
}
