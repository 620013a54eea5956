//! Bearer credential handling shared by the identity gate and verifiers.

/// Remove a leading `Bearer ` scheme (case-insensitive) and surrounding
/// whitespace. Credentials without a scheme are returned trimmed.
pub fn strip_bearer(credential: &str) -> &str {
    let trimmed = credential.trim_start();
    match trimmed.get(..7) {
        Some(scheme) if scheme.eq_ignore_ascii_case("bearer ") => trimmed[7..].trim(),
        _ => trimmed.trim_end(),
    }
}
