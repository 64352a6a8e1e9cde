/// Returns `true` if the HTTP status code indicates a redirect.
///
/// # Examples
///
/// ```
/// use hubcache_fetch::is_redirect;
///
/// assert!(is_redirect(302));
/// assert!(!is_redirect(200));
/// assert!(!is_redirect(304));
/// ```
pub fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Returns `true` for 2xx status codes.
pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}
