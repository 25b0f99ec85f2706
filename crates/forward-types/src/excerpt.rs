//! Quoting remote response bodies in error messages.

/// Maximum number of response body bytes quoted in error messages.
pub const ERROR_BODY_LIMIT: usize = 512;

/// The first `limit` bytes of `body`, cut back to a char boundary.
pub fn body_excerpt(body: &str, limit: usize) -> &str {
    if body.len() <= limit {
        return body;
    }
    let mut end = limit;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
