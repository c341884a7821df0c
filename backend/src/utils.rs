use sha2::{Digest, Sha256};

/// Lowercase, with runs of anything but ASCII alphanumerics collapsed to `_`.
pub fn slugify(s: &str) -> String {
    let mut slug = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_end_matches('_').to_string()
}

/// Entity-id safe form of an opaque device id, unique per id.
///
/// Ids that are already a slug are kept as they are. Any other id gets the
/// first 8 hex digits of its SHA-256 appended to its slug, or used alone when
/// the slug is empty.
pub fn object_id(id: &str) -> String {
    let slug = slugify(id);
    if slug == id {
        return slug;
    }

    let digest = Sha256::digest(id.as_bytes());
    let tag = hex::encode(&digest[..4]);
    if slug.is_empty() {
        tag
    } else {
        format!("{slug}_{tag}")
    }
}
