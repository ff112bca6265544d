//! Slug derivation and uniqueness allocation.
//!
//! Allocation is deterministic given a stable existence predicate but is NOT
//! safe against two concurrent inserts of the same title; storage backends
//! that can express it back this with a unique index on `posts.slug`.

/// Derive a URL-safe slug: lowercase ASCII alphanumerics with single hyphens
/// where anything else appeared, no leading/trailing hyphens. Symbol-only
/// titles produce an empty string; callers substitute a placeholder derived
/// from the post id instead of allocating from empty input.
pub fn slugify(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_hyphen = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    out
}

/// First free candidate among `base`, `base-1`, `base-2`, ...
///
/// `taken` is the existence check against current posts (excluding the post
/// itself on update paths). Must not be called with a title that slugifies
/// to the empty string.
pub fn allocate<F>(title: &str, mut taken: F) -> String
where
    F: FnMut(&str) -> bool,
{
    let base = slugify(title);
    if !taken(&base) {
        return base;
    }
    let mut counter = 1u64;
    loop {
        let candidate = format!("{base}-{counter}");
        if !taken(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}
