//! URL slugs and email normalization
//!
//! Portal URLs are addressed as `/{company_slug}?client={client_slug}`. Company
//! slugs are never stored on the account; they are derived from the company name
//! (or the owner's name) with [`slugify`] every time.

/// Turn a display name into a URL slug.
///
/// Lowercases, drops everything outside `[a-z0-9]`, whitespace and `-`, turns
/// whitespace runs into a single `-`, collapses `-` runs and trims `-` at both ends.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for ch in input.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else if ch == '-' || ch.is_whitespace() {
            pending_dash = true;
        }
    }

    slug
}

/// Canonical form used for every email comparison and every stored email.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_slugify_company_names() {
        assert_eq!(slugify("Acme Design Co."), "acme-design-co");
        assert_eq!(slugify("  Studio   Nine  "), "studio-nine");
        assert_eq!(slugify("Jane's -- Web & Print"), "janes-web-print");
        assert_eq!(slugify("ÉCOLE 42"), "cole-42");
    }

    #[test]
    fn test_trailing_whitespace_leaves_no_dash() {
        assert_eq!(slugify("Acme Studio "), "acme-studio");
        assert_eq!(slugify("Acme Studio"), slugify("Acme Studio \t"));
    }

    #[test]
    fn test_slugify_degenerate_input() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("!!!"), "");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Client@Example.COM "), "client@example.com");
    }

    proptest! {
        #[test]
        fn slug_is_url_safe(input in ".{0,64}") {
            let slug = slugify(&input);
            prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            prop_assert!(!slug.starts_with('-'));
            prop_assert!(!slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
        }

        #[test]
        fn slugify_is_idempotent(input in ".{0,64}") {
            let once = slugify(&input);
            prop_assert_eq!(slugify(&once), once.clone());
        }
    }
}
