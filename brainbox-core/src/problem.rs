//! Problem identifiers as typed by users.

/// Extract a problem slug from a bare slug or a problem URL.
///
/// Accepts `two-sum`, `https://leetcode.com/problems/two-sum/` and
/// `https://leetcode.com/problems/two-sum/description/`. Returns `None` for
/// blank input or a URL without a `problems/<slug>` segment.
pub fn problem_slug_from_input(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(url) = url::Url::parse(input) {
        return slug_after_problems(url.path_segments()?);
    }

    let slug = input.trim_matches('/');
    if slug.contains('/') {
        // Scheme-less URL such as `leetcode.com/problems/two-sum`.
        return slug_after_problems(slug.split('/'));
    }
    if slug.is_empty() || slug.contains(char::is_whitespace) {
        return None;
    }
    Some(slug.to_lowercase())
}

fn slug_after_problems<'a>(mut segments: impl Iterator<Item = &'a str>) -> Option<String> {
    while let Some(segment) = segments.next() {
        if segment == "problems" {
            return segments
                .next()
                .filter(|s| !s.is_empty())
                .map(|s| s.to_lowercase());
        }
    }
    None
}

/// Human-readable title for a slug: `two-sum` becomes `Two Sum`.
pub fn title_from_slug(slug: &str) -> String {
    slug.split('-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
