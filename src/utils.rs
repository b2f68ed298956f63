use unicode_width::UnicodeWidthChar;

use url::Url;

/// Ellipsis marker appended to truncated text.
pub const ELLIPSIS: &str = "...";

/// Safely truncate a string by display width, ensuring it is not truncated in the middle of multi-byte characters
///
/// Used for fixed-width terminal output: wide characters (CJK, emoji) count as two columns.
#[allow(dead_code)]
pub fn truncate_str(s: &str, max_width: usize) -> String {
    use unicode_width::UnicodeWidthStr;

    if s.width() <= max_width {
        return s.to_string();
    }

    let mut result = String::new();
    let mut current_width = 0;

    for c in s.chars() {
        let char_width = c.width().unwrap_or(1);

        if current_width + char_width + ELLIPSIS.len() > max_width {
            break;
        }

        result.push(c);
        current_width += char_width;
    }

    result.push_str(ELLIPSIS);
    result
}

/// Truncate to at most `max_chars` characters, replacing the tail with an ellipsis.
///
/// Counts `char`s rather than bytes so a codepoint is never split.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }

    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut result: String = s.chars().take(keep).collect();
    result.push_str(ELLIPSIS);
    result
}

/// Collapse every run of whitespace (including newlines) into a single space and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `host` equals `domain` or is one of its subdomains.
pub fn host_matches_domain(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let domain = domain.trim_start_matches('.').to_ascii_lowercase();
    if domain.is_empty() {
        return false;
    }
    host == domain || host.ends_with(&format!(".{domain}"))
}

/// Lowercased host of an absolute URL string, if it has one.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

/// Trimmed, non-empty text or nothing.
pub fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
