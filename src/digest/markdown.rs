//! Markdown scraping for digest replies.
//!
//! The reply contract puts named `## ` sections and a fenced JSON tail in
//! the markdown body. Both extractors are lenient: an absent heading means
//! an empty list, an unparseable tail means no tail.

use serde_json::Value;

/// Collect the `- ` / `• ` bullet lines under `## <heading>`, stopping at
/// the next `## ` heading or end of text. Matching is case-insensitive and
/// tolerates typographic apostrophes.
pub fn section_bullets(markdown: &str, heading: &str) -> Vec<String> {
    let wanted = normalize_heading(heading);
    let mut bullets = Vec::new();
    let mut in_section = false;

    for line in markdown.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("## ") {
            in_section = normalize_heading(rest) == wanted;
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some(text) = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("• "))
        {
            let text = text.trim();
            if !text.is_empty() {
                bullets.push(text.to_string());
            }
        }
    }
    bullets
}

fn normalize_heading(heading: &str) -> String {
    heading.trim().to_lowercase().replace('\u{2019}', "'")
}

/// Extract the first backtick-fenced block and parse it as JSON. Strict
/// parse first, then the substring between the first `{` and last `}` to
/// tolerate stray prose inside the fence. Returns `None` when there is no
/// fence or nothing parses to a JSON object.
pub fn extract_tail(markdown: &str) -> Option<Value> {
    let fence_start = markdown.find("```")?;
    let after_fence = &markdown[fence_start + 3..];
    // Skip the language tag line, if any.
    let body_start = after_fence.find('\n').map_or(0, |idx| idx + 1);
    let body = &after_fence[body_start..];
    let body = match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    };

    if let Ok(value) = serde_json::from_str::<Value>(body.trim())
        && value.is_object()
    {
        return Some(value);
    }

    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&body[start..=end])
        .ok()
        .filter(Value::is_object)
}

/// String-array field from a parsed tail, defaulting to empty.
pub fn tail_string_list(tail: Option<&Value>, key: &str) -> Vec<String> {
    tail.and_then(|value| value.get(key))
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
