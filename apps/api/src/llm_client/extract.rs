//! Structured-data recovery for free-form completion text.
//!
//! Strategies run in a fixed order and the first one yielding valid JSON wins:
//! 1. the whole payload as JSON
//! 2. the contents of a fenced code block (tagged or untagged)
//! 3. the first balanced `{...}` span that parses

use serde::Serialize;
use serde_json::Value;

/// Which recovery strategy produced the value. Logged for upstream quality tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Direct,
    FencedBlock,
    BalancedBraces,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub value: Value,
    pub method: ExtractionMethod,
}

/// Attempts to recover a JSON value from `text`. Returns `None` if every strategy fails.
pub fn extract_json(text: &str) -> Option<Extracted> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(Extracted {
            value,
            method: ExtractionMethod::Direct,
        });
    }

    for block in fenced_blocks(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(block) {
            return Some(Extracted {
                value,
                method: ExtractionMethod::FencedBlock,
            });
        }
    }

    for span in balanced_object_spans(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(span) {
            return Some(Extracted {
                value,
                method: ExtractionMethod::BalancedBraces,
            });
        }
    }

    None
}

/// Returns the bodies of all ``` fenced blocks in order, language tags stripped.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("```") {
        let after_open = &rest[start + 3..];
        let Some(end) = after_open.find("```") else {
            break;
        };
        blocks.push(strip_language_tag(&after_open[..end]).trim());
        rest = &after_open[end + 3..];
    }

    blocks
}

/// Drops a leading `json` / `JSON` / `javascript` style tag line from a fenced block body.
fn strip_language_tag(inner: &str) -> &str {
    match inner.find('\n') {
        Some(newline) => {
            let first_line = inner[..newline].trim();
            let is_tag = first_line
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+'));
            if is_tag {
                &inner[newline + 1..]
            } else {
                inner
            }
        }
        None => inner,
    }
}

/// Every balanced `{...}` span, ordered by start position. Braces inside JSON strings
/// are ignored.
fn balanced_object_spans(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    bytes
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'{')
        .filter_map(|(start, _)| matching_brace(bytes, start).map(|end| &text[start..=end]))
        .collect()
}

fn matching_brace(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PAYLOAD: &str = r#"{"title": "Intro", "modules": [{"title": "M1", "sections": []}]}"#;

    #[test]
    fn test_direct_json_wins_first() {
        let extracted = extract_json(PAYLOAD).unwrap();
        assert_eq!(extracted.method, ExtractionMethod::Direct);
        assert_eq!(extracted.value["title"], "Intro");
    }

    #[test]
    fn test_fenced_block_equals_raw_json() {
        let raw = extract_json(PAYLOAD).unwrap();
        let tagged = extract_json(&format!(
            "Here is your course:\n```json\n{PAYLOAD}\n```\nEnjoy!"
        ))
        .unwrap();
        let untagged = extract_json(&format!("Sure.\n```\n{PAYLOAD}\n```")).unwrap();

        assert_eq!(tagged.method, ExtractionMethod::FencedBlock);
        assert_eq!(untagged.method, ExtractionMethod::FencedBlock);
        assert_eq!(tagged.value, raw.value);
        assert_eq!(untagged.value, raw.value);
    }

    #[test]
    fn test_skips_non_json_fence_and_uses_next() {
        let text = format!("```bash\necho hi\n```\nthen\n```json\n{PAYLOAD}\n```");
        let extracted = extract_json(&text).unwrap();
        assert_eq!(extracted.method, ExtractionMethod::FencedBlock);
        assert_eq!(extracted.value["title"], "Intro");
    }

    #[test]
    fn test_balanced_span_in_prose() {
        let text = format!("The generated structure is {PAYLOAD} and nothing else.");
        let extracted = extract_json(&text).unwrap();
        assert_eq!(extracted.method, ExtractionMethod::BalancedBraces);
        assert_eq!(extracted.value["modules"][0]["title"], "M1");
    }

    #[test]
    fn test_braces_inside_strings_do_not_unbalance() {
        let text = r#"Result: {"title": "Use } and { wisely", "n": 1} trailing"#;
        let extracted = extract_json(text).unwrap();
        assert_eq!(extracted.value, json!({"title": "Use } and { wisely", "n": 1}));
    }

    #[test]
    fn test_later_span_used_when_first_is_not_json() {
        let text = r#"Template {placeholder} then {"ok": true}"#;
        let extracted = extract_json(text).unwrap();
        assert_eq!(extracted.value, json!({"ok": true}));
    }

    #[test]
    fn test_unrecoverable_text_returns_none() {
        assert!(extract_json("I'm sorry, I cannot help with that.").is_none());
        assert!(extract_json("{ unterminated").is_none());
        assert!(extract_json("   ").is_none());
    }
}
