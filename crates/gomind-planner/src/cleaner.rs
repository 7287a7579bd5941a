//! LLM response cleaning (§4.4 step 3, §8 invariant 7).
//!
//! Some providers emit markdown even when asked for raw JSON. This module
//! applies only specific, conservative transformations — never a general
//! markdown-to-text algorithm, because payload values may legitimately
//! contain asterisks or braces.

/// Strips a fenced ```json ... ``` (or bare ``` ... ```) code block wrapper,
/// returning the inner content if found.
fn strip_code_fence(input: &str) -> &str {
    let trimmed = input.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        if let Some(inner) = rest.strip_suffix("```") {
            return inner.trim();
        }
        return rest.trim_end_matches("```").trim();
    }
    if let Some(rest) = trimmed.strip_prefix("```") {
        if let Some(inner) = rest.strip_suffix("```") {
            return inner.trim();
        }
    }
    trimmed
}

/// Finds the first `{` and its matching `}`, respecting string literals and
/// escape sequences, and returns the slice between them (inclusive).
fn extract_outermost_json_object(input: &str) -> Option<&str> {
    let bytes = input.as_bytes();
    let start = input.find('{')?;

    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut i = start;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else {
            match c {
                '"' => in_string = true,
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(&input[start..=i]);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Strips markdown bold (`**x**` -> `x`) and, conservatively, markdown italic
/// (`*x*` -> `x`). Italic stripping is skipped whenever:
/// - the asterisks are actually part of a `**` bold marker,
/// - the enclosed run contains any of `\n \t { } [ ] "`,
/// - the enclosed run is longer than a 100-character window.
fn strip_markdown_emphasis(input: &str) -> String {
    let without_bold = strip_bold(input);
    strip_italic(&without_bold)
}

fn strip_bold(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '*' && i + 1 < chars.len() && chars[i + 1] == '*' {
            if let Some(end) = find_closing(&chars, i + 2, "**") {
                let inner: String = chars[i + 2..end].iter().collect();
                out.push_str(&inner);
                i = end + 2;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn find_closing(chars: &[char], from: usize, marker: &str) -> Option<usize> {
    let marker_chars: Vec<char> = marker.chars().collect();
    let mut i = from;
    while i + marker_chars.len() <= chars.len() {
        if chars[i..i + marker_chars.len()] == marker_chars[..] {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn strip_italic(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '*' && !(i + 1 < chars.len() && chars[i + 1] == '*') && !(i > 0 && chars[i - 1] == '*') {
            // Look for a closing single '*' within a 100-char window, not followed by another '*'.
            let window_end = (i + 1 + 100).min(chars.len());
            let mut found = None;
            let mut j = i + 1;
            while j < window_end {
                if chars[j] == '*' {
                    let is_double = j + 1 < chars.len() && chars[j + 1] == '*';
                    let preceded_by_star = j > 0 && chars[j - 1] == '*';
                    if !is_double && !preceded_by_star {
                        found = Some(j);
                    }
                    break;
                }
                j += 1;
            }
            if let Some(end) = found {
                let inner: Vec<char> = chars[i + 1..end].to_vec();
                let forbidden = ['\n', '\t', '{', '}', '[', ']', '"'];
                if !inner.iter().any(|c| forbidden.contains(c)) {
                    out.extend(inner.iter());
                    i = end + 1;
                    continue;
                }
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Full cleaning pipeline: unwrap code fences, extract the outermost JSON
/// object, then strip markdown emphasis from the remaining text.
pub fn clean_llm_response(raw: &str) -> String {
    let unfenced = strip_code_fence(raw);
    let json_slice = extract_outermost_json_object(unfenced).unwrap_or(unfenced);
    strip_markdown_emphasis(json_slice)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fenced_code_block() {
        let input = "```json\n{\"a\": 1}\n```";
        assert_eq!(clean_llm_response(input), "{\"a\": 1}");
    }

    #[test]
    fn trims_prose_around_json() {
        let input = "Sure, here is the plan:\n{\"a\": 1}\nLet me know if you need changes.";
        assert_eq!(clean_llm_response(input), "{\"a\": 1}");
    }

    #[test]
    fn respects_braces_inside_string_literals() {
        let input = r#"{"a": "contains } a closing brace", "b": 2}"#;
        assert_eq!(clean_llm_response(input), input);
    }

    #[test]
    fn respects_escaped_quotes() {
        let input = r#"{"a": "she said \"hi\""}"#;
        assert_eq!(clean_llm_response(input), input);
    }

    #[test]
    fn glob_path_is_not_modified() {
        let input = r#"{"pattern": "path/*/file"}"#;
        assert_eq!(clean_llm_response(input), input);
    }

    #[test]
    fn bold_is_stripped() {
        let input = r#"{"note": "**X**"}"#;
        assert_eq!(clean_llm_response(input), r#"{"note": "X"}"#);
    }

    #[test]
    fn arithmetic_expression_survives() {
        let input = r#"{"formula": "5 * 3"}"#;
        assert_eq!(clean_llm_response(input), input);
    }

    #[test]
    fn italic_with_forbidden_char_is_left_alone() {
        let input = r#"{"note": "*a{b*"}"#;
        assert_eq!(clean_llm_response(input), input);
    }
}
