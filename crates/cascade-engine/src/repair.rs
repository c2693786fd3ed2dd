//! Tolerant JSON recovery for provider responses that are supposed to be
//! JSON but aren't quite — markdown fences, a trailing comma, an unclosed
//! string, one unbalanced bracket. This is a hand-written recovery pass
//! over a handful of common failure shapes, not a general-purpose parser;
//! anything stranger than that is reported as unrecoverable.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairAction {
    StrippedFences,
    SlicedToOuterBraces,
    RemovedTrailingCommas,
    EscapedUnescapedNewlines,
    ClosedUnbalancedBrackets,
    ClosedUnterminatedString,
}

#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub value: Value,
    pub actions: Vec<RepairAction>,
}

#[derive(Debug, Clone)]
pub struct RepairFailure {
    pub original_error: String,
    pub attempted: Vec<RepairAction>,
}

/// Attempts to parse `raw` as JSON, applying successive repair passes
/// until one yields valid JSON or all passes are exhausted. On total
/// failure, `skeleton` (if given) is merged into an empty object so the
/// caller always gets a value shaped like what it expected, with
/// `success: false` layered in separately by the operation kernel.
pub fn repair_and_parse(raw: &str, skeleton: Option<&Value>) -> Result<RepairOutcome, RepairFailure> {
    let original_error = match serde_json::from_str::<Value>(raw) {
        Ok(value) => return Ok(RepairOutcome { value, actions: vec![] }),
        Err(e) => e.to_string(),
    };

    let mut actions = Vec::new();
    let mut candidate = strip_code_fences(raw);
    if candidate != raw {
        actions.push(RepairAction::StrippedFences);
    }

    if let Some(sliced) = slice_to_outer_braces(&candidate) {
        if sliced != candidate {
            actions.push(RepairAction::SlicedToOuterBraces);
            candidate = sliced;
        }
    }

    if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
        return Ok(RepairOutcome { value, actions });
    }

    let without_trailing_commas = remove_trailing_commas(&candidate);
    if without_trailing_commas != candidate {
        actions.push(RepairAction::RemovedTrailingCommas);
        candidate = without_trailing_commas;
    }
    if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
        return Ok(RepairOutcome { value, actions });
    }

    let newlines_escaped = escape_unescaped_newlines(&candidate);
    if newlines_escaped != candidate {
        actions.push(RepairAction::EscapedUnescapedNewlines);
        candidate = newlines_escaped;
    }
    if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
        return Ok(RepairOutcome { value, actions });
    }

    let closed_strings = close_unterminated_string(&candidate);
    if closed_strings != candidate {
        actions.push(RepairAction::ClosedUnterminatedString);
        candidate = closed_strings;
    }
    if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
        return Ok(RepairOutcome { value, actions });
    }

    let balanced = close_unbalanced_brackets(&candidate);
    if balanced != candidate {
        actions.push(RepairAction::ClosedUnbalancedBrackets);
        candidate = balanced;
    }
    if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
        return Ok(RepairOutcome { value, actions });
    }

    if let Some(skeleton) = skeleton {
        if let Value::Object(_) = skeleton {
            return Ok(RepairOutcome {
                value: skeleton.clone(),
                actions,
            });
        }
    }

    Err(RepairFailure {
        original_error,
        attempted: actions,
    })
}

fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        let rest = rest.trim_start_matches('\n');
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim().to_string();
        }
        return rest.trim().to_string();
    }
    trimmed.to_string()
}

fn slice_to_outer_braces(s: &str) -> Option<String> {
    let start = s.find(['{', '['])?;
    let end = s.rfind(['}', ']'])?;
    if end < start {
        return None;
    }
    Some(s[start..=end].to_string())
}

fn remove_trailing_commas(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == '}' || chars[j] == ']') {
                i += 1;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Replaces raw `\n`/`\r` bytes found inside a string literal with their
/// escaped form. Model completions routinely embed literal newlines inside
/// a JSON string value (e.g. multi-paragraph prose); `serde_json` rejects
/// those as control characters, so this pass runs before the
/// unterminated-string close, which only looks at quote/escape state and
/// would otherwise append its closing quote after already-broken content.
fn escape_unescaped_newlines(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in s.chars() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(c);
                continue;
            }
            match c {
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                _ => out.push(c),
            }
        } else {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
        }
    }
    out
}

fn close_unterminated_string(s: &str) -> String {
    let mut in_string = false;
    let mut escaped = false;
    for c in s.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        }
    }
    if in_string {
        format!("{s}\"")
    } else {
        s.to_string()
    }
}

fn close_unbalanced_brackets(s: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for c in s.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&c) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }
    let mut out = s.to_string();
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_clean_json_without_repairs() {
        let outcome = repair_and_parse(r#"{"a": 1}"#, None).unwrap();
        assert_eq!(outcome.value, json!({"a": 1}));
        assert!(outcome.actions.is_empty());
    }

    #[test]
    fn strips_markdown_code_fences() {
        let outcome = repair_and_parse("```json\n{\"a\": 1}\n```", None).unwrap();
        assert_eq!(outcome.value, json!({"a": 1}));
        assert!(outcome.actions.contains(&RepairAction::StrippedFences));
    }

    #[test]
    fn removes_trailing_commas() {
        let outcome = repair_and_parse(r#"{"a": 1, "b": 2,}"#, None).unwrap();
        assert_eq!(outcome.value, json!({"a": 1, "b": 2}));
        assert!(outcome.actions.contains(&RepairAction::RemovedTrailingCommas));
    }

    #[test]
    fn closes_unbalanced_brackets() {
        let outcome = repair_and_parse(r#"{"a": [1, 2, 3]"#, None).unwrap();
        assert_eq!(outcome.value, json!({"a": [1, 2, 3]}));
        assert!(outcome.actions.contains(&RepairAction::ClosedUnbalancedBrackets));
    }

    #[test]
    fn escapes_raw_newlines_inside_string_literals() {
        let outcome = repair_and_parse("{\"a\": \"line one\nline two\"}", None).unwrap();
        assert_eq!(outcome.value, json!({"a": "line one\nline two"}));
        assert!(outcome.actions.contains(&RepairAction::EscapedUnescapedNewlines));
    }

    #[test]
    fn closes_unterminated_string() {
        let outcome = repair_and_parse(r#"{"a": "hello"#, None).unwrap();
        assert_eq!(outcome.value, json!({"a": "hello"}));
    }

    #[test]
    fn falls_back_to_skeleton_when_unrecoverable() {
        let skeleton = json!({"a": null, "b": null});
        let outcome = repair_and_parse("not json at all and {{{ broken", Some(&skeleton)).unwrap();
        assert_eq!(outcome.value, skeleton);
    }

    #[test]
    fn reports_failure_without_skeleton() {
        let err = repair_and_parse("not json at all and {{{ broken", None).unwrap_err();
        assert!(!err.original_error.is_empty());
    }

    #[test]
    fn slices_leading_and_trailing_prose() {
        let outcome = repair_and_parse("Sure, here you go: {\"a\": 1} Hope that helps!", None).unwrap();
        assert_eq!(outcome.value, json!({"a": 1}));
        assert!(outcome.actions.contains(&RepairAction::SlicedToOuterBraces));
    }
}
