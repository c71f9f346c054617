//! Tolerant parser for agent replies.
//!
//! Agents are asked for a JSON array but do not always comply. The parser
//! first looks for JSON (bare or inside a markdown fence) and falls back to
//! scanning lines for ICD-10 codes with adjacent description text. Nothing
//! here fails: entries without a valid code are skipped and counted.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use url::Url;

use crate::core::{CodeCandidate, IcdCode};

/// Body of a markdown code fence.
static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?si)```(?:json)?\s*(.*?)```").unwrap_or_else(|_| unreachable!())
});

/// Maximum byte length kept for free-text fields.
const MAX_FIELD_LEN: usize = 2_000;

/// Characters that separate a code from its description.
const SEPARATORS: &[char] = &[' ', '\t', ':', '-', '\u{2013}', '\u{2014}', '|', '*', '=', '>'];

/// Clinical phrasing that introduces a finding rather than naming it.
const LEAD_INS: &[&str] = &[
    "presents with",
    "presenting with",
    "diagnosed with",
    "consistent with",
    "suffering from",
    "suffers from",
    "complains of",
    "history of",
    "known for",
];

/// Candidates recovered from one reply, plus the count of skipped entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    /// Candidates in order of appearance.
    pub candidates: Vec<CodeCandidate>,
    /// JSON elements or text lines that yielded no valid code.
    pub skipped: usize,
}

/// Parses an agent reply into candidates.
#[must_use]
pub fn parse_response(text: &str) -> ParsedResponse {
    if text.trim().is_empty() {
        return ParsedResponse::default();
    }

    if let Some(parsed) = parse_json(text) {
        return parsed;
    }
    parse_lines(text)
}

/// Finds the first JSON payload that looks like a code list.
///
/// Fenced blocks win over bare brackets, so a `[note]` in a preamble does not
/// hide the real answer. Bare payloads are tried at every `[` or `{` until one
/// deserializes; trailing chatter after the value is ignored.
fn parse_json(text: &str) -> Option<ParsedResponse> {
    let fenced = FENCE_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find_map(|body| json_items(body.as_str().trim_start()));
    let items = fenced.or_else(|| {
        text.match_indices(['[', '{'])
            .find_map(|(at, _)| json_items(&text[at..]))
    })?;

    let mut parsed = ParsedResponse::default();
    for item in &items {
        match candidate_from_json(item) {
            Some(c) => parsed.candidates.push(c),
            None => parsed.skipped += 1,
        }
    }
    Some(parsed)
}

/// Elements of the JSON value at the start of `text`, if it is a code list.
///
/// Arrays must be empty or hold at least one object, which keeps citation
/// brackets like `[1]` from being taken for an answer.
fn json_items(text: &str) -> Option<Vec<Value>> {
    let value = serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .next()?
        .ok()?;

    match value {
        Value::Array(items) if items.is_empty() || items.iter().any(Value::is_object) => {
            Some(items)
        }
        Value::Object(map) => {
            let nested = ["codes", "results", "candidates"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_array).cloned());
            Some(nested.unwrap_or_else(|| vec![Value::Object(map)]))
        }
        _ => None,
    }
}

fn candidate_from_json(item: &Value) -> Option<CodeCandidate> {
    let obj = item.as_object()?;
    let code = obj.get("code").and_then(Value::as_str).and_then(IcdCode::parse)?;

    let text = |keys: &[&str]| -> Option<String> {
        keys.iter()
            .find_map(|k| obj.get(*k))
            .and_then(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .map(|s| truncate(s, MAX_FIELD_LEN))
    };

    Some(CodeCandidate {
        code,
        description: text(&["description", "label", "name"]).unwrap_or_default(),
        rationale: text(&["rationale", "confidence", "reason"]),
        extract: text(&["extract", "excerpt"]),
        url: text(&["url", "link"]).and_then(|u| Url::parse(&u).ok()),
    })
}

fn parse_lines(text: &str) -> ParsedResponse {
    let mut parsed = ParsedResponse::default();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("```") {
            continue;
        }

        let before = parsed.candidates.len();
        parsed.candidates.extend(candidates_in_line(trimmed));
        if parsed.candidates.len() == before {
            parsed.skipped += 1;
        }
    }
    parsed
}

/// Extracts every code in a line with the text that describes it.
///
/// Supported shapes: `CODE - description`, `description (CODE)`,
/// `description [CODE]`, `description: CODE`, and table rows
/// `| CODE | description |`.
fn candidates_in_line(line: &str) -> Vec<CodeCandidate> {
    let matches: Vec<_> = IcdCode::scan(line).collect();
    let mut out = Vec::with_capacity(matches.len());

    for (i, (range, code)) in matches.iter().enumerate() {
        let prev_end = if i == 0 { 0 } else { matches[i - 1].0.end };
        let next_start = matches.get(i + 1).map_or(line.len(), |(r, _)| r.start);
        let before = &line[prev_end..range.start];
        let after = &line[range.end..next_start];

        let wrapped = before.trim_end().ends_with(['(', '[']);
        let lead = clean_lead(before);

        let description = if wrapped || lead.ends_with(':') {
            clean_before(before)
        } else if lead.is_empty() {
            clean_after(after)
        } else {
            let tail = clean_after(after);
            if tail.is_empty() { clean_before(before) } else { tail }
        };

        out.push(CodeCandidate::new(
            code.clone(),
            truncate(description, MAX_FIELD_LEN),
        ));
    }
    out
}

/// Strips list markers, table pipes, and closers left by a previous code.
fn clean_lead(text: &str) -> &str {
    text.trim_matches(|c: char| {
        c.is_whitespace() || c.is_ascii_digit() || "-*•.)]|#>,;".contains(c)
    })
}

/// Description text that precedes a code.
fn clean_before(text: &str) -> String {
    let text = text
        .trim_start_matches(|c: char| c.is_whitespace() || ")]|,;.".contains(c))
        .trim_end_matches(|c: char| c.is_whitespace() || "([:-|".contains(c));
    let last = text.rsplit([',', ';']).next().unwrap_or(text).trim();
    let last = strip_word(last, &["and ", "or ", "with "]);
    strip_list_marker(after_lead_in(last)).to_string()
}

/// Text after the last lead-in phrase, or all of it when there is none.
fn after_lead_in(text: &str) -> &str {
    let lower = text.to_ascii_lowercase();
    LEAD_INS
        .iter()
        .filter_map(|phrase| lower.rfind(phrase).map(|at| at + phrase.len()))
        .max()
        .map_or(text, |end| text[end..].trim())
}

/// Description text that follows a code.
fn clean_after(text: &str) -> String {
    let text = text
        .trim_start_matches(|c: char| SEPARATORS.contains(&c) || ")]".contains(c))
        .trim_end_matches(|c: char| c.is_whitespace() || "|*,;.(".contains(c));
    let text = text.strip_suffix(" and").or_else(|| text.strip_suffix(" or")).unwrap_or(text);
    text.trim().to_string()
}

fn strip_word<'a>(text: &'a str, words: &[&str]) -> &'a str {
    words
        .iter()
        .find_map(|w| {
            text.get(..w.len())
                .filter(|head| head.eq_ignore_ascii_case(w))
                .map(|_| &text[w.len()..])
        })
        .unwrap_or(text)
        .trim()
}

fn strip_list_marker(text: &str) -> &str {
    let rest = text.trim_start_matches(|c: char| c.is_ascii_digit());
    let rest = if rest.len() < text.len() {
        rest.strip_prefix(['.', ')']).unwrap_or(text)
    } else {
        rest
    };
    rest.trim_start_matches(['-', '*', '•', '|']).trim()
}

fn truncate(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(parsed: &ParsedResponse) -> Vec<(&str, &str)> {
        parsed
            .candidates
            .iter()
            .map(|c| (c.code.as_str(), c.description.as_str()))
            .collect()
    }

    #[test]
    fn test_json_array() {
        let reply = r#"[
            {"extract": "Type 2 diabetes", "code": "E11.9", "description": "Type 2 diabetes mellitus without complications", "url": "https://icd.who.int/browse10/2019/en#/E11.9"},
            {"extract": "hypertension", "code": "I10", "description": "Essential (primary) hypertension"}
        ]"#;
        let parsed = parse_response(reply);
        assert_eq!(parsed.skipped, 0);
        assert_eq!(parsed.candidates.len(), 2);
        assert_eq!(parsed.candidates[0].extract.as_deref(), Some("Type 2 diabetes"));
        assert!(parsed.candidates[0].url.is_some());
        assert!(parsed.candidates[1].url.is_none());
    }

    #[test]
    fn test_json_in_fence_with_chatter() {
        let reply = "Here are the codes:\n```json\n[{\"code\": \"r54\", \"description\": \"Senility\"}]\n```\nLet me know.";
        let parsed = parse_response(reply);
        assert_eq!(codes(&parsed), vec![("R54", "Senility")]);
        assert_eq!(parsed.skipped, 0);
    }

    #[test]
    fn test_fenced_json_wins_over_bracket_in_preamble() {
        let reply = "Codes found [see below]:\n```json\n[{\"code\": \"I10\", \"description\": \"hypertension\", \"extract\": \"HTN\"}]\n```";
        let parsed = parse_response(reply);
        assert_eq!(codes(&parsed), vec![("I10", "hypertension")]);
        assert_eq!(parsed.candidates[0].extract.as_deref(), Some("HTN"));
        assert_eq!(parsed.skipped, 0);
    }

    #[test]
    fn test_bare_json_after_citation_bracket() {
        let reply = "Per guideline [1], the codes are [{\"code\": \"R54\", \"description\": \"Senility\"}] as requested.";
        let parsed = parse_response(reply);
        assert_eq!(codes(&parsed), vec![("R54", "Senility")]);
        assert_eq!(parsed.skipped, 0);
    }

    #[test]
    fn test_json_skips_malformed_elements() {
        let reply = r#"[{"code": "E11.9", "description": "a"}, {"code": "E1", "description": "b"}, "I10", {"description": "c"}]"#;
        let parsed = parse_response(reply);
        assert_eq!(parsed.candidates.len(), 1);
        assert_eq!(parsed.skipped, 3);
    }

    #[test]
    fn test_json_wrapper_and_single_object() {
        let wrapped = parse_response(r#"{"codes": [{"code": "I10", "description": "hypertension"}]}"#);
        assert_eq!(codes(&wrapped), vec![("I10", "hypertension")]);

        let single = parse_response(r#"{"code": "J45.9", "description": "Asthma", "confidence": 0.8}"#);
        assert_eq!(codes(&single), vec![("J45.9", "Asthma")]);
        assert_eq!(single.candidates[0].rationale.as_deref(), Some("0.8"));
    }

    #[test]
    fn test_empty_json_array() {
        assert_eq!(parse_response("[]"), ParsedResponse::default());
    }

    #[test]
    fn test_empty_text() {
        assert_eq!(parse_response("   \n"), ParsedResponse::default());
    }

    #[test]
    fn test_lines_code_first() {
        let reply = "1. E11.9 - Type 2 diabetes\n2. I10: hypertension\n- **J45.9** \u{2014} Asthma";
        let parsed = parse_response(reply);
        assert_eq!(
            codes(&parsed),
            vec![("E11.9", "Type 2 diabetes"), ("I10", "hypertension"), ("J45.9", "Asthma")]
        );
        assert_eq!(parsed.skipped, 0);
    }

    #[test]
    fn test_lines_description_first() {
        let reply = "Patient presents with Type 2 diabetes (E11.9) and hypertension (I10).";
        let parsed = parse_response(reply);
        assert_eq!(
            codes(&parsed),
            vec![("E11.9", "Type 2 diabetes"), ("I10", "hypertension")]
        );
        assert_eq!(parsed.skipped, 0);
    }

    #[test]
    fn test_lines_lead_in_phrases_dropped() {
        let reply = "Known history of Essential hypertension [I10]\nDiagnosed with asthma: J45.9";
        let parsed = parse_response(reply);
        assert_eq!(
            codes(&parsed),
            vec![("I10", "Essential hypertension"), ("J45.9", "asthma")]
        );
    }

    #[test]
    fn test_lines_malformed_codes_are_skipped() {
        let reply = "E11.12345 - Type 2 diabetes\nE11-9 - Type 2 diabetes\nI10 - hypertension";
        let parsed = parse_response(reply);
        assert_eq!(codes(&parsed), vec![("I10", "hypertension")]);
        assert_eq!(parsed.skipped, 2);
    }

    #[test]
    fn test_lines_colon_and_brackets() {
        let reply = "Essential hypertension: I10\nSenility [R54]";
        let parsed = parse_response(reply);
        assert_eq!(
            codes(&parsed),
            vec![("I10", "Essential hypertension"), ("R54", "Senility")]
        );
    }

    #[test]
    fn test_markdown_table() {
        let reply = "| Code | Description |\n|------|-------------|\n| E11.9 | Type 2 diabetes |\n| I10 | hypertension |";
        let parsed = parse_response(reply);
        assert_eq!(
            codes(&parsed),
            vec![("E11.9", "Type 2 diabetes"), ("I10", "hypertension")]
        );
        assert_eq!(parsed.skipped, 2);
    }

    #[test]
    fn test_only_unparseable_text() {
        let parsed = parse_response("I could not find anything.\nPlease provide more detail.");
        assert!(parsed.candidates.is_empty());
        assert_eq!(parsed.skipped, 2);
    }

    #[test]
    fn test_broken_json_falls_back_to_lines() {
        let reply = "[{\"code\": \"I10\", \"description\": \"hypertension\"";
        let parsed = parse_response(reply);
        assert_eq!(parsed.candidates.len(), 1);
        assert_eq!(parsed.candidates[0].code.as_str(), "I10");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let s = truncate("ééé".to_string(), 3);
        assert_eq!(s, "é");
    }
}
