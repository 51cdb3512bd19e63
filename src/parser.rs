// src/parser.rs
//! Turns the grading model's loosely tagged text into a [`ParsedGradeResult`].
//!
//! The model is asked for `<finalScore>`, `<overallFeedback>` and
//! `<criteriaFeedback>` tags but frequently escapes its own output, doubles
//! braces or leaves trailing commas in the embedded JSON. Sanitisation happens
//! once up front; after that only the two top-level tags are mandatory and the
//! criteria fragment degrades to an empty mapping when it cannot be decoded.

use crate::errors::{GradingError, Result};
use crate::models::{CriterionFeedback, ParsedGradeResult};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

const FINAL_SCORE: &str = "finalScore";
const OVERALL_FEEDBACK: &str = "overallFeedback";
const CRITERIA_FEEDBACK: &str = "criteriaFeedback";

static FINAL_SCORE_TAG: OnceLock<Regex> = OnceLock::new();
static OVERALL_FEEDBACK_TAG: OnceLock<Regex> = OnceLock::new();
static CRITERIA_FEEDBACK_TAG: OnceLock<Regex> = OnceLock::new();

/// Parses raw backend output. Fails only when a required tag is missing or empty.
pub fn parse_grade_output(raw: &str) -> Result<ParsedGradeResult> {
    let text = sanitize(raw);

    let final_score = extract_tag(&text, &FINAL_SCORE_TAG, FINAL_SCORE)
        .map(|s| normalize_score(&s))
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GradingError::MalformedResult(format!("missing <{}> tag", FINAL_SCORE)))?;

    let overall_feedback = extract_tag(&text, &OVERALL_FEEDBACK_TAG, OVERALL_FEEDBACK)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            GradingError::MalformedResult(format!("missing <{}> tag", OVERALL_FEEDBACK))
        })?;

    let criteria_feedback = match extract_tag(&text, &CRITERIA_FEEDBACK_TAG, CRITERIA_FEEDBACK) {
        Some(fragment) => parse_criteria_feedback(&fragment).unwrap_or_else(|| {
            log::warn!("⚠️  Could not decode criteriaFeedback, keeping overall feedback only");
            BTreeMap::new()
        }),
        None => BTreeMap::new(),
    };

    Ok(ParsedGradeResult {
        final_score,
        overall_feedback,
        criteria_feedback,
    })
}

/// Removes the escaping noise the generator leaves behind.
///
/// Escaped newlines collapse to a space, remaining backslashes are dropped and
/// `&` is spelled out so the text never carries a stray entity reference.
/// No control characters are introduced, so embedded JSON stays decodable.
pub fn sanitize(raw: &str) -> String {
    raw.replace("\\r\\n", " ")
        .replace("\\n", " ")
        .replace('\\', "")
        .replace('&', "and")
}

fn extract_tag(text: &str, cell: &'static OnceLock<Regex>, tag: &str) -> Option<String> {
    let re = cell.get_or_init(|| {
        Regex::new(&format!(r"(?s)<\s*{tag}\s*>(.*?)<\s*/\s*{tag}\s*>")).expect("valid tag regex")
    });
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn normalize_score(score: &str) -> String {
    score.split_whitespace().collect::<String>()
}

/// Decodes the JSON-ish criteria fragment. `None` means the fragment is unusable.
pub fn parse_criteria_feedback(fragment: &str) -> Option<BTreeMap<String, CriterionFeedback>> {
    let body = json_body(fragment)?;
    let value = decode_lenient(body)?;

    let mut criteria = BTreeMap::new();
    match value {
        Value::Object(map) => {
            for (name, entry) in map {
                criteria.insert(name.trim().to_string(), criterion_entry(&entry)?);
            }
        }
        Value::Array(items) => {
            for item in items {
                let name = item
                    .get("criterion")
                    .or_else(|| item.get("name"))
                    .and_then(Value::as_str)?
                    .trim()
                    .to_string();
                criteria.insert(name, criterion_entry(&item)?);
            }
        }
        _ => return None,
    }
    Some(criteria)
}

/// Slice from the first opening bracket to its matching last closing bracket.
fn json_body(fragment: &str) -> Option<&str> {
    let object_start = fragment.find('{');
    let array_start = fragment.find('[');
    let (start, close) = match (object_start, array_start) {
        (Some(o), Some(a)) if a < o => (a, ']'),
        (Some(o), _) => (o, '}'),
        (None, Some(a)) => (a, ']'),
        (None, None) => return None,
    };
    let end = fragment.rfind(close)?;
    (end > start).then(|| &fragment[start..=end])
}

fn decode_lenient(body: &str) -> Option<Value> {
    static TRAILING_COMMA: OnceLock<Regex> = OnceLock::new();
    let trailing = TRAILING_COMMA.get_or_init(|| Regex::new(r",\s*([}\]])").expect("valid regex"));

    // Raw line breaks are only legal between tokens, where a space is equivalent.
    let flattened = body.replace(['\r', '\n'], " ");
    let cleaned = trailing.replace_all(&flattened, "$1");
    if let Ok(value) = serde_json::from_str(&cleaned) {
        return Some(value);
    }

    let collapsed = cleaned.replace("{{", "{").replace("}}", "}");
    serde_json::from_str(&collapsed).ok()
}

fn criterion_entry(entry: &Value) -> Option<CriterionFeedback> {
    match entry {
        Value::String(text) => Some(CriterionFeedback {
            feedback: text.trim().to_string(),
            score: String::new(),
        }),
        Value::Object(fields) => Some(CriterionFeedback {
            feedback: fields
                .get("feedback")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string(),
            score: fields.get("score").map(scalar_text).unwrap_or_default(),
        }),
        _ => None,
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => normalize_score(s),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
