// src/prompt.rs
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Output contract the grading model is asked to follow.
pub const SYSTEM_INSTRUCTION: &str = r#"You are an experienced teacher grading a student essay against a rubric.
Respond ONLY with the three tagged fields below and nothing else:
<finalScore>POINTS_AWARDED/TOTAL_POINTS</finalScore>
<overallFeedback>Two to four sentences of feedback on the essay as a whole.</overallFeedback>
<criteriaFeedback>{"CRITERION NAME": {"feedback": "feedback for this criterion", "score": "POINTS_AWARDED/CRITERION_POINTS"}}</criteriaFeedback>
The criteriaFeedback value must be a JSON object with one key per rubric criterion, using the criterion names exactly as given."#;

const GRADING_TEMPLATE: &str = r#"Grade the following essay using this rubric.

RUBRIC (JSON):
{{rubric}}

ESSAY:
{{essay}}

Award points for each criterion, add them up for the final score, and answer in the required tagged format."#;

/// Builds the user prompt for one document.
pub fn grading_prompt(rubric_json: &str, essay_text: &str) -> String {
    let mut values = HashMap::new();
    values.insert("rubric", rubric_json);
    values.insert("essay", essay_text);
    render_template(GRADING_TEMPLATE, &values)
}

/// Simple `{{key}}` template renderer. Unknown keys are left untouched.
pub fn render_template(template: &str, values: &HashMap<&str, &str>) -> String {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    let re = PLACEHOLDER.get_or_init(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}").expect("valid placeholder regex"));
    re.replace_all(template, |caps: &regex::Captures| {
        let key = &caps[1];
        values
            .get(key)
            .map(|s| s.to_string())
            .unwrap_or_else(|| caps[0].to_string())
    })
    .to_string()
}
