//! Best-effort parsers for the line-oriented blocks a model emits.
//!
//! The reasoning agent asks the model to answer in fixed
//! `START_ALTERNATIVE` / `START_DECISION` blocks. Models do not always
//! comply, so none of these functions fail: malformed values fall back to
//! documented defaults and unrecognised lines are ignored.

use serde::{Deserialize, Serialize};

use crate::decision::{clamp_unit, Alternative, DEFAULT_FEASIBILITY};

const START_ALTERNATIVE: &str = "START_ALTERNATIVE";
const END_ALTERNATIVE: &str = "END_ALTERNATIVE";
const END_DECISION: &str = "END_DECISION";

/// Decision block extracted from a final-synthesis response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalDecision {
    /// The chosen option.
    pub decision: String,
    /// Confidence within `[0, 1]`; 0.0 when missing or unparseable.
    pub confidence: f64,
    /// Why it was chosen.
    pub reasoning: String,
}

/// Parse a 1-10 feasibility rating.
///
/// Accepts `"8"`, `"8/10"` and `"8 out of 10"`. Decimals are rounded and
/// values outside the scale are clamped. Anything else yields
/// [`DEFAULT_FEASIBILITY`].
pub fn parse_feasibility(text: &str) -> u8 {
    let lowered = text.trim().to_lowercase();
    let numerator = lowered
        .split_once('/')
        .map(|(n, _)| n)
        .or_else(|| lowered.split_once("out of").map(|(n, _)| n))
        .unwrap_or(&lowered)
        .trim();

    parse_scale_value(numerator).unwrap_or(DEFAULT_FEASIBILITY)
}

fn parse_scale_value(text: &str) -> Option<u8> {
    if let Ok(value) = text.parse::<i64>() {
        return Some(value.clamp(1, 10) as u8);
    }
    let value = text.parse::<f64>().ok().filter(|v| v.is_finite())?;
    Some(value.round().clamp(1.0, 10.0) as u8)
}

/// Parse every `START_ALTERNATIVE ... END_ALTERNATIVE` block in `text`.
///
/// A block is only emitted once its `END_ALTERNATIVE` line is seen. Field
/// lines that appear before any `START_ALTERNATIVE` open an implicit block.
pub fn parse_alternatives(text: &str) -> Vec<Alternative> {
    let mut alternatives = Vec::new();
    let mut current: Option<Alternative> = None;

    for line in text.lines().map(str::trim) {
        if line.starts_with(START_ALTERNATIVE) {
            current = Some(Alternative::new(""));
        } else if line.starts_with(END_ALTERNATIVE) {
            if let Some(alternative) = current.take() {
                alternatives.push(alternative);
            }
        } else if let Some(value) = field_value(line, "Approach") {
            current.get_or_insert_with(|| Alternative::new("")).approach = value.to_string();
        } else if let Some(value) = field_value(line, "Advantages") {
            current.get_or_insert_with(|| Alternative::new("")).advantages = split_list(value);
        } else if let Some(value) = field_value(line, "Disadvantages") {
            current.get_or_insert_with(|| Alternative::new("")).disadvantages = split_list(value);
        } else if let Some(value) = field_value(line, "Feasibility") {
            current.get_or_insert_with(|| Alternative::new("")).feasibility =
                parse_feasibility(value);
        }
    }

    alternatives
}

/// Parse the `Decision:` / `Confidence:` / `Reasoning:` lines of a decision block.
///
/// Reasoning may continue over the following lines until the next field or
/// `END_DECISION`.
pub fn parse_final_decision(text: &str) -> FinalDecision {
    let mut parsed = FinalDecision::default();
    let mut in_reasoning = false;

    for line in text.lines().map(str::trim) {
        if let Some(value) = field_value(line, "Decision") {
            parsed.decision = value.to_string();
            in_reasoning = false;
        } else if let Some(value) = field_value(line, "Confidence") {
            parsed.confidence = value
                .trim_end_matches('%')
                .trim()
                .parse::<f64>()
                .map(|v| if value.ends_with('%') { v / 100.0 } else { v })
                .map(clamp_unit)
                .unwrap_or(0.0);
            in_reasoning = false;
        } else if let Some(value) = field_value(line, "Reasoning") {
            parsed.reasoning = value.to_string();
            in_reasoning = true;
        } else if line.starts_with(END_DECISION) {
            in_reasoning = false;
        } else if in_reasoning && !line.is_empty() {
            parsed.reasoning.push('\n');
            parsed.reasoning.push_str(line);
        }
    }

    parsed
}

/// Value after `key:` at the start of a line.
fn field_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    line.strip_prefix(key)
        .and_then(|rest| rest.strip_prefix(':'))
        .map(str::trim)
}

pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split([';', ','])
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_feasibility_fraction() {
        assert_eq!(parse_feasibility("8/10"), 8);
        assert_eq!(parse_feasibility(" 3 / 10 "), 3);
    }

    #[test]
    fn test_parse_feasibility_out_of() {
        assert_eq!(parse_feasibility("8 out of 10"), 8);
        assert_eq!(parse_feasibility("6 Out Of 10"), 6);
        assert_eq!(parse_feasibility("9out of 10"), 9);
    }

    #[test]
    fn test_parse_feasibility_plain_and_decimal() {
        assert_eq!(parse_feasibility("7"), 7);
        assert_eq!(parse_feasibility("7.6"), 8);
    }

    #[test]
    fn test_parse_feasibility_fallback() {
        assert_eq!(parse_feasibility("high"), 5);
        assert_eq!(parse_feasibility(""), 5);
        assert_eq!(parse_feasibility("/10"), 5);
        assert_eq!(parse_feasibility("out of 10"), 5);
    }

    #[test]
    fn test_parse_feasibility_clamps_to_scale() {
        assert_eq!(parse_feasibility("15"), 10);
        assert_eq!(parse_feasibility("0/10"), 1);
        assert_eq!(parse_feasibility("-3"), 1);
    }

    #[test]
    fn test_parse_alternatives_blocks() {
        let text = "Here are the options:\n\
            START_ALTERNATIVE\n\
            Approach: Migrate to Postgres\n\
            Advantages: mature, well supported; rich indexing\n\
            Disadvantages: operational overhead\n\
            Feasibility: 8/10\n\
            END_ALTERNATIVE\n\
            \n\
            START_ALTERNATIVE\n\
            Approach: Stay on SQLite\n\
            Advantages: [zero ops]\n\
            Disadvantages: single writer\n\
            Feasibility: high\n\
            END_ALTERNATIVE\n";

        let alternatives = parse_alternatives(text);
        assert_eq!(alternatives.len(), 2);

        assert_eq!(alternatives[0].approach, "Migrate to Postgres");
        assert_eq!(
            alternatives[0].advantages,
            vec!["mature", "well supported", "rich indexing"]
        );
        assert_eq!(alternatives[0].disadvantages, vec!["operational overhead"]);
        assert_eq!(alternatives[0].feasibility, 8);

        assert_eq!(alternatives[1].approach, "Stay on SQLite");
        assert_eq!(alternatives[1].advantages, vec!["zero ops"]);
        assert_eq!(alternatives[1].feasibility, 5);
    }

    #[test]
    fn test_parse_alternatives_indented_lines() {
        let text = "    START_ALTERNATIVE\n    Approach: Cache results\n    Feasibility: 9 out of 10\n    END_ALTERNATIVE";
        let alternatives = parse_alternatives(text);
        assert_eq!(alternatives.len(), 1);
        assert_eq!(alternatives[0].approach, "Cache results");
        assert_eq!(alternatives[0].feasibility, 9);
    }

    #[test]
    fn test_parse_alternatives_unterminated_block_dropped() {
        let text = "START_ALTERNATIVE\nApproach: A\nEND_ALTERNATIVE\nSTART_ALTERNATIVE\nApproach: B\n";
        let alternatives = parse_alternatives(text);
        assert_eq!(alternatives.len(), 1);
        assert_eq!(alternatives[0].approach, "A");
    }

    #[test]
    fn test_parse_alternatives_missing_feasibility_defaults() {
        let text = "START_ALTERNATIVE\nApproach: A\nEND_ALTERNATIVE";
        assert_eq!(parse_alternatives(text)[0].feasibility, DEFAULT_FEASIBILITY);
    }

    #[test]
    fn test_parse_alternatives_no_blocks() {
        assert!(parse_alternatives("Just prose, no structure.").is_empty());
    }

    #[test]
    fn test_parse_final_decision() {
        let text = "START_DECISION\n\
            Decision: Invest in Acme\n\
            Confidence: 0.85\n\
            Reasoning: Strong moat and growing margins.\n\
            Valuation is reasonable.\n\
            END_DECISION";
        let parsed = parse_final_decision(text);
        assert_eq!(parsed.decision, "Invest in Acme");
        assert_eq!(parsed.confidence, 0.85);
        assert_eq!(
            parsed.reasoning,
            "Strong moat and growing margins.\nValuation is reasonable."
        );
    }

    #[test]
    fn test_parse_final_decision_bad_confidence() {
        let parsed = parse_final_decision("Decision: Hold\nConfidence: fairly sure");
        assert_eq!(parsed.decision, "Hold");
        assert_eq!(parsed.confidence, 0.0);
        assert!(parsed.reasoning.is_empty());
    }

    #[test]
    fn test_parse_final_decision_confidence_bounds() {
        assert_eq!(parse_final_decision("Confidence: 1.4").confidence, 1.0);
        assert_eq!(parse_final_decision("Confidence: 80%").confidence, 0.8);
    }

    #[test]
    fn test_parse_final_decision_empty() {
        assert_eq!(parse_final_decision(""), FinalDecision::default());
    }
}
