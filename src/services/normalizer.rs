//! Judgement normalizer: raw provider output to the canonical shape.
//!
//! Providers answer with whatever their models emit: fenced JSON, JSON
//! buried in prose, bare `label: relevant` lines, or garbage. The normalizer
//! tolerates all of it. A malformed response never fails the pipeline;
//! it degrades to the most conservative judgement (`irrelevant`, confidence
//! 0.0) with a warning naming the defect, so the run continues and the
//! defect stays visible downstream.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::domain::models::{warning, JudgeLabel, Judgement};

/// Per-call context threaded into the produced judgement.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub sample_id: String,
    pub model_id: String,
    pub provider: String,
    pub latency_ms: u64,
    pub attempts: u32,

    /// Warnings accumulated before normalization (retry, cache degradation)
    pub warnings: Vec<String>,
}

fn label_fallback_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\blabel\s*[:=]\s*(relevant|partially|irrelevant)\b")
            .expect("hard-coded regex compiles")
    })
}

fn code_fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("hard-coded regex compiles")
    })
}

/// Parse raw provider output into a canonical [`Judgement`].
///
/// Never fails: parse failures, labels outside the canonical space, and
/// out-of-range confidences all produce the conservative fallback judgement
/// with the corresponding warning appended.
pub fn normalize(raw_text: &str, ctx: CallContext) -> Judgement {
    let mut warnings = ctx.warnings;

    // Parse ladder: structured JSON first; a JSON object that carries no
    // label key at all (or no JSON) falls through to the textual form.
    let parsed = match extract_json_object(raw_text).map(|value| parse_structured(&value)) {
        Some(parsed) if parsed.label.is_some() || parsed.had_label_key => Some(parsed),
        _ => parse_textual_fallback(raw_text),
    };

    let (label, confidence, score, rationale) = match parsed {
        Some(ParsedJudgement {
            label: Some(label),
            confidence,
            score,
            rationale,
            ..
        }) => {
            let confidence = match confidence {
                Some(c) if (0.0..=1.0).contains(&c) => c,
                Some(_) => {
                    warnings.push(warning::CONFIDENCE_OUT_OF_RANGE.to_string());
                    0.0
                }
                // Textual fallback carries no confidence; treat as fully
                // uncertain rather than inventing one.
                None => 0.0,
            };
            (label, confidence, score, rationale)
        }
        Some(ParsedJudgement { label: None, .. }) => {
            warnings.push(warning::LABEL_OUT_OF_DOMAIN.to_string());
            (JudgeLabel::Irrelevant, 0.0, None, None)
        }
        None => {
            warnings.push(warning::PARSE_FAILURE.to_string());
            (JudgeLabel::Irrelevant, 0.0, None, None)
        }
    };

    Judgement {
        sample_id: ctx.sample_id,
        model_id: ctx.model_id,
        provider: ctx.provider,
        label,
        score,
        confidence,
        rationale,
        raw_text: Some(raw_text.to_string()),
        latency_ms: ctx.latency_ms,
        attempts: ctx.attempts,
        cache_hit: false,
        warnings,
    }
}

struct ParsedJudgement {
    label: Option<JudgeLabel>,

    /// Whether a label key was present at all; distinguishes
    /// `label_out_of_domain` from a plain parse failure
    had_label_key: bool,

    confidence: Option<f64>,
    score: Option<f64>,
    rationale: Option<String>,
}

/// Return the first syntactically valid JSON object found in `text`, after
/// stripping code fences.
fn extract_json_object(text: &str) -> Option<Value> {
    let stripped = code_fence_re().replace_all(text, "$1");
    let bytes = stripped.as_bytes();

    let candidates = bytes
        .iter()
        .enumerate()
        .filter_map(|(i, &byte)| (byte == b'{').then_some(i));
    for start in candidates {
        // Balanced-brace scan from this opening brace; strings may contain
        // braces, so track quoting and escapes.
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        for (offset, &byte) in bytes[start..].iter().enumerate() {
            if escaped {
                escaped = false;
                continue;
            }
            match byte {
                b'\\' if in_string => escaped = true,
                b'"' => in_string = !in_string,
                b'{' if !in_string => depth += 1,
                b'}' if !in_string => {
                    depth -= 1;
                    if depth == 0 {
                        let candidate = &stripped[start..=start + offset];
                        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                            return Some(value);
                        }
                        break;
                    }
                }
                _ => {}
            }
        }
    }
    None
}

/// Pull label/confidence/score/rationale out of a JSON object with
/// case-insensitive keys.
fn parse_structured(value: &Value) -> ParsedJudgement {
    let raw_label = get_ci(value, "label");
    let label = raw_label.and_then(Value::as_str).and_then(JudgeLabel::parse);
    let confidence = get_ci(value, "confidence").and_then(as_number);
    let score = get_ci(value, "score").and_then(as_number);
    let rationale = get_ci(value, "rationale")
        .or_else(|| get_ci(value, "reason"))
        .and_then(Value::as_str)
        .map(str::to_string);

    ParsedJudgement {
        label,
        had_label_key: raw_label.is_some(),
        confidence,
        score,
        rationale,
    }
}

/// Textual fallback: a bare `label: relevant` somewhere in the output.
fn parse_textual_fallback(text: &str) -> Option<ParsedJudgement> {
    let captures = label_fallback_re().captures(text)?;
    let label = JudgeLabel::parse(captures.get(1)?.as_str())?;
    Some(ParsedJudgement {
        label: Some(label),
        had_label_key: true,
        confidence: None,
        score: None,
        rationale: None,
    })
}

fn get_ci<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    value
        .as_object()?
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> CallContext {
        CallContext {
            sample_id: "s1".to_string(),
            model_id: "m1".to_string(),
            provider: "mock".to_string(),
            latency_ms: 10,
            attempts: 1,
            warnings: vec![],
        }
    }

    #[test]
    fn test_clean_json() {
        let judgement = normalize(r#"{"label": "relevant", "confidence": 0.92}"#, ctx());

        assert_eq!(judgement.label, JudgeLabel::Relevant);
        assert!((judgement.confidence - 0.92).abs() < f64::EPSILON);
        assert!(judgement.warnings.is_empty());
        assert!(!judgement.cache_hit);
    }

    #[test]
    fn test_fenced_json_with_prose() {
        let raw = "Sure! Here is my judgement:\n```json\n{\"Label\": \"partially\", \"Confidence\": 0.4, \"Rationale\": \"covers half the query\"}\n```\nHope that helps.";
        let judgement = normalize(raw, ctx());

        assert_eq!(judgement.label, JudgeLabel::Partially);
        assert!((judgement.confidence - 0.4).abs() < f64::EPSILON);
        assert_eq!(
            judgement.rationale.as_deref(),
            Some("covers half the query")
        );
        assert!(judgement.warnings.is_empty());
    }

    #[test]
    fn test_json_with_braces_in_string() {
        let raw = r#"{"label": "relevant", "confidence": 0.8, "rationale": "matches {exactly}"}"#;
        let judgement = normalize(raw, ctx());
        assert_eq!(judgement.label, JudgeLabel::Relevant);
        assert!(judgement.warnings.is_empty());
    }

    #[test]
    fn test_garbage_produces_conservative_fallback() {
        let judgement = normalize("I have no idea what you want from me", ctx());

        assert_eq!(judgement.label, JudgeLabel::Irrelevant);
        assert!((judgement.confidence - 0.0).abs() < f64::EPSILON);
        assert_eq!(judgement.warnings, vec![warning::PARSE_FAILURE]);
    }

    #[test]
    fn test_json_without_label_key_is_parse_failure() {
        let judgement = normalize(r#"{"verdict": "yes", "confidence": 0.9}"#, ctx());

        assert_eq!(judgement.label, JudgeLabel::Irrelevant);
        assert_eq!(judgement.warnings, vec![warning::PARSE_FAILURE]);
    }

    #[test]
    fn test_label_out_of_domain() {
        let judgement = normalize(r#"{"label": "maybe", "confidence": 0.7}"#, ctx());

        assert_eq!(judgement.label, JudgeLabel::Irrelevant);
        assert!((judgement.confidence - 0.0).abs() < f64::EPSILON);
        assert_eq!(judgement.warnings, vec![warning::LABEL_OUT_OF_DOMAIN]);
    }

    #[test]
    fn test_confidence_out_of_range() {
        let judgement = normalize(r#"{"label": "relevant", "confidence": 1.7}"#, ctx());

        assert_eq!(judgement.label, JudgeLabel::Relevant);
        assert!((judgement.confidence - 0.0).abs() < f64::EPSILON);
        assert_eq!(judgement.warnings, vec![warning::CONFIDENCE_OUT_OF_RANGE]);
    }

    #[test]
    fn test_textual_fallback() {
        let judgement = normalize("label: RELEVANT (pretty sure)", ctx());

        assert_eq!(judgement.label, JudgeLabel::Relevant);
        assert!((judgement.confidence - 0.0).abs() < f64::EPSILON);
        assert!(judgement.warnings.is_empty());
    }

    #[test]
    fn test_score_carried_as_informational() {
        let judgement = normalize(
            r#"{"label": "partially", "confidence": 0.5, "score": 2}"#,
            ctx(),
        );
        assert_eq!(judgement.score, Some(2.0));
        assert!((judgement.confidence - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_prior_warnings_are_preserved_in_order() {
        let mut context = ctx();
        context.warnings = vec!["attempt 1/3 failed (timeout): timed out".to_string()];
        let judgement = normalize("garbage", context);

        assert_eq!(judgement.warnings.len(), 2);
        assert!(judgement.warnings[0].starts_with("attempt 1/3"));
        assert_eq!(judgement.warnings[1], warning::PARSE_FAILURE);
    }

    #[test]
    fn test_confidence_as_string_number() {
        let judgement = normalize(r#"{"label": "relevant", "confidence": "0.75"}"#, ctx());
        assert!((judgement.confidence - 0.75).abs() < f64::EPSILON);
        assert!(judgement.warnings.is_empty());
    }
}
