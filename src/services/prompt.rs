//! Built-in judge prompt rendering.
//!
//! One fixed template asking the model for a JSON judgement; template
//! authoring beyond this is out of scope. The rendered prompt participates
//! in cache key derivation, so rendering must be deterministic.

use crate::domain::models::{PromptConfig, Sample};

const JUDGEMENT_SHAPE: &str =
    r#"{"label": "relevant" | "partially" | "irrelevant", "confidence": <number in [0,1]>}"#;

const JUDGEMENT_SHAPE_WITH_RATIONALE: &str = r#"{"label": "relevant" | "partially" | "irrelevant", "confidence": <number in [0,1]>, "rationale": "<one or two sentences>"}"#;

/// Render the judge prompt for one sample.
pub fn render(sample: &Sample, config: &PromptConfig) -> String {
    let candidate = truncate(&sample.candidate, config.max_text_chars);
    let shape = if config.reasoning_enabled {
        JUDGEMENT_SHAPE_WITH_RATIONALE
    } else {
        JUDGEMENT_SHAPE
    };

    let mut prompt = format!(
        "You are judging whether a candidate text is relevant to a query.\n\
         \n\
         Query:\n{query}\n\
         \n\
         Candidate:\n{candidate}\n",
        query = sample.query.trim(),
        candidate = candidate.trim(),
    );

    if !sample.references.is_empty() {
        prompt.push_str("\nReference material:\n");
        for reference in &sample.references {
            prompt.push_str(reference.trim());
            prompt.push('\n');
        }
    }

    prompt.push_str(&format!(
        "\nRespond with a single JSON object of the form:\n{shape}\n\
         Do not include any other text.\n"
    ));
    prompt
}

fn truncate(text: &str, limit: Option<usize>) -> &str {
    match limit {
        Some(limit) if text.len() > limit => {
            // Back off to a char boundary so we never split a code point.
            let mut end = limit;
            while end > 0 && !text.is_char_boundary(end) {
                end -= 1;
            }
            &text[..end]
        }
        _ => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_query_and_candidate() {
        let sample = Sample::new("s1", "what is rust", "Rust is a systems language");
        let prompt = render(&sample, &PromptConfig::default());

        assert!(prompt.contains("what is rust"));
        assert!(prompt.contains("Rust is a systems language"));
        assert!(prompt.contains("\"label\""));
        assert!(!prompt.contains("rationale"));
    }

    #[test]
    fn test_render_with_reasoning_requests_rationale() {
        let sample = Sample::new("s1", "q", "c");
        let config = PromptConfig {
            reasoning_enabled: true,
            max_text_chars: None,
        };
        assert!(render(&sample, &config).contains("rationale"));
    }

    #[test]
    fn test_truncate_limits_candidate() {
        let sample = Sample::new("s1", "q", "x".repeat(500));
        let config = PromptConfig {
            reasoning_enabled: false,
            max_text_chars: Some(100),
        };
        let prompt = render(&sample, &config);
        assert!(!prompt.contains(&"x".repeat(101)));
        assert!(prompt.contains(&"x".repeat(100)));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        // 'é' is two bytes in UTF-8; a byte-index cut at 3 would panic
        assert_eq!(truncate("ééé", Some(3)), "é");
    }

    #[test]
    fn test_render_is_deterministic() {
        let sample = Sample::new("s1", "q", "c");
        let config = PromptConfig::default();
        assert_eq!(render(&sample, &config), render(&sample, &config));
    }
}
