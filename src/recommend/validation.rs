/// Checks run on generated text before it is shown or stored.
///
/// 1. **Preamble stripped**: "Sure, here is..." openers are removed first.
/// 2. **Non-empty**: something must remain.
/// 3. **Within budget**: more than twice the word budget means the model ran
///    away.
/// 4. **No refusal markers**: "As an AI" style replies are not advice.
use crate::error::UploadError;

/// Remove a leading chatty line such as "Sure! Here's your report:".
pub fn strip_preamble(text: &str) -> String {
    let trimmed = text.trim();
    let Some((first, rest)) = trimmed.split_once('\n') else {
        return trimmed.to_string();
    };

    let lower = first.trim().to_ascii_lowercase();
    let chatty = ["sure", "certainly", "of course", "here is", "here's", "okay", "absolutely"];
    if chatty.iter().any(|p| lower.starts_with(p)) && lower.ends_with(':') {
        rest.trim_start().to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Validate generated text against its word budget.
pub fn validate_output(text: &str, word_budget: usize) -> Result<(), UploadError> {
    check_non_empty(text)?;
    check_length(text, word_budget)?;
    check_no_refusal(text)?;
    Ok(())
}

fn check_non_empty(text: &str) -> Result<(), UploadError> {
    if text.trim().is_empty() {
        return Err(UploadError::Recommendation(
            "generated recommendation is empty".to_string(),
        ));
    }
    Ok(())
}

fn check_length(text: &str, word_budget: usize) -> Result<(), UploadError> {
    let words = word_count(text);
    let limit = word_budget * 2;
    if words > limit {
        return Err(UploadError::Recommendation(format!(
            "generated recommendation has {words} words (limit {limit})"
        )));
    }
    Ok(())
}

fn check_no_refusal(text: &str) -> Result<(), UploadError> {
    let markers = ["as an ai", "i cannot provide", "i'm unable to", "i am unable to"];
    let lower = text.to_ascii_lowercase();
    for marker in markers {
        if lower.contains(marker) {
            return Err(UploadError::Recommendation(format!(
                "generated recommendation contains refusal marker: \"{marker}\""
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_reasonable_markdown() {
        let text = "## Summary\n- Check blood pressure daily\n- Rest";
        assert!(validate_output(text, 180).is_ok());
    }

    #[test]
    fn rejects_empty_output() {
        assert!(validate_output("", 180).is_err());
        assert!(validate_output("  \n ", 180).is_err());
    }

    #[test]
    fn rejects_runaway_output() {
        let text = "word ".repeat(361);
        let err = validate_output(&text, 180).unwrap_err();
        assert_eq!(err.kind(), "recommendation");
        assert!(validate_output(&"word ".repeat(360), 180).is_ok());
    }

    #[test]
    fn rejects_refusals() {
        assert!(validate_output("As an AI, I cannot give medical advice.", 180).is_err());
    }

    #[test]
    fn strips_chatty_first_line() {
        let text = "Sure! Here's the report:\n\n## Summary\nAll good.";
        assert_eq!(strip_preamble(text), "## Summary\nAll good.");
    }

    #[test]
    fn keeps_substantive_first_line() {
        let text = "## Summary\nHere is what matters:\n- rest";
        assert_eq!(strip_preamble(text), text);
        assert_eq!(strip_preamble("  single line  "), "single line");
    }
}
