use crate::prompt::common::{COMPLIANCE_ANALYST, NO_COMMENTARY};

/// Prompt asking for a single similarity score between two articles.
///
/// The score must reflect whether the articles impose the same (or directly
/// conflicting) obligations, not whether they share a topic.
pub fn similarity_prompt(article_a: &str, article_b: &str) -> String {
    format!(
        r#"{analyst}

Compare the two regulatory articles below. Output a single decimal number between 0 and 1:
- 1.0 = the articles impose the same obligation, or obligations that directly conflict
- 0.5 = the articles regulate the same process but with materially different requirements
- 0.0 = the articles are unrelated or share only generic vocabulary (e.g. "risk", "capital")

Round to two decimal places.

## ARTICLE A
----------
{article_a}
----------

## ARTICLE B
----------
{article_b}
----------
{no_commentary}
Answer with only the number:"#,
        analyst = COMPLIANCE_ANALYST,
        article_a = article_a.trim_end(),
        article_b = article_b.trim_end(),
        no_commentary = NO_COMMENTARY,
    )
}
