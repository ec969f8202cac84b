use crate::prompt::common::{COMPLIANCE_ANALYST, NO_COMMENTARY};

const RELATION_INSTRUCTIONS: &str = r#"
Compare Article A and Article B. Output one label: contradiction, overlap, or bloat.

contradiction
Use only if their obligations, permissions or prohibitions cannot be followed at the
same time, and one directly negates or forbids what the other requires. If simultaneous
compliance is possible, it is not a contradiction.

overlap
Use only if both articles regulate the same narrowly defined requirement, addressing the
same mechanism, scope and regulatory intent, such that compliance with one would
materially satisfy the other.

bloat
Use when any similarity is generic (e.g. "risk", "capital", "liquidity") and the articles
do not regulate the same concrete behaviour or process.

Decision order: contradiction, overlap, bloat.

Output: one lowercase word, nothing else.
"#;

/// Prompt asking for the relation label between two articles of one cluster.
pub fn relation_prompt(article_a: &str, article_b: &str) -> String {
    format!(
        r#"{analyst}
{instructions}
Article A:
"""{article_a}"""

Article B:
"""{article_b}"""
{no_commentary}"#,
        analyst = COMPLIANCE_ANALYST,
        instructions = RELATION_INSTRUCTIONS,
        article_a = article_a,
        article_b = article_b,
        no_commentary = NO_COMMENTARY,
    )
}
