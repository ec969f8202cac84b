// Common text blocks for all prompts
pub const COMPLIANCE_ANALYST: &str =
    "You are a compliance analyst comparing provisions from different financial regulations.";

pub const NO_COMMENTARY: &str = r#"
Do not explain your reasoning, restate the question, or add any text before or after the answer.
"#;
