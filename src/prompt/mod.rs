// Declare submodules
mod common;
mod relation;
mod similarity;

pub use common::*;
pub use relation::relation_prompt;
pub use similarity::similarity_prompt;
