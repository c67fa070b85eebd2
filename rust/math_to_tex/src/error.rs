use thiserror::Error;

pub type Result<T> = std::result::Result<T, MathError>;

/// Failure of a single extraction or conversion step.
///
/// None of these ever escape `MathRewriter::rewrite`; the rule that produced them decides
/// whether the node is kept or dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MathError {
    #[error("decode error: {0}")]
    Decode(String),

    /// MathML could not be turned into LaTeX (bad XML, missing namespace, unknown element).
    #[error("mathml conversion error: {0}")]
    Conversion(String),

    /// ASCII-math input the grammar does not accept.
    #[error("asciimath parse error: {0}")]
    Parse(String),

    #[error("missing attribute `{attr}`")]
    AttributeMissing { attr: &'static str },

    #[error("no expression found")]
    EmptyExpression,
}

impl MathError {
    /// Errors that mean "nothing to do here" rather than "the content is broken".
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            MathError::AttributeMissing { .. } | MathError::EmptyExpression
        )
    }
}
