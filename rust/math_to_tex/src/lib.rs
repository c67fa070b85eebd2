//! Normalizes the many ways web pages encode math (MathML, equation images, KaTeX and
//! MathJax artifacts, ASCII-math, attribute payloads) into `$...$` / `$$...$$` LaTeX text.
//!
//! ```no_run
//! let html = r#"<p><img src="https://latex.codecogs.com/gif.latex?x%5E2"></p>"#;
//! assert!(math_to_tex::normalize_html(html).contains("<span>$x^2$</span>"));
//! ```

pub mod asciimath;
pub mod dom;
pub mod entities;
pub mod error;
pub mod expression;
pub mod mathml;
pub mod normalize;
pub mod percent;
pub mod rewriter;
pub mod rules;

pub use error::{MathError, Result};
pub use expression::{MathExpression, SourceEncoding};
pub use rewriter::{normalize_html, normalize_html_body, MathRewriter};
pub use rules::{default_rules, Edit, Fallback, Rule};
