use crate::asciimath::asciimath_to_latex;
use crate::error::Result;
use crate::mathml::mml_to_latex;
use crate::normalize::wrap_math;
use crate::percent::{unquote, unquote_strict};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    Latex,
    MathMl,
    AsciiMath,
    /// LaTeX still carrying `%xx` escapes, e.g. the query string of an equation image URL.
    PercentLatex,
    /// Mixed or unidentified text; passed through like LaTeX.
    Unknown,
}

/// A math expression pulled out of the document, before it is normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathExpression {
    pub source: String,
    pub encoding: SourceEncoding,
    pub display: bool,
}

impl MathExpression {
    pub fn new(source: impl Into<String>, encoding: SourceEncoding) -> Self {
        MathExpression {
            source: source.into(),
            encoding,
            display: false,
        }
    }

    pub fn latex(source: impl Into<String>) -> Self {
        Self::new(source, SourceEncoding::Latex)
    }

    pub fn display(mut self, display: bool) -> Self {
        self.display = display;
        self
    }

    pub fn to_latex(&self) -> Result<String> {
        match self.encoding {
            SourceEncoding::Latex | SourceEncoding::Unknown => Ok(self.source.clone()),
            SourceEncoding::PercentLatex => Ok(unquote_strict(&self.source).unwrap_or_else(|e| {
                log::trace!("lossy percent decoding: {e}");
                unquote(&self.source)
            })),
            SourceEncoding::MathMl => mml_to_latex(&self.source),
            SourceEncoding::AsciiMath => asciimath_to_latex(&self.source),
        }
    }

    /// Converted and wrapped in `$...$` / `$$...$$`. Empty when nothing is left.
    pub fn render(&self) -> Result<String> {
        Ok(wrap_math(&self.to_latex()?, self.display))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_each_encoding() {
        assert_eq!(MathExpression::latex("x^2").render().unwrap(), "$x^2$");
        assert_eq!(
            MathExpression::new("%5Cfrac%7Ba%7D%7Bb%7D", SourceEncoding::PercentLatex)
                .render()
                .unwrap(),
            r"$\frac{a}{b}$"
        );
        assert_eq!(
            MathExpression::new("<math><mi>x</mi></math>", SourceEncoding::MathMl)
                .display(true)
                .render()
                .unwrap(),
            "$$x$$"
        );
        assert_eq!(
            MathExpression::new("a/b", SourceEncoding::AsciiMath).render().unwrap(),
            r"$\frac{a}{b}$"
        );
    }

    #[test]
    fn conversion_failures_propagate() {
        assert!(MathExpression::new("<notvalidxml", SourceEncoding::MathMl)
            .render()
            .is_err());
        assert!(MathExpression::new("(a", SourceEncoding::AsciiMath)
            .render()
            .is_err());
    }

    #[test]
    fn invalid_percent_utf8_is_replaced() {
        let expr = MathExpression::new("x%FF%2By", SourceEncoding::PercentLatex);
        assert_eq!(expr.to_latex().unwrap(), "x\u{FFFD}+y");
    }

    #[test]
    fn blank_source_renders_empty() {
        assert_eq!(MathExpression::latex("  \n").render().unwrap(), "");
    }
}
