use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    // \textcolor[model]{color}, shortest match on both groups.
    static ref TEXT_COLOR: Regex = Regex::new(r"\\textcolor\[.*?\]\{.*?\}").unwrap();
}

/// Collapses whitespace, drops color directives and stray `$`, then wraps in `$...$`
/// (or `$$...$$` for display math). Returns an empty string when nothing is left.
pub fn wrap_math(text: &str, display: bool) -> String {
    let s = WHITESPACE.replace_all(text, " ");
    let s = TEXT_COLOR.replace_all(&s, "");
    let s = s.replace('$', "");
    let s = s.trim();
    if s.is_empty() {
        return String::new();
    }
    if display {
        format!("$${s}$$")
    } else {
        format!("${s}$")
    }
}

/// Collapses whitespace runs into single spaces and trims the ends.
pub fn collapse_ws(s: &str) -> String {
    WHITESPACE.replace_all(s, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_inline_and_display() {
        assert_eq!(wrap_math("x^2", false), "$x^2$");
        assert_eq!(wrap_math("x^2", true), "$$x^2$$");
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(wrap_math("", false), "");
        assert_eq!(wrap_math("   ", false), "");
        assert_eq!(wrap_math("\n\t", true), "");
        assert_eq!(wrap_math("$$", false), "");
    }

    #[test]
    fn collapses_newlines_and_runs_of_spaces() {
        assert_eq!(wrap_math("a +\n\n  b", false), "$a + b$");
    }

    #[test]
    fn strips_dollars_and_color_directives() {
        let inputs = [
            "$x$ + \\textcolor[rgb]{1,0,0}y",
            "\\textcolor[named]{red}$$a$$\nb",
            "p \\textcolor[]{} q $",
        ];
        for input in inputs {
            let out = wrap_math(input, false);
            let inner = &out[1..out.len() - 1];
            assert!(!inner.contains('$'), "{out}");
            assert!(!out.contains('\n'), "{out}");
            assert!(!out.contains("\\textcolor["), "{out}");
        }
        assert_eq!(wrap_math("$x$ + \\textcolor[rgb]{1,0,0}y", false), "$x + y$");
    }

    #[test]
    fn collapse_ws_trims() {
        assert_eq!(collapse_ws("  a \n b  "), "a b");
    }
}
