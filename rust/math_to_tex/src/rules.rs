//! One rule per markup convention, in the order they must run.
//!
//! A rule picks candidate elements with `select` and turns each one into a list of
//! [`Edit`]s with `plan`. Planning only reads the tree; [`crate::MathRewriter`] applies
//! the edits and falls back to the rule's [`Fallback`] when planning fails.

use crate::asciimath::asciimath_to_latex;
use crate::dom::{
    attr, class_contains, has_attr, has_class_token, has_element_children, is_ancestor_of,
    is_tag, parent_of, select, serialize_xml, text_content,
};
use crate::entities::html_unescape;
use crate::error::{MathError, Result};
use crate::expression::{MathExpression, SourceEncoding};
use crate::normalize::wrap_math;
use crate::percent::unquote;
use lazy_static::lazy_static;
use markup5ever_rcdom::Handle;
use regex::{Captures, Regex};
use std::rc::Rc;

lazy_static! {
    static ref BRACED: Regex = Regex::new(r"\{(.+)\}").unwrap();
    static ref HASHED: Regex = Regex::new(r"#(.+?)#").unwrap();
}

const LATEX_IMAGE_CLASSES: &[&str] = &[
    "latexcenter",
    "latex",
    "tex",
    "latexdisplay",
    "latexblock",
    "latexblockcenter",
];

const TEX_ATTRIBUTES: &[&str] = &["tex", "data-tex", "data-formula"];
const MATHML_ATTRIBUTES: &[&str] = &["mathml", "data-mathml"];

/// What to do with a matched node when its rule fails on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    Keep,
    Remove,
}

#[derive(Debug, Clone)]
pub enum Edit {
    /// Swap the node for a bare `<span>` holding `text`. Empty text removes the node.
    Replace { node: Handle, text: String },
    Remove(Handle),
    RemoveAttr(Handle, &'static str),
}

pub type Plan = fn(&Handle, &Handle) -> Result<Vec<Edit>>;

#[derive(Clone)]
pub struct Rule {
    pub name: &'static str,
    pub select: fn(&Handle) -> bool,
    /// Called with the matched node and the document root.
    pub plan: Plan,
    pub on_failure: Fallback,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("on_failure", &self.on_failure)
            .finish()
    }
}

/// The rules in the order they run.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            name: "tex_error",
            select: |h| has_class_token(h, "texerror"),
            plan: tex_error,
            on_failure: Fallback::Keep,
        },
        Rule {
            name: "image",
            select: |h| is_tag(h, "img"),
            plan: image,
            on_failure: Fallback::Keep,
        },
        Rule {
            name: "math_container",
            select: |h| has_class_token(h, "math-container"),
            plan: math_container,
            on_failure: Fallback::Keep,
        },
        Rule {
            name: "katex_equation",
            select: |h| has_class_token(h, "wp-katex-eq"),
            plan: katex_equation,
            on_failure: Fallback::Keep,
        },
        Rule {
            name: "tex_script",
            select: |h| is_tag(h, "script") && script_type(h).starts_with("math/tex"),
            plan: tex_script,
            on_failure: Fallback::Keep,
        },
        Rule {
            name: "asciimath_script",
            select: |h| is_tag(h, "script") && script_type(h) == "math/asciimath",
            plan: asciimath_script,
            on_failure: Fallback::Remove,
        },
        Rule {
            name: "mathml_script",
            select: |h| is_tag(h, "script") && script_type(h).contains("math/mml"),
            plan: mathml_script,
            on_failure: Fallback::Remove,
        },
        Rule {
            name: "tex_attribute",
            select: |h| TEX_ATTRIBUTES.iter().any(|a| has_attr(h, a)),
            plan: tex_attribute,
            on_failure: Fallback::Keep,
        },
        Rule {
            name: "mathml_attribute",
            select: |h| MATHML_ATTRIBUTES.iter().any(|a| has_attr(h, a)),
            plan: mathml_attribute,
            on_failure: Fallback::Remove,
        },
        Rule {
            name: "tex_span",
            select: |h| is_tag(h, "span") && class_contains(h, "tex"),
            plan: tex_span,
            on_failure: Fallback::Keep,
        },
        Rule {
            name: "katex_html",
            select: |h| is_tag(h, "span") && class_contains(h, "katex"),
            plan: katex_html,
            on_failure: Fallback::Keep,
        },
        Rule {
            name: "mathjax_preview",
            select: |h| is_tag(h, "span") && class_contains(h, "MathJax_Preview"),
            plan: |node, _| Ok(vec![Edit::Remove(node.clone())]),
            on_failure: Fallback::Keep,
        },
        Rule {
            name: "math_element",
            select: |h| is_tag(h, "math"),
            plan: math_element,
            on_failure: Fallback::Remove,
        },
        Rule {
            name: "mathjax_tag",
            select: |h| is_tag(h, "mathjax"),
            plan: mathjax_tag,
            on_failure: Fallback::Keep,
        },
    ]
}

fn script_type(h: &Handle) -> String {
    attr(h, "type")
        .map(|t| t.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

fn replace(node: &Handle, expr: &MathExpression) -> Result<Vec<Edit>> {
    Ok(vec![Edit::Replace {
        node: node.clone(),
        text: expr.render()?,
    }])
}

fn required_attr(h: &Handle, key: &'static str) -> Result<String> {
    attr(h, key).ok_or(MathError::AttributeMissing { attr: key })
}

fn first_attr(h: &Handle, keys: &[&'static str]) -> Result<String> {
    keys.iter()
        .find_map(|k| attr(h, k))
        .ok_or(MathError::AttributeMissing { attr: keys[0] })
}

fn tex_error(node: &Handle, _root: &Handle) -> Result<Vec<Edit>> {
    let text = text_content(node);
    let caps = BRACED.captures(&text).ok_or(MathError::EmptyExpression)?;
    replace(node, &MathExpression::latex(&caps[1]))
}

type ImageCandidate = fn(&Handle) -> Option<Result<MathExpression>>;

// Each entry returns None when its signal is absent from the image.
const IMAGE_CANDIDATES: &[(&str, ImageCandidate)] = &[
    ("latex_class", |img| {
        let hit = LATEX_IMAGE_CLASSES.iter().any(|c| has_class_token(img, c));
        hit.then(|| -> Result<MathExpression> {
            Ok(MathExpression::latex(required_attr(img, "alt")?))
        })
    }),
    ("codecogs", |img| query_payload(img, "codecogs.com")),
    ("latex_php", |img| alt_payload(img, "latex.php")),
    ("codecogs_images", |img| alt_payload(img, "/images/math/codecogs")),
    ("mimetex", |img| query_payload(img, "mimetex.cgi")),
    ("mathtex", |img| query_payload(img, "mathtex.cgi")),
    ("url_signal", |img| {
        let src = attr(img, "src")?;
        // The last signal present wins, like the candidates themselves.
        ["tex?", "?latex=", "?tex="]
            .iter()
            .filter_map(|sig| src.split_once(sig).map(|(_, rest)| rest.to_string()))
            .last()
            .map(|rest| Ok(MathExpression::new(rest, SourceEncoding::PercentLatex)))
    }),
    ("tex_attribute", |img| {
        let value = attr(img, "latex").or_else(|| attr(img, "tex"))?;
        Some(Ok(MathExpression::new(value, SourceEncoding::PercentLatex)))
    }),
    ("ck12", |img| {
        class_contains(img, "x-ck12").then(|| -> Result<MathExpression> {
            let alt = required_attr(img, "alt")?;
            Ok(MathExpression::new(alt, SourceEncoding::PercentLatex))
        })
    }),
];

// Everything after the first `?`, further `?` included.
fn query_payload(img: &Handle, signal: &str) -> Option<Result<MathExpression>> {
    let src = attr(img, "src")?;
    if !src.contains(signal) {
        return None;
    }
    Some(match src.split_once('?') {
        Some((_, query)) => Ok(MathExpression::new(query, SourceEncoding::PercentLatex)),
        None => Err(MathError::EmptyExpression),
    })
}

fn alt_payload(img: &Handle, signal: &str) -> Option<Result<MathExpression>> {
    let src = attr(img, "src")?;
    if !src.contains(signal) {
        return None;
    }
    Some(required_attr(img, "alt").map(|alt| MathExpression::new(alt, SourceEncoding::PercentLatex)))
}

fn image(node: &Handle, _root: &Handle) -> Result<Vec<Edit>> {
    let mut winner = None;
    for (name, candidate) in IMAGE_CANDIDATES {
        let Some(found) = candidate(node) else {
            continue;
        };
        match found.and_then(|expr| expr.render()) {
            Ok(text) if !text.is_empty() => winner = Some(text),
            Ok(_) => log::trace!("image candidate {name}: empty expression"),
            Err(e) => log::trace!("image candidate {name}: {e}"),
        }
    }
    let text = winner.ok_or(MathError::EmptyExpression)?;
    Ok(vec![Edit::Replace {
        node: node.clone(),
        text,
    }])
}

fn math_container(node: &Handle, _root: &Handle) -> Result<Vec<Edit>> {
    replace(node, &MathExpression::latex(text_content(node)))
}

fn katex_equation(node: &Handle, _root: &Handle) -> Result<Vec<Edit>> {
    let display = attr(node, "data-display").as_deref() == Some("true");
    replace(node, &MathExpression::latex(text_content(node)).display(display))
}

/// `MathJax-Element-3-Frame` -> `MathJax-Element-3`.
fn id_prefix(id: &str) -> String {
    id.split('-').take(3).collect::<Vec<_>>().join("-")
}

fn tex_script(node: &Handle, _root: &Handle) -> Result<Vec<Edit>> {
    let display = script_type(node).contains("display");
    let mut edits = replace(node, &MathExpression::latex(text_content(node)).display(display))?;

    let id = attr(node, "id").unwrap_or_default();
    let Some(parent) = parent_of(node).filter(|_| !id.is_empty()) else {
        return Ok(edits);
    };
    // Rendered copies live next to the script, so only the parent's subtree is searched.
    let prefix = id_prefix(&id);
    let duplicates = select(&parent, |h| {
        attr(h, "id").is_some_and(|other| other.contains(&prefix))
            && !Rc::ptr_eq(h, node)
            && !is_ancestor_of(h, node)
            && !(is_tag(h, "script") && script_type(h).starts_with("math/tex"))
    });
    edits.extend(duplicates.into_iter().map(Edit::Remove));
    Ok(edits)
}

fn asciimath_script(node: &Handle, _root: &Handle) -> Result<Vec<Edit>> {
    let expr = MathExpression::new(text_content(node), SourceEncoding::AsciiMath);
    replace(node, &expr)
}

fn mathml_script(node: &Handle, _root: &Handle) -> Result<Vec<Edit>> {
    let mathml = html_unescape(&text_content(node));
    replace(node, &MathExpression::new(mathml, SourceEncoding::MathMl))
}

fn tex_attribute(node: &Handle, _root: &Handle) -> Result<Vec<Edit>> {
    let value = first_attr(node, TEX_ATTRIBUTES)?;
    replace(node, &MathExpression::latex(html_unescape(&unquote(&value))))
}

fn mathml_attribute(node: &Handle, _root: &Handle) -> Result<Vec<Edit>> {
    let value = first_attr(node, MATHML_ATTRIBUTES)?;
    replace(node, &MathExpression::new(value, SourceEncoding::MathMl))
}

fn tex_span(node: &Handle, _root: &Handle) -> Result<Vec<Edit>> {
    let expr = required_attr(node, "data-expr")?;
    replace(node, &MathExpression::latex(expr))
}

fn katex_html(node: &Handle, _root: &Handle) -> Result<Vec<Edit>> {
    Ok(node
        .children
        .borrow()
        .iter()
        .filter(|c| is_tag(c, "span") && class_contains(c, "katex-html"))
        .map(|c| Edit::Remove(c.clone()))
        .collect())
}

/// `style="Display : None;"` and friends.
fn hides_element(style: &str) -> bool {
    let compact: String = style
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ';')
        .collect();
    compact.to_ascii_lowercase().contains("display:none")
}

fn tex_annotation(math: &Handle) -> Option<Handle> {
    select(math, |h| {
        is_tag(h, "annotation")
            && attr(h, "encoding").is_some_and(|e| e.trim() == "application/x-tex")
    })
    .into_iter()
    .next()
}

fn math_element(node: &Handle, _root: &Handle) -> Result<Vec<Edit>> {
    if let Some(annotation) = tex_annotation(node) {
        let mut edits = vec![Edit::Replace {
            node: node.clone(),
            text: wrap_math(&text_content(&annotation), false),
        }];
        if let Some(parent) = parent_of(node) {
            if attr(&parent, "style").is_some_and(|s| hides_element(&s)) {
                edits.push(Edit::RemoveAttr(parent, "style"));
            }
        }
        return Ok(edits);
    }

    if let Ok(alt) = first_attr(node, &["alttext", "data-code"]) {
        let alt = html_unescape(&unquote(&alt));
        let encoding = match attr(node, "data-math-language").as_deref() {
            Some("asciimath") => SourceEncoding::AsciiMath,
            Some("mathml") => SourceEncoding::MathMl,
            _ => SourceEncoding::Latex,
        };
        let latex = MathExpression::new(alt.as_str(), encoding)
            .to_latex()
            .unwrap_or_else(|e| {
                log::trace!("math alttext kept as latex: {e}");
                alt.clone()
            });
        return Ok(vec![Edit::Replace {
            node: node.clone(),
            text: wrap_math(&latex, false),
        }]);
    }

    let source = if has_element_children(node) {
        serialize_xml(node)
    } else {
        text_content(node)
    };
    replace(node, &MathExpression::new(source, SourceEncoding::MathMl))
}

fn translate_hashed(text: &str) -> String {
    HASHED
        .replace_all(text, |caps: &Captures| match asciimath_to_latex(&caps[1]) {
            Ok(latex) => latex,
            Err(_) => caps[0].to_string(),
        })
        .into_owned()
}

fn mathjax_tag(node: &Handle, _root: &Handle) -> Result<Vec<Edit>> {
    let text = translate_hashed(&html_unescape(&text_content(node)));
    replace(node, &MathExpression::new(text, SourceEncoding::Unknown))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;

    fn first(root: &Handle, tag: &str) -> Handle {
        select(root, |h| is_tag(h, tag)).remove(0)
    }

    fn replaced_text(edits: &[Edit]) -> Option<&str> {
        edits.iter().find_map(|e| match e {
            Edit::Replace { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    #[test]
    fn rule_names_are_unique_and_ordered() {
        let names: Vec<_> = default_rules().iter().map(|r| r.name).collect();
        assert_eq!(names.first(), Some(&"tex_error"));
        assert_eq!(names.last(), Some(&"mathjax_tag"));
        let img = names.iter().position(|n| *n == "image").unwrap();
        let script = names.iter().position(|n| *n == "tex_script").unwrap();
        let math = names.iter().position(|n| *n == "math_element").unwrap();
        assert!(img < script && script < math);
        let mut dedup = names.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), names.len());
    }

    #[test]
    fn tex_error_takes_braced_expression() {
        let dom = parse_html(r#"<span class="texerror">Unknown control: {\foo x}</span>"#);
        let span = first(&dom.document, "span");
        let edits = tex_error(&span, &dom.document).unwrap();
        assert_eq!(replaced_text(&edits), Some(r"$\foo x$"));

        let dom = parse_html(r#"<span class="texerror">no braces</span>"#);
        let span = first(&dom.document, "span");
        assert!(tex_error(&span, &dom.document).unwrap_err().is_skip());
    }

    #[test]
    fn image_candidates() {
        let cases = [
            (r#"<img class="latex" alt="x+y">"#, "$x+y$"),
            (
                r#"<img src="https://latex.codecogs.com/gif.latex?%5Cfrac%7Ba%7D%7Bb%7D">"#,
                r"$\frac{a}{b}$",
            ),
            (r#"<img src="/latex.php?x" alt="a%5E2">"#, "$a^2$"),
            (r#"<img src="/cgi-bin/mimetex.cgi?a?b">"#, "$a?b$"),
            (r#"<img src="/render?tex=x%2By">"#, "$x+y$"),
            (r#"<img tex="-i u_t + &#92;Delta u">"#, r"$-i u_t + \Delta u$"),
            (r#"<img class="x-ck12-math" alt="%5Cpi">"#, r"$\pi$"),
            (r#"<img src="/images/math/codecogs/x.png" alt="%5Csigma">"#, r"$\sigma$"),
            (r#"<img src="/cgi-bin/mathtex.cgi?x%5E2">"#, "$x^2$"),
            (r#"<img src="/render.php?latex=y">"#, "$y$"),
            (r#"<img src="/tex?z">"#, "$z$"),
        ];
        for (html, want) in cases {
            let dom = parse_html(html);
            let img = first(&dom.document, "img");
            let edits = image(&img, &dom.document).unwrap();
            assert_eq!(replaced_text(&edits), Some(want), "{html}");
            assert_eq!(edits.len(), 1);
        }
    }

    #[test]
    fn image_last_successful_candidate_wins() {
        let dom = parse_html(r#"<img class="latex" alt="from alt" latex="from%20attr">"#);
        let img = first(&dom.document, "img");
        let edits = image(&img, &dom.document).unwrap();
        assert_eq!(replaced_text(&edits), Some("$from attr$"));
    }

    #[test]
    fn plain_images_are_skipped() {
        for html in [
            r#"<img src="/cat.png" alt="a cat">"#,
            r#"<img class="latex">"#,
            r#"<img src="/latex.php">"#,
        ] {
            let dom = parse_html(html);
            let img = first(&dom.document, "img");
            assert!(image(&img, &dom.document).unwrap_err().is_skip(), "{html}");
        }
    }

    #[test]
    fn id_prefix_keeps_three_segments() {
        assert_eq!(id_prefix("MathJax-Element-3-Frame"), "MathJax-Element-3");
        assert_eq!(id_prefix("mathjax-block-3"), "mathjax-block-3");
        assert_eq!(id_prefix("eq1"), "eq1");
    }

    #[test]
    fn tex_script_cleans_up_within_parent() {
        let dom = parse_html(concat!(
            r#"<div id="mathjax-block-3-wrap">"#,
            r#"<span id="mathjax-block-3-frame">x</span>"#,
            r#"<script type="math/tex; mode=display" id="mathjax-block-3">x^2</script>"#,
            "</div>",
            r#"<span id="mathjax-block-3-preview">x</span><span id="other">y</span>"#,
        ));
        let script = first(&dom.document, "script");
        let edits = tex_script(&script, &dom.document).unwrap();
        assert_eq!(replaced_text(&edits), Some("$$x^2$$"));
        let removed: Vec<_> = edits
            .iter()
            .filter_map(|e| match e {
                Edit::Remove(h) => attr(h, "id"),
                _ => None,
            })
            .collect();
        // The preview sits outside the script's parent and stays.
        assert_eq!(removed, ["mathjax-block-3-frame"]);
    }

    #[test]
    fn detached_tex_script_plans_no_cleanup() {
        let dom = parse_html(r#"<p><script type="math/tex" id="eq">x</script><i id="eq-1">i</i></p>"#);
        let script = first(&dom.document, "script");
        assert!(crate::dom::remove_node(&script));
        let edits = tex_script(&script, &dom.document).unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(replaced_text(&edits), Some("$x$"));
    }

    #[test]
    fn script_type_is_trimmed_and_lowercased() {
        let dom = parse_html(r#"<script type=" Math/TeX "></script>"#);
        assert_eq!(script_type(&first(&dom.document, "script")), "math/tex");
    }

    #[test]
    fn hidden_style_detection() {
        assert!(hides_element("display: none;"));
        assert!(hides_element("Display : NONE"));
        assert!(hides_element("color: red; display:none"));
        assert!(!hides_element("display: block"));
    }

    #[test]
    fn alttext_with_failing_secondary_conversion_is_kept() {
        let dom = parse_html(r#"<math alttext="(a" data-math-language="asciimath"></math>"#);
        let math = first(&dom.document, "math");
        let edits = math_element(&math, &dom.document).unwrap();
        assert_eq!(replaced_text(&edits), Some("$(a$"));

        let dom = parse_html(r#"<math data-code="a/b" data-math-language="asciimath"></math>"#);
        let math = first(&dom.document, "math");
        let edits = math_element(&math, &dom.document).unwrap();
        assert_eq!(replaced_text(&edits), Some(r"$\frac{a}{b}$"));
    }

    #[test]
    fn alttext_in_mathml_language() {
        let dom = parse_html(
            r#"<math alttext="<math><msqrt><mi>x</mi></msqrt></math>" data-math-language="mathml"></math>"#,
        );
        let math = first(&dom.document, "math");
        let edits = math_element(&math, &dom.document).unwrap();
        assert_eq!(replaced_text(&edits), Some(r"$\sqrt{x}$"));

        let dom = parse_html(r#"<math alttext="&lt;notvalidxml" data-math-language="mathml"></math>"#);
        let math = first(&dom.document, "math");
        let edits = math_element(&math, &dom.document).unwrap();
        assert_eq!(replaced_text(&edits), Some("$<notvalidxml$"));
    }

    #[test]
    fn math_without_source_fails() {
        let dom = parse_html("<p><math>not mathml</math></p>");
        let math = first(&dom.document, "math");
        let err = math_element(&math, &dom.document).unwrap_err();
        assert!(!err.is_skip());
    }

    #[test]
    fn hashed_segments_are_translated() {
        assert_eq!(translate_hashed("area #pi r^2# here"), r"area \pi r^{2} here");
        assert_eq!(translate_hashed("#(a# and #b/c#"), r"#(a# and \frac{b}{c}");
        assert_eq!(translate_hashed("no hashes"), "no hashes");
    }

    #[test]
    fn katex_html_removes_direct_children_only() {
        let dom = parse_html(concat!(
            r#"<span class="katex"><span class="katex-mathml">m</span>"#,
            r#"<span class="katex-html">h</span></span>"#,
        ));
        let katex = select(&dom.document, |h| has_class_token(h, "katex")).remove(0);
        let edits = katex_html(&katex, &dom.document).unwrap();
        assert_eq!(edits.len(), 1);
        assert!(matches!(&edits[0], Edit::Remove(h) if class_contains(h, "katex-html")));
    }
}
