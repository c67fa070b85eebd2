//! MathML -> LaTeX.
//!
//! The input must be a single `<math>` element declaring the MathML namespace;
//! [`mml_to_latex`] prepares markup scraped from HTML so that it satisfies this.

use crate::entities::html_unescape;
use crate::error::{MathError, Result};
use crate::normalize::collapse_ws;
use lazy_static::lazy_static;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use regex::Regex;
use std::collections::HashMap;

pub const MATHML_NS: &str = "http://www.w3.org/1998/Math/MathML";

// Element nesting accepted before the input is rejected. The tree and the emitter recurse.
const MAX_DEPTH: usize = 128;

lazy_static! {
    static ref MML_NS_DECL: Regex = Regex::new(r#"xmlns:mml\s*=\s*(?:".*?"|'.*?')"#).unwrap();
    static ref MATH_START: Regex = Regex::new(r"<math\b([^>]*)>").unwrap();
    static ref HAS_DEFAULT_NS: Regex = Regex::new(r"(?:^|\s)xmlns\s*=").unwrap();
    static ref COMMAND: Regex = Regex::new(r"^\\[A-Za-z]+ ?$").unwrap();

    static ref SYMBOLS: HashMap<char, &'static str> = [
        // greek
        ('α', r"\alpha"), ('β', r"\beta"), ('γ', r"\gamma"), ('δ', r"\delta"),
        ('ε', r"\varepsilon"), ('ϵ', r"\epsilon"), ('ζ', r"\zeta"), ('η', r"\eta"),
        ('θ', r"\theta"), ('ϑ', r"\vartheta"), ('ι', r"\iota"), ('κ', r"\kappa"),
        ('λ', r"\lambda"), ('μ', r"\mu"), ('ν', r"\nu"), ('ξ', r"\xi"), ('π', r"\pi"),
        ('ρ', r"\rho"), ('σ', r"\sigma"), ('ς', r"\varsigma"), ('τ', r"\tau"),
        ('υ', r"\upsilon"), ('φ', r"\varphi"), ('ϕ', r"\phi"), ('χ', r"\chi"),
        ('ψ', r"\psi"), ('ω', r"\omega"), ('Γ', r"\Gamma"), ('Δ', r"\Delta"),
        ('Θ', r"\Theta"), ('Λ', r"\Lambda"), ('Ξ', r"\Xi"), ('Π', r"\Pi"),
        ('Σ', r"\Sigma"), ('Υ', r"\Upsilon"), ('Φ', r"\Phi"), ('Ψ', r"\Psi"),
        ('Ω', r"\Omega"),
        // operators and relations
        ('−', "-"), ('×', r"\times"), ('÷', r"\div"), ('·', r"\cdot"), ('⋅', r"\cdot"),
        ('∗', "*"), ('±', r"\pm"), ('∓', r"\mp"), ('∘', r"\circ"), ('⊕', r"\oplus"),
        ('⊗', r"\otimes"), ('≤', r"\le"), ('≥', r"\ge"), ('≠', r"\ne"), ('≈', r"\approx"),
        ('≡', r"\equiv"), ('≅', r"\cong"), ('∼', r"\sim"), ('∝', r"\propto"),
        ('≪', r"\ll"), ('≫', r"\gg"), ('∈', r"\in"), ('∉', r"\notin"), ('∋', r"\ni"),
        ('⊂', r"\subset"), ('⊃', r"\supset"), ('⊆', r"\subseteq"), ('⊇', r"\supseteq"),
        ('∪', r"\cup"), ('∩', r"\cap"), ('∧', r"\wedge"), ('∨', r"\vee"), ('¬', r"\neg"),
        ('∀', r"\forall"), ('∃', r"\exists"), ('∅', r"\emptyset"), ('∞', r"\infty"),
        ('∂', r"\partial"), ('∇', r"\nabla"), ('√', r"\surd"), ('∑', r"\sum"),
        ('∏', r"\prod"), ('∐', r"\coprod"), ('∫', r"\int"), ('∬', r"\iint"),
        ('∮', r"\oint"), ('⋃', r"\bigcup"), ('⋂', r"\bigcap"), ('→', r"\to"),
        ('←', r"\leftarrow"), ('↔', r"\leftrightarrow"), ('⇒', r"\Rightarrow"),
        ('⇐', r"\Leftarrow"), ('⇔', r"\Leftrightarrow"), ('↦', r"\mapsto"),
        ('↑', r"\uparrow"), ('↓', r"\downarrow"), ('…', r"\ldots"), ('⋯', r"\cdots"),
        ('⋮', r"\vdots"), ('⋱', r"\ddots"), ('⟨', r"\langle"), ('⟩', r"\rangle"),
        ('⌊', r"\lfloor"), ('⌋', r"\rfloor"), ('⌈', r"\lceil"), ('⌉', r"\rceil"),
        ('‖', r"\|"), ('′', "'"), ('″', "''"), ('ℝ', r"\mathbb{R}"), ('ℕ', r"\mathbb{N}"),
        ('ℤ', r"\mathbb{Z}"), ('ℚ', r"\mathbb{Q}"), ('ℂ', r"\mathbb{C}"), ('ℓ', r"\ell"),
        ('ℏ', r"\hbar"), ('ℵ', r"\aleph"), ('°', r"^\circ"), ('⊥', r"\perp"),
        ('∥', r"\parallel"), ('∠', r"\angle"), ('△', r"\triangle"), ('∴', r"\therefore"),
        // reserved LaTeX characters
        ('{', r"\{"), ('}', r"\}"), ('%', r"\%"), ('#', r"\#"), ('&', r"\&"), ('_', r"\_"),
        ('$', r"\$"), ('\\', r"\backslash"),
        // invisible operators
        ('\u{2061}', ""), ('\u{2062}', ""), ('\u{2063}', ""), ('\u{2064}', ""),
        ('\u{a0}', " "),
    ]
    .into_iter()
    .collect();
}

const FUNCTIONS: &[&str] = &[
    "sin", "cos", "tan", "cot", "sec", "csc", "sinh", "cosh", "tanh", "coth", "arcsin",
    "arccos", "arctan", "exp", "log", "ln", "lg", "det", "dim", "ker", "deg", "gcd", "hom",
    "arg", "lim", "liminf", "limsup", "max", "min", "sup", "inf", "Pr",
];

// Bases whose under/over scripts are written as plain sub/superscripts.
const LIMIT_OPERATORS: &[&str] = &[
    "∑", "∏", "∐", "∫", "∬", "∮", "⋃", "⋂", "⋁", "⋀", "⨁", "⨂", "lim", "liminf", "limsup",
    "max", "min", "sup", "inf",
];

#[derive(Debug, Clone, PartialEq)]
enum MathNode {
    Element {
        name: String,
        attrs: Vec<(String, String)>,
        children: Vec<MathNode>,
    },
    Text(String),
}

impl MathNode {
    fn name(&self) -> &str {
        match self {
            MathNode::Element { name, .. } => name,
            MathNode::Text(_) => "",
        }
    }

    fn attr(&self, key: &str) -> Option<&str> {
        match self {
            MathNode::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            MathNode::Text(_) => None,
        }
    }

    fn element_children(&self) -> Vec<&MathNode> {
        match self {
            MathNode::Element { children, .. } => children
                .iter()
                .filter(|c| matches!(c, MathNode::Element { .. }))
                .collect(),
            MathNode::Text(_) => Vec::new(),
        }
    }

    fn text(&self) -> String {
        match self {
            MathNode::Text(t) => t.clone(),
            MathNode::Element { children, .. } => children.iter().map(|c| c.text()).collect(),
        }
    }
}

/// Strips `mml:` prefixes, turns `[itex]` markers into `<math>` and injects the MathML
/// namespace on the root element when it is missing.
pub fn prepare_mathml(raw: &str) -> String {
    let mut s = raw.replace("[itex]", "<math>").replace("[/itex]", "</math>");
    if s.contains("xmlns:mml") {
        s = s.replace("mml:", "");
        s = MML_NS_DECL.replace_all(&s, "").into_owned();
    }
    inject_namespace(&s)
}

fn inject_namespace(s: &str) -> String {
    let Some(caps) = MATH_START.captures(s) else {
        return s.to_string();
    };
    let attrs = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    if HAS_DEFAULT_NS.is_match(attrs) {
        return s.to_string();
    }
    let Some(whole) = caps.get(0) else {
        return s.to_string();
    };
    let insert_at = whole.start() + "<math".len();
    format!("{} xmlns=\"{MATHML_NS}\"{}", &s[..insert_at], &s[insert_at..])
}

/// Prepares scraped MathML and converts it.
pub fn mml_to_latex(raw: &str) -> Result<String> {
    mathml_to_latex(&prepare_mathml(raw))
}

/// Converts a namespaced `<math>` fragment to LaTeX.
pub fn mathml_to_latex(mathml: &str) -> Result<String> {
    let root = parse(mathml)?;
    if root.name() != "math" {
        return Err(MathError::Conversion(format!(
            "root element is <{}>, expected <math>",
            root.name()
        )));
    }
    let mut out = String::new();
    emit(&root, &mut out)?;
    Ok(collapse_ws(&out))
}

fn conversion_err(msg: impl Into<String>) -> MathError {
    MathError::Conversion(msg.into())
}

fn local_name(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw);
    match name.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.into_owned(),
    }
}

fn element_attrs(e: &BytesStart<'_>) -> Result<Vec<(String, String)>> {
    let mut attrs = Vec::new();
    for a in e.attributes() {
        let a = a.map_err(|err| conversion_err(format!("bad attribute: {err}")))?;
        attrs.push((
            String::from_utf8_lossy(a.key.as_ref()).to_string(),
            html_unescape(&String::from_utf8_lossy(&a.value)),
        ));
    }
    Ok(attrs)
}

fn declares_mathml_ns(attrs: &[(String, String)]) -> bool {
    attrs
        .iter()
        .any(|(k, v)| (k == "xmlns" || k.starts_with("xmlns:")) && v == MATHML_NS)
}

fn parse(mathml: &str) -> Result<MathNode> {
    let mut reader = Reader::from_str(mathml);
    reader.trim_text(true);

    let mut stack: Vec<(String, Vec<(String, String)>, Vec<MathNode>)> = Vec::new();
    let mut root: Option<MathNode> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| conversion_err(format!("xml error at {}: {e}", reader.buffer_position())))?;
        match event {
            Event::Start(e) => {
                let attrs = element_attrs(&e)?;
                if stack.is_empty() {
                    if root.is_some() {
                        return Err(conversion_err("more than one root element"));
                    }
                    if !declares_mathml_ns(&attrs) {
                        return Err(conversion_err("root element lacks the MathML namespace"));
                    }
                }
                if stack.len() >= MAX_DEPTH {
                    return Err(conversion_err("elements nested too deeply"));
                }
                stack.push((local_name(e.name().as_ref()), attrs, Vec::new()));
            }
            Event::Empty(e) => {
                let attrs = element_attrs(&e)?;
                let node = MathNode::Element {
                    name: local_name(e.name().as_ref()),
                    attrs,
                    children: Vec::new(),
                };
                match stack.last_mut() {
                    Some((_, _, children)) => children.push(node),
                    None => {
                        if root.is_some() || !declares_mathml_ns(node_attrs(&node)) {
                            return Err(conversion_err("root element lacks the MathML namespace"));
                        }
                        root = Some(node);
                    }
                }
            }
            Event::End(_) => {
                let Some((name, attrs, children)) = stack.pop() else {
                    return Err(conversion_err("unbalanced end tag"));
                };
                let node = MathNode::Element {
                    name,
                    attrs,
                    children,
                };
                match stack.last_mut() {
                    Some((_, _, children)) => children.push(node),
                    None => root = Some(node),
                }
            }
            Event::Text(e) => {
                let text = html_unescape(&String::from_utf8_lossy(&e.into_inner()));
                match stack.last_mut() {
                    Some((_, _, children)) => children.push(MathNode::Text(text)),
                    None if text.trim().is_empty() => {}
                    None => return Err(conversion_err("text outside of the root element")),
                }
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e.into_inner()).to_string();
                if let Some((_, _, children)) = stack.last_mut() {
                    children.push(MathNode::Text(text));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(conversion_err("unexpected end of input"));
    }
    root.ok_or_else(|| conversion_err("no root element"))
}

fn node_attrs(node: &MathNode) -> &[(String, String)] {
    match node {
        MathNode::Element { attrs, .. } => attrs,
        MathNode::Text(_) => &[],
    }
}

fn symbols(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match SYMBOLS.get(&ch) {
            Some(cmd) if cmd.starts_with('\\') && cmd[1..].chars().all(|c| c.is_ascii_alphabetic()) => {
                out.push_str(cmd);
                out.push(' ');
            }
            Some(rep) => out.push_str(rep),
            None => out.push(ch),
        }
    }
    out
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '{' | '}' | '%' | '#' | '&' | '_' | '$' => {
                out.push('\\');
                out.push(ch);
            }
            '\\' => out.push_str(r"\backslash "),
            _ => out.push(ch),
        }
    }
    out
}

fn with_variant(variant: Option<&str>, body: String) -> String {
    let cmd = match variant {
        Some("normal") => r"\mathrm",
        Some("bold") => r"\mathbf",
        Some("bold-italic") => r"\boldsymbol",
        Some("double-struck") => r"\mathbb",
        Some("script") | Some("bold-script") => r"\mathcal",
        Some("fraktur") | Some("bold-fraktur") => r"\mathfrak",
        Some("sans-serif") => r"\mathsf",
        Some("monospace") => r"\mathtt",
        _ => return body,
    };
    format!("{cmd}{{{}}}", body.trim_end())
}

fn emit_identifier(node: &MathNode, out: &mut String) {
    let text = node.text();
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    let variant = node.attr("mathvariant");
    if text.chars().count() == 1 {
        out.push_str(&with_variant(variant, symbols(text)));
    } else if FUNCTIONS.contains(&text) {
        out.push('\\');
        out.push_str(text);
        out.push(' ');
    } else if variant.is_some() && variant != Some("normal") {
        out.push_str(&with_variant(variant, escape_text(text)));
    } else {
        out.push_str(&format!(r"\mathrm{{{}}}", escape_text(text)));
    }
}

fn latex_of(node: &MathNode) -> Result<String> {
    let mut s = String::new();
    emit(node, &mut s)?;
    Ok(s.trim().to_string())
}

// Bases that are a single character or command need no braces.
fn base_of(node: &MathNode) -> Result<String> {
    let s = latex_of(node)?;
    if s.chars().count() == 1 || COMMAND.is_match(&s) {
        Ok(s)
    } else {
        Ok(format!("{{{s}}}"))
    }
}

fn emit_children(children: &[MathNode], out: &mut String) -> Result<()> {
    for c in children {
        emit(c, out)?;
    }
    Ok(())
}

fn required<'a>(args: &[&'a MathNode], n: usize, name: &str) -> Result<Vec<&'a MathNode>> {
    if args.len() < n {
        return Err(conversion_err(format!(
            "<{name}> needs {n} children, found {}",
            args.len()
        )));
    }
    Ok(args[..n].to_vec())
}

fn is_limit_base(node: &MathNode) -> bool {
    matches!(node.name(), "mo" | "mi") && LIMIT_OPERATORS.contains(&node.text().trim())
}

fn accent_over(mark: &str, base: &str) -> Option<String> {
    let cmd = match mark {
        "^" | "ˆ" | "\u{302}" => r"\hat",
        "~" | "˜" | "\u{303}" => r"\tilde",
        "¯" | "‾" | "―" | "\u{304}" | "\u{305}" => r"\overline",
        "→" | "\u{20d7}" => r"\vec",
        "˙" | "." | "\u{307}" => r"\dot",
        "¨" | "\u{308}" => r"\ddot",
        "⏞" | "︷" => r"\overbrace",
        "ˇ" => r"\check",
        "˘" => r"\breve",
        _ => return None,
    };
    Some(format!("{cmd}{{{base}}}"))
}

fn accent_under(mark: &str, base: &str) -> Option<String> {
    let cmd = match mark {
        "_" | "¯" | "‾" | "\u{332}" => r"\underline",
        "⏟" | "︸" => r"\underbrace",
        _ => return None,
    };
    Some(format!("{cmd}{{{base}}}"))
}

fn fence(delim: &str) -> String {
    match delim.trim() {
        "" => ".".to_string(),
        "{" => r"\{".to_string(),
        "}" => r"\}".to_string(),
        "⟨" | "〈" => r"\langle ".to_string(),
        "⟩" | "〉" => r"\rangle ".to_string(),
        "‖" => r"\|".to_string(),
        d => d.to_string(),
    }
}

fn emit_table(node: &MathNode, out: &mut String) -> Result<()> {
    out.push_str(r"\begin{matrix}");
    let rows = node.element_children();
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            out.push_str(r" \\ ");
        }
        let mut cells = row.element_children();
        if row.name() == "mlabeledtr" && !cells.is_empty() {
            cells.remove(0);
        }
        for (j, cell) in cells.iter().enumerate() {
            if j > 0 {
                out.push_str(" & ");
            }
            out.push_str(&latex_of(cell)?);
        }
    }
    out.push_str(r"\end{matrix}");
    Ok(())
}

fn emit_multiscripts(args: &[&MathNode], out: &mut String) -> Result<()> {
    let Some((base, rest)) = args.split_first() else {
        return Err(conversion_err("<mmultiscripts> without a base"));
    };
    let split = rest.iter().position(|n| n.name() == "mprescripts");
    let (post, pre) = match split {
        Some(i) => (&rest[..i], &rest[i + 1..]),
        None => (rest, &[][..]),
    };
    let scripts = |pairs: &[&MathNode]| -> Result<String> {
        let mut s = String::new();
        for pair in pairs.chunks(2) {
            if let Some(sub) = pair.first().filter(|n| n.name() != "none") {
                s.push_str(&format!("_{{{}}}", latex_of(sub)?));
            }
            if let Some(sup) = pair.get(1).filter(|n| n.name() != "none") {
                s.push_str(&format!("^{{{}}}", latex_of(sup)?));
            }
        }
        Ok(s)
    };
    if !pre.is_empty() {
        out.push_str("{}");
        out.push_str(&scripts(pre)?);
    }
    out.push_str(&base_of(base)?);
    out.push_str(&scripts(post)?);
    Ok(())
}

fn emit(node: &MathNode, out: &mut String) -> Result<()> {
    let (name, children) = match node {
        MathNode::Text(t) => {
            out.push_str(&symbols(t));
            return Ok(());
        }
        MathNode::Element { name, children, .. } => (name.as_str(), children),
    };
    let args = node.element_children();

    match name {
        "math" | "mrow" | "mstyle" | "mpadded" | "merror" | "mtd" => emit_children(children, out)?,
        "semantics" => {
            if let Some(first) = args
                .iter()
                .find(|c| !matches!(c.name(), "annotation" | "annotation-xml"))
            {
                emit(first, out)?;
            }
        }
        "annotation" | "annotation-xml" | "none" | "mprescripts" | "mglyph" | "malignmark"
        | "maligngroup" => {}
        "maction" => {
            if let Some(first) = args.first() {
                emit(first, out)?;
            }
        }
        "mi" => emit_identifier(node, out),
        "mn" => out.push_str(&symbols(node.text().trim())),
        "mo" => out.push_str(&symbols(node.text().trim())),
        "mtext" => {
            let text = node.text();
            if !text.trim().is_empty() {
                out.push_str(&format!(r"\text{{{}}}", escape_text(&text)));
            }
        }
        "ms" => out.push_str(&format!(r#"\text{{"{}"}}"#, escape_text(&node.text()))),
        "mspace" => {
            if node.attr("linebreak") == Some("newline") {
                out.push_str(r" \\ ");
            } else {
                out.push_str(r"\ ");
            }
        }
        "mphantom" => {
            let mut inner = String::new();
            emit_children(children, &mut inner)?;
            out.push_str(&format!(r"\phantom{{{}}}", inner.trim()));
        }
        "mfrac" => {
            let a = required(&args, 2, name)?;
            let (num, den) = (latex_of(a[0])?, latex_of(a[1])?);
            if node.attr("linethickness").map(str::trim) == Some("0") {
                out.push_str(&format!(r"\genfrac{{}}{{}}{{0pt}}{{}}{{{num}}}{{{den}}}"));
            } else {
                out.push_str(&format!(r"\frac{{{num}}}{{{den}}}"));
            }
        }
        "msqrt" => {
            let mut inner = String::new();
            emit_children(children, &mut inner)?;
            out.push_str(&format!(r"\sqrt{{{}}}", inner.trim()));
        }
        "mroot" => {
            let a = required(&args, 2, name)?;
            out.push_str(&format!(r"\sqrt[{}]{{{}}}", latex_of(a[1])?, latex_of(a[0])?));
        }
        "msub" => {
            let a = required(&args, 2, name)?;
            out.push_str(&format!("{}_{{{}}}", base_of(a[0])?, latex_of(a[1])?));
        }
        "msup" => {
            let a = required(&args, 2, name)?;
            out.push_str(&format!("{}^{{{}}}", base_of(a[0])?, latex_of(a[1])?));
        }
        "msubsup" => {
            let a = required(&args, 3, name)?;
            out.push_str(&format!(
                "{}_{{{}}}^{{{}}}",
                base_of(a[0])?,
                latex_of(a[1])?,
                latex_of(a[2])?
            ));
        }
        "munder" => {
            let a = required(&args, 2, name)?;
            let (base, under) = (latex_of(a[0])?, latex_of(a[1])?);
            if is_limit_base(a[0]) {
                out.push_str(&format!("{}_{{{under}}}", base_of(a[0])?));
            } else if let Some(s) = accent_under(a[1].text().trim(), &base) {
                out.push_str(&s);
            } else {
                out.push_str(&format!(r"\underset{{{under}}}{{{base}}}"));
            }
        }
        "mover" => {
            let a = required(&args, 2, name)?;
            let (base, over) = (latex_of(a[0])?, latex_of(a[1])?);
            if is_limit_base(a[0]) {
                out.push_str(&format!("{}^{{{over}}}", base_of(a[0])?));
            } else if let Some(s) = accent_over(a[1].text().trim(), &base) {
                out.push_str(&s);
            } else {
                out.push_str(&format!(r"\overset{{{over}}}{{{base}}}"));
            }
        }
        "munderover" => {
            let a = required(&args, 3, name)?;
            let (base, under, over) = (latex_of(a[0])?, latex_of(a[1])?, latex_of(a[2])?);
            if is_limit_base(a[0]) {
                out.push_str(&format!("{}_{{{under}}}^{{{over}}}", base_of(a[0])?));
            } else {
                out.push_str(&format!(r"\overset{{{over}}}{{\underset{{{under}}}{{{base}}}}}"));
            }
        }
        "mmultiscripts" => emit_multiscripts(&args, out)?,
        "mtable" => emit_table(node, out)?,
        "mtr" | "mlabeledtr" => {
            for (j, cell) in args.iter().enumerate() {
                if j > 0 {
                    out.push_str(" & ");
                }
                emit(cell, out)?;
            }
        }
        "mfenced" => {
            let open = node.attr("open").unwrap_or("(");
            let close = node.attr("close").unwrap_or(")");
            let separators: Vec<char> = node
                .attr("separators")
                .unwrap_or(",")
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            out.push_str(&format!(r"\left{}", fence(open)));
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    if let Some(sep) = separators.get(i - 1).or(separators.last()) {
                        out.push(*sep);
                    }
                }
                emit(arg, out)?;
            }
            out.push_str(&format!(r"\right{}", fence(close)));
        }
        "menclose" => {
            let mut inner = String::new();
            emit_children(children, &mut inner)?;
            let inner = inner.trim();
            let notation = node.attr("notation").unwrap_or("longdiv");
            let wrapped = if notation.contains("box") {
                format!(r"\boxed{{{inner}}}")
            } else if notation.contains("updiagonalstrike") {
                format!(r"\cancel{{{inner}}}")
            } else if notation.contains("radical") {
                format!(r"\sqrt{{{inner}}}")
            } else if notation == "top" {
                format!(r"\overline{{{inner}}}")
            } else if notation == "bottom" {
                format!(r"\underline{{{inner}}}")
            } else {
                inner.to_string()
            };
            out.push_str(&wrapped);
        }
        other => return Err(conversion_err(format!("unsupported element <{other}>"))),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns(body: &str) -> String {
        format!(r#"<math xmlns="{MATHML_NS}">{body}</math>"#)
    }

    #[test]
    fn converts_scripts_and_fractions() {
        let m = ns("<mi>E</mi><mo>=</mo><mi>m</mi><msup><mi>c</mi><mn>2</mn></msup>");
        assert_eq!(mathml_to_latex(&m).unwrap(), "E=mc^{2}");

        let m = ns("<mfrac><mi>a</mi><mrow><mi>b</mi><mo>+</mo><mn>1</mn></mrow></mfrac>");
        assert_eq!(mathml_to_latex(&m).unwrap(), r"\frac{a}{b+1}");
    }

    #[test]
    fn converts_roots_and_greek() {
        let m = ns("<msqrt><mi>α</mi></msqrt><mroot><mi>x</mi><mn>3</mn></mroot>");
        assert_eq!(mathml_to_latex(&m).unwrap(), r"\sqrt{\alpha}\sqrt[3]{x}");
    }

    #[test]
    fn sums_use_limits_syntax() {
        let m = ns(
            "<munderover><mo>∑</mo><mrow><mi>i</mi><mo>=</mo><mn>1</mn></mrow><mi>n</mi></munderover><msub><mi>x</mi><mi>i</mi></msub>",
        );
        assert_eq!(mathml_to_latex(&m).unwrap(), r"\sum_{i=1}^{n}x_{i}");
    }

    #[test]
    fn accents_and_functions() {
        let m = ns("<mover><mi>v</mi><mo>→</mo></mover><mi>sin</mi><mi>x</mi>");
        assert_eq!(mathml_to_latex(&m).unwrap(), r"\vec{v}\sin x");
    }

    #[test]
    fn semantics_skips_annotations() {
        let m = ns(
            r#"<semantics><mi>x</mi><annotation encoding="application/x-tex">ignored</annotation></semantics>"#,
        );
        assert_eq!(mathml_to_latex(&m).unwrap(), "x");
    }

    #[test]
    fn tables_and_fences() {
        let m = ns(
            "<mfenced><mtable><mtr><mtd><mn>1</mn></mtd><mtd><mn>0</mn></mtd></mtr><mtr><mtd><mn>0</mn></mtd><mtd><mn>1</mn></mtd></mtr></mtable></mfenced>",
        );
        assert_eq!(
            mathml_to_latex(&m).unwrap(),
            r"\left(\begin{matrix}1 & 0 \\ 0 & 1\end{matrix}\right)"
        );
    }

    #[test]
    fn requires_namespace_and_wellformed_xml() {
        assert!(mathml_to_latex("<math><mi>x</mi></math>").is_err());
        assert!(mathml_to_latex(&ns("<mi>x</mi>")).is_ok());
        assert!(mathml_to_latex("<notvalidxml").is_err());
        assert!(mathml_to_latex(&ns("<mi>x</mo>")).is_err());
        assert!(mathml_to_latex(&format!(r#"<math xmlns="{MATHML_NS}"><mi>x</mi>"#)).is_err());
    }

    #[test]
    fn rejects_unknown_elements() {
        let err = mathml_to_latex(&ns("<blink>x</blink>")).unwrap_err();
        assert!(matches!(err, MathError::Conversion(_)));
    }

    #[test]
    fn rejects_runaway_nesting() {
        let deep = ns(&format!("{}<mi>x</mi>{}", "<mrow>".repeat(100_000), "</mrow>".repeat(100_000)));
        let err = mathml_to_latex(&deep).unwrap_err();
        assert!(matches!(err, MathError::Conversion(_)));

        let nested = ns(&format!("{}<mi>x</mi>{}", "<mrow>".repeat(50), "</mrow>".repeat(50)));
        assert_eq!(mathml_to_latex(&nested).unwrap(), "x");
    }

    #[test]
    fn prepare_injects_namespace_and_strips_prefix() {
        assert_eq!(
            prepare_mathml("<math><mi>x</mi></math>"),
            format!(r#"<math xmlns="{MATHML_NS}"><mi>x</mi></math>"#)
        );
        let prefixed = r#"<mml:math xmlns:mml="http://www.w3.org/1998/Math/MathML"><mml:mi>y</mml:mi></mml:math>"#;
        assert_eq!(mml_to_latex(prefixed).unwrap(), "y");
        assert_eq!(mml_to_latex("[itex]<mn>4</mn>[/itex]").unwrap(), "4");
    }

    #[test]
    fn keeps_existing_namespace() {
        let m = ns("<mi>z</mi>");
        assert_eq!(prepare_mathml(&m), m);
    }
}
