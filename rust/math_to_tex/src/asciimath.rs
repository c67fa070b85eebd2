//! ASCII-math -> LaTeX.
//!
//! Grammar (asciimath.org):
//!
//! ```text
//! S ::= v | l E r | u S | b S S     simple
//! I ::= S_S | S^S | S_S^S | S       intermediate
//! E ::= I E | I/I                   expression
//! ```

use crate::error::{MathError, Result};
use crate::normalize::collapse_ws;
use lazy_static::lazy_static;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unary {
    Command(&'static str),
    Fenced(&'static str, &'static str),
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binary {
    Frac,
    Root,
    Over,
    Under,
    Color,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Const(&'static str),
    Unary(Unary),
    Binary(Binary),
    Left(&'static str),
    Right(&'static str),
    Sub,
    Sup,
    Div,
}

lazy_static! {
    static ref SYMBOLS: HashMap<&'static str, Kind> = {
        let mut m = HashMap::new();
        let consts: &[(&str, &str)] = &[
            // greek
            ("alpha", r"\alpha"), ("beta", r"\beta"), ("gamma", r"\gamma"), ("Gamma", r"\Gamma"),
            ("delta", r"\delta"), ("Delta", r"\Delta"), ("epsilon", r"\epsilon"),
            ("varepsilon", r"\varepsilon"), ("zeta", r"\zeta"), ("eta", r"\eta"),
            ("theta", r"\theta"), ("Theta", r"\Theta"), ("vartheta", r"\vartheta"),
            ("iota", r"\iota"), ("kappa", r"\kappa"), ("lambda", r"\lambda"),
            ("Lambda", r"\Lambda"), ("mu", r"\mu"), ("nu", r"\nu"), ("xi", r"\xi"),
            ("Xi", r"\Xi"), ("pi", r"\pi"), ("Pi", r"\Pi"), ("rho", r"\rho"),
            ("sigma", r"\sigma"), ("Sigma", r"\Sigma"), ("tau", r"\tau"),
            ("upsilon", r"\upsilon"), ("phi", r"\phi"), ("Phi", r"\Phi"),
            ("varphi", r"\varphi"), ("chi", r"\chi"), ("psi", r"\psi"), ("Psi", r"\Psi"),
            ("omega", r"\omega"), ("Omega", r"\Omega"),
            // operators
            ("+", "+"), ("-", "-"), ("*", r"\cdot"), ("**", r"\ast"), ("***", r"\star"),
            ("//", "/"), ("\\\\", r"\backslash"), ("xx", r"\times"), ("-:", r"\div"),
            ("|><", r"\ltimes"), ("><|", r"\rtimes"), ("|><|", r"\bowtie"), ("@", r"\circ"),
            ("o+", r"\oplus"), ("ox", r"\otimes"), ("o.", r"\odot"), ("sum", r"\sum"),
            ("prod", r"\prod"), ("^^", r"\wedge"), ("^^^", r"\bigwedge"), ("vv", r"\vee"),
            ("vvv", r"\bigvee"), ("nn", r"\cap"), ("nnn", r"\bigcap"), ("uu", r"\cup"),
            ("uuu", r"\bigcup"),
            // relations
            ("=", "="), ("!=", r"\ne"), ("<", "<"), (">", ">"), ("lt", "<"), ("gt", ">"),
            ("<=", r"\le"), ("le", r"\le"), (">=", r"\ge"), ("ge", r"\ge"), ("-<", r"\prec"),
            (">-", r"\succ"), ("in", r"\in"), ("!in", r"\notin"), ("sub", r"\subset"),
            ("sup", r"\supset"), ("sube", r"\subseteq"), ("supe", r"\supseteq"),
            ("-=", r"\equiv"), ("~=", r"\cong"), ("~~", r"\approx"), ("prop", r"\propto"),
            // logic
            ("and", r"\ \text{and}\ "), ("or", r"\ \text{or}\ "), ("not", r"\neg"),
            ("=>", r"\Rightarrow"), ("if", r"\ \text{if}\ "), ("<=>", r"\Leftrightarrow"),
            ("AA", r"\forall"), ("EE", r"\exists"), ("_|_", r"\bot"), ("TT", r"\top"),
            ("|--", r"\vdash"), ("|==", r"\models"),
            // misc
            ("int", r"\int"), ("oint", r"\oint"), ("del", r"\partial"), ("grad", r"\nabla"),
            ("+-", r"\pm"), ("-+", r"\mp"), ("O/", r"\emptyset"), ("oo", r"\infty"),
            ("aleph", r"\aleph"), ("...", r"\ldots"), ("cdots", r"\cdots"),
            ("vdots", r"\vdots"), ("ddots", r"\ddots"), (":.", r"\therefore"),
            ("/_", r"\angle"), ("quad", r"\quad"), ("qquad", r"\qquad"),
            ("diamond", r"\diamond"), ("square", r"\square"), ("|__", r"\lfloor"),
            ("__|", r"\rfloor"), ("|~", r"\lceil"), ("~|", r"\rceil"), ("CC", r"\mathbb{C}"),
            ("NN", r"\mathbb{N}"), ("QQ", r"\mathbb{Q}"), ("RR", r"\mathbb{R}"),
            ("ZZ", r"\mathbb{Z}"),
            // functions
            ("sin", r"\sin"), ("cos", r"\cos"), ("tan", r"\tan"), ("sec", r"\sec"),
            ("csc", r"\csc"), ("cot", r"\cot"), ("arcsin", r"\arcsin"), ("arccos", r"\arccos"),
            ("arctan", r"\arctan"), ("sinh", r"\sinh"), ("cosh", r"\cosh"), ("tanh", r"\tanh"),
            ("exp", r"\exp"), ("log", r"\log"), ("ln", r"\ln"), ("det", r"\det"),
            ("dim", r"\dim"), ("gcd", r"\gcd"), ("lcm", r"\operatorname{lcm}"),
            ("lim", r"\lim"), ("min", r"\min"), ("max", r"\max"),
            // arrows
            ("uarr", r"\uparrow"), ("darr", r"\downarrow"), ("rarr", r"\rightarrow"),
            ("->", r"\to"), (">->", r"\rightarrowtail"), ("->>", r"\twoheadrightarrow"),
            ("|->", r"\mapsto"), ("larr", r"\leftarrow"), ("harr", r"\leftrightarrow"),
            ("rArr", r"\Rightarrow"), ("lArr", r"\Leftarrow"), ("hArr", r"\Leftrightarrow"),
        ];
        for &(k, v) in consts {
            m.insert(k, Kind::Const(v));
        }
        let unary: &[(&str, Unary)] = &[
            ("sqrt", Unary::Command(r"\sqrt")), ("hat", Unary::Command(r"\hat")),
            ("bar", Unary::Command(r"\overline")), ("ul", Unary::Command(r"\underline")),
            ("vec", Unary::Command(r"\vec")), ("dot", Unary::Command(r"\dot")),
            ("ddot", Unary::Command(r"\ddot")), ("tilde", Unary::Command(r"\tilde")),
            ("ubrace", Unary::Command(r"\underbrace")), ("obrace", Unary::Command(r"\overbrace")),
            ("cancel", Unary::Command(r"\cancel")), ("bb", Unary::Command(r"\mathbf")),
            ("bbb", Unary::Command(r"\mathbb")), ("cc", Unary::Command(r"\mathcal")),
            ("tt", Unary::Command(r"\mathtt")), ("fr", Unary::Command(r"\mathfrak")),
            ("sf", Unary::Command(r"\mathsf")), ("abs", Unary::Fenced("|", "|")),
            ("norm", Unary::Fenced(r"\|", r"\|")), ("floor", Unary::Fenced(r"\lfloor", r"\rfloor")),
            ("ceil", Unary::Fenced(r"\lceil", r"\rceil")), ("text", Unary::Text),
        ];
        for &(k, v) in unary {
            m.insert(k, Kind::Unary(v));
        }
        m.insert("frac", Kind::Binary(Binary::Frac));
        m.insert("root", Kind::Binary(Binary::Root));
        m.insert("stackrel", Kind::Binary(Binary::Over));
        m.insert("overset", Kind::Binary(Binary::Over));
        m.insert("underset", Kind::Binary(Binary::Under));
        m.insert("color", Kind::Binary(Binary::Color));
        for &(k, v) in &[("(", "("), ("[", "["), ("{", r"\{"), ("(:", r"\langle"), ("<<", r"\langle"), ("{:", "")] {
            m.insert(k, Kind::Left(v));
        }
        for &(k, v) in &[(")", ")"), ("]", "]"), ("}", r"\}"), (":)", r"\rangle"), (">>", r"\rangle"), (":}", "")] {
            m.insert(k, Kind::Right(v));
        }
        m.insert("_", Kind::Sub);
        m.insert("^", Kind::Sup);
        m.insert("/", Kind::Div);
        m
    };

    static ref MAX_SYMBOL_LEN: usize = SYMBOLS.keys().map(|k| k.chars().count()).max().unwrap_or(1);
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Symbol(Kind),
    Number(String),
    Letter(char),
    Quoted(String),
    Other(char),
}

// A translated simple expression; `inner` holds the bracket contents when it was `l E r`.
#[derive(Debug, Clone)]
struct Simple {
    latex: String,
    inner: Option<String>,
}

impl Simple {
    fn plain(latex: String) -> Self {
        Simple { latex, inner: None }
    }

    fn unbracketed(&self) -> &str {
        self.inner.as_deref().unwrap_or(&self.latex).trim()
    }
}

fn parse_err(msg: impl Into<String>) -> MathError {
    MathError::Parse(msg.into())
}

// Nesting of simple expressions (brackets, operator arguments) before parsing gives up.
const MAX_DEPTH: usize = 128;

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        Parser {
            chars: input.chars().collect(),
            pos: 0,
            depth: 0,
        }
    }

    fn skip_ws(&mut self) {
        while self.chars.get(self.pos).is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn at_end(&mut self) -> bool {
        self.skip_ws();
        self.pos >= self.chars.len()
    }

    // Next token and its length in chars, without consuming it.
    fn peek(&mut self) -> Result<Option<(Token, usize)>> {
        self.skip_ws();
        let rest = &self.chars[self.pos..];
        let Some(&first) = rest.first() else {
            return Ok(None);
        };

        if first == '"' {
            let Some(end) = rest[1..].iter().position(|&c| c == '"') else {
                return Err(parse_err("unterminated quoted text"));
            };
            let text: String = rest[1..1 + end].iter().collect();
            return Ok(Some((Token::Quoted(text), end + 2)));
        }

        for len in (1..=(*MAX_SYMBOL_LEN).min(rest.len())).rev() {
            let candidate: String = rest[..len].iter().collect();
            if let Some(&kind) = SYMBOLS.get(candidate.as_str()) {
                return Ok(Some((Token::Symbol(kind), len)));
            }
        }

        if first.is_ascii_digit() {
            let mut len = rest.iter().take_while(|c| c.is_ascii_digit()).count();
            if rest.get(len) == Some(&'.') && rest.get(len + 1).is_some_and(|c| c.is_ascii_digit()) {
                len += 1 + rest[len + 1..].iter().take_while(|c| c.is_ascii_digit()).count();
            }
            return Ok(Some((Token::Number(rest[..len].iter().collect()), len)));
        }
        if first.is_alphabetic() {
            return Ok(Some((Token::Letter(first), 1)));
        }
        Ok(Some((Token::Other(first), 1)))
    }

    fn next(&mut self) -> Result<Option<Token>> {
        let peeked = self.peek()?;
        Ok(peeked.map(|(tok, len)| {
            self.pos += len;
            tok
        }))
    }

    fn peek_kind(&mut self) -> Result<Option<Kind>> {
        Ok(match self.peek()? {
            Some((Token::Symbol(kind), _)) => Some(kind),
            _ => None,
        })
    }

    fn expression(&mut self, in_brackets: bool) -> Result<String> {
        let mut out = String::new();
        loop {
            if self.at_end() {
                if in_brackets {
                    return Err(parse_err("unclosed bracket"));
                }
                return Ok(out);
            }
            if let Some(Kind::Right(_)) = self.peek_kind()? {
                if in_brackets {
                    return Ok(out);
                }
                return Err(parse_err("unmatched closing bracket"));
            }
            let mut item = self.intermediate()?;
            while self.peek_kind()? == Some(Kind::Div) {
                self.next()?;
                let den = self.intermediate()?;
                item = Simple::plain(format!(
                    r"\frac{{{}}}{{{}}}",
                    item.unbracketed(),
                    den.unbracketed()
                ));
            }
            out.push_str(&item.latex);
        }
    }

    fn intermediate(&mut self) -> Result<Simple> {
        let base = self.simple()?;
        let mut sub = None;
        let mut sup = None;
        if self.peek_kind()? == Some(Kind::Sub) {
            self.next()?;
            sub = Some(self.simple()?);
        }
        if self.peek_kind()? == Some(Kind::Sup) {
            self.next()?;
            sup = Some(self.simple()?);
        }
        if sub.is_none() && sup.is_none() {
            return Ok(base);
        }
        let mut latex = base.latex.trim_end().to_string();
        if let Some(s) = sub {
            latex.push_str(&format!("_{{{}}}", s.unbracketed()));
        }
        if let Some(s) = sup {
            latex.push_str(&format!("^{{{}}}", s.unbracketed()));
        }
        Ok(Simple::plain(latex))
    }

    fn simple(&mut self) -> Result<Simple> {
        if self.depth >= MAX_DEPTH {
            return Err(parse_err("expression nested too deeply"));
        }
        self.depth += 1;
        let simple = self.simple_at_depth();
        self.depth -= 1;
        simple
    }

    fn simple_at_depth(&mut self) -> Result<Simple> {
        let Some(token) = self.next()? else {
            return Err(parse_err("unexpected end of input"));
        };
        match token {
            Token::Number(n) => Ok(Simple::plain(n)),
            Token::Letter(c) => Ok(Simple::plain(c.to_string())),
            Token::Quoted(text) => Ok(Simple::plain(format!(r"\text{{{}}}", escape(&text)))),
            Token::Other(c) => Ok(Simple::plain(escape(&c.to_string()))),
            Token::Symbol(kind) => match kind {
                Kind::Const(latex) => Ok(Simple::plain(command(latex))),
                Kind::Left(open) => {
                    let content = self.expression(true)?;
                    let close = match self.next()? {
                        Some(Token::Symbol(Kind::Right(close))) => close,
                        _ => return Err(parse_err("unclosed bracket")),
                    };
                    let latex = if open.is_empty() && close.is_empty() {
                        format!("{{{content}}}")
                    } else {
                        format!(r"\left{}{content}\right{}", fence(open), fence(close))
                    };
                    Ok(Simple {
                        latex,
                        inner: Some(content),
                    })
                }
                Kind::Right(_) => Err(parse_err("unmatched closing bracket")),
                Kind::Unary(Unary::Text) => self.raw_text(),
                Kind::Unary(Unary::Command(cmd)) => {
                    let arg = self.simple()?;
                    Ok(Simple::plain(format!("{cmd}{{{}}}", arg.unbracketed())))
                }
                Kind::Unary(Unary::Fenced(l, r)) => {
                    let arg = self.simple()?;
                    Ok(Simple::plain(format!(
                        r"\left{}{}\right{}",
                        command(l),
                        arg.unbracketed(),
                        command(r)
                    )))
                }
                Kind::Binary(op) => {
                    let a = self.simple()?;
                    let b = self.simple()?;
                    let (a, b) = (a.unbracketed(), b.unbracketed());
                    Ok(Simple::plain(match op {
                        Binary::Frac => format!(r"\frac{{{a}}}{{{b}}}"),
                        Binary::Root => format!(r"\sqrt[{a}]{{{b}}}"),
                        Binary::Over => format!(r"\overset{{{a}}}{{{b}}}"),
                        Binary::Under => format!(r"\underset{{{a}}}{{{b}}}"),
                        Binary::Color => format!(r"{{\color{{{a}}}{b}}}"),
                    }))
                }
                Kind::Sub | Kind::Sup | Kind::Div => Err(parse_err("operator without operand")),
            },
        }
    }

    // text(...) keeps its argument verbatim.
    fn raw_text(&mut self) -> Result<Simple> {
        self.skip_ws();
        let open = self.chars.get(self.pos).copied();
        let close = match open {
            Some('(') => ')',
            Some('[') => ']',
            Some('{') => '}',
            _ => return Err(parse_err("text expects a bracketed argument")),
        };
        let start = self.pos + 1;
        let Some(len) = self.chars[start..].iter().position(|&c| c == close) else {
            return Err(parse_err("unclosed text argument"));
        };
        let text: String = self.chars[start..start + len].iter().collect();
        self.pos = start + len + 1;
        Ok(Simple::plain(format!(r"\text{{{}}}", escape(&text))))
    }
}

// Control words get a trailing space so the next letter does not run into them.
fn command(latex: &str) -> String {
    if latex.starts_with('\\') && latex.ends_with(|c: char| c.is_ascii_alphabetic()) {
        format!("{latex} ")
    } else {
        latex.to_string()
    }
}

fn fence(delim: &str) -> String {
    if delim.is_empty() {
        ".".to_string()
    } else {
        command(delim)
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '%' | '#' | '&' | '$' | '_' | '{' | '}' => {
                out.push('\\');
                out.push(ch);
            }
            '\\' => out.push_str(r"\backslash "),
            _ => out.push(ch),
        }
    }
    out
}

/// Translates ASCII-math notation to LaTeX.
pub fn asciimath_to_latex(input: &str) -> Result<String> {
    if input.trim().is_empty() {
        return Err(parse_err("empty input"));
    }
    let mut parser = Parser::new(input);
    let latex = parser.expression(false)?;
    Ok(collapse_ws(&latex))
}
