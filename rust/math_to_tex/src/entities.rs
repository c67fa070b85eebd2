use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};

lazy_static! {
    static ref NAMED: HashMap<&'static str, &'static str> = [
        ("amp", "&"),
        ("lt", "<"),
        ("gt", ">"),
        ("quot", "\""),
        ("apos", "'"),
        ("nbsp", "\u{a0}"),
        ("ndash", "\u{2013}"),
        ("mdash", "\u{2014}"),
        ("hellip", "\u{2026}"),
        ("middot", "\u{b7}"),
        ("times", "\u{d7}"),
        ("divide", "\u{f7}"),
        ("minus", "\u{2212}"),
        ("plusmn", "\u{b1}"),
        ("le", "\u{2264}"),
        ("ge", "\u{2265}"),
        ("ne", "\u{2260}"),
        ("equiv", "\u{2261}"),
        ("asymp", "\u{2248}"),
        ("infin", "\u{221e}"),
        ("sum", "\u{2211}"),
        ("prod", "\u{220f}"),
        ("int", "\u{222b}"),
        ("part", "\u{2202}"),
        ("nabla", "\u{2207}"),
        ("radic", "\u{221a}"),
        ("isin", "\u{2208}"),
        ("notin", "\u{2209}"),
        ("sub", "\u{2282}"),
        ("sup", "\u{2283}"),
        ("cap", "\u{2229}"),
        ("cup", "\u{222a}"),
        ("forall", "\u{2200}"),
        ("exist", "\u{2203}"),
        ("empty", "\u{2205}"),
        ("rarr", "\u{2192}"),
        ("larr", "\u{2190}"),
        ("harr", "\u{2194}"),
        ("rArr", "\u{21d2}"),
        ("hArr", "\u{21d4}"),
        ("deg", "\u{b0}"),
        ("prime", "\u{2032}"),
        ("sdot", "\u{22c5}"),
        ("InvisibleTimes", "\u{2062}"),
        ("ApplyFunction", "\u{2061}"),
        ("alpha", "\u{3b1}"),
        ("beta", "\u{3b2}"),
        ("gamma", "\u{3b3}"),
        ("delta", "\u{3b4}"),
        ("epsilon", "\u{3b5}"),
        ("theta", "\u{3b8}"),
        ("lambda", "\u{3bb}"),
        ("mu", "\u{3bc}"),
        ("pi", "\u{3c0}"),
        ("sigma", "\u{3c3}"),
        ("phi", "\u{3c6}"),
        ("omega", "\u{3c9}"),
        ("Delta", "\u{394}"),
        ("Sigma", "\u{3a3}"),
        ("Omega", "\u{3a9}"),
    ]
    .into_iter()
    .collect();
}

lazy_static! {
    // Names HTML still decodes when the trailing `;` is missing.
    static ref LEGACY: HashSet<&'static str> = [
        "amp", "lt", "gt", "quot", "nbsp", "times", "divide", "plusmn", "middot", "deg",
    ]
    .into_iter()
    .collect();
}

// Longest entity name we bother scanning for before giving up on a `&`.
const MAX_ENTITY_LEN: usize = 32;

/// Decodes named and numeric character references. Numeric and legacy named references
/// may omit the `;`. Unknown or malformed references are kept literally.
pub fn html_unescape(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let body = &rest[1..];
        let decoded = match body.strip_prefix('#') {
            Some(num) => numeric_reference(num).map(|(c, used)| (c.to_string(), used + 1)),
            None => named_reference(body),
        };
        match decoded {
            Some((text, used)) => {
                out.push_str(&text);
                rest = &body[used..];
            }
            None => {
                out.push('&');
                rest = body;
            }
        }
    }
    out.push_str(rest);
    out
}

// `num` follows the `#`. Returns the character and the bytes consumed, `;` included.
fn numeric_reference(num: &str) -> Option<(char, usize)> {
    let (digits_at, radix) = match num.as_bytes().first() {
        Some(b'x' | b'X') => (1, 16),
        _ => (0, 10),
    };
    let digits = &num[digits_at..];
    let len = digits
        .bytes()
        .take_while(|b| b.is_ascii_digit() || (radix == 16 && b.is_ascii_hexdigit()))
        .count();
    if len == 0 {
        return None;
    }
    let decoded = u32::from_str_radix(&digits[..len], radix)
        .ok()
        .filter(|&cp| cp != 0)
        .and_then(char::from_u32)
        .unwrap_or(char::REPLACEMENT_CHARACTER);
    let semi = usize::from(digits[len..].starts_with(';'));
    Some((decoded, digits_at + len + semi))
}

fn named_reference(body: &str) -> Option<(String, usize)> {
    let name_len = body
        .char_indices()
        .take(MAX_ENTITY_LEN)
        .find(|&(_, c)| matches!(c, '\t' | '\n' | '\x0c' | ' ' | '<' | '&' | '#' | ';'))
        .map_or_else(
            || body.char_indices().nth(MAX_ENTITY_LEN).map_or(body.len(), |(i, _)| i),
            |(i, _)| i,
        );
    let name = &body[..name_len];
    if body[name_len..].starts_with(';') {
        if let Some(text) = NAMED.get(name) {
            return Some((text.to_string(), name_len + 1));
        }
    }
    // `&amplifier` still decodes its `&amp` prefix.
    (2..=name_len)
        .rev()
        .filter(|&end| name.is_char_boundary(end))
        .find(|&end| LEGACY.contains(&name[..end]))
        .and_then(|end| NAMED.get(&name[..end]).map(|text| (text.to_string(), end)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_basic_entities() {
        assert_eq!(html_unescape("a &amp; b"), "a & b");
        assert_eq!(html_unescape("&lt;mi&gt;x&lt;/mi&gt;"), "<mi>x</mi>");
        assert_eq!(html_unescape("&quot;q&quot; &#39;"), "\"q\" '");
    }

    #[test]
    fn decodes_numeric_references() {
        assert_eq!(html_unescape("&#92;Delta"), "\\Delta");
        assert_eq!(html_unescape("&#x3B1;&#X3b2;"), "αβ");
    }

    #[test]
    fn keeps_unknown_and_bare_ampersands() {
        assert_eq!(html_unescape("a & b"), "a & b");
        assert_eq!(html_unescape("&bogus; &apos"), "&bogus; &apos");
        assert_eq!(html_unescape("&#; &#x;"), "&#; &#x;");
        assert_eq!(html_unescape("&#xZZ;"), "&#xZZ;");
        assert_eq!(html_unescape("&#0; &#1114112;"), "\u{FFFD} \u{FFFD}");
        assert_eq!(html_unescape("x &&amp; y"), "x && y");
    }

    #[test]
    fn decodes_references_without_semicolon() {
        assert_eq!(html_unescape("a &amp b &#92alpha"), "a & b \\alpha");
        assert_eq!(html_unescape("&lt&gt &quot"), "<> \"");
        assert_eq!(html_unescape("&#x3B1x &#923"), "\u{3b1}x \u{39b}");
        assert_eq!(html_unescape("&amplifier &ltb"), "&lifier <b");
        assert_eq!(html_unescape("&alpha &alpha;"), "&alpha \u{3b1}");
    }

    #[test]
    fn keeps_non_ascii_text() {
        assert_eq!(html_unescape("ϕ&le;π"), "ϕ≤π");
    }
}
