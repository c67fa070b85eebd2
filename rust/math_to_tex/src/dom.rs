use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{parse_document, LocalName, Namespace, QualName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

const HTML_NS: &str = "http://www.w3.org/1999/xhtml";

pub fn parse_html(input: &str) -> RcDom {
    parse_document(RcDom::default(), Default::default()).one(input)
}

/// All elements under `root` (inclusive) for which `pred` holds, in document order.
pub fn select<F>(root: &Handle, pred: F) -> Vec<Handle>
where
    F: Fn(&Handle) -> bool,
{
    let mut out = Vec::new();
    let mut stack = vec![root.clone()];
    while let Some(node) = stack.pop() {
        if matches!(node.data, NodeData::Element { .. }) && pred(&node) {
            out.push(node.clone());
        }
        // Reversed so the first child is popped next.
        stack.extend(node.children.borrow().iter().rev().cloned());
    }
    out
}

/// First element named `name` in document order.
pub fn find_elem(node: &Handle, name: &str) -> Option<Handle> {
    select(node, |h| is_tag(h, name)).into_iter().next()
}

pub fn is_tag(h: &Handle, tag: &str) -> bool {
    match &h.data {
        NodeData::Element { name, .. } => name.local.to_string().eq_ignore_ascii_case(tag),
        _ => false,
    }
}

pub fn attr(h: &Handle, key: &str) -> Option<String> {
    match &h.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| a.name.local.to_string().eq_ignore_ascii_case(key))
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

pub fn has_attr(h: &Handle, key: &str) -> bool {
    attr(h, key).is_some()
}

pub fn class_attr(h: &Handle) -> String {
    attr(h, "class").unwrap_or_default()
}

/// Whitespace-separated class token match.
pub fn has_class_token(h: &Handle, token: &str) -> bool {
    class_attr(h).split_whitespace().any(|c| c == token)
}

/// Substring match anywhere in the class attribute, e.g. `katex` also hits `katex-display`.
pub fn class_contains(h: &Handle, needle: &str) -> bool {
    class_attr(h).contains(needle)
}

pub fn has_element_children(h: &Handle) -> bool {
    h.children
        .borrow()
        .iter()
        .any(|c| matches!(c.data, NodeData::Element { .. }))
}

/// Concatenated text of all descendant text nodes.
pub fn text_content(h: &Handle) -> String {
    let mut out = String::new();
    let mut stack = vec![h.clone()];
    while let Some(node) = stack.pop() {
        if let NodeData::Text { contents } = &node.data {
            out.push_str(&contents.borrow());
        }
        stack.extend(node.children.borrow().iter().rev().cloned());
    }
    out
}

pub fn parent_of(h: &Handle) -> Option<Handle> {
    let weak = h.parent.take();
    let parent = weak.as_ref().and_then(Weak::upgrade);
    h.parent.set(weak);
    parent
}

/// True when `root` can be reached from `h` by following parent links.
pub fn is_attached(h: &Handle, root: &Handle) -> bool {
    let mut cur = h.clone();
    loop {
        if Rc::ptr_eq(&cur, root) {
            return true;
        }
        match parent_of(&cur) {
            Some(p) => cur = p,
            None => return false,
        }
    }
}

pub fn is_ancestor_of(ancestor: &Handle, h: &Handle) -> bool {
    let mut cur = parent_of(h);
    while let Some(p) = cur {
        if Rc::ptr_eq(&p, ancestor) {
            return true;
        }
        cur = parent_of(&p);
    }
    false
}

fn index_in_parent(parent: &Handle, h: &Handle) -> Option<usize> {
    parent.children.borrow().iter().position(|c| Rc::ptr_eq(c, h))
}

/// Swaps `old` for `new` in its parent's child list. Returns false if `old` is detached.
pub fn replace_node(old: &Handle, new: Handle) -> bool {
    let Some(parent) = parent_of(old) else {
        return false;
    };
    let Some(idx) = index_in_parent(&parent, old) else {
        return false;
    };
    new.parent.set(Some(Rc::downgrade(&parent)));
    parent.children.borrow_mut()[idx] = new;
    old.parent.set(None);
    true
}

pub fn remove_node(h: &Handle) -> bool {
    let Some(parent) = parent_of(h) else {
        return false;
    };
    let Some(idx) = index_in_parent(&parent, h) else {
        return false;
    };
    parent.children.borrow_mut().remove(idx);
    h.parent.set(None);
    true
}

pub fn remove_attr(h: &Handle, key: &str) -> bool {
    match &h.data {
        NodeData::Element { attrs, .. } => {
            let mut attrs = attrs.borrow_mut();
            let before = attrs.len();
            attrs.retain(|a| !a.name.local.to_string().eq_ignore_ascii_case(key));
            attrs.len() != before
        }
        _ => false,
    }
}

/// A bare `<span>` holding a single text node.
pub fn new_text_span(text: &str) -> Handle {
    let span = Node::new(NodeData::Element {
        name: QualName::new(None, Namespace::from(HTML_NS), LocalName::from("span")),
        attrs: RefCell::new(vec![]),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    });
    let text = Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from_slice(text)),
    });
    text.parent.set(Some(Rc::downgrade(&span)));
    span.children.borrow_mut().push(text);
    span
}

fn esc_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

fn esc_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

fn is_void(tag: &str) -> bool {
    matches!(
        tag,
        "area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta"
            | "source" | "track" | "wbr"
    )
}

fn is_raw_text(tag: &str) -> bool {
    matches!(
        tag,
        "script" | "style" | "xmp" | "iframe" | "noembed" | "noframes" | "plaintext"
    )
}

#[derive(Clone, Copy, PartialEq)]
enum Flavor {
    Html,
    Xml,
}

fn push_attrs(out: &mut String, h: &Handle) {
    if let NodeData::Element { attrs, .. } = &h.data {
        for a in attrs.borrow().iter() {
            out.push(' ');
            if let Some(prefix) = &a.name.prefix {
                out.push_str(prefix);
                out.push(':');
            }
            out.push_str(&a.name.local);
            out.push_str("=\"");
            out.push_str(&esc_attr(&a.value));
            out.push('"');
        }
    }
}

enum Step {
    Open(Handle, bool),
    Close(String),
}

fn children_steps(h: &Handle, raw: bool) -> Vec<Step> {
    // Reversed so the first child is popped next.
    h.children
        .borrow()
        .iter()
        .rev()
        .map(|c| Step::Open(c.clone(), raw))
        .collect()
}

// Explicit stack so deeply nested pages serialize without recursion.
fn serialize_steps(out: &mut String, mut stack: Vec<Step>, flavor: Flavor) {
    while let Some(step) = stack.pop() {
        let (h, raw) = match step {
            Step::Open(h, raw) => (h, raw),
            Step::Close(tag) => {
                out.push_str("</");
                out.push_str(&tag);
                out.push('>');
                continue;
            }
        };
        match &h.data {
            NodeData::Document => stack.extend(children_steps(&h, false)),
            NodeData::Doctype { name, .. } => {
                if flavor == Flavor::Html {
                    out.push_str("<!DOCTYPE ");
                    out.push_str(name);
                    out.push('>');
                }
            }
            NodeData::Text { contents } => {
                let t = contents.borrow();
                if raw {
                    out.push_str(&t);
                } else {
                    out.push_str(&esc_text(&t));
                }
            }
            NodeData::Comment { contents } => {
                out.push_str("<!--");
                out.push_str(contents);
                out.push_str("-->");
            }
            NodeData::ProcessingInstruction { .. } => {}
            NodeData::Element { name, .. } => {
                let tag = name.local.to_string();
                out.push('<');
                out.push_str(&tag);
                push_attrs(out, &h);
                if flavor == Flavor::Html && is_void(&tag) {
                    out.push_str("/>");
                    continue;
                }
                out.push('>');
                let raw = flavor == Flavor::Html && is_raw_text(&tag);
                stack.push(Step::Close(tag));
                stack.extend(children_steps(&h, raw));
            }
        }
    }
}

/// Whole document back to HTML text.
pub fn serialize_document(dom: &RcDom) -> String {
    let mut out = String::new();
    serialize_steps(&mut out, vec![Step::Open(dom.document.clone(), false)], Flavor::Html);
    out
}

/// Only the children of `<body>`, or the whole document when there is none.
pub fn serialize_body(dom: &RcDom) -> String {
    let Some(body) = find_elem(&dom.document, "body") else {
        return serialize_document(dom);
    };
    let mut out = String::new();
    serialize_steps(&mut out, children_steps(&body, false), Flavor::Html);
    out
}

/// Outer markup of `h` as well-formed XML: every element gets an end tag and all text is escaped.
pub fn serialize_xml(h: &Handle) -> String {
    let mut out = String::new();
    serialize_steps(&mut out, vec![Step::Open(h.clone(), false)], Flavor::Xml);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(dom: &RcDom) -> Handle {
        find_elem(&dom.document, "body").unwrap()
    }

    #[test]
    fn select_returns_document_order() {
        let dom = parse_html("<div id=a><p id=b></p></div><p id=c></p>");
        let ps = select(&dom.document, |h| is_tag(h, "p"));
        let ids: Vec<_> = ps.iter().filter_map(|h| attr(h, "id")).collect();
        assert_eq!(ids, ["b", "c"]);
    }

    #[test]
    fn class_matching_modes() {
        let dom = parse_html(r#"<span class="katex-display foo"></span>"#);
        let span = select(&dom.document, |h| is_tag(h, "span")).remove(0);
        assert!(class_contains(&span, "katex"));
        assert!(!has_class_token(&span, "katex"));
        assert!(has_class_token(&span, "foo"));
    }

    #[test]
    fn replace_keeps_position_and_parent_link() {
        let dom = parse_html("<p>a<b>x</b>c</p>");
        let b = select(&dom.document, |h| is_tag(h, "b")).remove(0);
        let p = parent_of(&b).unwrap();
        assert!(replace_node(&b, new_text_span("$x$")));
        assert!(!is_attached(&b, &dom.document));
        assert_eq!(serialize_body(&dom), "<p>a<span>$x$</span>c</p>");
        let span = select(&dom.document, |h| is_tag(h, "span")).remove(0);
        assert!(Rc::ptr_eq(&parent_of(&span).unwrap(), &p));
        assert!(is_attached(&span, &dom.document));
    }

    #[test]
    fn remove_detaches_whole_subtree() {
        let dom = parse_html("<div><i><b>x</b></i>y</div>");
        let i = select(&dom.document, |h| is_tag(h, "i")).remove(0);
        let b = select(&dom.document, |h| is_tag(h, "b")).remove(0);
        assert!(remove_node(&i));
        assert!(!remove_node(&i));
        assert!(!is_attached(&b, &dom.document));
        assert_eq!(serialize_body(&dom), "<div>y</div>");
    }

    #[test]
    fn ancestor_check() {
        let dom = parse_html("<div><p><b>x</b></p></div>");
        let div = select(&dom.document, |h| is_tag(h, "div")).remove(0);
        let b = select(&dom.document, |h| is_tag(h, "b")).remove(0);
        assert!(is_ancestor_of(&div, &b));
        assert!(!is_ancestor_of(&b, &div));
        assert!(!is_ancestor_of(&b, &b));
    }

    #[test]
    fn removes_attribute() {
        let dom = parse_html(r#"<div style="display: none;" id=x></div>"#);
        let div = select(&dom.document, |h| is_tag(h, "div")).remove(0);
        assert!(remove_attr(&div, "style"));
        assert!(!has_attr(&div, "style"));
        assert_eq!(attr(&div, "id").as_deref(), Some("x"));
    }

    #[test]
    fn serializes_raw_text_and_voids() {
        let dom = parse_html("<p>a &amp; b<br><script>if (a < b) {}</script></p>");
        assert_eq!(
            serialize_body(&dom),
            "<p>a &amp; b<br/><script>if (a < b) {}</script></p>"
        );
        let doc = serialize_document(&parse_html("<!DOCTYPE html><p>x</p>"));
        assert!(doc.starts_with("<!DOCTYPE html><html>"), "{doc}");
    }

    #[test]
    fn serializes_math_as_xml() {
        let dom = parse_html("<math><mi>x</mi><mo>&lt;</mo><mspace/></math>");
        let math = select(&dom.document, |h| is_tag(h, "math")).remove(0);
        assert_eq!(
            serialize_xml(&math),
            "<math><mi>x</mi><mo>&lt;</mo><mspace></mspace></math>"
        );
        assert_eq!(text_content(&math), "x<");
        assert!(has_element_children(&math));
        assert!(!has_element_children(&body(&parse_html("text"))));
    }

    #[test]
    fn deep_documents_walk_without_recursion() {
        let depth = 50_000;
        let html = format!("{}x{}", "<span>".repeat(depth), "</span>".repeat(depth));
        let dom = parse_html(&html);
        assert_eq!(select(&dom.document, |h| is_tag(h, "span")).len(), depth);
        assert_eq!(text_content(&dom.document), "x");
        assert_eq!(serialize_body(&dom), html);
        assert!(find_elem(&dom.document, "SPAN").is_some());
    }
}
