use crate::dom::{
    is_attached, new_text_span, parse_html, remove_attr, remove_node, replace_node, select,
    serialize_body, serialize_document,
};
use crate::rules::{default_rules, Edit, Fallback, Rule};
use markup5ever_rcdom::{Handle, RcDom};

/// Runs the math rules over a parsed document, one full pass per rule.
#[derive(Debug, Clone)]
pub struct MathRewriter {
    rules: Vec<Rule>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct PassStats {
    matched: usize,
    replaced: usize,
    removed: usize,
    skipped: usize,
    failed: usize,
}

impl Default for MathRewriter {
    fn default() -> Self {
        Self::new()
    }
}

impl MathRewriter {
    pub fn new() -> Self {
        Self::with_rules(default_rules())
    }

    pub fn with_rules(rules: Vec<Rule>) -> Self {
        MathRewriter { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Rewrites `dom` in place. Per-node failures never escape; the worst outcome for a
    /// malformed node is its removal.
    pub fn rewrite<'a>(&self, dom: &'a RcDom) -> &'a RcDom {
        let root = &dom.document;
        for rule in &self.rules {
            let stats = run_rule(rule, root);
            if stats.matched > 0 {
                log::debug!(
                    "{}: matched {}, replaced {}, removed {}, skipped {}, failed {}",
                    rule.name,
                    stats.matched,
                    stats.replaced,
                    stats.removed,
                    stats.skipped,
                    stats.failed
                );
            }
        }
        dom
    }
}

fn run_rule(rule: &Rule, root: &Handle) -> PassStats {
    let mut stats = PassStats::default();
    // Snapshot first: the pass mutates the tree as it goes.
    let matches = select(root, rule.select);
    for node in matches {
        // Already replaced or removed by an earlier match.
        if !is_attached(&node, root) {
            continue;
        }
        stats.matched += 1;
        match (rule.plan)(&node, root) {
            Ok(edits) => {
                for edit in edits {
                    apply(edit, &mut stats);
                }
            }
            Err(e) if e.is_skip() => {
                stats.skipped += 1;
                log::trace!("{}: skipped: {e}", rule.name);
            }
            Err(e) => {
                stats.failed += 1;
                log::debug!("{}: {e}", rule.name);
                if rule.on_failure == Fallback::Remove && remove_node(&node) {
                    stats.removed += 1;
                }
            }
        }
    }
    stats
}

fn apply(edit: Edit, stats: &mut PassStats) {
    match edit {
        Edit::Replace { node, text } if text.is_empty() => {
            if remove_node(&node) {
                stats.removed += 1;
            }
        }
        Edit::Replace { node, text } => {
            if replace_node(&node, new_text_span(&text)) {
                stats.replaced += 1;
            }
        }
        Edit::Remove(node) => {
            if remove_node(&node) {
                stats.removed += 1;
            }
        }
        Edit::RemoveAttr(node, key) => {
            remove_attr(&node, key);
        }
    }
}

/// Parses `html`, rewrites its math with the default rules and serializes it back.
pub fn normalize_html(html: &str) -> String {
    let dom = parse_html(html);
    serialize_document(MathRewriter::new().rewrite(&dom))
}

/// Like [`normalize_html`] but only returns the contents of `<body>`.
pub fn normalize_html_body(html: &str) -> String {
    let dom = parse_html(html);
    serialize_body(MathRewriter::new().rewrite(&dom))
}
