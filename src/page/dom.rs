//! Rendered-page snapshot: a flat arena of element descriptions.
//!
//! Each [`Node`] carries only what the heuristics look at (tag, role,
//! accessible label, own text, class/id tokens, bounding rect) plus its tree
//! links. Nodes with `shadow_child` set are roots of a shadow tree hosted by
//! their parent; light queries stop at them, deep queries walk through.

use serde::{Deserialize, Serialize};

use super::ElementRef;

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Node {
    pub tag: String,
    pub role: Option<String>,
    pub aria_label: Option<String>,
    /// Raw `aria-labelledby` id reference.
    pub labelled_by: Option<String>,
    /// Text directly inside this element, excluding children.
    pub text: String,
    pub classes: Vec<String>,
    pub dom_id: Option<String>,
    pub rect: Rect,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub shadow_child: bool,
    pub element_ref: ElementRef,
}

impl Node {
    pub fn is(&self, tag: &str) -> bool {
        self.tag.eq_ignore_ascii_case(tag)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role
            .as_deref()
            .is_some_and(|r| r.eq_ignore_ascii_case(role))
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    /// Lower-cased, trimmed accessible label ("" when absent).
    pub fn label_lower(&self) -> String {
        self.aria_label
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_lowercase()
    }

    /// Clickable in the sense the locate strategies use.
    pub fn is_clickable(&self) -> bool {
        self.is("button") || self.is("a") || self.has_role("button")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub nodes: Vec<Node>,
}

impl PageSnapshot {
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn find_ref(&self, element: &ElementRef) -> Option<NodeId> {
        self.nodes.iter().position(|n| &n.element_ref == element)
    }

    fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parent.is_none())
            .map(|(id, _)| id)
    }

    /// Whitespace-normalised text of `id` and its light descendants.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        self.collect_text(id, &mut parts);
        parts.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn collect_text<'a>(&'a self, id: NodeId, parts: &mut Vec<&'a str>) {
        let node = self.node(id);
        if !node.text.trim().is_empty() {
            parts.push(node.text.trim());
        }
        for &child in &node.children {
            if !self.node(child).shadow_child {
                self.collect_text(child, parts);
            }
        }
    }

    /// Parent chain of `id`, nearest first, stopping at a shadow root.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = id;
        while !self.node(cur).shadow_child {
            match self.node(cur).parent {
                Some(parent) => {
                    out.push(parent);
                    cur = parent;
                }
                None => break,
            }
        }
        out
    }

    /// `id` itself or its nearest ancestor matching `pred`.
    pub fn closest(&self, id: NodeId, pred: impl Fn(&Node) -> bool) -> Option<NodeId> {
        if pred(self.node(id)) {
            return Some(id);
        }
        self.ancestors(id).into_iter().find(|&a| pred(self.node(a)))
    }

    /// Descendants of `id` in document order, not entering shadow trees.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.walk(id, false, &mut out);
        out
    }

    /// Descendants of `id` in document order, including shadow trees.
    pub fn deep_descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.walk(id, true, &mut out);
        out
    }

    fn walk(&self, id: NodeId, deep: bool, out: &mut Vec<NodeId>) {
        for &child in &self.node(id).children {
            if !deep && self.node(child).shadow_child {
                continue;
            }
            out.push(child);
            self.walk(child, deep, out);
        }
    }

    /// All light-DOM nodes matching `pred`, in document order.
    pub fn find_all(&self, pred: impl Fn(&Node) -> bool) -> Vec<NodeId> {
        self.scan(false, pred)
    }

    /// All nodes matching `pred`, shadow trees included.
    pub fn find_all_deep(&self, pred: impl Fn(&Node) -> bool) -> Vec<NodeId> {
        self.scan(true, pred)
    }

    fn scan(&self, deep: bool, pred: impl Fn(&Node) -> bool) -> Vec<NodeId> {
        let mut order = Vec::new();
        for root in self.roots().collect::<Vec<_>>() {
            order.push(root);
            self.walk(root, deep, &mut order);
        }
        order.into_iter().filter(|&id| pred(self.node(id))).collect()
    }

    /// The page's main content region.
    pub fn main_region(&self) -> Option<NodeId> {
        self.find_all(|n| n.is("main") || n.has_role("main"))
            .into_iter()
            .next()
    }

    pub fn is_within(&self, id: NodeId, container: NodeId) -> bool {
        id == container || self.ancestors(id).contains(&container)
    }
}

#[cfg(test)]
mod tests {
    use crate::page::fixture::{ElementSpec, PageBuilder};

    #[test]
    fn text_content_skips_shadow_trees() {
        let mut b = PageBuilder::new("https://example.com", "t");
        let main = b.root(ElementSpec::new("main"));
        let h1 = b.child(main, ElementSpec::new("h1").text("  Jane "));
        b.child(h1, ElementSpec::new("span").text("Doe\n"));
        let host = b.child(main, ElementSpec::new("div"));
        b.child(host, ElementSpec::new("div").text("hidden").shadow());
        let page = b.build();

        assert_eq!(page.text_content(h1), "Jane Doe");
        assert_eq!(page.text_content(main), "Jane Doe");
    }

    #[test]
    fn light_and_deep_queries_differ() {
        let mut b = PageBuilder::new("https://example.com", "t");
        let body = b.root(ElementSpec::new("body"));
        let host = b.child(body, ElementSpec::new("div"));
        let shadow = b.child(host, ElementSpec::new("div").shadow());
        let dialog = b.child(shadow, ElementSpec::new("div").role("dialog"));
        let page = b.build();

        assert!(page.find_all(|n| n.has_role("dialog")).is_empty());
        assert_eq!(page.find_all_deep(|n| n.has_role("dialog")), vec![dialog]);
        assert_eq!(page.ancestors(dialog), vec![shadow]);
        assert!(page.closest(dialog, |n| n.is("body")).is_none());
    }

    #[test]
    fn main_region_and_containment() {
        let mut b = PageBuilder::new("https://example.com", "t");
        let body = b.root(ElementSpec::new("body"));
        let main = b.child(body, ElementSpec::new("main"));
        let inner = b.child(main, ElementSpec::button("Connect"));
        let aside = b.child(body, ElementSpec::new("aside"));
        let page = b.build();

        assert_eq!(page.main_region(), Some(main));
        assert!(page.is_within(inner, main));
        assert!(!page.is_within(aside, main));
        assert_eq!(page.find_ref(&page.node(inner).element_ref), Some(inner));
    }
}
