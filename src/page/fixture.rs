//! Builder for synthetic page snapshots.
//!
//! ```
//! use outreach_pilot::page::fixture::{ElementSpec, PageBuilder};
//!
//! let mut b = PageBuilder::new("https://www.linkedin.com/in/jane-doe/", "Jane Doe | LinkedIn");
//! let main = b.root(ElementSpec::new("main"));
//! b.child(main, ElementSpec::new("h1").text("Jane Doe"));
//! let page = b.build();
//! assert_eq!(page.main_region(), Some(main));
//! ```

use super::ElementRef;
use super::dom::{Node, NodeId, PageSnapshot, Rect};

/// Description of one element to add.
#[derive(Debug, Clone)]
pub struct ElementSpec {
    node: Node,
    reference: Option<String>,
}

impl ElementSpec {
    pub fn new(tag: &str) -> Self {
        Self {
            node: Node {
                tag: tag.to_string(),
                rect: Rect::new(0.0, 0.0, 100.0, 24.0),
                ..Default::default()
            },
            reference: None,
        }
    }

    /// A `<button>` with visible text.
    pub fn button(text: &str) -> Self {
        Self::new("button").text(text)
    }

    pub fn text(mut self, text: &str) -> Self {
        self.node.text = text.to_string();
        self
    }

    pub fn aria_label(mut self, label: &str) -> Self {
        self.node.aria_label = Some(label.to_string());
        self
    }

    pub fn labelled_by(mut self, id: &str) -> Self {
        self.node.labelled_by = Some(id.to_string());
        self
    }

    pub fn role(mut self, role: &str) -> Self {
        self.node.role = Some(role.to_string());
        self
    }

    pub fn class(mut self, class: &str) -> Self {
        self.node.classes.extend(class.split_whitespace().map(str::to_string));
        self
    }

    pub fn id(mut self, id: &str) -> Self {
        self.node.dom_id = Some(id.to_string());
        self
    }

    /// Place the element at vertical offset `y`.
    pub fn at(mut self, y: f64) -> Self {
        self.node.rect.y = y;
        self
    }

    pub fn rect(mut self, rect: Rect) -> Self {
        self.node.rect = rect;
        self
    }

    /// Zero-sized, as the browser reports `display: none` elements.
    pub fn hidden(mut self) -> Self {
        self.node.rect = Rect::default();
        self
    }

    /// Root of a shadow tree hosted by the parent.
    pub fn shadow(mut self) -> Self {
        self.node.shadow_child = true;
        self
    }

    /// Stable reference instead of the generated `e<N>`.
    pub fn reference(mut self, reference: &str) -> Self {
        self.reference = Some(reference.to_string());
        self
    }
}

/// Incrementally builds a [`PageSnapshot`].
#[derive(Debug, Clone)]
pub struct PageBuilder {
    snapshot: PageSnapshot,
}

impl PageBuilder {
    pub fn new(url: &str, title: &str) -> Self {
        Self {
            snapshot: PageSnapshot {
                url: url.to_string(),
                title: title.to_string(),
                nodes: Vec::new(),
            },
        }
    }

    /// Start from an existing snapshot, e.g. to add a dialog to a page.
    pub fn extend(snapshot: PageSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn root(&mut self, spec: ElementSpec) -> NodeId {
        self.push(None, spec)
    }

    pub fn child(&mut self, parent: NodeId, spec: ElementSpec) -> NodeId {
        self.push(Some(parent), spec)
    }

    fn push(&mut self, parent: Option<NodeId>, spec: ElementSpec) -> NodeId {
        let id = self.snapshot.nodes.len();
        let mut node = spec.node;
        node.parent = parent;
        node.element_ref = ElementRef::new(spec.reference.unwrap_or_else(|| format!("e{id}")));
        self.snapshot.nodes.push(node);
        if let Some(p) = parent {
            self.snapshot.nodes[p].children.push(id);
        }
        id
    }

    pub fn reference(&self, id: NodeId) -> ElementRef {
        self.snapshot.nodes[id].element_ref.clone()
    }

    pub fn build(self) -> PageSnapshot {
        self.snapshot
    }
}
