//! Element tree — an append-only arena of elements addressed by
//! [`ElementId`]. Detached elements stay in the arena but are no longer part
//! of the document.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Stable identity of an element within one [`DomTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(usize);

/// A single element node.
#[derive(Debug, Clone)]
pub struct Element {
    tag: String,
    attributes: IndexMap<String, String>,
    text: String,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
}

impl Element {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: IndexMap::new(),
            text: String::new(),
            parent: None,
            children: Vec::new(),
        }
    }

    /// Lowercase tag name.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whitespace-separated entries of the `class` attribute.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attribute("class").unwrap_or_default().split_whitespace()
    }

    /// Text owned directly by this element, excluding descendants.
    pub fn own_text(&self) -> &str {
        &self.text
    }

    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    pub fn children(&self) -> &[ElementId] {
        &self.children
    }
}

/// Recursive, serializable description of an element subtree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElementFixture {
    pub tag: String,
    #[serde(default)]
    pub attributes: IndexMap<String, String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub children: Vec<ElementFixture>,
}

impl ElementFixture {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn child(mut self, child: ElementFixture) -> Self {
        self.children.push(child);
        self
    }
}

/// The element arena. The root element is created with the tree and is never
/// detached.
#[derive(Debug, Clone)]
pub struct DomTree {
    elements: Vec<Element>,
    root: ElementId,
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new("html")
    }
}

impl DomTree {
    pub fn new(root_tag: &str) -> Self {
        Self {
            elements: vec![Element::new(root_tag)],
            root: ElementId(0),
        }
    }

    /// Builds a tree whose root is the given fixture.
    pub fn from_fixture(fixture: &ElementFixture) -> Self {
        let mut tree = Self::new(&fixture.tag);
        let root = tree.root;
        tree.fill(root, fixture);
        tree
    }

    fn fill(&mut self, id: ElementId, fixture: &ElementFixture) {
        for (name, value) in &fixture.attributes {
            self.set_attribute(id, name, value);
        }
        if let Some(text) = &fixture.text {
            self.set_text(id, text);
        }
        for child in &fixture.children {
            self.append_fixture(id, child);
        }
    }

    /// Appends a whole fixture subtree under `parent` and returns its root.
    pub fn append_fixture(&mut self, parent: ElementId, fixture: &ElementFixture) -> ElementId {
        let id = self.append_child(parent, &fixture.tag);
        self.fill(id, fixture);
        id
    }

    pub fn root(&self) -> ElementId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(id.0)
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.get(id).and_then(Element::parent)
    }

    pub fn append_child(&mut self, parent: ElementId, tag: &str) -> ElementId {
        let id = ElementId(self.elements.len());
        let mut element = Element::new(tag);
        element.parent = Some(parent);
        self.elements.push(element);
        if let Some(p) = self.elements.get_mut(parent.0) {
            p.children.push(id);
        }
        id
    }

    pub fn set_attribute(&mut self, id: ElementId, name: &str, value: &str) {
        if let Some(el) = self.elements.get_mut(id.0) {
            el.attributes.insert(name.to_string(), value.to_string());
        }
    }

    pub fn set_text(&mut self, id: ElementId, text: &str) {
        if let Some(el) = self.elements.get_mut(id.0) {
            el.text = text.to_string();
        }
    }

    /// Removes an element (and its subtree) from the document.
    pub fn detach(&mut self, id: ElementId) {
        if id == self.root {
            return;
        }
        let Some(parent) = self.parent(id) else {
            return;
        };
        if let Some(p) = self.elements.get_mut(parent.0) {
            p.children.retain(|c| *c != id);
        }
        if let Some(el) = self.elements.get_mut(id.0) {
            el.parent = None;
        }
    }

    /// Whether `node` is `ancestor` itself or one of its descendants.
    pub fn contains(&self, ancestor: ElementId, node: ElementId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Whether the element is reachable from the root.
    pub fn is_attached(&self, id: ElementId) -> bool {
        self.get(id).is_some() && self.contains(self.root, id)
    }

    /// Every attached element in document (pre-)order, root first.
    pub fn document_order(&self) -> Vec<ElementId> {
        let mut order = Vec::with_capacity(self.elements.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            if let Some(el) = self.get(id) {
                stack.extend(el.children.iter().rev());
            }
        }
        order
    }

    /// Descendants of `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack: Vec<ElementId> = self
            .get(id)
            .map(|el| el.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(next) = stack.pop() {
            out.push(next);
            if let Some(el) = self.get(next) {
                stack.extend(el.children.iter().rev());
            }
        }
        out
    }

    /// Concatenated text of the element and its descendants with whitespace
    /// collapsed to single spaces.
    pub fn text_content(&self, id: ElementId) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(el) = self.get(id) {
            parts.push(&el.text);
        }
        for d in self.descendants(id) {
            if let Some(el) = self.get(d) {
                parts.push(&el.text);
            }
        }
        parts
            .iter()
            .flat_map(|p| p.split_whitespace())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
