//! Mount harness: a document with one container to render into.

use nbwidget_core::{Document, Element, ElementId};

/// Children of a container at one point in time, by identity and content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildrenSnapshot {
    pub ids: Vec<ElementId>,
    pub html: String,
}

/// A connected container plus DOM assertions.
pub struct MountHarness {
    document: Document,
    container: Element,
}

impl MountHarness {
    /// A `div#widget-container` attached to a fresh document body.
    pub fn new() -> Self {
        let document = Document::new();
        let container = document.create_element("div");
        container.set_attribute("id", "widget-container");
        // A fresh container under a fresh body cannot fail to attach.
        let _ = document.body().append_child(&container);
        Self {
            document,
            container,
        }
    }

    /// Like [`MountHarness::new`], with a caller-owned placeholder already
    /// inside the container.
    pub fn with_placeholder() -> Self {
        let harness = Self::new();
        let placeholder = Element::new("p");
        placeholder.add_class("placeholder");
        let _ = harness.container.append_child(&placeholder);
        harness
    }

    pub const fn document(&self) -> &Document {
        &self.document
    }

    pub const fn container(&self) -> &Element {
        &self.container
    }

    /// Remove the container from the document.
    pub fn detach(&self) {
        self.container.remove();
    }

    pub fn reattach(&self) {
        if !self.container.is_connected() {
            let _ = self.document.body().append_child(&self.container);
        }
    }

    // === Queries ===

    /// First element under the container matching `selector`.
    pub fn query(&self, selector: &str) -> Option<Element> {
        self.container.query_selector(selector).ok().flatten()
    }

    pub fn query_all(&self, selector: &str) -> Vec<Element> {
        self.container.query_selector_all(selector).unwrap_or_default()
    }

    pub fn exists(&self, selector: &str) -> bool {
        self.query(selector).is_some()
    }

    pub fn html(&self) -> String {
        self.container.to_html()
    }

    pub fn snapshot(&self) -> ChildrenSnapshot {
        ChildrenSnapshot {
            ids: self.container.children().iter().map(Element::id).collect(),
            html: self.html(),
        }
    }

    // === Assertions ===

    /// Assert that an element matching `selector` exists under the container.
    ///
    /// # Panics
    ///
    /// Panics if no element matches.
    pub fn assert_exists(&self, selector: &str) -> &Self {
        assert!(
            self.exists(selector),
            "expected `{selector}` under the container, got {}",
            self.html()
        );
        self
    }

    /// # Panics
    ///
    /// Panics if an element matches.
    pub fn assert_not_exists(&self, selector: &str) -> &Self {
        assert!(
            !self.exists(selector),
            "expected no `{selector}` under the container, got {}",
            self.html()
        );
        self
    }

    /// # Panics
    ///
    /// Panics if the number of matches differs.
    pub fn assert_count(&self, selector: &str, expected: usize) -> &Self {
        let actual = self.query_all(selector).len();
        assert_eq!(
            actual,
            expected,
            "expected {expected} `{selector}`, found {actual} in {}",
            self.html()
        );
        self
    }

    /// Assert the container's children are exactly those in `before`.
    ///
    /// # Panics
    ///
    /// Panics if a child was added, removed, replaced or modified.
    pub fn assert_unchanged(&self, before: &ChildrenSnapshot) -> &Self {
        assert_eq!(&self.snapshot(), before, "container children changed");
        self
    }

    /// Event listeners registered anywhere under the container.
    pub fn listener_count(&self) -> usize {
        self.container.subtree_listener_count()
    }
}

impl Default for MountHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MountHarness {
    fn drop(&mut self) {
        self.container.remove();
    }
}
