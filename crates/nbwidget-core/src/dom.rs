//! Host-independent element tree.
//!
//! Widgets render into [`Element`]s. An element is a cheap reference-counted
//! handle: cloning it yields another handle to the same node, and equality is
//! node identity. Parents own their children; children point back to their
//! parent weakly, so detaching a subtree is enough to drop it.
//!
//! ```
//! use nbwidget_core::{Document, Element};
//!
//! let document = Document::new();
//! let container = Element::new("div");
//! document.body().append_child(&container).unwrap();
//!
//! let canvas = Element::new("canvas");
//! container.append_child(&canvas).unwrap();
//! assert!(canvas.is_connected());
//!
//! container.remove();
//! assert!(!canvas.is_connected());
//! ```

use crate::error::DomError;
use crate::selector::{Selector, SelectorError};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ELEMENT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of an element node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u64);

impl ElementId {
    fn next() -> Self {
        Self(NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle returned by [`Element::add_event_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// An event dispatched through the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomEvent {
    /// Event type, e.g. `"pointerdown"`.
    pub kind: String,
    /// Element the event was dispatched on.
    pub target: ElementId,
}

/// Listener callback.
pub type EventCallback = Rc<dyn Fn(&DomEvent)>;

struct Listener {
    id: ListenerId,
    kind: String,
    callback: EventCallback,
}

struct Node {
    id: ElementId,
    tag: String,
    is_document: bool,
    parent: RefCell<Weak<Node>>,
    children: RefCell<Vec<Element>>,
    attributes: RefCell<BTreeMap<String, String>>,
    classes: RefCell<Vec<String>>,
    text: RefCell<Option<String>>,
    listeners: RefCell<Vec<Listener>>,
}

/// A node in the element tree.
#[derive(Clone)]
pub struct Element(Rc<Node>);

impl Element {
    /// Create a detached element. Tag names are stored lowercase.
    pub fn new(tag: impl AsRef<str>) -> Self {
        Self::with_kind(tag.as_ref().to_ascii_lowercase(), false)
    }

    fn with_kind(tag: String, is_document: bool) -> Self {
        Self(Rc::new(Node {
            id: ElementId::next(),
            tag,
            is_document,
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
            attributes: RefCell::new(BTreeMap::new()),
            classes: RefCell::new(Vec::new()),
            text: RefCell::new(None),
            listeners: RefCell::new(Vec::new()),
        }))
    }

    /// A handle that does not keep the element alive, for listeners that
    /// refer back to their own subtree.
    pub fn downgrade(&self) -> WeakElement {
        WeakElement(Rc::downgrade(&self.0))
    }

    pub fn id(&self) -> ElementId {
        self.0.id
    }

    pub fn tag(&self) -> &str {
        &self.0.tag
    }

    /// Whether this element is the root of a [`Document`].
    pub fn is_document(&self) -> bool {
        self.0.is_document
    }

    // =========================================================================
    // Tree structure
    // =========================================================================

    pub fn parent(&self) -> Option<Self> {
        self.0.parent.borrow().upgrade().map(Self)
    }

    /// Snapshot of the direct children.
    pub fn children(&self) -> Vec<Self> {
        self.0.children.borrow().clone()
    }

    pub fn child_count(&self) -> usize {
        self.0.children.borrow().len()
    }

    pub fn first_child(&self) -> Option<Self> {
        self.0.children.borrow().first().cloned()
    }

    /// Append `child` as the last child, detaching it from any previous parent.
    pub fn append_child(&self, child: &Self) -> Result<(), DomError> {
        if child.is_document() {
            return Err(DomError::DocumentInsert);
        }
        if self.inclusive_ancestors().any(|ancestor| ancestor == *child) {
            return Err(DomError::HierarchyRequest {
                parent: self.id(),
                child: child.id(),
            });
        }
        child.remove();
        self.attach(child);
        Ok(())
    }

    fn attach(&self, child: &Self) {
        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        self.0.children.borrow_mut().push(child.clone());
    }

    /// Remove `child` if it is a direct child. Returns whether it was.
    pub fn remove_child(&self, child: &Self) -> bool {
        let removed = {
            let mut children = self.0.children.borrow_mut();
            let before = children.len();
            children.retain(|c| c != child);
            children.len() != before
        };
        if removed {
            *child.0.parent.borrow_mut() = Weak::new();
        }
        removed
    }

    /// Detach this element from its parent, if any.
    pub fn remove(&self) {
        if let Some(parent) = self.parent() {
            parent.remove_child(self);
        }
    }

    /// Iterate over this element and its ancestors, innermost first.
    pub fn inclusive_ancestors(&self) -> impl Iterator<Item = Self> {
        std::iter::successors(Some(self.clone()), Self::parent)
    }

    /// Iterate over the ancestors, innermost first.
    pub fn ancestors(&self) -> impl Iterator<Item = Self> {
        self.inclusive_ancestors().skip(1)
    }

    /// Whether the element is attached (transitively) to a document root.
    pub fn is_connected(&self) -> bool {
        self.inclusive_ancestors().any(|e| e.is_document())
    }

    /// Whether `other` is this element or one of its descendants.
    pub fn contains(&self, other: &Self) -> bool {
        other.inclusive_ancestors().any(|e| e == *self)
    }

    /// All descendants in document order, excluding `self`.
    pub fn descendants(&self) -> Vec<Self> {
        let mut out = Vec::new();
        let mut stack: Vec<Self> = self.children().into_iter().rev().collect();
        while let Some(element) = stack.pop() {
            stack.extend(element.children().into_iter().rev());
            out.push(element);
        }
        out
    }

    // =========================================================================
    // Attributes, classes and text
    // =========================================================================

    /// Set an attribute. `class` replaces the class list.
    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<String>) {
        let (name, value) = (name.into(), value.into());
        if name == "class" {
            self.0.classes.borrow_mut().clear();
            self.add_class(value);
            return;
        }
        self.0.attributes.borrow_mut().insert(name, value);
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        if name == "class" {
            let classes = self.0.classes.borrow();
            return (!classes.is_empty()).then(|| classes.join(" "));
        }
        self.0.attributes.borrow().get(name).cloned()
    }

    /// Attributes other than `class`, sorted by name.
    pub fn attributes(&self) -> Vec<(String, String)> {
        self.0
            .attributes
            .borrow()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    pub fn remove_attribute(&self, name: &str) -> bool {
        self.0.attributes.borrow_mut().remove(name).is_some()
    }

    pub fn add_class(&self, class: impl AsRef<str>) {
        let mut classes = self.0.classes.borrow_mut();
        for class in class.as_ref().split_whitespace() {
            if !classes.iter().any(|c| c == class) {
                classes.push(class.to_string());
            }
        }
    }

    pub fn remove_class(&self, class: &str) -> bool {
        let mut classes = self.0.classes.borrow_mut();
        let before = classes.len();
        classes.retain(|c| c != class);
        classes.len() != before
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.0.classes.borrow().iter().any(|c| c == class)
    }

    pub fn classes(&self) -> Vec<String> {
        self.0.classes.borrow().clone()
    }

    pub fn set_text(&self, text: impl Into<String>) {
        *self.0.text.borrow_mut() = Some(text.into());
    }

    /// Text set directly on this element.
    pub fn text(&self) -> Option<String> {
        self.0.text.borrow().clone()
    }

    /// Concatenated text of this element and its descendants.
    pub fn text_content(&self) -> String {
        let mut out = self.0.text.borrow().clone().unwrap_or_default();
        for child in self.children() {
            out.push_str(&child.text_content());
        }
        out
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub fn add_event_listener(
        &self,
        kind: impl Into<String>,
        callback: impl Fn(&DomEvent) + 'static,
    ) -> ListenerId {
        let id = ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed));
        self.0.listeners.borrow_mut().push(Listener {
            id,
            kind: kind.into(),
            callback: Rc::new(callback),
        });
        id
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.0.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }

    /// Listeners registered directly on this element.
    pub fn listener_count(&self) -> usize {
        self.0.listeners.borrow().len()
    }

    /// Listeners registered anywhere in this subtree.
    pub fn subtree_listener_count(&self) -> usize {
        self.listener_count()
            + self
                .descendants()
                .iter()
                .map(Self::listener_count)
                .sum::<usize>()
    }

    /// Drop every listener in this subtree.
    pub fn remove_all_listeners(&self) {
        self.0.listeners.borrow_mut().clear();
        for element in self.descendants() {
            element.0.listeners.borrow_mut().clear();
        }
    }

    /// Dispatch an event at this element, bubbling to its ancestors.
    ///
    /// Returns the number of callbacks invoked.
    pub fn dispatch_event(&self, kind: &str) -> usize {
        let event = DomEvent {
            kind: kind.to_string(),
            target: self.id(),
        };
        let mut invoked = 0;
        for element in self.inclusive_ancestors() {
            // Collect first so callbacks may add or remove listeners.
            let callbacks: Vec<EventCallback> = element
                .0
                .listeners
                .borrow()
                .iter()
                .filter(|l| l.kind == kind)
                .map(|l| Rc::clone(&l.callback))
                .collect();
            for callback in callbacks {
                callback(&event);
                invoked += 1;
            }
        }
        invoked
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Whether this element matches a parsed selector.
    pub fn matches(&self, selector: &Selector) -> bool {
        selector.matches(self)
    }

    /// First descendant matching `selector`.
    pub fn query_selector(&self, selector: &str) -> Result<Option<Self>, SelectorError> {
        let selector = Selector::parse(selector)?;
        Ok(self.descendants().into_iter().find(|e| selector.matches(e)))
    }

    /// All descendants matching `selector`, in document order.
    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<Self>, SelectorError> {
        let selector = Selector::parse(selector)?;
        Ok(self
            .descendants()
            .into_iter()
            .filter(|e| selector.matches(e))
            .collect())
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    /// Serialize this subtree as HTML.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        out.push('<');
        out.push_str(self.tag());
        if let Some(class) = self.attribute("class") {
            push_attribute(out, "class", &class);
        }
        for (name, value) in self.0.attributes.borrow().iter() {
            push_attribute(out, name, value);
        }
        out.push('>');
        if let Some(text) = self.0.text.borrow().as_deref() {
            out.push_str(&escape_html(text));
        }
        for child in self.children() {
            child.write_html(out);
        }
        out.push_str("</");
        out.push_str(self.tag());
        out.push('>');
    }
}

fn push_attribute(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&escape_html(value));
    out.push('"');
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Element {}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("id", &self.0.id)
            .field("tag", &self.0.tag)
            .field("classes", &*self.0.classes.borrow())
            .field("children", &self.child_count())
            .finish()
    }
}

/// Non-owning reference to an [`Element`].
#[derive(Clone, Default)]
pub struct WeakElement(Weak<Node>);

impl WeakElement {
    pub fn upgrade(&self) -> Option<Element> {
        self.0.upgrade().map(Element)
    }
}

impl fmt::Debug for WeakElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WeakElement")
            .field(&self.upgrade().map(|e| e.id()))
            .finish()
    }
}

/// A document: the root every connected element hangs from.
#[derive(Debug, Clone)]
pub struct Document {
    root: Element,
    body: Element,
}

impl Document {
    pub fn new() -> Self {
        let root = Element::with_kind("#document".to_string(), true);
        let body = Element::new("body");
        root.attach(&body);
        Self { root, body }
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn body(&self) -> &Element {
        &self.body
    }

    /// Create a detached element; it becomes connected once appended.
    pub fn create_element(&self, tag: &str) -> Element {
        Element::new(tag)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}
