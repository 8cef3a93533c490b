//! Declared elements and their props
//!
//! An [`Element`] is an immutable description of one node of the desired
//! tree. Props are reference counted: cloning an element is cheap, and two
//! props compare equal for bailout purposes only if they are the same
//! allocation.

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::Deserialize;
use serde_json::Value;

use crate::component::Component;

/// Reconciliation key
pub type Key = Rc<str>;

/// What an element describes
#[derive(Clone)]
pub enum ElementKind {
    /// Host node with a tag
    Host(Rc<str>),
    /// Text node; the text lives in the props
    Text,
    /// User component
    Component(Rc<dyn Component>),
    /// Transparent grouping of children
    Fragment,
}

impl ElementKind {
    /// Whether a fiber created for `self` can be reused for `other`
    pub fn same_type(&self, other: &ElementKind) -> bool {
        match (self, other) {
            (ElementKind::Host(a), ElementKind::Host(b)) => a == b,
            (ElementKind::Text, ElementKind::Text) => true,
            (ElementKind::Component(a), ElementKind::Component(b)) => {
                std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
            }
            (ElementKind::Fragment, ElementKind::Fragment) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Host(tag) => write!(f, "Host({tag})"),
            ElementKind::Text => write!(f, "Text"),
            ElementKind::Component(c) => write!(f, "Component({})", c.name()),
            ElementKind::Fragment => write!(f, "Fragment"),
        }
    }
}

#[derive(Clone, Default)]
struct PropsData {
    attributes: BTreeMap<String, Value>,
    children: Vec<Element>,
    text: Option<Rc<str>>,
}

/// Element properties
#[derive(Clone, Default)]
pub struct Props(Rc<PropsData>);

impl Props {
    /// Empty props
    pub fn new() -> Self {
        Self::default()
    }

    /// Props of a text node
    pub fn text(text: impl Into<Rc<str>>) -> Self {
        Self(Rc::new(PropsData {
            text: Some(text.into()),
            ..Default::default()
        }))
    }

    /// Whether both are the same allocation
    pub fn ptr_eq(&self, other: &Props) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// All attributes
    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.0.attributes
    }

    /// A single attribute
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.attributes.get(name)
    }

    /// Declared children
    pub fn children(&self) -> &[Element] {
        &self.0.children
    }

    /// Text content of a text node
    pub fn text_content(&self) -> Option<&str> {
        self.0.text.as_deref()
    }

    /// Builder: set an attribute
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        Rc::make_mut(&mut self.0)
            .attributes
            .insert(name.into(), value.into());
        self
    }

    fn data_mut(&mut self) -> &mut PropsData {
        Rc::make_mut(&mut self.0)
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Props");
        s.field("attributes", &self.0.attributes);
        if let Some(text) = &self.0.text {
            s.field("text", text);
        }
        if !self.0.children.is_empty() {
            s.field("children", &self.0.children.len());
        }
        s.finish()
    }
}

/// Shared slot that receives a host node's public instance after commit
#[derive(Clone, Default)]
pub struct NodeRef(Rc<RefCell<Option<Rc<dyn Any>>>>);

impl NodeRef {
    /// Create an empty ref
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value, if attached and of type `T`
    pub fn get<T: Clone + 'static>(&self) -> Option<T> {
        self.0.borrow().as_ref()?.downcast_ref::<T>().cloned()
    }

    /// Whether the ref currently points at a node
    pub fn is_attached(&self) -> bool {
        self.0.borrow().is_some()
    }

    /// Whether both are the same ref
    pub fn ptr_eq(&self, other: &NodeRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn set(&self, value: Option<Rc<dyn Any>>) {
        *self.0.borrow_mut() = value;
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeRef(attached: {})", self.is_attached())
    }
}

/// One node of a declared tree
#[derive(Clone)]
pub struct Element {
    pub kind: ElementKind,
    pub key: Option<Key>,
    pub props: Props,
    pub node_ref: Option<NodeRef>,
}

impl Element {
    /// Host element
    pub fn host(tag: impl Into<Rc<str>>) -> Self {
        Self::new(ElementKind::Host(tag.into()), Props::new())
    }

    /// Text element
    pub fn text(text: impl Into<Rc<str>>) -> Self {
        Self::new(ElementKind::Text, Props::text(text))
    }

    /// Component element
    pub fn component(component: Rc<dyn Component>, props: Props) -> Self {
        Self::new(ElementKind::Component(component), props)
    }

    /// Fragment wrapping `children`
    pub fn fragment(children: Vec<Element>) -> Self {
        Self::new(ElementKind::Fragment, Props::new()).children(children)
    }

    fn new(kind: ElementKind, props: Props) -> Self {
        Self {
            kind,
            key: None,
            props,
            node_ref: None,
        }
    }

    /// Set the reconciliation key
    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set an attribute
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props = self.props.with(name, value);
        self
    }

    /// Append a child
    pub fn child(mut self, child: Element) -> Self {
        self.props.data_mut().children.push(child);
        self
    }

    /// Append several children
    pub fn children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.props.data_mut().children.extend(children);
        self
    }

    /// Attach a node ref
    pub fn with_ref(mut self, node_ref: NodeRef) -> Self {
        self.node_ref = Some(node_ref);
        self
    }

    /// Identity check used by the root bailout
    pub fn ptr_eq(&self, other: &Element) -> bool {
        self.kind.same_type(&other.kind) && self.key == other.key && self.props.ptr_eq(&other.props)
    }

    /// Build a host-only tree from its JSON description
    ///
    /// ```
    /// use void_reconciler::Element;
    ///
    /// let element = Element::from_description(&serde_json::json!({
    ///     "type": "container",
    ///     "props": { "id": 1 },
    ///     "children": [{ "type": "text", "value": "A" }]
    /// }))
    /// .unwrap();
    /// assert_eq!(element.props.children().len(), 1);
    /// ```
    pub fn from_description(description: &Value) -> Result<Element, serde_json::Error> {
        let parsed = ElementDescription::deserialize(description)?;
        Ok(parsed.into_element())
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("kind", &self.kind)
            .field("key", &self.key)
            .field("props", &self.props)
            .finish()
    }
}

#[derive(Deserialize)]
struct ElementDescription {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    props: BTreeMap<String, Value>,
    #[serde(default)]
    children: Vec<ElementDescription>,
}

impl ElementDescription {
    fn into_element(self) -> Element {
        let mut element = match self.kind.as_str() {
            "text" => Element::text(self.value.unwrap_or_default()),
            "fragment" => Element::fragment(Vec::new()),
            tag => Element::host(tag),
        };
        if let Some(key) = self.key {
            element = element.key(key);
        }
        for (name, value) in self.props {
            element = element.attr(name, value);
        }
        element.children(self.children.into_iter().map(ElementDescription::into_element))
    }
}
