//! User components
//!
//! A component turns props and state into child elements. Components are
//! shared as `Rc<dyn Component>`; two elements are of the same component type
//! exactly when they point at the same component object.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::element::{Element, Props};
use crate::error::RenderError;
use crate::updater::Updater;

/// Cleanup returned by a passive effect; runs before the next effect or on
/// unmount
pub type Cleanup = Box<dyn FnOnce()>;

/// What a lifecycle callback can see and do
pub struct LifecycleContext<'a> {
    props: &'a Props,
    state: &'a Value,
    updater: &'a Updater,
}

impl<'a> LifecycleContext<'a> {
    pub(crate) fn new(props: &'a Props, state: &'a Value, updater: &'a Updater) -> Self {
        Self {
            props,
            state,
            updater,
        }
    }

    /// Committed props
    pub fn props(&self) -> &Props {
        self.props
    }

    /// Committed state
    pub fn state(&self) -> &Value {
        self.state
    }

    /// Handle for scheduling state updates on this component
    pub fn updater(&self) -> &Updater {
        self.updater
    }
}

/// A user component
///
/// Only `render` is required. Lifecycle callbacks run during commit and may
/// schedule further updates through the context's [`Updater`].
pub trait Component: 'static {
    /// Name used in logs and errors
    fn name(&self) -> &str {
        "Component"
    }

    /// State for a freshly mounted instance
    fn initial_state(&self, _props: &Props) -> Value {
        Value::Null
    }

    /// Produce children
    fn render(&self, props: &Props, state: &Value) -> Vec<Element>;

    /// Whether an update should re-render; a forced update skips this
    fn should_update(
        &self,
        _prev_props: &Props,
        _next_props: &Props,
        _prev_state: &Value,
        _next_state: &Value,
    ) -> bool {
        true
    }

    /// Called after the component's first commit
    fn on_mount(&self, _ctx: &LifecycleContext<'_>) {}

    /// Called after a commit that re-rendered the component
    fn on_update(&self, _ctx: &LifecycleContext<'_>, _prev_props: &Props, _prev_state: &Value) {}

    /// Called before the component's host nodes are removed
    fn on_will_unmount(&self, _ctx: &LifecycleContext<'_>) {}

    /// Whether `passive_effect` should be scheduled after commits
    fn has_passive_effect(&self) -> bool {
        false
    }

    /// Runs after commit, outside the commit itself
    fn passive_effect(&self, _ctx: &LifecycleContext<'_>) -> Option<Cleanup> {
        None
    }

    /// Fallback children when a descendant's render fails. Returning `None`
    /// lets the error propagate further up.
    fn recover_from_error(&self, _props: &Props, _error: &RenderError) -> Option<Vec<Element>> {
        None
    }
}

/// Per-instance storage of a mounted component, shared by both alternates
pub struct ComponentSlot {
    pub(crate) updater: Updater,
    pub(crate) passive_cleanup: Option<Cleanup>,
}

impl ComponentSlot {
    pub(crate) fn new(updater: Updater) -> Self {
        Self {
            updater,
            passive_cleanup: None,
        }
    }

    /// Handle for scheduling updates on this instance
    pub fn updater(&self) -> &Updater {
        &self.updater
    }
}

impl fmt::Debug for ComponentSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentSlot")
            .field("fiber", &self.updater.fiber())
            .field("has_cleanup", &self.passive_cleanup.is_some())
            .finish()
    }
}

/// Stateless component backed by a closure
pub struct FnComponent<F> {
    name: &'static str,
    render: F,
}

impl<F> Component for FnComponent<F>
where
    F: Fn(&Props) -> Vec<Element> + 'static,
{
    fn name(&self) -> &str {
        self.name
    }

    fn render(&self, props: &Props, _state: &Value) -> Vec<Element> {
        (self.render)(props)
    }
}

impl<F> fmt::Debug for FnComponent<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FnComponent({})", self.name)
    }
}

/// Wrap a closure as a component
pub fn function_component<F>(name: &'static str, render: F) -> Rc<dyn Component>
where
    F: Fn(&Props) -> Vec<Element> + 'static,
{
    Rc::new(FnComponent { name, render })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementKind;

    #[test]
    fn test_function_component() {
        let comp = function_component("Label", |props| {
            let text = props.get("text").and_then(Value::as_str).unwrap_or("");
            vec![Element::text(text)]
        });
        assert_eq!(comp.name(), "Label");
        let out = comp.render(&Props::new().with("text", "hi"), &Value::Null);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].props.text_content(), Some("hi"));
    }

    #[test]
    fn test_component_identity() {
        let a = function_component("A", |_| Vec::new());
        let b = function_component("A", |_| Vec::new());
        let ka = ElementKind::Component(a.clone());
        assert!(ka.same_type(&ElementKind::Component(a)));
        assert!(!ka.same_type(&ElementKind::Component(b)));
    }
}
