//! Custom element definitions
//!
//! A definition binds a local name to an [`ElementClass`] and freezes the
//! class's lifecycle callbacks and observed attributes at registration time.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::{DefinitionError, ScriptError};
use crate::internals::CustomElementInternals;
use crate::NodeId;

/// Custom element lifecycle callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleCallback {
    Connected,
    Disconnected,
    Adopted,
    AttributeChanged,
}

impl LifecycleCallback {
    pub const ALL: [LifecycleCallback; 4] = [
        Self::Connected,
        Self::Disconnected,
        Self::Adopted,
        Self::AttributeChanged,
    ];

    /// Prototype member name of the callback
    pub fn member_name(self) -> &'static str {
        match self {
            Self::Connected => "connectedCallback",
            Self::Disconnected => "disconnectedCallback",
            Self::Adopted => "adoptedCallback",
            Self::AttributeChanged => "attributeChangedCallback",
        }
    }
}

/// Arguments of one lifecycle callback invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction<'a> {
    Connected {
        element: NodeId,
    },
    Disconnected {
        element: NodeId,
    },
    Adopted {
        element: NodeId,
        old_document: NodeId,
        new_document: NodeId,
    },
    AttributeChanged {
        element: NodeId,
        name: &'a str,
        old_value: Option<&'a str>,
        new_value: Option<&'a str>,
        namespace: Option<&'a str>,
    },
}

impl Reaction<'_> {
    /// Element the callback runs on (`this`)
    pub fn element(&self) -> NodeId {
        match *self {
            Self::Connected { element }
            | Self::Disconnected { element }
            | Self::Adopted { element, .. }
            | Self::AttributeChanged { element, .. } => element,
        }
    }

    pub fn callback(&self) -> LifecycleCallback {
        match self {
            Self::Connected { .. } => LifecycleCallback::Connected,
            Self::Disconnected { .. } => LifecycleCallback::Disconnected,
            Self::Adopted { .. } => LifecycleCallback::Adopted,
            Self::AttributeChanged { .. } => LifecycleCallback::AttributeChanged,
        }
    }
}

/// A callable lifecycle member
pub type Callback = Rc<dyn Fn(&Reaction<'_>) -> Result<(), ScriptError>>;

type ConstructFn = Rc<dyn Fn(&Construction<'_>) -> Result<NodeId, ScriptError>>;

/// Result of looking up a member on a class prototype
#[derive(Clone)]
pub enum Member {
    /// Member is `undefined`
    Absent,
    /// Member is a function
    Callable(Callback),
    /// Member holds a non-callable value
    Value,
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "Absent"),
            Self::Callable(_) => write!(f, "Callable"),
            Self::Value => write!(f, "Value"),
        }
    }
}

/// A custom element class as the script host sees it
///
/// Lookups may run user code (getters), which may call back into the
/// registry.
pub trait ElementClass {
    /// Whether the class can be invoked as a constructor
    fn is_constructor(&self) -> bool {
        true
    }

    /// Run the constructor. Upgrades expect the instance obtained from
    /// [`Construction::element`] back.
    fn construct(&self, cx: &Construction<'_>) -> Result<NodeId, ScriptError>;

    /// Look up a prototype member
    fn member(&self, _name: &str) -> Result<Member, ScriptError> {
        Ok(Member::Absent)
    }

    /// The static `observedAttributes` list
    fn observed_attributes(&self) -> Result<Vec<String>, ScriptError> {
        Ok(Vec::new())
    }
}

/// Entry on a definition's construction stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StackEntry {
    Pending(NodeId),
    AlreadyConstructed,
}

/// Lifecycle members frozen at registration
#[derive(Default)]
pub(crate) struct Lifecycle {
    callbacks: HashMap<LifecycleCallback, Callback>,
    observed_attributes: Vec<String>,
}

impl Lifecycle {
    /// Read every lifecycle member off `class`
    pub(crate) fn read(class: &dyn ElementClass) -> Result<Self, DefinitionError> {
        let mut callbacks = HashMap::new();
        for callback in LifecycleCallback::ALL {
            let name = callback.member_name();
            match class.member(name).map_err(DefinitionError::Script)? {
                Member::Absent => {}
                Member::Callable(f) => {
                    callbacks.insert(callback, f);
                }
                Member::Value => return Err(DefinitionError::MalformedCallback(name)),
            }
        }
        let observed_attributes = class.observed_attributes().map_err(DefinitionError::Script)?;
        Ok(Self {
            callbacks,
            observed_attributes,
        })
    }
}

/// Registered custom element definition
pub struct Definition {
    local_name: String,
    class: Rc<dyn ElementClass>,
    lifecycle: Lifecycle,
    construction_stack: RefCell<Vec<StackEntry>>,
}

impl Definition {
    pub(crate) fn new(local_name: &str, class: Rc<dyn ElementClass>, lifecycle: Lifecycle) -> Self {
        Self {
            local_name: local_name.to_string(),
            class,
            lifecycle,
            construction_stack: RefCell::new(Vec::new()),
        }
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// The registered constructor
    pub fn class(&self) -> &Rc<dyn ElementClass> {
        &self.class
    }

    pub fn observed_attributes(&self) -> &[String] {
        &self.lifecycle.observed_attributes
    }

    pub fn is_observed(&self, name: &str) -> bool {
        self.lifecycle.observed_attributes.iter().any(|a| a == name)
    }

    pub fn callback(&self, callback: LifecycleCallback) -> Option<&Callback> {
        self.lifecycle.callbacks.get(&callback)
    }

    pub fn has_callback(&self, callback: LifecycleCallback) -> bool {
        self.lifecycle.callbacks.contains_key(&callback)
    }

    /// Depth of in-flight constructions
    pub fn construction_depth(&self) -> usize {
        self.construction_stack.borrow().len()
    }

    pub(crate) fn push_construction(&self, element: NodeId) {
        self.construction_stack.borrow_mut().push(StackEntry::Pending(element));
    }

    pub(crate) fn pop_construction(&self) -> Option<StackEntry> {
        self.construction_stack.borrow_mut().pop()
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("local_name", &self.local_name)
            .field("callbacks", &self.lifecycle.callbacks.keys().collect::<Vec<_>>())
            .field("observed_attributes", &self.lifecycle.observed_attributes)
            .field("construction_depth", &self.construction_depth())
            .finish()
    }
}

const REENTRANT_CONSTRUCTION: &str = "The element constructor was either called reentrantly for \
     this constructor or called multiple times";

/// Handle a constructor receives while it runs
///
/// [`Construction::element`] is the base element constructor step: it hands
/// out the element being upgraded, or creates a fresh one when the class is
/// constructed directly.
pub struct Construction<'a> {
    definition: &'a Rc<Definition>,
    internals: &'a CustomElementInternals,
}

impl<'a> Construction<'a> {
    pub(crate) fn new(
        definition: &'a Rc<Definition>,
        internals: &'a CustomElementInternals,
    ) -> Self {
        Self {
            definition,
            internals,
        }
    }

    pub fn local_name(&self) -> &str {
        self.definition.local_name()
    }

    pub fn definition(&self) -> &Rc<Definition> {
        self.definition
    }

    pub fn internals(&self) -> &CustomElementInternals {
        self.internals
    }

    /// Obtain the instance under construction
    pub fn element(&self) -> Result<NodeId, ScriptError> {
        let top = self.definition.construction_stack.borrow().last().copied();
        match top {
            Some(StackEntry::Pending(element)) => {
                if let Some(entry) = self.definition.construction_stack.borrow_mut().last_mut() {
                    *entry = StackEntry::AlreadyConstructed;
                }
                self.internals.patch(element);
                Ok(element)
            }
            Some(StackEntry::AlreadyConstructed) => Err(ScriptError::new(REENTRANT_CONSTRUCTION)),
            None => Ok(self.internals.create_custom_element(self.definition)),
        }
    }
}

/// Closure-backed [`ElementClass`]
///
/// Embedders without a script engine (and tests) describe classes with it.
#[derive(Clone)]
pub struct CustomElementClass {
    constructor: Option<ConstructFn>,
    members: HashMap<String, Member>,
    observed_attributes: Vec<String>,
}

impl Default for CustomElementClass {
    fn default() -> Self {
        Self::new()
    }
}

impl CustomElementClass {
    /// Class whose constructor only calls `super()`
    pub fn new() -> Self {
        Self {
            constructor: Some(Rc::new(|cx: &Construction<'_>| cx.element())),
            members: HashMap::new(),
            observed_attributes: Vec::new(),
        }
    }

    /// A value that cannot be used with `new`
    pub fn not_constructor() -> Self {
        Self {
            constructor: None,
            ..Self::new()
        }
    }

    pub fn constructor(
        mut self,
        f: impl Fn(&Construction<'_>) -> Result<NodeId, ScriptError> + 'static,
    ) -> Self {
        self.constructor = Some(Rc::new(f));
        self
    }

    /// Install a lifecycle callback
    pub fn on(
        mut self,
        callback: LifecycleCallback,
        f: impl Fn(&Reaction<'_>) -> Result<(), ScriptError> + 'static,
    ) -> Self {
        self.members
            .insert(callback.member_name().to_string(), Member::Callable(Rc::new(f)));
        self
    }

    /// Set an arbitrary prototype member
    pub fn member(mut self, name: &str, member: Member) -> Self {
        self.members.insert(name.to_string(), member);
        self
    }

    pub fn observe(mut self, names: &[&str]) -> Self {
        self.observed_attributes = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn into_class(self) -> Rc<dyn ElementClass> {
        Rc::new(self)
    }
}

impl ElementClass for CustomElementClass {
    fn is_constructor(&self) -> bool {
        self.constructor.is_some()
    }

    fn construct(&self, cx: &Construction<'_>) -> Result<NodeId, ScriptError> {
        match &self.constructor {
            Some(f) => f(cx),
            None => Err(ScriptError::new("Value is not a constructor")),
        }
    }

    fn member(&self, name: &str) -> Result<Member, ScriptError> {
        Ok(self.members.get(name).cloned().unwrap_or(Member::Absent))
    }

    fn observed_attributes(&self) -> Result<Vec<String>, ScriptError> {
        Ok(self.observed_attributes.clone())
    }
}
