//! fOS Custom Elements - Custom Elements v1 engine
//!
//! Decides when elements upgrade to registered custom element classes and
//! sequences lifecycle reactions against DOM mutation. The engine reaches the
//! tree only through [`DomAccess`]; DOM mutation glue calls into
//! [`CustomElementInternals`] whenever subtrees are inserted, removed, cloned
//! or adopted.

mod config;
mod definition;
mod dom;
mod error;
mod internals;
mod name;
mod reactions;
mod registry;
mod store;
mod tree;
mod upgrade;
mod walker;
mod when_defined;

pub use config::{ErrorReporter, FlushCallback, FlushTrigger, RegistryConfig};
pub use definition::{
    Callback, Construction, CustomElementClass, Definition, ElementClass, LifecycleCallback,
    Member, Reaction,
};
pub use dom::{is_import_link, DomAccess, NodeKind};
pub use error::{DefinitionError, ScriptError, UpgradeError};
pub use internals::{CustomElementInternals, ElementPatch, ElementState};
pub use name::is_valid_custom_element_name;
pub use registry::CustomElementRegistry;
pub use tree::DomTree;
pub use upgrade::{TreeOptions, UpgradeFn};
pub use walker::walk_deep_descendant_elements;
pub use when_defined::WhenDefined;

/// Node identifier (index into the host's node arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Root node ID
    pub const ROOT: NodeId = NodeId(0);
    /// Invalid/none node ID
    pub const NONE: NodeId = NodeId(u32::MAX);

    /// Check if this is a valid node ID
    #[inline]
    pub fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }

    /// Convert the sentinel into `None`
    #[inline]
    pub fn valid(self) -> Option<NodeId> {
        self.is_valid().then_some(self)
    }
}
