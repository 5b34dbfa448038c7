//! Custom element errors

use crate::NodeId;

/// Error thrown by user code (a constructor, a lifecycle callback or a class
/// member lookup)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ScriptError {
    message: String,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors reported synchronously from `define`. None of them leave a trace in
/// the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    #[error("Custom element constructors must be callable")]
    NotAConstructor,

    #[error("The element name '{0}' is not valid")]
    InvalidName(String),

    #[error("A custom element with name '{0}' has already been defined")]
    AlreadyDefined(String),

    #[error("This constructor is already registered as '{0}'")]
    ConstructorInUse(String),

    #[error("A custom element is already being defined")]
    Reentrant,

    #[error("The '{0}' callback must be callable")]
    MalformedCallback(&'static str),

    #[error("Reading the custom element class failed: {0}")]
    Script(#[source] ScriptError),
}

/// Failures scoped to a single element during upgrade or reaction dispatch
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpgradeError {
    #[error("Constructor for <{local_name}> threw: {source}")]
    Constructor {
        element: Option<NodeId>,
        local_name: String,
        #[source]
        source: ScriptError,
    },

    #[error("Constructor for <{local_name}> did not produce the element being upgraded")]
    ConstructionMismatch {
        element: NodeId,
        local_name: String,
    },

    #[error("{callback} of <{local_name}> threw: {source}")]
    Reaction {
        element: NodeId,
        local_name: String,
        callback: &'static str,
        #[source]
        source: ScriptError,
    },
}

impl UpgradeError {
    /// Element the failure belongs to, if one exists yet
    pub fn element(&self) -> Option<NodeId> {
        match self {
            Self::Constructor { element, .. } => *element,
            Self::ConstructionMismatch { element, .. } | Self::Reaction { element, .. } => {
                Some(*element)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = DefinitionError::InvalidName("foo".into());
        assert_eq!(err.to_string(), "The element name 'foo' is not valid");

        let err = UpgradeError::Reaction {
            element: NodeId(4),
            local_name: "x-foo".into(),
            callback: "connectedCallback",
            source: ScriptError::new("boom"),
        };
        assert_eq!(err.to_string(), "connectedCallback of <x-foo> threw: boom");
        assert_eq!(err.element(), Some(NodeId(4)));
    }
}
