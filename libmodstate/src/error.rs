//! Error types for modstate

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModstateError>;

#[derive(Error, Debug)]
pub enum ModstateError {
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Declaration error: {0}")]
    Declaration(#[from] DeclareError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

impl ModstateError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ModstateError::Build(_) => 2,
            ModstateError::Declaration(_) => 2,
            ModstateError::Access(_) => 3,
            ModstateError::Config(_) => 1,
            ModstateError::Dispatch(_) => 1,
        }
    }
}

/// Structural problems found while building a composition tree.
///
/// Every variant is fatal to startup: a tree that fails to build never
/// reaches the dispatch loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("Invalid module name '{name}' at {path}")]
    InvalidName { name: String, path: String },

    #[error("Invalid event label '{label}' in namespace {namespace}")]
    InvalidLabel { namespace: String, label: String },

    #[error("Duplicate module {path}")]
    DuplicateModule { path: String },

    #[error("Namespace {namespace} is declared at both {first} and {second}")]
    DuplicateNamespace {
        namespace: String,
        first: String,
        second: String,
    },

    #[error("Duplicate event id {0}")]
    DuplicateEvent(String),

    #[error("Unknown namespace {0}")]
    UnknownNamespace(String),

    #[error("Duplicate accessor {accessor} on {module}")]
    DuplicateAccessor { module: String, accessor: String },

    #[error("Module {module} cannot react to {namespace}: not a descendant namespace")]
    InvalidReaction { module: String, namespace: String },

    #[error("Module {module} reads unknown accessor {accessor}")]
    UnknownAccessor { module: String, accessor: String },

    #[error("Module {module} may not read {accessor}: owner is not on its line of descent")]
    Visibility { module: String, accessor: String },
}

/// Read-side failures raised to the caller of an accessor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("{requester} may not read {accessor}: owner is a sibling or cousin")]
    Visibility { requester: String, accessor: String },

    #[error("Unknown module {0}")]
    UnknownModule(String),

    #[error("Unknown accessor {0}")]
    UnknownAccessor(String),

    #[error("Malformed accessor reference '{0}' (expected OWNER.accessor)")]
    MalformedReference(String),

    #[error("State snapshot has no slot for {0}")]
    MissingSlot(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DeclareError {
    #[error("Failed to read declaration file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse declaration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid state pointer '{0}' (must start with /data or /ui)")]
    InvalidPointer(String),

    #[error("Invalid handler event '{event}' in module {module}")]
    InvalidHandler { module: String, event: String },

    #[error("Unreachable handler {event} in module {module} (namespace not owned or in reacts_to)")]
    UnreachableHandler { module: String, event: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Event queue is full ({0} pending)")]
    QueueFull(usize),

    #[error("Store has been dropped")]
    Closed,
}
