//! Error types for relay-core.

use thiserror::Error;

/// Result type for relay-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in relay-core.
#[derive(Debug, Error)]
pub enum Error {
    /// A socket was declared twice.
    #[error("{name} already exists. Its type is {type_name}")]
    AlreadyDeclared { name: String, type_name: String },

    /// A cell's declaration phase ran twice.
    #[error("cell {cell} has already declared its {what}")]
    DeclaredTwice { cell: String, what: &'static str },

    /// A registry name was registered twice.
    #[error("name collision: {0}")]
    NameCollision(String),

    /// A default value could not be installed on a socket.
    #[error("bad default for socket {name}: {message}")]
    BadDefault { name: String, message: String },

    /// No conversion exists between the two socket types.
    #[error("cannot convert from {from} to {to}")]
    TypeMismatch { from: String, to: String },

    /// Operation on a none-typed socket that has no value.
    #[error("socket is not initialized: {0}")]
    NotInitialized(String),

    /// Lookup of an unknown name in a socket map.
    #[error("no socket named {0}")]
    KeyNotFound(String),

    /// A connect/disconnect referenced a socket that does not exist.
    #[error("cell {cell} has no socket named {socket}")]
    UnknownSocket { cell: String, socket: String },

    /// The destination input already has an incoming edge.
    #[error("input {cell}.{socket} is already connected")]
    AlreadyConnected { cell: String, socket: String },

    /// Disconnect of an edge that was never recorded.
    #[error("{src_cell}.{src_socket} is not connected to {dst_cell}.{dst_socket}")]
    NotConnected {
        src_cell: String,
        src_socket: String,
        dst_cell: String,
        dst_socket: String,
    },

    /// The requested edge would close a cycle.
    #[error("connecting {src_cell}.{src_socket} to {dst_cell}.{dst_socket} would create a cycle")]
    CycleDetected {
        src_cell: String,
        src_socket: String,
        dst_cell: String,
        dst_socket: String,
    },

    /// A required input has no value.
    #[error("required input {cell}.{socket} has not been supplied")]
    Unsupplied { cell: String, socket: String },

    /// `process` was invoked before `declare_io`.
    #[error("cell {0} processed before its io was declared")]
    ProcessBeforeDeclare(String),

    /// A cell was requested from the registry but never added.
    #[error("no cell registered under {0}")]
    CellNotFound(String),

    /// Error raised by user code during a cell's process or configure.
    #[error("execution error in cell {cell}: {message}")]
    Execution { cell: String, message: String },
}

impl Error {
    /// Convenience constructor for user-code failures inside a cell.
    pub fn execution(cell: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Execution {
            cell: cell.into(),
            message: message.into(),
        }
    }
}
