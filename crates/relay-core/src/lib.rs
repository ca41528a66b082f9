//! Core engine for relay dataflow circuits.
//!
//! This crate is the execution substrate: typed socket values with
//! runtime conversion rules, cells wrapping user compute units,
//! circuits of typed fan-out edges, and the token-driven scheduler that
//! repeatedly drives a circuit to steady state.
//!
//! For application code, prefer the `relay` crate and its prelude; the
//! APIs here move with the engine.
//!
//! This crate provides:
//! - Dynamically typed sockets with dirty/supplied/token metadata
//! - Conversion tables between socket types, foreign objects included
//! - Cell lifecycle: declare, configure, process with smart
//!   re-execution
//! - Circuits with typed, fan-out-capable edges and topology queries
//! - A deadlock-tolerant, parallel, debuggable scheduler
//! - Process-wide type and cell registries with a plugin surface

pub mod cell;
pub mod circuit;
pub mod convert;
pub mod error;
pub mod handle;
pub mod observer;
pub mod registry;
pub mod scheduler;
pub mod socket;
pub mod sockets;
pub mod value;

pub use cell::{Cell, CellRef, Phase, ReturnCode, Unit, UnitClone};
pub use circuit::{Circuit, Edge};
pub use convert::{ConvertFn, ConverterSet};
pub use error::{Error, Result};
pub use handle::Handle;
pub use observer::{Event, Observable, Observer};
pub use registry::{
    CellRegistry, PLUGIN_API_VERSION, PluginRegisterFn, TypeRegistry, cell_registry,
    type_registry,
};
pub use scheduler::Scheduler;
pub use socket::{NO_TOKEN, Socket, SocketRef};
pub use sockets::SocketMap;
pub use value::{SocketValue, Value};
