//! Relay: a dataflow circuit execution engine.
//!
//! Computations are described as circuits of typed **cells** joined by
//! typed **sockets**; the scheduler repeatedly drives the circuit to
//! steady state, honoring declared data dependencies, per-iteration
//! token ordering, smart re-execution, deadlock tolerance and parallel
//! execution of independent branches.
//!
//! # Quick start
//!
//! ```
//! use relay::prelude::*;
//!
//! #[derive(Clone, Default)]
//! struct Doubler;
//!
//! impl Unit for Doubler {
//!     fn declare_io(
//!         &self,
//!         _params: &SocketMap,
//!         inputs: &SocketMap,
//!         outputs: &SocketMap,
//!     ) -> Result<()> {
//!         inputs.declare::<i64>("value", "Value in.")?;
//!         outputs.declare_with_default::<i64>("twice", "Value doubled.", 0)?;
//!         Ok(())
//!     }
//!
//!     fn process(&mut self, inputs: &SocketMap, outputs: &SocketMap) -> Result<ReturnCode> {
//!         outputs.put("twice", inputs.get::<i64>("value")? * 2)?;
//!         Ok(ReturnCode::Ok)
//!     }
//! }
//!
//! let cell = Cell::new(Doubler);
//! cell.declare_params()?;
//! cell.declare_io()?;
//! cell.inputs.put("value", 21i64)?;
//! cell.process()?;
//! assert_eq!(cell.outputs.get::<i64>("twice")?, 42);
//! # Ok::<(), relay::Error>(())
//! ```
//!
//! Wire cells into a [`Circuit`](prelude::Circuit), hand it to a
//! [`Scheduler`](prelude::Scheduler) and call `execute(n)` to drive n
//! iterations; each iteration stamps a fresh token through the graph so
//! every cell fires at most once per iteration and consumers only run
//! once their producers have delivered.

pub use relay_core::{Error, Result};

pub mod prelude {
    //! Common imports for building and running circuits.
    //!
    //! ```
    //! use relay::prelude::*;
    //! ```

    pub use relay_core::{
        Cell, CellRef, CellRegistry, Circuit, Edge, Error, Event, Handle, NO_TOKEN, Observable,
        Observer, Phase, Result, ReturnCode, Scheduler, Socket, SocketMap, SocketRef, SocketValue,
        Unit, Value, cell_registry, type_registry,
    };
}
