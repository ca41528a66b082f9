//! Cells: self-describing compute units.
//!
//! A cell wraps a user-supplied [`Unit`] and drives it through the
//! declare / configure / process lifecycle. The cell owns three socket
//! maps (parameters, inputs, outputs) and enforces the token gating and
//! smart re-execution rules; the unit only reads inputs and writes
//! outputs.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::observer::{Event, Observable, Observer};
use crate::socket::{NO_TOKEN, WriteKind};
use crate::sockets::SocketMap;

/// Shared handle to a cell.
pub type CellRef = Arc<Cell>;

/// Status a unit's process reports back to the scheduler.
///
/// Integer codes outside the named range round-trip as `User` codes and
/// are treated like `Ok` by the scheduler, which records them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ReturnCode {
    /// Processed successfully; outputs are good.
    Ok,
    /// Stop the run gracefully at the end of the current sweep.
    Quit,
    /// Not ready yet; retry at the same pid.
    DoOver,
    /// Abort the whole execute call.
    Break,
    /// Nothing meaningful to report.
    Unknown,
    /// Application-defined code, passed through untouched.
    User(i32),
}

impl ReturnCode {
    pub fn from_i32(code: i32) -> ReturnCode {
        match code {
            0 => ReturnCode::Ok,
            1 => ReturnCode::Quit,
            2 => ReturnCode::DoOver,
            3 => ReturnCode::Break,
            4 => ReturnCode::Unknown,
            other => ReturnCode::User(other),
        }
    }

    pub fn to_i32(self) -> i32 {
        match self {
            ReturnCode::Ok => 0,
            ReturnCode::Quit => 1,
            ReturnCode::DoOver => 2,
            ReturnCode::Break => 3,
            ReturnCode::Unknown => 4,
            ReturnCode::User(code) => code,
        }
    }
}

impl Default for ReturnCode {
    fn default() -> Self {
        ReturnCode::Unknown
    }
}

/// Profiled lifecycle phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Config,
    Process,
}

/// The user compute object a cell wraps.
///
/// All methods are optional; a unit with only `process` is common. The
/// declare methods run exactly once per cell, configure may run again
/// after a parameter change.
pub trait Unit: UnitClone + Send {
    fn declare_params(&self, _params: &SocketMap) -> Result<()> {
        Ok(())
    }

    fn declare_io(
        &self,
        _params: &SocketMap,
        _inputs: &SocketMap,
        _outputs: &SocketMap,
    ) -> Result<()> {
        Ok(())
    }

    fn configure(
        &mut self,
        _params: &SocketMap,
        _inputs: &SocketMap,
        _outputs: &SocketMap,
    ) -> Result<()> {
        Ok(())
    }

    fn process(&mut self, _inputs: &SocketMap, _outputs: &SocketMap) -> Result<ReturnCode> {
        Ok(ReturnCode::Ok)
    }
}

/// Object-safe cloning for boxed units.
pub trait UnitClone {
    fn clone_unit(&self) -> Box<dyn Unit>;
}

impl<T: Unit + Clone + 'static> UnitClone for T {
    fn clone_unit(&self) -> Box<dyn Unit> {
        Box::new(self.clone())
    }
}

struct Meta {
    name: String,
    module: String,
    short_doc: String,
}

struct Lifecycle {
    params_declared: bool,
    io_declared: bool,
    configured: bool,
    last_pid: Option<i64>,
    last_code: ReturnCode,
    input_versions: FxHashMap<String, u64>,
    stamped_outputs: Vec<String>,
}

#[derive(Default)]
struct Profiling {
    enabled: FxHashMap<Phase, bool>,
    elapsed: FxHashMap<Phase, Duration>,
}

/// A compute unit with declared parameter, input and output sockets.
pub struct Cell {
    meta: Mutex<Meta>,
    pub parameters: SocketMap,
    pub inputs: SocketMap,
    pub outputs: SocketMap,
    unit: Mutex<Box<dyn Unit>>,
    lifecycle: Mutex<Lifecycle>,
    profiling: Mutex<Profiling>,
    observable: Observable,
}

impl Cell {
    /// Wrap a unit. The cell's name defaults to the unit's type name.
    pub fn new<U: Unit + 'static>(unit: U) -> CellRef {
        let type_name = std::any::type_name::<U>();
        let short = type_name.rsplit("::").next().unwrap_or(type_name);
        Self::from_boxed(Box::new(unit), short.to_string())
    }

    fn from_boxed(unit: Box<dyn Unit>, name: String) -> CellRef {
        Arc::new(Cell {
            meta: Mutex::new(Meta {
                name,
                module: String::new(),
                short_doc: String::new(),
            }),
            parameters: SocketMap::new(),
            inputs: SocketMap::new(),
            outputs: SocketMap::new(),
            unit: Mutex::new(unit),
            lifecycle: Mutex::new(Lifecycle {
                params_declared: false,
                io_declared: false,
                configured: false,
                last_pid: None,
                last_code: ReturnCode::Unknown,
                input_versions: FxHashMap::default(),
                stamped_outputs: Vec::new(),
            }),
            profiling: Mutex::new(Profiling::default()),
            observable: Observable::new(),
        })
    }

    // ----- metadata -----

    pub fn name(&self) -> String {
        self.lock_meta().name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.lock_meta().name = name.into();
    }

    pub fn module(&self) -> String {
        self.lock_meta().module.clone()
    }

    pub fn set_module(&self, module: impl Into<String>) {
        self.lock_meta().module = module.into();
    }

    pub fn short_doc(&self) -> String {
        self.lock_meta().short_doc.clone()
    }

    pub fn set_short_doc(&self, doc: impl Into<String>) {
        self.lock_meta().short_doc = doc.into();
    }

    // ----- declaration -----

    /// Run the unit's parameter declaration. Exactly once per cell.
    pub fn declare_params(&self) -> Result<()> {
        {
            let mut lifecycle = self.lock_lifecycle();
            if lifecycle.params_declared {
                return Err(Error::DeclaredTwice {
                    cell: self.name(),
                    what: "parameters",
                });
            }
            lifecycle.params_declared = true;
        }
        self.lock_unit().declare_params(&self.parameters)
    }

    /// Run the unit's io declaration. Exactly once per cell.
    pub fn declare_io(&self) -> Result<()> {
        {
            let mut lifecycle = self.lock_lifecycle();
            if lifecycle.io_declared {
                return Err(Error::DeclaredTwice {
                    cell: self.name(),
                    what: "io",
                });
            }
            lifecycle.io_declared = true;
        }
        self.lock_unit()
            .declare_io(&self.parameters, &self.inputs, &self.outputs)
    }

    // ----- configuration -----

    /// Run the unit's configure. May be called again after a parameter
    /// change.
    pub fn configure(&self) -> Result<()> {
        if self.lock_lifecycle().configured {
            tracing::warn!(cell = %self.name(), "configure called more than once");
        }
        let timer = self.profiled(Phase::Config).then(Instant::now);
        let result = {
            let mut unit = self.lock_unit();
            unit.configure(&self.parameters, &self.inputs, &self.outputs)
        };
        if let Some(start) = timer {
            self.record_elapsed(Phase::Config, start.elapsed());
        }
        if result.is_ok() {
            self.lock_lifecycle().configured = true;
        }
        result
    }

    pub fn configured(&self) -> bool {
        self.lock_lifecycle().configured
    }

    // ----- processing -----

    /// Process outside any scheduler iteration (no token).
    pub fn process(&self) -> Result<ReturnCode> {
        self.process_at(NO_TOKEN)
    }

    /// Attempt to process at the given pid.
    ///
    /// Gating, in order: every required input must be supplied
    /// (`Unsupplied` otherwise); every graph-supplied input must carry
    /// the current token (`DoOver` otherwise); if nothing changed since
    /// the last successful process the unit is skipped and previously
    /// stamped outputs are restamped with the new pid.
    pub fn process_at(&self, pid: i64) -> Result<ReturnCode> {
        let name = self.name();
        if !self.lock_lifecycle().io_declared {
            return Err(Error::ProcessBeforeDeclare(name));
        }

        let inputs = self.inputs.entries();
        for (socket_name, socket) in &inputs {
            if socket.required() && !socket.supplied() {
                return Err(Error::Unsupplied {
                    cell: name,
                    socket: socket_name.clone(),
                });
            }
        }
        for (socket_name, socket) in &inputs {
            if socket.graph_supplied() && socket.token_id() != pid {
                tracing::trace!(
                    cell = %name,
                    socket = %socket_name,
                    token = socket.token_id(),
                    pid,
                    "token not ready"
                );
                return Ok(ReturnCode::DoOver);
            }
        }

        if !self.needs_process() {
            let mut lifecycle = self.lock_lifecycle();
            if let Some(last) = lifecycle.last_pid {
                if pid >= 0 && pid != last {
                    for output in &lifecycle.stamped_outputs {
                        if let Ok(socket) = self.outputs.sock(output) {
                            socket.set_token_id(pid);
                        }
                    }
                    lifecycle.last_pid = Some(pid);
                }
                tracing::trace!(cell = %name, pid, "inputs unchanged, skipping process");
                return Ok(ReturnCode::Ok);
            }
        }

        for (_, socket) in self.outputs.entries() {
            socket.clear_write_kind();
        }

        let timer = self.profiled(Phase::Process).then(Instant::now);
        let code = {
            let mut unit = self.lock_unit();
            unit.process(&self.inputs, &self.outputs)?
        };
        if let Some(start) = timer {
            self.record_elapsed(Phase::Process, start.elapsed());
        }

        if code == ReturnCode::DoOver {
            self.lock_lifecycle().last_code = code;
            return Ok(code);
        }

        let mut stamped = Vec::new();
        for (output_name, socket) in self.outputs.entries() {
            match socket.write_kind() {
                WriteKind::Insert | WriteKind::Transfer => {
                    if pid >= 0 {
                        socket.set_token_id(pid);
                    }
                    stamped.push(output_name);
                }
                WriteKind::Assign | WriteKind::Untouched => {}
            }
        }

        let versions = self
            .inputs
            .entries()
            .into_iter()
            .map(|(input_name, socket)| (input_name, socket.version()))
            .collect();
        {
            let mut lifecycle = self.lock_lifecycle();
            lifecycle.last_pid = Some(pid);
            lifecycle.last_code = code;
            lifecycle.input_versions = versions;
            lifecycle.stamped_outputs = stamped;
        }
        self.observable.notify(Event::ValueChanged);
        Ok(code)
    }

    /// True when an input changed since the last successful process
    /// (or the cell never processed).
    pub fn needs_process(&self) -> bool {
        let lifecycle = self.lock_lifecycle();
        let Some(last_pid) = lifecycle.last_pid else {
            return true;
        };
        for (input_name, socket) in self.inputs.entries() {
            if socket.dirty() || socket.token_id() > last_pid {
                return true;
            }
            if lifecycle.input_versions.get(&input_name).copied() != Some(socket.version()) {
                return true;
            }
        }
        false
    }

    /// The return code of the last completed process.
    pub fn last_code(&self) -> ReturnCode {
        self.lock_lifecycle().last_code
    }

    /// The pid of the last completed process, if any.
    pub fn last_pid(&self) -> Option<i64> {
        self.lock_lifecycle().last_pid
    }

    // ----- cloning -----

    /// A new cell of the same unit type: declaration re-runs, parameter
    /// and input values are deep-copied, but required flags set outside
    /// declaration, callbacks, token ids and profiling do not
    /// propagate. The clone is unconfigured.
    pub fn clone_cell(&self) -> Result<CellRef> {
        let unit = self.lock_unit().clone_unit();
        let clone = Cell::from_boxed(unit, self.name());
        clone.set_module(self.module());
        clone.set_short_doc(self.short_doc());

        let (params_declared, io_declared) = {
            let lifecycle = self.lock_lifecycle();
            (lifecycle.params_declared, lifecycle.io_declared)
        };
        if params_declared {
            clone.declare_params()?;
        }
        if io_declared {
            clone.declare_io()?;
        }

        for (source_map, target_map) in [
            (&self.parameters, &clone.parameters),
            (&self.inputs, &clone.inputs),
        ] {
            for (socket_name, source) in source_map.entries() {
                if !source.supplied() {
                    continue;
                }
                if let Ok(target) = target_map.sock(&socket_name) {
                    target.copy_from(&source)?;
                    target.set_token_id(NO_TOKEN);
                }
            }
        }
        Ok(clone)
    }

    // ----- profiling -----

    /// Enable or disable wall-time recording for a phase.
    pub fn set_profile(&self, phase: Phase, enabled: bool) {
        self.lock_profiling().enabled.insert(phase, enabled);
    }

    pub fn profiled(&self, phase: Phase) -> bool {
        self.lock_profiling()
            .enabled
            .get(&phase)
            .copied()
            .unwrap_or(false)
    }

    /// Wall time of the last profiled run of a phase; zero when the
    /// phase was never profiled.
    pub fn elapsed(&self, phase: Phase) -> Duration {
        self.lock_profiling()
            .elapsed
            .get(&phase)
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    fn record_elapsed(&self, phase: Phase, elapsed: Duration) {
        self.lock_profiling().elapsed.insert(phase, elapsed);
    }

    // ----- observers -----

    pub fn observable(&self) -> &Observable {
        &self.observable
    }

    pub fn attach<O: Observer + 'static>(&self, observer: &Arc<O>) {
        self.observable.attach(observer);
    }

    pub fn detach<O: Observer + 'static>(&self, observer: &Arc<O>) {
        self.observable.detach(observer);
    }

    pub fn notify_observers(&self, event: Event) {
        self.observable.notify(event);
    }

    // ----- locks -----

    fn lock_meta(&self) -> MutexGuard<'_, Meta> {
        self.meta.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_unit(&self) -> MutexGuard<'_, Box<dyn Unit>> {
        self.unit.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_profiling(&self) -> MutexGuard<'_, Profiling> {
        self.profiling.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("name", &self.name())
            .field("parameters", &self.parameters)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Doubler;

    impl Unit for Doubler {
        fn declare_io(
            &self,
            _params: &SocketMap,
            inputs: &SocketMap,
            outputs: &SocketMap,
        ) -> Result<()> {
            inputs.declare::<i64>("a", "an integer")?;
            outputs.declare_with_default::<i64>("out", "twice a", 0)?;
            Ok(())
        }

        fn process(&mut self, inputs: &SocketMap, outputs: &SocketMap) -> Result<ReturnCode> {
            outputs.put("out", inputs.get::<i64>("a")? * 2)?;
            Ok(ReturnCode::Ok)
        }
    }

    #[test]
    fn declare_twice_is_an_error() {
        let cell = Cell::new(Doubler);
        cell.declare_params().unwrap();
        cell.declare_io().unwrap();
        assert!(cell.declare_params().is_err());
        assert!(cell.declare_io().is_err());
    }

    #[test]
    fn process_before_declare_is_an_error() {
        let cell = Cell::new(Doubler);
        assert!(matches!(
            cell.process(),
            Err(Error::ProcessBeforeDeclare(_))
        ));
    }

    #[test]
    fn process_stamps_insertion_outputs() {
        let cell = Cell::new(Doubler);
        cell.declare_io().unwrap();
        cell.inputs.put("a", 3i64).unwrap();
        assert_eq!(cell.process_at(23).unwrap(), ReturnCode::Ok);
        assert_eq!(cell.outputs.get::<i64>("out").unwrap(), 6);
        assert_eq!(cell.outputs.sock("out").unwrap().token_id(), 23);
    }

    #[test]
    fn required_inputs_gate_processing() {
        let cell = Cell::new(Doubler);
        cell.declare_io().unwrap();
        let a = cell.inputs.sock("a").unwrap();
        a.set_required(true);
        assert!(matches!(cell.process(), Err(Error::Unsupplied { .. })));

        cell.inputs.put("a", 1i64).unwrap();
        assert_eq!(cell.process().unwrap(), ReturnCode::Ok);

        // graph-supplied inputs additionally need the current token
        a.set_graph_supplied(true);
        a.set_token_id(7);
        assert_eq!(cell.process_at(3).unwrap(), ReturnCode::DoOver);
        assert_eq!(cell.process_at(7).unwrap(), ReturnCode::Ok);
    }

    #[test]
    fn smart_reexecution_skips_unchanged_inputs() {
        let cell = Cell::new(Doubler);
        cell.declare_io().unwrap();
        cell.inputs.put("a", 1i64).unwrap();
        cell.process().unwrap();
        assert!(!cell.needs_process());
        cell.inputs.put("a", 2i64).unwrap();
        assert!(cell.needs_process());
    }

    #[test]
    fn skipped_process_restamps_outputs() {
        let cell = Cell::new(Doubler);
        cell.declare_io().unwrap();
        cell.inputs.put("a", 1i64).unwrap();
        cell.process_at(0).unwrap();
        assert_eq!(cell.outputs.sock("out").unwrap().token_id(), 0);
        assert!(!cell.needs_process());
        // nothing changed: the unit is skipped but the token advances
        cell.process_at(1).unwrap();
        assert_eq!(cell.outputs.sock("out").unwrap().token_id(), 1);
        assert_eq!(cell.outputs.get::<i64>("out").unwrap(), 2);
    }

    #[test]
    fn clones_copy_values_but_not_flags() {
        let cell = Cell::new(Doubler);
        cell.declare_io().unwrap();
        cell.inputs.put("a", 5i64).unwrap();
        let a = cell.inputs.sock("a").unwrap();
        a.set_required(true);
        a.set_token_id(4);

        let clone = cell.clone_cell().unwrap();
        let cloned_a = clone.inputs.sock("a").unwrap();
        assert_eq!(cloned_a.get::<i64>().unwrap(), 5);
        assert!(!cloned_a.required());
        assert_eq!(cloned_a.token_id(), NO_TOKEN);
        assert!(!clone.configured());
    }

    #[test]
    fn return_codes_round_trip() {
        assert_eq!(ReturnCode::from_i32(0), ReturnCode::Ok);
        assert_eq!(ReturnCode::from_i32(2), ReturnCode::DoOver);
        assert_eq!(ReturnCode::from_i32(3), ReturnCode::Break);
        assert_eq!(ReturnCode::from_i32(42), ReturnCode::User(42));
        assert_eq!(ReturnCode::User(42).to_i32(), 42);
        assert_eq!(ReturnCode::Quit.to_i32(), 1);
    }
}
