//! Shared cell fixtures for the integration suite.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use relay_core::{Cell, CellRef, Event, Observer, Result, ReturnCode, SocketMap, Unit};

/// Observer that remembers whether it was updated.
#[derive(Default)]
pub struct TestObserver {
    updated: AtomicBool,
}

impl TestObserver {
    pub fn updated(&self) -> bool {
        self.updated.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.updated.store(false, Ordering::SeqCst);
    }
}

impl Observer for TestObserver {
    fn update(&self, _event: Event) {
        self.updated.store(true, Ordering::SeqCst);
    }
}

/// Adds or subtracts two integers depending on the `minus` parameter.
#[derive(Clone, Default)]
pub struct Operation {
    minus: bool,
}

impl Unit for Operation {
    fn declare_params(&self, params: &SocketMap) -> Result<()> {
        params.declare_with_default::<bool>("minus", "Subtraction", false)?;
        Ok(())
    }

    fn declare_io(
        &self,
        _params: &SocketMap,
        inputs: &SocketMap,
        outputs: &SocketMap,
    ) -> Result<()> {
        inputs.declare::<i64>("a", "An integer.")?;
        inputs.declare_with_default::<i64>("b", "An integer.", 0)?;
        outputs.declare_with_default::<i64>("ans", "Result of operation.", 0)?;
        Ok(())
    }

    fn configure(
        &mut self,
        params: &SocketMap,
        _inputs: &SocketMap,
        _outputs: &SocketMap,
    ) -> Result<()> {
        self.minus = params.get::<bool>("minus")?;
        Ok(())
    }

    fn process(&mut self, inputs: &SocketMap, outputs: &SocketMap) -> Result<ReturnCode> {
        let a = inputs.get::<i64>("a")?;
        let b = inputs.get::<i64>("b")?;
        outputs.put("ans", if self.minus { a - b } else { a + b })?;
        Ok(ReturnCode::Ok)
    }
}

/// Sums two doubles.
#[derive(Clone, Default)]
pub struct Adder;

impl Unit for Adder {
    fn declare_io(
        &self,
        _params: &SocketMap,
        inputs: &SocketMap,
        outputs: &SocketMap,
    ) -> Result<()> {
        inputs.declare::<f64>("left", "Left operand.")?;
        inputs.declare::<f64>("right", "Right operand.")?;
        outputs.declare::<f64>("out", "Sum of both operands.")?;
        Ok(())
    }

    fn process(&mut self, inputs: &SocketMap, outputs: &SocketMap) -> Result<ReturnCode> {
        outputs.put("out", inputs.get::<f64>("left")? + inputs.get::<f64>("right")?)?;
        Ok(ReturnCode::Ok)
    }
}

/// Sleeps, then reports completion. `link` chains pauses together.
#[derive(Clone, Default)]
pub struct Pause;

impl Unit for Pause {
    fn declare_io(
        &self,
        _params: &SocketMap,
        inputs: &SocketMap,
        outputs: &SocketMap,
    ) -> Result<()> {
        inputs.declare_with_default::<i64>("milliseconds", "Number of milliseconds to pause", 0)?;
        inputs
            .declare_with_default::<bool>("link", "Connection to prior node", false)?
            .set_required(true);
        outputs.declare_with_default::<bool>("done", "Connector to next node", false)?;
        Ok(())
    }

    fn process(&mut self, inputs: &SocketMap, outputs: &SocketMap) -> Result<ReturnCode> {
        let ms = inputs.get::<i64>("milliseconds")?;
        std::thread::sleep(Duration::from_millis(ms.max(0) as u64));
        outputs.put("done", true)?;
        Ok(ReturnCode::Ok)
    }
}

/// Sleeps and produces nothing.
#[derive(Clone, Default)]
pub struct Sleeper;

impl Unit for Sleeper {
    fn declare_io(
        &self,
        _params: &SocketMap,
        inputs: &SocketMap,
        _outputs: &SocketMap,
    ) -> Result<()> {
        inputs.declare_with_default::<i64>("milliseconds", "Number of milliseconds to sleep.", 0)?;
        Ok(())
    }

    fn process(&mut self, inputs: &SocketMap, _outputs: &SocketMap) -> Result<ReturnCode> {
        let ms = inputs.get::<i64>("milliseconds")?;
        std::thread::sleep(Duration::from_millis(ms.max(0) as u64));
        Ok(ReturnCode::Ok)
    }
}

/// Never writes `done`; returns whatever code `ret` holds. The `a`
/// input is marked graph-supplied at declaration, so the cell stays
/// gated until an upstream token arrives.
#[derive(Clone, Default)]
pub struct NeverOutput;

impl Unit for NeverOutput {
    fn declare_io(
        &self,
        _params: &SocketMap,
        inputs: &SocketMap,
        outputs: &SocketMap,
    ) -> Result<()> {
        let a = inputs.declare::<bool>("a", "Dont connect me")?;
        a.set_required(true);
        a.set_graph_supplied(true);
        inputs.declare_with_default::<i64>("ret", "Return code", 0)?;
        outputs.declare_with_default::<bool>("done", "Dont put anything here", false)?;
        outputs.declare_with_default::<bool>("link", "Put something here to continue", false)?;
        Ok(())
    }

    fn process(&mut self, inputs: &SocketMap, outputs: &SocketMap) -> Result<ReturnCode> {
        outputs.put("link", true)?;
        Ok(ReturnCode::from_i32(inputs.get::<i64>("ret")? as i32))
    }
}

/// Writes its outputs through in-place references, so tokens never
/// reset.
#[derive(Clone, Default)]
pub struct RefWriter;

impl Unit for RefWriter {
    fn declare_io(
        &self,
        _params: &SocketMap,
        inputs: &SocketMap,
        outputs: &SocketMap,
    ) -> Result<()> {
        inputs.declare::<f64>("a", "An input.")?;
        outputs.declare::<f64>("primitive", "A primitive assignment.")?;
        outputs.declare::<f64>("socket", "A value assigned from a socket.")?;
        Ok(())
    }

    fn process(&mut self, inputs: &SocketMap, outputs: &SocketMap) -> Result<ReturnCode> {
        let a = inputs.get::<f64>("a")?;
        outputs.sock("primitive")?.modify::<f64>(|v| *v = 2.5)?;
        outputs.sock("socket")?.modify::<f64>(|v| *v = a)?;
        Ok(ReturnCode::Ok)
    }
}

/// Writes its outputs through insertion, so tokens reset or transfer.
#[derive(Clone, Default)]
pub struct InsWriter;

impl Unit for InsWriter {
    fn declare_io(
        &self,
        _params: &SocketMap,
        inputs: &SocketMap,
        outputs: &SocketMap,
    ) -> Result<()> {
        inputs.declare::<f64>("a", "An input.")?;
        outputs.declare::<f64>("primitive", "A primitive insertion.")?;
        outputs.declare::<f64>("socket", "A socket insertion.")?;
        outputs.declare::<f64>("combo", "A calculated insertion.")?;
        Ok(())
    }

    fn process(&mut self, inputs: &SocketMap, outputs: &SocketMap) -> Result<ReturnCode> {
        outputs.put("primitive", 2.5f64)?;
        outputs.sock("socket")?.copy_from(&*inputs.sock("a")?)?;
        outputs.put("combo", inputs.get::<f64>("a")? + 2.5)?;
        Ok(ReturnCode::Ok)
    }
}

/// Emits a greeting.
#[derive(Clone, Default)]
pub struct Greeter;

impl Unit for Greeter {
    fn declare_io(
        &self,
        _params: &SocketMap,
        _inputs: &SocketMap,
        outputs: &SocketMap,
    ) -> Result<()> {
        outputs.declare_with_default::<String>("msg", "Say hello", "Hi there!".to_string())?;
        Ok(())
    }

    fn process(&mut self, _inputs: &SocketMap, outputs: &SocketMap) -> Result<ReturnCode> {
        outputs.put("msg", "Helloooooo!".to_string())?;
        Ok(ReturnCode::Ok)
    }
}

/// Starts an execution-flow chain.
#[derive(Clone, Default)]
pub struct Starter;

impl Unit for Starter {
    fn declare_io(
        &self,
        _params: &SocketMap,
        _inputs: &SocketMap,
        outputs: &SocketMap,
    ) -> Result<()> {
        outputs.declare_with_default::<ReturnCode>(">>", "Execution flow", ReturnCode::Ok)?;
        Ok(())
    }

    fn process(&mut self, _inputs: &SocketMap, outputs: &SocketMap) -> Result<ReturnCode> {
        outputs.put(">>", ReturnCode::Ok)?;
        Ok(ReturnCode::Ok)
    }
}

/// Consumes a message and reports flow status.
#[derive(Clone, Default)]
pub struct Printer {
    pub last: String,
}

impl Unit for Printer {
    fn declare_io(
        &self,
        _params: &SocketMap,
        inputs: &SocketMap,
        outputs: &SocketMap,
    ) -> Result<()> {
        inputs
            .declare_with_default::<ReturnCode>(">>", "Put status here.", ReturnCode::Unknown)?
            .set_required(true);
        inputs.declare_with_default::<String>(
            "msg",
            "Put message here.",
            "Hello World!".to_string(),
        )?;
        outputs.declare_with_default::<ReturnCode>(">>", "Flow out", ReturnCode::Unknown)?;
        Ok(())
    }

    fn process(&mut self, inputs: &SocketMap, outputs: &SocketMap) -> Result<ReturnCode> {
        self.last = inputs.get::<String>("msg")?;
        outputs.put(">>", ReturnCode::Ok)?;
        Ok(ReturnCode::Ok)
    }
}

/// A declared cell, ready to wire up.
pub fn cell_of<U: Unit + Default + 'static>() -> CellRef {
    let cell = Cell::new(U::default());
    cell.declare_params().unwrap();
    cell.declare_io().unwrap();
    cell
}

pub fn operation() -> CellRef {
    cell_of::<Operation>()
}

pub fn adder() -> CellRef {
    cell_of::<Adder>()
}

pub fn pause(milliseconds: i64) -> CellRef {
    let cell = cell_of::<Pause>();
    cell.inputs.put("milliseconds", milliseconds).unwrap();
    cell
}

pub fn never_output(ret: i64) -> CellRef {
    let cell = cell_of::<NeverOutput>();
    cell.inputs.put("ret", ret).unwrap();
    cell
}

pub fn observer() -> Arc<TestObserver> {
    Arc::new(TestObserver::default())
}
