//! The token-driven execution engine.
//!
//! A scheduler drives a circuit through pids 0..N-1. Execution is
//! organized in *waves*: each wave snapshots the set of cells whose
//! next pid is still due and whose graph-supplied inputs already carry
//! the matching token, fires them concurrently, then transfers outputs
//! along edges serially. Deferred transfer gives every consumer a
//! consistent pre-wave view and lets tokens pipeline through the graph:
//! a producer can advance to pid n+1 in the same wave its consumer
//! handles pid n.
//!
//! Cells whose tokens never arrive are passively *waiting*; when a wave
//! fires nothing and no cell is actively asking for a retry, the
//! waiting cells are declared blocked for the run and the run finishes
//! without error. A cell-returned [`ReturnCode::DoOver`] is an *active*
//! retry request and keeps the run sweeping until something else breaks
//! the loop.

use std::sync::Arc;

use rayon::prelude::*;

use crate::cell::{CellRef, ReturnCode};
use crate::circuit::Circuit;
use crate::error::Result;
use crate::socket::{NO_TOKEN, SocketRef};

/// Executor over one circuit.
///
/// The plan is captured lazily when a run starts, so the circuit may be
/// edited freely between runs.
pub struct Scheduler {
    circuit: Arc<Circuit>,
    debug: bool,
    run: Option<Run>,
    finished: bool,
}

struct Transfer {
    src: SocketRef,
    dst: SocketRef,
}

struct Run {
    iterations: i64,
    cells: Vec<CellRef>,
    outgoing: Vec<Vec<Transfer>>,
    next_pid: Vec<i64>,
    active: Vec<bool>,
    quit: bool,
}

impl Run {
    fn drained(&self) -> bool {
        self.next_pid
            .iter()
            .all(|&pid| pid >= self.iterations)
    }

    fn any_active_pending(&self) -> bool {
        self.active
            .iter()
            .zip(&self.next_pid)
            .any(|(&active, &pid)| active && pid < self.iterations)
    }
}

#[derive(Default)]
struct WaveOutcome {
    progressed: bool,
    broke: bool,
}

impl Scheduler {
    pub fn new(circuit: Arc<Circuit>) -> Scheduler {
        Scheduler {
            circuit,
            debug: false,
            run: None,
            finished: false,
        }
    }

    /// Enable stepwise debugging: each `execute` call performs a single
    /// wave and run state persists across calls until the plan drains.
    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// True while a run is in flight (between `execute` calls in debug
    /// mode).
    pub fn running(&self) -> bool {
        self.run.is_some()
    }

    /// True while the requested iteration count has not been drained.
    pub fn executing(&self) -> bool {
        self.run.is_some()
    }

    /// True once the last run ended, by draining, blocking, quit or
    /// break.
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// The lowest pid still in flight, or -1 when idle.
    pub fn pid(&self) -> i64 {
        let Some(run) = &self.run else {
            return NO_TOKEN;
        };
        run.next_pid
            .iter()
            .copied()
            .filter(|&pid| pid < run.iterations)
            .min()
            .unwrap_or(NO_TOKEN)
    }

    /// Drive the circuit for `iterations` pids (one wave per call in
    /// debug mode). A fresh run starts from pid 0 whenever the previous
    /// one has ended.
    pub fn execute(&mut self, iterations: u64) -> Result<()> {
        if self.run.is_none() {
            self.run = Some(self.plan(iterations as i64)?);
            self.finished = false;
            tracing::debug!(iterations, debug = self.debug, "run started");
        }
        match self.drive() {
            Ok(()) => Ok(()),
            Err(error) => {
                // the run is poisoned; the next execute starts fresh
                self.run = None;
                Err(error)
            }
        }
    }

    fn drive(&mut self) -> Result<()> {
        loop {
            let outcome = match self.run.as_mut() {
                Some(run) => Self::wave(run)?,
                None => return Ok(()),
            };
            let run = match self.run.as_ref() {
                Some(run) => run,
                None => return Ok(()),
            };
            let over = outcome.broke
                || run.quit
                || run.drained()
                || (!outcome.progressed && !run.any_active_pending());
            if over {
                tracing::debug!(
                    broke = outcome.broke,
                    quit = run.quit,
                    drained = run.drained(),
                    "run finished"
                );
                self.run = None;
                self.finished = true;
                return Ok(());
            }
            if self.debug {
                return Ok(());
            }
            if !outcome.progressed {
                // only active retries remain: a user-land loop
                std::thread::yield_now();
            }
        }
    }

    /// One sweep: fire every token-ready cell, then transfer outputs.
    fn wave(run: &mut Run) -> Result<WaveOutcome> {
        let ready: Vec<usize> = (0..run.cells.len())
            .filter(|&index| run.next_pid[index] < run.iterations)
            .filter(|&index| token_ready(&run.cells[index], run.next_pid[index]))
            .collect();

        let mut outcome = WaveOutcome::default();
        if ready.is_empty() {
            return Ok(outcome);
        }

        let cells = &run.cells;
        let pids = &run.next_pid;
        let fired: Vec<(usize, Result<ReturnCode>)> = ready
            .par_iter()
            .map(|&index| (index, cells[index].process_at(pids[index])))
            .collect();

        for (index, result) in fired {
            let code = result?;
            match code {
                ReturnCode::DoOver => {
                    run.active[index] = true;
                }
                ReturnCode::Break => {
                    tracing::debug!(cell = %run.cells[index].name(), "break requested");
                    outcome.broke = true;
                }
                ReturnCode::Quit => {
                    tracing::debug!(cell = %run.cells[index].name(), "quit requested");
                    transfer_outputs(run, index)?;
                    run.next_pid[index] = run.iterations;
                    run.quit = true;
                    outcome.progressed = true;
                }
                ReturnCode::Ok | ReturnCode::Unknown | ReturnCode::User(_) => {
                    if code != ReturnCode::Ok {
                        tracing::debug!(
                            cell = %run.cells[index].name(),
                            code = code.to_i32(),
                            "non-standard return code recorded"
                        );
                    }
                    run.active[index] = false;
                    transfer_outputs(run, index)?;
                    run.next_pid[index] += 1;
                    outcome.progressed = true;
                }
            }
        }
        Ok(outcome)
    }

    fn plan(&self, iterations: i64) -> Result<Run> {
        let cells = self.circuit.topological_order();
        let edges = self.circuit.edges();
        let mut outgoing: Vec<Vec<Transfer>> = (0..cells.len()).map(|_| Vec::new()).collect();
        for edge in edges {
            let Some(index) = cells.iter().position(|c| Arc::ptr_eq(c, &edge.src)) else {
                continue;
            };
            let src = edge.src.outputs.sock(&edge.src_socket)?;
            let dst = edge.dst.inputs.sock(&edge.dst_socket)?;
            outgoing[index].push(Transfer { src, dst });
        }
        let count = cells.len();
        Ok(Run {
            iterations,
            cells,
            outgoing,
            next_pid: vec![0; count],
            active: vec![false; count],
            quit: false,
        })
    }
}

/// All graph-supplied inputs carry the token for this pid.
fn token_ready(cell: &CellRef, pid: i64) -> bool {
    cell.inputs
        .entries()
        .iter()
        .all(|(_, socket)| !socket.graph_supplied() || socket.token_id() == pid)
}

/// Copy a fired cell's outputs along its edges, preserving tokens, and
/// notify each destination.
fn transfer_outputs(run: &Run, index: usize) -> Result<()> {
    for transfer in &run.outgoing[index] {
        transfer.dst.copy_from(&transfer.src)?;
        transfer.dst.set_dirty(true);
        transfer.dst.notify();
    }
    Ok(())
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("debug", &self.debug)
            .field("running", &self.running())
            .field("finished", &self.finished)
            .finish()
    }
}
