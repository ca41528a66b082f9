//! Circuits: graphs of cells joined by typed edges.
//!
//! A circuit owns its cells (shared, so a cell may sit in several
//! circuits) and records edges as (cell, socket name) pairs. Fan-out
//! from one output is unrestricted; an input accepts a single driver.
//! Topology may be edited between runs; schedulers snapshot it lazily.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::cell::CellRef;
use crate::error::{Error, Result};
use crate::observer::Event;
use crate::socket::SocketRef;

/// A directed, typed connection between two cell sockets.
#[derive(Clone)]
pub struct Edge {
    pub src: CellRef,
    pub src_socket: String,
    pub dst: CellRef,
    pub dst_socket: String,
}

impl Edge {
    fn joins(&self, src: &CellRef, src_socket: &str, dst: &CellRef, dst_socket: &str) -> bool {
        Arc::ptr_eq(&self.src, src)
            && Arc::ptr_eq(&self.dst, dst)
            && self.src_socket == src_socket
            && self.dst_socket == dst_socket
    }
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.src.name(),
            self.src_socket,
            self.dst.name(),
            self.dst_socket
        )
    }
}

#[derive(Default)]
struct Inner {
    cells: Vec<CellRef>,
    edges: Vec<Edge>,
}

impl Inner {
    fn position(&self, cell: &CellRef) -> Option<usize> {
        self.cells.iter().position(|c| Arc::ptr_eq(c, cell))
    }

    /// True when `from` reaches `to` along existing edges.
    fn reaches(&self, from: &CellRef, to: &CellRef) -> bool {
        if Arc::ptr_eq(from, to) {
            return true;
        }
        let mut queue = vec![from.clone()];
        let mut seen: Vec<CellRef> = Vec::new();
        while let Some(cell) = queue.pop() {
            for edge in self.edges.iter().filter(|e| Arc::ptr_eq(&e.src, &cell)) {
                if Arc::ptr_eq(&edge.dst, to) {
                    return true;
                }
                if !seen.iter().any(|c| Arc::ptr_eq(c, &edge.dst)) {
                    seen.push(edge.dst.clone());
                    queue.push(edge.dst.clone());
                }
            }
        }
        false
    }
}

/// A graph of cells and typed edges.
#[derive(Default)]
pub struct Circuit {
    inner: Mutex<Inner>,
}

impl Circuit {
    /// A fresh, shared circuit.
    pub fn new() -> Arc<Circuit> {
        Arc::new(Circuit::default())
    }

    /// Add a cell; inserting a member again is a no-op.
    pub fn insert(&self, cell: &CellRef) {
        let mut inner = self.lock();
        if inner.position(cell).is_none() {
            tracing::debug!(cell = %cell.name(), "cell inserted");
            inner.cells.push(cell.clone());
        }
    }

    /// Remove a cell and disconnect every incident edge.
    pub fn remove(&self, cell: &CellRef) {
        let incident: Vec<Edge> = {
            let inner = self.lock();
            inner
                .edges
                .iter()
                .filter(|e| Arc::ptr_eq(&e.src, cell) || Arc::ptr_eq(&e.dst, cell))
                .cloned()
                .collect()
        };
        for edge in incident {
            let _ = self.disconnect(&edge.src, &edge.src_socket, &edge.dst, &edge.dst_socket);
        }
        let mut inner = self.lock();
        if let Some(index) = inner.position(cell) {
            tracing::debug!(cell = %cell.name(), "cell removed");
            inner.cells.remove(index);
        }
    }

    /// Join an output socket to an input socket.
    ///
    /// Both sockets must exist, the types must be compatible under the
    /// destination's conversion table, the input must not already have
    /// a driver, and the edge must not close a cycle. On success the
    /// input becomes graph-supplied, inherits the source's current
    /// token, and a `Connected` event fires on the input socket and the
    /// destination cell.
    pub fn connect(
        &self,
        src: &CellRef,
        src_socket: &str,
        dst: &CellRef,
        dst_socket: &str,
    ) -> Result<()> {
        let source = output_socket(src, src_socket)?;
        let target = input_socket(dst, dst_socket)?;
        if !target.accepts_from(&source) {
            return Err(Error::TypeMismatch {
                from: source.type_name().to_string(),
                to: target.type_name().to_string(),
            });
        }
        {
            let mut inner = self.lock();
            if inner
                .edges
                .iter()
                .any(|e| Arc::ptr_eq(&e.dst, dst) && e.dst_socket == dst_socket)
            {
                return Err(Error::AlreadyConnected {
                    cell: dst.name(),
                    socket: dst_socket.to_string(),
                });
            }
            if inner.reaches(dst, src) {
                return Err(Error::CycleDetected {
                    src_cell: src.name(),
                    src_socket: src_socket.to_string(),
                    dst_cell: dst.name(),
                    dst_socket: dst_socket.to_string(),
                });
            }
            inner.edges.push(Edge {
                src: src.clone(),
                src_socket: src_socket.to_string(),
                dst: dst.clone(),
                dst_socket: dst_socket.to_string(),
            });
        }
        target.set_graph_supplied(true);
        target.set_token_id(source.token_id());
        tracing::debug!(
            src = %src.name(), src_socket,
            dst = %dst.name(), dst_socket,
            "connected"
        );
        target.notify_observers(Event::Connected);
        dst.notify_observers(Event::Connected);
        Ok(())
    }

    /// Remove a previously recorded edge.
    pub fn disconnect(
        &self,
        src: &CellRef,
        src_socket: &str,
        dst: &CellRef,
        dst_socket: &str,
    ) -> Result<()> {
        let target = input_socket(dst, dst_socket)?;
        {
            let mut inner = self.lock();
            let index = inner
                .edges
                .iter()
                .position(|e| e.joins(src, src_socket, dst, dst_socket))
                .ok_or_else(|| Error::NotConnected {
                    src_cell: src.name(),
                    src_socket: src_socket.to_string(),
                    dst_cell: dst.name(),
                    dst_socket: dst_socket.to_string(),
                })?;
            inner.edges.remove(index);
        }
        target.set_graph_supplied(false);
        tracing::debug!(
            src = %src.name(), src_socket,
            dst = %dst.name(), dst_socket,
            "disconnected"
        );
        target.notify_observers(Event::Disconnected);
        dst.notify_observers(Event::Disconnected);
        Ok(())
    }

    /// Configure every cell in topological order.
    pub fn configure_all(&self) -> Result<()> {
        for cell in self.topological_order() {
            cell.configure()?;
        }
        Ok(())
    }

    // ----- queries -----

    pub fn cells(&self) -> Vec<CellRef> {
        self.lock().cells.clone()
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.lock().edges.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().cells.is_empty()
    }

    pub fn contains(&self, cell: &CellRef) -> bool {
        self.lock().position(cell).is_some()
    }

    /// Cells feeding an input of `cell`.
    pub fn predecessors(&self, cell: &CellRef) -> Vec<CellRef> {
        let inner = self.lock();
        let mut found: Vec<CellRef> = Vec::new();
        for edge in inner.edges.iter().filter(|e| Arc::ptr_eq(&e.dst, cell)) {
            if !found.iter().any(|c| Arc::ptr_eq(c, &edge.src)) {
                found.push(edge.src.clone());
            }
        }
        found
    }

    /// Cells fed by an output of `cell`.
    pub fn successors(&self, cell: &CellRef) -> Vec<CellRef> {
        let inner = self.lock();
        let mut found: Vec<CellRef> = Vec::new();
        for edge in inner.edges.iter().filter(|e| Arc::ptr_eq(&e.src, cell)) {
            if !found.iter().any(|c| Arc::ptr_eq(c, &edge.dst)) {
                found.push(edge.dst.clone());
            }
        }
        found
    }

    /// Cells with no incoming edges.
    pub fn roots(&self) -> Vec<CellRef> {
        let inner = self.lock();
        inner
            .cells
            .iter()
            .filter(|cell| !inner.edges.iter().any(|e| Arc::ptr_eq(&e.dst, cell)))
            .cloned()
            .collect()
    }

    /// Cells with no outgoing edges.
    pub fn sinks(&self) -> Vec<CellRef> {
        let inner = self.lock();
        inner
            .cells
            .iter()
            .filter(|cell| !inner.edges.iter().any(|e| Arc::ptr_eq(&e.src, cell)))
            .cloned()
            .collect()
    }

    /// Cells sorted so producers come before consumers.
    pub fn topological_order(&self) -> Vec<CellRef> {
        let inner = self.lock();
        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let mut nodes: Vec<NodeIndex> = Vec::with_capacity(inner.cells.len());
        for (index, _) in inner.cells.iter().enumerate() {
            nodes.push(graph.add_node(index));
        }
        for edge in &inner.edges {
            if let (Some(s), Some(d)) = (
                inner.position(&edge.src),
                inner.position(&edge.dst),
            ) {
                graph.add_edge(nodes[s], nodes[d], ());
            }
        }
        match toposort(&graph, None) {
            Ok(sorted) => sorted
                .into_iter()
                .map(|node| inner.cells[graph[node]].clone())
                .collect(),
            // connect() rejects cycles, so sorting cannot fail; fall
            // back to insertion order regardless.
            Err(_) => inner.cells.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Circuit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Circuit")
            .field("cells", &inner.cells.len())
            .field("edges", &inner.edges)
            .finish()
    }
}

fn output_socket(cell: &CellRef, name: &str) -> Result<SocketRef> {
    cell.outputs.sock(name).map_err(|_| Error::UnknownSocket {
        cell: cell.name(),
        socket: name.to_string(),
    })
}

fn input_socket(cell: &CellRef, name: &str) -> Result<SocketRef> {
    cell.inputs.sock(name).map_err(|_| Error::UnknownSocket {
        cell: cell.name(),
        socket: name.to_string(),
    })
}
