//! Named, insertion-ordered collections of sockets.
//!
//! Each cell owns three of these (parameters, inputs, outputs). The map
//! is interior-mutable so declaration can run through the shared
//! references handed to user code.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use linked_hash_map::LinkedHashMap;

use crate::error::{Error, Result};
use crate::socket::{Socket, SocketRef};
use crate::value::SocketValue;

/// Ordered mapping from socket name to socket.
#[derive(Default)]
pub struct SocketMap {
    slots: Mutex<LinkedHashMap<String, SocketRef>>,
}

impl SocketMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a socket of type `T`. Fails if the name already exists.
    pub fn declare<T: SocketValue>(
        &self,
        name: impl Into<String>,
        doc: impl Into<String>,
    ) -> Result<SocketRef> {
        let socket = Socket::typed::<T>();
        socket.set_doc(doc);
        self.install(name.into(), Arc::new(socket))
    }

    /// Declare a socket of type `T` with a default value; the socket
    /// counts as supplied from the start.
    pub fn declare_with_default<T: SocketValue>(
        &self,
        name: impl Into<String>,
        doc: impl Into<String>,
        default: T,
    ) -> Result<SocketRef> {
        let socket = Socket::with_value(default, doc.into());
        self.install(name.into(), Arc::new(socket))
    }

    /// Declare a second name for an existing socket.
    pub fn declare_alias(&self, name: impl Into<String>, socket: &SocketRef) -> Result<SocketRef> {
        self.install(name.into(), socket.clone())
    }

    fn install(&self, name: String, socket: SocketRef) -> Result<SocketRef> {
        let mut slots = self.lock();
        if let Some(existing) = slots.get(&name) {
            return Err(Error::AlreadyDeclared {
                name,
                type_name: existing.type_name().to_string(),
            });
        }
        slots.insert(name, socket.clone());
        Ok(socket)
    }

    /// Look up a socket by name.
    pub fn sock(&self, name: &str) -> Result<SocketRef> {
        self.lock()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::KeyNotFound(name.to_string()))
    }

    /// Typed read sugar: `map.get::<i64>("a")`.
    pub fn get<T: SocketValue>(&self, name: &str) -> Result<T> {
        self.sock(name)?.get()
    }

    /// Insertion sugar: `map.put("a", 1i64)`.
    pub fn put<T: SocketValue>(&self, name: &str, value: T) -> Result<()> {
        self.sock(name)?.put(value)
    }

    /// Shallow copy: the target shares the same underlying sockets, so
    /// later writes through either map are visible in both. Existing
    /// names are kept.
    pub fn insert_from(&self, other: &SocketMap) {
        let entries = other.entries();
        let mut slots = self.lock();
        for (name, socket) in entries {
            slots.entry(name).or_insert(socket);
        }
    }

    /// Snapshot of (name, socket) pairs in declaration order.
    pub fn entries(&self) -> Vec<(String, SocketRef)> {
        self.lock()
            .iter()
            .map(|(name, socket)| (name.clone(), socket.clone()))
            .collect()
    }

    /// Socket names in declaration order.
    pub fn names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every socket; names become declarable again.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, LinkedHashMap<String, SocketRef>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SocketMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.entries()
                    .iter()
                    .map(|(name, socket)| (name.clone(), socket.type_name())),
            )
            .finish()
    }
}
