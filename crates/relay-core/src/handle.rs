//! Typed views over shared sockets.
//!
//! A [`Handle<T>`] is a socket reference checked once, at construction,
//! to hold values of type `T`. Cells keep handles to their own sockets
//! so `process` can read and write without string lookups.

use std::marker::PhantomData;

use crate::error::{Error, Result};
use crate::socket::SocketRef;
use crate::value::{SocketValue, Value};

/// A type-checked handle to a socket.
pub struct Handle<T: SocketValue> {
    socket: SocketRef,
    _marker: PhantomData<fn() -> T>,
}

impl<T: SocketValue> Handle<T> {
    /// Wrap a socket, verifying it holds `T`.
    pub fn new(socket: SocketRef) -> Result<Self> {
        if !socket.is_type::<T>() {
            return Err(Error::TypeMismatch {
                from: socket.type_name().to_string(),
                to: Value::type_name_of::<T>().to_string(),
            });
        }
        Ok(Handle {
            socket,
            _marker: PhantomData,
        })
    }

    /// Read the current value.
    pub fn get(&self) -> Result<T> {
        self.socket.get::<T>()
    }

    /// Insertion write (token resets, conversion-free since the type is
    /// pinned).
    pub fn set(&self, value: T) -> Result<()> {
        self.socket.put(value)
    }

    /// Assignment-through-reference write: token and flags untouched.
    pub fn modify(&self, f: impl FnOnce(&mut T)) -> Result<()> {
        self.socket.modify(f)
    }

    pub fn set_default(&self, value: T) -> Result<()> {
        self.socket.set_default(value)
    }

    pub fn set_callback(&self, f: impl Fn(&T) + Send + Sync + 'static) {
        self.socket.set_callback(f);
    }

    pub fn notify(&self) {
        self.socket.notify();
    }

    pub fn dirty(&self) -> bool {
        self.socket.dirty()
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.socket.set_dirty(dirty);
    }

    pub fn has_default(&self) -> bool {
        self.socket.has_default()
    }

    pub fn supplied(&self) -> bool {
        self.socket.supplied()
    }

    pub fn graph_supplied(&self) -> bool {
        self.socket.graph_supplied()
    }

    pub fn token_id(&self) -> i64 {
        self.socket.token_id()
    }

    /// The underlying shared socket.
    pub fn socket(&self) -> &SocketRef {
        &self.socket
    }
}

impl<T: SocketValue> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Handle {
            socket: self.socket.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: SocketValue> TryFrom<SocketRef> for Handle<T> {
    type Error = Error;

    fn try_from(socket: SocketRef) -> Result<Self> {
        Handle::new(socket)
    }
}

impl<T: SocketValue> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Handle").field(&self.socket).finish()
    }
}
