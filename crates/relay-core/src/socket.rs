//! The socket: one typed, named value slot with observer, dirty and
//! token metadata.
//!
//! Sockets are shared (`Arc<Socket>`) between the owning cell's maps,
//! user-held handles and the scheduler. Each socket carries its own
//! mutex; callbacks are always invoked with the lock released, so a
//! callback may re-enter the socket it was fired from.
//!
//! Three kinds of writes exist, with different token semantics:
//!
//! - **insertion** ([`put`](Socket::put)): conversion rules apply, the
//!   token resets to "no token" (the value is treated as a constant);
//! - **transfer** ([`copy_from`](Socket::copy_from)): conversion rules
//!   apply, the token travels with the value;
//! - **assignment** ([`assign`](Socket::assign)): the whole socket is
//!   copied, flags and token included; observers stay put.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::convert::ConverterSet;
use crate::error::{Error, Result};
use crate::observer::{Event, Observable, Observer};
use crate::registry;
use crate::value::{SocketValue, Value};

/// Token value meaning "no token": the socket's value is a constant
/// rather than the product of a scheduler iteration.
pub const NO_TOKEN: i64 = -1;

/// Shared handle to a socket.
pub type SocketRef = Arc<Socket>;

type TypedCallback = Arc<dyn Fn(&Value) + Send + Sync>;
type UpdateFn = Arc<dyn Fn() + Send + Sync>;
type DisplayFn = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// How the value was last written; drives output token stamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteKind {
    Untouched,
    Insert,
    Transfer,
    Assign,
}

#[derive(Clone)]
struct State {
    value: Value,
    doc: String,
    default: Option<Value>,
    supplied: bool,
    graph_supplied: bool,
    required: bool,
    internal_use: bool,
    dirty: bool,
    fresh: bool,
    token_id: i64,
    version: u64,
    write_kind: WriteKind,
    converters: ConverterSet,
    callback: Option<TypedCallback>,
    updater: Option<UpdateFn>,
    display: Option<DisplayFn>,
}

impl State {
    fn new(value: Value, converters: ConverterSet) -> Self {
        State {
            value,
            doc: String::new(),
            default: None,
            supplied: false,
            graph_supplied: false,
            required: false,
            internal_use: false,
            dirty: false,
            fresh: false,
            token_id: NO_TOKEN,
            version: 0,
            write_kind: WriteKind::Untouched,
            converters,
            callback: None,
            updater: None,
            display: None,
        }
    }
}

#[derive(Clone, Copy)]
enum TokenRule {
    Reset,
    Set(i64),
}

/// A typed value slot.
pub struct Socket {
    state: Mutex<State>,
    observable: Observable,
}

impl Socket {
    /// A none-typed socket: unset and untyped until the first write.
    pub fn unset() -> Socket {
        Socket {
            state: Mutex::new(State::new(Value::None, ConverterSet::default())),
            observable: Observable::new(),
        }
    }

    /// A typed socket holding a default-constructed value that does not
    /// count as supplied.
    pub fn typed<T: SocketValue>() -> Socket {
        let converters = registry::type_registry().register::<T>();
        Socket {
            state: Mutex::new(State::new(Value::from_typed(T::default()), converters)),
            observable: Observable::new(),
        }
    }

    /// A typed socket with an initial value that doubles as its default.
    pub fn with_value<T: SocketValue>(value: T, doc: impl Into<String>) -> Socket {
        let converters = registry::type_registry().register::<T>();
        let value = Value::from_typed(value);
        let mut state = State::new(value.clone(), converters);
        state.doc = doc.into();
        state.default = Some(value);
        state.supplied = true;
        Socket {
            state: Mutex::new(state),
            observable: Observable::new(),
        }
    }

    pub(crate) fn from_parts(value: Value, converters: ConverterSet) -> Socket {
        Socket {
            state: Mutex::new(State::new(value, converters)),
            observable: Observable::new(),
        }
    }

    // ----- type identity -----

    pub fn type_name(&self) -> &'static str {
        self.lock().value.type_name()
    }

    pub fn is_type<T: SocketValue>(&self) -> bool {
        self.type_name() == Value::type_name_of::<T>()
    }

    pub fn same_type(&self, other: &Socket) -> bool {
        self.type_name() == other.type_name()
    }

    /// True while the socket is none-typed.
    pub fn is_unset(&self) -> bool {
        self.lock().value.is_none()
    }

    // ----- reads -----

    /// Exact-typed read. The stored type must be `T`; no conversion.
    pub fn get<T: SocketValue>(&self) -> Result<T> {
        let state = self.lock();
        if state.value.is_none() {
            return Err(Error::NotInitialized(format!(
                "requested {} from an unset socket",
                Value::type_name_of::<T>()
            )));
        }
        state.value.to_typed::<T>().ok_or_else(|| Error::TypeMismatch {
            from: state.value.type_name().to_string(),
            to: Value::type_name_of::<T>().to_string(),
        })
    }

    /// Snapshot of the raw value.
    pub fn value(&self) -> Value {
        self.lock().value.clone()
    }

    /// Extraction into the generic foreign-object type.
    pub fn to_foreign(&self) -> Result<serde_json::Value> {
        let state = self.lock();
        match &state.value {
            Value::Foreign(j) => Ok(j.clone()),
            Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
            Value::Int(i) => Ok(serde_json::json!(*i)),
            Value::Float(f) => Ok(serde_json::json!(*f)),
            Value::Str(s) => Ok(serde_json::Value::String(s.clone())),
            Value::None => Err(Error::NotInitialized(
                "cannot extract a foreign object from an unset socket".into(),
            )),
            other => Err(Error::TypeMismatch {
                from: other.type_name().to_string(),
                to: crate::value::FOREIGN_TYPE.to_string(),
            }),
        }
    }

    // ----- writes -----

    /// Insertion of a plain value. Conversion rules apply; the token is
    /// reset; the update hook fires iff the stored value changed.
    pub fn put<T: SocketValue>(&self, value: T) -> Result<()> {
        let converters = registry::type_registry().register::<T>();
        self.write(
            Value::from_typed(value),
            converters,
            TokenRule::Reset,
            WriteKind::Insert,
        )
    }

    /// Insertion of a raw [`Value`], as [`put`](Socket::put).
    pub fn put_value(&self, value: Value) -> Result<()> {
        let converters = registry::type_registry().converters_for(&value);
        self.write(value, converters, TokenRule::Reset, WriteKind::Insert)
    }

    /// Transfer from another socket: conversion rules apply and the
    /// source's token travels with the value.
    pub fn copy_from(&self, other: &Socket) -> Result<()> {
        let (value, token, converters) = {
            let src = other.lock();
            (src.value.clone(), src.token_id, src.converters.clone())
        };
        self.write(value, converters, TokenRule::Set(token), WriteKind::Transfer)
    }

    /// Full-socket assignment: type, value, flags, token and converter
    /// table are copied. Observers remain attached to `self`.
    pub fn assign(&self, other: &Socket) {
        let source = other.lock().clone();
        let mut state = self.lock();
        let changed = state.value != source.value;
        let version = state.version + 1;
        *state = State {
            fresh: changed,
            version,
            write_kind: WriteKind::Assign,
            ..source
        };
    }

    /// Assignment-through-reference: mutate the stored value in place.
    /// The token id and the supplied flag are left alone.
    pub fn modify<T: SocketValue>(&self, f: impl FnOnce(&mut T)) -> Result<()> {
        let mut state = self.lock();
        if state.value.is_none() {
            return Err(Error::NotInitialized(format!(
                "cannot modify {} in an unset socket",
                Value::type_name_of::<T>()
            )));
        }
        let actual = state.value.type_name().to_string();
        match state.value.downcast_mut::<T>() {
            Some(slot) => f(slot),
            None => {
                return Err(Error::TypeMismatch {
                    from: actual,
                    to: Value::type_name_of::<T>().to_string(),
                });
            }
        }
        state.version += 1;
        Ok(())
    }

    fn write(
        &self,
        incoming: Value,
        adoption_converters: ConverterSet,
        token: TokenRule,
        kind: WriteKind,
    ) -> Result<()> {
        let updater = {
            let mut state = self.lock();
            let stored: Value;
            let mut adopted = None;
            if state.value.is_none() {
                if incoming.is_none()
                    || matches!(incoming, Value::Foreign(serde_json::Value::Null))
                {
                    // A none source, or a foreign null, never establishes
                    // a type on a none-typed destination.
                    state.token_id = match token {
                        TokenRule::Reset => NO_TOKEN,
                        TokenRule::Set(t) => t,
                    };
                    state.write_kind = kind;
                    state.version += 1;
                    return Ok(());
                }
                stored = incoming;
                adopted = Some(adoption_converters);
            } else if incoming.is_none() {
                return Err(Error::TypeMismatch {
                    from: crate::value::NONE_TYPE.to_string(),
                    to: state.value.type_name().to_string(),
                });
            } else if state.value.same_type(&incoming) {
                stored = incoming;
            } else {
                stored = state.converters.convert(&incoming, state.value.type_name())?;
            }
            let changed = state.value != stored;
            state.value = stored;
            if let Some(converters) = adopted {
                state.converters = converters;
            }
            state.supplied = true;
            state.fresh = changed;
            state.version += 1;
            state.token_id = match token {
                TokenRule::Reset => NO_TOKEN,
                TokenRule::Set(t) => t,
            };
            state.write_kind = kind;
            if changed { state.updater.clone() } else { None }
        };
        if let Some(updater) = updater {
            updater();
        }
        Ok(())
    }

    /// True when a transfer from `src` could succeed: same type, an
    /// untyped destination, or a registered converter for the source
    /// type.
    pub fn accepts_from(&self, src: &Socket) -> bool {
        let src_type = src.type_name();
        let state = self.lock();
        if state.value.is_none() {
            return true;
        }
        state.value.type_name() == src_type || state.converters.get(src_type).is_some()
    }

    /// Independent copy: same type, value and flags, fresh observer set.
    pub fn copy(&self) -> Socket {
        let state = self.lock();
        let copied = State {
            value: state.value.clone(),
            doc: state.doc.clone(),
            default: state.default.clone(),
            supplied: state.supplied,
            graph_supplied: state.graph_supplied,
            required: state.required,
            internal_use: state.internal_use,
            dirty: state.dirty,
            fresh: state.fresh,
            token_id: state.token_id,
            version: 0,
            write_kind: WriteKind::Untouched,
            converters: state.converters.clone(),
            callback: state.callback.clone(),
            updater: state.updater.clone(),
            display: state.display.clone(),
        };
        Socket {
            state: Mutex::new(copied),
            observable: Observable::new(),
        }
    }

    // ----- defaults -----

    pub fn has_default(&self) -> bool {
        self.lock().default.is_some()
    }

    /// Install a default value. An unsupplied socket takes the default
    /// as its value and becomes supplied, matching declaration with a
    /// default.
    pub fn set_default<T: SocketValue>(&self, value: T) -> Result<()> {
        let converters = registry::type_registry().register::<T>();
        let incoming = Value::from_typed(value);
        let mut state = self.lock();
        if state.value.is_none() {
            state.value = incoming.clone();
            state.converters = converters;
        } else if !state.value.same_type(&incoming) {
            return Err(Error::BadDefault {
                name: state.doc.clone(),
                message: format!(
                    "default of type {} for a socket of type {}",
                    incoming.type_name(),
                    state.value.type_name()
                ),
            });
        }
        if !state.supplied {
            state.value = incoming.clone();
            state.supplied = true;
        }
        state.default = Some(incoming);
        Ok(())
    }

    pub fn default_value(&self) -> Option<Value> {
        self.lock().default.clone()
    }

    // ----- flags -----

    pub fn dirty(&self) -> bool {
        self.lock().dirty
    }

    /// Dirtiness is explicit: this is the only way dirty becomes true.
    pub fn set_dirty(&self, dirty: bool) {
        self.lock().dirty = dirty;
    }

    pub fn supplied(&self) -> bool {
        self.lock().supplied
    }

    pub fn graph_supplied(&self) -> bool {
        self.lock().graph_supplied
    }

    pub fn set_graph_supplied(&self, graph_supplied: bool) {
        self.lock().graph_supplied = graph_supplied;
    }

    pub fn required(&self) -> bool {
        self.lock().required
    }

    pub fn set_required(&self, required: bool) {
        self.lock().required = required;
    }

    pub fn internal_use(&self) -> bool {
        self.lock().internal_use
    }

    pub fn set_internal_use(&self, internal_use: bool) {
        self.lock().internal_use = internal_use;
    }

    /// True when the last write changed the stored value.
    pub fn is_new(&self) -> bool {
        self.lock().fresh
    }

    // ----- token -----

    pub fn token_id(&self) -> i64 {
        self.lock().token_id
    }

    pub fn set_token_id(&self, token_id: i64) {
        self.lock().token_id = token_id;
    }

    /// Monotonic write counter; every value write bumps it.
    pub fn version(&self) -> u64 {
        self.lock().version
    }

    pub(crate) fn write_kind(&self) -> WriteKind {
        self.lock().write_kind
    }

    pub(crate) fn clear_write_kind(&self) {
        self.lock().write_kind = WriteKind::Untouched;
    }

    // ----- doc & display -----

    pub fn doc(&self) -> String {
        self.lock().doc.clone()
    }

    pub fn set_doc(&self, doc: impl Into<String>) {
        self.lock().doc = doc.into();
    }

    /// Install a human-readable formatter for the stored value.
    pub fn set_display(&self, f: impl Fn(&Value) -> String + Send + Sync + 'static) {
        self.lock().display = Some(Arc::new(f));
    }

    /// Format the current value through the display hook, if any.
    pub fn display(&self) -> Option<String> {
        let (display, value) = {
            let state = self.lock();
            (state.display.clone(), state.value.clone())
        };
        display.map(|d| d(&value))
    }

    // ----- callbacks & notification -----

    /// Typed callback fired by [`notify`](Socket::notify) while dirty.
    pub fn set_callback<T: SocketValue>(&self, f: impl Fn(&T) + Send + Sync + 'static) {
        let wrapped: TypedCallback = Arc::new(move |value: &Value| {
            if let Some(typed) = value.to_typed::<T>() {
                f(&typed);
            }
        });
        self.lock().callback = Some(wrapped);
    }

    /// Update hook fired whenever a write changes the stored value, and
    /// again on notify.
    pub fn set_updater(&self, f: impl Fn() + Send + Sync + 'static) {
        self.lock().updater = Some(Arc::new(f));
    }

    /// If dirty: fire the typed callback with the current value, fire
    /// the update hook, clear dirty. No-op on a clean socket.
    pub fn notify(&self) {
        let (callback, updater, value) = {
            let mut state = self.lock();
            if !state.dirty {
                return;
            }
            state.dirty = false;
            (state.callback.clone(), state.updater.clone(), state.value.clone())
        };
        if let Some(callback) = callback {
            callback(&value);
        }
        if let Some(updater) = updater {
            updater();
        }
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

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Socket")
            .field("type", &state.value.type_name())
            .field("supplied", &state.supplied)
            .field("dirty", &state.dirty)
            .field("token_id", &state.token_id)
            .finish()
    }
}
