//! Process-wide registries.
//!
//! The type registry maps type names to prototype sockets and houses
//! the converter tables; the cell registry is the factory catalog a
//! host or plugin populates with cell prototypes. Both publish each key
//! once: inserts are idempotent and lookups after publication only take
//! a shared read lock.

use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rustc_hash::FxHashMap;

use crate::cell::CellRef;
use crate::convert::{ConvertFn, ConverterSet};
use crate::error::{Error, Result};
use crate::socket::Socket;
use crate::value::{SocketValue, Value};

/// Version integer a plugin library is expected to export; the loader
/// refuses to register plugins built against another engine version.
pub const PLUGIN_API_VERSION: u32 = 1;

/// Registration entry point a plugin library exposes. The plugin is
/// expected to declare and configure each prototype before adding it.
pub type PluginRegisterFn = fn(&CellRegistry) -> Result<()>;

struct TypeEntry {
    prototype: Value,
    converters: ConverterSet,
}

/// Registry of socket prototypes keyed by type name.
#[derive(Default)]
pub struct TypeRegistry {
    entries: RwLock<FxHashMap<&'static str, TypeEntry>>,
}

impl TypeRegistry {
    /// Publish `T` (idempotent) and return the converter set sockets of
    /// that type start with.
    pub fn register<T: SocketValue>(&self) -> ConverterSet {
        let name = Value::type_name_of::<T>();
        if let Some(entry) = self.read().get(name) {
            return entry.converters.clone();
        }
        let prototype = Value::from_typed(T::default());
        let converters = ConverterSet::builtin_for(&prototype);
        self.write()
            .entry(name)
            .or_insert_with(|| TypeEntry {
                prototype,
                converters: converters.clone(),
            })
            .converters
            .clone()
    }

    /// An empty typed socket for a registered type name.
    pub fn get(&self, name: &str) -> Option<Socket> {
        let entries = self.read();
        let entry = entries.get(name)?;
        Some(Socket::from_parts(
            entry.prototype.clone(),
            entry.converters.clone(),
        ))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.read().keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Converter set for an arbitrary value, registering its type on
    /// first sight.
    pub(crate) fn converters_for(&self, value: &Value) -> ConverterSet {
        if value.is_none() {
            return ConverterSet::default();
        }
        let name = value.type_name();
        if let Some(entry) = self.read().get(name) {
            return entry.converters.clone();
        }
        let converters = ConverterSet::builtin_for(value);
        self.write()
            .entry(name)
            .or_insert_with(|| TypeEntry {
                prototype: value.clone(),
                converters: converters.clone(),
            })
            .converters
            .clone()
    }

    /// Install a custom `S -> D` conversion. Sockets that establish
    /// type `D` afterwards pick it up; existing sockets keep the table
    /// they were built with.
    pub fn register_converter<S, D>(&self, f: impl Fn(&S) -> D + Send + Sync + 'static)
    where
        S: SocketValue,
        D: SocketValue,
    {
        self.register::<S>();
        self.register::<D>();
        let src_name = Value::type_name_of::<S>();
        let dst_name = Value::type_name_of::<D>();
        let convert: ConvertFn = Arc::new(move |value: &Value| {
            let source = value.to_typed::<S>().ok_or_else(|| Error::TypeMismatch {
                from: value.type_name().to_string(),
                to: dst_name.to_string(),
            })?;
            Ok(Value::from_typed(f(&source)))
        });
        if let Some(entry) = self.write().get_mut(dst_name) {
            entry.converters.insert(src_name, convert);
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, FxHashMap<&'static str, TypeEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, FxHashMap<&'static str, TypeEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// The process-wide type registry.
pub fn type_registry() -> &'static TypeRegistry {
    static TYPES: OnceLock<TypeRegistry> = OnceLock::new();
    TYPES.get_or_init(TypeRegistry::default)
}

/// Factory catalog of cell prototypes, keyed by unique
/// `"Module::Cell"`-style names.
#[derive(Default)]
pub struct CellRegistry {
    cells: RwLock<FxHashMap<String, CellRef>>,
}

impl CellRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a prototype under a unique name.
    pub fn add_cell(&self, cell: CellRef, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        let mut cells = self.cells.write().unwrap_or_else(|e| e.into_inner());
        if cells.contains_key(&name) {
            return Err(Error::NameCollision(name));
        }
        tracing::debug!(cell = %name, "registered cell prototype");
        cells.insert(name, cell);
        Ok(())
    }

    /// A fresh clone of the prototype registered under `name`.
    pub fn get_cell(&self, name: &str) -> Result<CellRef> {
        let prototype = {
            let cells = self.cells.read().unwrap_or_else(|e| e.into_inner());
            cells
                .get(name)
                .cloned()
                .ok_or_else(|| Error::CellNotFound(name.to_string()))?
        };
        prototype.clone_cell()
    }

    pub fn contains(&self, name: &str) -> bool {
        let cells = self.cells.read().unwrap_or_else(|e| e.into_inner());
        cells.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let cells = self.cells.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<_> = cells.keys().cloned().collect();
        names.sort_unstable();
        names
    }
}

/// The process-wide cell registry handed to plugin registration.
pub fn cell_registry() -> &'static CellRegistry {
    static CELLS: OnceLock<CellRegistry> = OnceLock::new();
    CELLS.get_or_init(CellRegistry::default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, Default, Debug)]
    struct FooBar {
        x: i64,
    }

    #[test]
    fn types_publish_once_and_lookup_by_name() {
        let registry = type_registry();
        registry.register::<i64>();
        registry.register::<String>();
        registry.register::<FooBar>();

        let a = registry.get("i64").unwrap();
        let b = registry.get(std::any::type_name::<FooBar>()).unwrap();
        let c = registry.get("str").unwrap();

        let ta = Socket::with_value(4i64, "");
        let tb = Socket::with_value(FooBar::default(), "");
        let tc = Socket::with_value(String::new(), "");
        assert!(ta.same_type(&a));
        assert!(tb.same_type(&b));
        assert!(tc.same_type(&c));
    }

    #[test]
    fn unknown_names_return_nothing() {
        assert!(type_registry().get("no::such::Type").is_none());
    }

    #[test]
    fn registry_sockets_start_unsupplied() {
        type_registry().register::<f64>();
        let socket = type_registry().get("f64").unwrap();
        assert!(!socket.supplied());
        assert!(socket.is_type::<f64>());
    }

    #[test]
    fn custom_converters_reach_new_sockets() {
        #[derive(Clone, PartialEq, Default, Debug)]
        struct Celsius(f64);
        #[derive(Clone, PartialEq, Default, Debug)]
        struct Fahrenheit(f64);

        type_registry().register_converter::<Celsius, Fahrenheit>(|c| {
            Fahrenheit(c.0 * 9.0 / 5.0 + 32.0)
        });

        let celsius = Socket::with_value(Celsius(100.0), "boiling");
        let fahrenheit = Socket::typed::<Fahrenheit>();
        fahrenheit.copy_from(&celsius).unwrap();
        assert_eq!(fahrenheit.get::<Fahrenheit>().unwrap(), Fahrenheit(212.0));

        // no reverse rule was registered
        assert!(celsius.copy_from(&fahrenheit).is_err());
    }
}
