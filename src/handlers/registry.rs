//! # Handler registry.
//!
//! [`HandlerRegistry`] maps protocol names to immutable [`Handler`] records.
//! It is built once during startup discovery and handed to the daemon, which
//! only reads from it afterwards.
//!
//! ## Rules
//! - Protocol names are unique: a second registration fails with `DuplicateHandler`
//! - Schemas must use known type codes and unique parameter names, else `InvalidSchema`
//! - A failed registration leaves the registry untouched

use std::collections::HashMap;
use std::collections::HashSet;
use std::ops::BitOr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::RegistryError;
use crate::handlers::schema::{Param, ParamType};

/// Capability flags of a handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct HandlerFlags(u8);

impl HandlerFlags {
    /// No flags.
    pub const NONE: HandlerFlags = HandlerFlags(0);
    /// The protocol does not operate on a main device.
    pub const NO_DEVICE: HandlerFlags = HandlerFlags(1 << 0);
    /// Interfaces using this protocol start out available.
    pub const INIT_AVAILABLE: HandlerFlags = HandlerFlags(1 << 1);

    /// Returns `true` if all flags in `other` are set.
    #[inline]
    pub fn contains(self, other: HandlerFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for HandlerFlags {
    type Output = HandlerFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        HandlerFlags(self.0 | rhs.0)
    }
}

/// One backend script's self-description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handler {
    name: String,
    script: PathBuf,
    schema: Vec<Param>,
    flags: HandlerFlags,
}

impl Handler {
    /// Protocol name (unique key).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the backend script, as invoked.
    pub fn script(&self) -> &Path {
        &self.script
    }

    /// Declared parameter schema, in declaration order.
    pub fn schema(&self) -> &[Param] {
        &self.schema
    }

    /// Capability flags.
    pub fn flags(&self) -> HandlerFlags {
        self.flags
    }
}

/// Name → handler lookup.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<Handler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler.
    ///
    /// `schema` holds raw `(name, type code)` pairs as declared by the script.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        script: impl Into<PathBuf>,
        schema: Vec<(String, i64)>,
        flags: HandlerFlags,
    ) -> Result<Arc<Handler>, RegistryError> {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(RegistryError::DuplicateHandler { name });
        }

        let schema = parse_schema(&name, schema)?;
        let handler = Arc::new(Handler {
            name: name.clone(),
            script: script.into(),
            schema,
            flags,
        });
        self.handlers.insert(name, Arc::clone(&handler));
        Ok(handler)
    }

    /// Looks up a handler by protocol name.
    pub fn lookup(&self, name: &str) -> Option<Arc<Handler>> {
        self.handlers.get(name).cloned()
    }

    /// Returns sorted list of registered protocol names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

fn parse_schema(handler: &str, raw: Vec<(String, i64)>) -> Result<Vec<Param>, RegistryError> {
    let invalid = |reason: String| RegistryError::InvalidSchema {
        handler: handler.to_string(),
        reason,
    };

    let mut seen = HashSet::with_capacity(raw.len());
    let mut params = Vec::with_capacity(raw.len());
    for (name, code) in raw {
        let Some(kind) = ParamType::from_code(code) else {
            return Err(invalid(format!("parameter {name:?} has unknown type {code}")));
        };
        if !seen.insert(name.clone()) {
            return Err(invalid(format!("parameter {name:?} declared twice")));
        }
        params.push(Param { name, kind });
    }
    Ok(params)
}
