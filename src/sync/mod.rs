pub mod lease;
pub mod registry;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoordinatorError, Result};

pub use lease::{LeaseMutex, SyncEvent};
pub use registry::ObjectRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Mutex,
    Event,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectType::Mutex => f.write_str("mutex"),
            ObjectType::Event => f.write_str("event"),
        }
    }
}

/// Declared visibility of a named object, coarsest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectScope {
    Global,
    #[default]
    Script,
    Instance,
}

/// Who is asking: the driver and the script it is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockContext {
    pub client: String,
    pub script: String,
}

impl LockContext {
    pub fn new(client: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            script: script.into(),
        }
    }
}

/// A scope bound to the run that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "owner", rename_all = "lowercase")]
pub enum ScopeKey {
    Global,
    Script(String),
    Instance(String),
}

impl ScopeKey {
    pub fn resolve(scope: ObjectScope, ctx: &LockContext) -> Result<Self> {
        match scope {
            ObjectScope::Global => Ok(ScopeKey::Global),
            ObjectScope::Script => {
                if ctx.script.trim().is_empty() {
                    return Err(CoordinatorError::invalid(
                        "script-scoped objects need a script name",
                    ));
                }
                Ok(ScopeKey::Script(ctx.script.clone()))
            }
            ObjectScope::Instance => {
                if ctx.client.trim().is_empty() {
                    return Err(CoordinatorError::invalid(
                        "instance-scoped objects need a client name",
                    ));
                }
                Ok(ScopeKey::Instance(ctx.client.clone()))
            }
        }
    }

    pub fn scope(&self) -> ObjectScope {
        match self {
            ScopeKey::Global => ObjectScope::Global,
            ScopeKey::Script(_) => ObjectScope::Script,
            ScopeKey::Instance(_) => ObjectScope::Instance,
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKey::Global => f.write_str("global"),
            ScopeKey::Script(script) => write!(f, "script:{}", script),
            ScopeKey::Instance(client) => write!(f, "instance:{}", client),
        }
    }
}

/// Registry key: names are unique within one resolved scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub name: String,
    pub scope: ScopeKey,
}

impl ObjectKey {
    pub fn new(name: impl Into<String>, scope: ScopeKey) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CoordinatorError::invalid("object name must not be empty"));
        }
        Ok(Self { name, scope })
    }

    pub fn global(name: impl Into<String>) -> Result<Self> {
        Self::new(name, ScopeKey::Global)
    }

    pub fn resolve(name: impl Into<String>, scope: ObjectScope, ctx: &LockContext) -> Result<Self> {
        Self::new(name, ScopeKey::resolve(scope, ctx)?)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.scope)
    }
}

#[derive(Debug)]
enum Primitive {
    Mutex(LeaseMutex),
    Event(SyncEvent),
}

/// A named mutex or event brokered by the coordinator.
#[derive(Debug)]
pub struct SyncObject {
    primitive: Primitive,
    parameters: Option<serde_json::Value>,
}

impl SyncObject {
    pub fn new(object_type: ObjectType, name: impl Into<String>) -> Self {
        let primitive = match object_type {
            ObjectType::Mutex => Primitive::Mutex(LeaseMutex::new(name)),
            ObjectType::Event => Primitive::Event(SyncEvent::new(name)),
        };
        Self {
            primitive,
            parameters: None,
        }
    }

    pub fn mutex(name: impl Into<String>) -> Self {
        Self::new(ObjectType::Mutex, name)
    }

    pub fn event(name: impl Into<String>) -> Self {
        Self::new(ObjectType::Event, name)
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn object_type(&self) -> ObjectType {
        match self.primitive {
            Primitive::Mutex(_) => ObjectType::Mutex,
            Primitive::Event(_) => ObjectType::Event,
        }
    }

    pub fn parameters(&self) -> Option<&serde_json::Value> {
        self.parameters.as_ref()
    }

    pub fn as_mutex(&self) -> Option<&LeaseMutex> {
        match &self.primitive {
            Primitive::Mutex(m) => Some(m),
            Primitive::Event(_) => None,
        }
    }

    pub fn as_event(&self) -> Option<&SyncEvent> {
        match &self.primitive {
            Primitive::Event(e) => Some(e),
            Primitive::Mutex(_) => None,
        }
    }
}
