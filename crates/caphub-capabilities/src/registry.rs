//! CapabilityRegistry — the process-wide table of capability registrations.
//!
//! Built once at boot and shared read-only (`Arc<CapabilityRegistry>`) by
//! every session. Registration problems are configuration errors and are
//! reported before the server starts accepting connections.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use caphub_protocol::HandlerResult;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::contract::ParamContract;
use crate::{Capability, CapabilityDyn, InvocationContext};

/// What kind of protocol surface a capability is exposed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    Tool,
    Resource,
    Prompt,
}

/// Whether a capability is applied to every new instance or granted later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Static,
    Dynamic,
}

/// Boot-time registration failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("capability name must not be empty")]
    EmptyName,
    #[error("capability {0} is already registered")]
    Duplicate(String),
    #[error("capability {name} has an invalid parameter contract: {reason}")]
    InvalidContract { name: String, reason: String },
}

/// Static description of a capability, before it is registered.
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub kind: CapabilityKind,
    pub name: String,
    pub description: String,
    pub contract: Value,
}

impl Descriptor {
    pub fn tool(name: impl Into<String>, description: impl Into<String>, contract: Value) -> Self {
        Self {
            kind: CapabilityKind::Tool,
            name: name.into(),
            description: description.into(),
            contract,
        }
    }

    /// Resources are addressed by URI and take no parameters.
    pub fn resource(uri: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: CapabilityKind::Resource,
            name: uri.into(),
            description: description.into(),
            contract: ParamContract::empty().schema().clone(),
        }
    }

    pub fn prompt(name: impl Into<String>, description: impl Into<String>, contract: Value) -> Self {
        Self {
            kind: CapabilityKind::Prompt,
            name: name.into(),
            description: description.into(),
            contract,
        }
    }
}

/// An immutable, registered capability.
pub struct CapabilityRegistration {
    name: String,
    kind: CapabilityKind,
    description: String,
    contract: ParamContract,
    activation: Activation,
    handler: Arc<dyn CapabilityDyn>,
}

impl CapabilityRegistration {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CapabilityKind {
        self.kind
    }

    pub fn contract(&self) -> &ParamContract {
        &self.contract
    }

    pub fn is_dynamic(&self) -> bool {
        self.activation == Activation::Dynamic
    }

    /// Validate `params` against the contract, then run the handler.
    pub async fn invoke(&self, params: Value, ctx: &InvocationContext) -> HandlerResult {
        self.contract.validate(&params)?;
        self.handler.invoke_dyn(params, ctx).await
    }

    /// Listing entry as returned by `tools/list`, `resources/list`, `prompts/list`.
    pub fn listing(&self) -> Value {
        match self.kind {
            CapabilityKind::Tool => json!({
                "name": self.name,
                "description": self.description,
                "inputSchema": self.contract.schema(),
            }),
            CapabilityKind::Resource => json!({
                "uri": self.name,
                "description": self.description,
            }),
            CapabilityKind::Prompt => json!({
                "name": self.name,
                "description": self.description,
                "arguments": self.contract.schema().get("properties").cloned().unwrap_or(Value::Null),
            }),
        }
    }
}

impl fmt::Debug for CapabilityRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRegistration")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("activation", &self.activation)
            .finish_non_exhaustive()
    }
}

/// Anything that can receive capabilities projected from the registry.
pub trait CapabilityTarget {
    fn install(&self, registration: Arc<CapabilityRegistration>);
}

/// The registry itself. Append-only: nothing is removed at runtime.
#[derive(Default)]
pub struct CapabilityRegistry {
    entries: HashMap<String, Arc<CapabilityRegistration>>,
    /// Registration order, for stable listings.
    order: Vec<String>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an always-on capability.
    pub fn register_static<C: Capability + 'static>(
        &mut self,
        descriptor: Descriptor,
        handler: C,
    ) -> Result<(), RegistryError> {
        self.register(descriptor, Activation::Static, Arc::new(handler))
    }

    /// Register a capability that is only granted after per-session activation.
    pub fn register_dynamic<C: Capability + 'static>(
        &mut self,
        descriptor: Descriptor,
        handler: C,
    ) -> Result<(), RegistryError> {
        self.register(descriptor, Activation::Dynamic, Arc::new(handler))
    }

    fn register(
        &mut self,
        descriptor: Descriptor,
        activation: Activation,
        handler: Arc<dyn CapabilityDyn>,
    ) -> Result<(), RegistryError> {
        let name = descriptor.name.trim().to_string();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.entries.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        let contract = ParamContract::from_schema(descriptor.contract).map_err(|reason| {
            RegistryError::InvalidContract {
                name: name.clone(),
                reason,
            }
        })?;

        debug!("Registered {:?} capability: {name} ({:?})", descriptor.kind, activation);
        let registration = CapabilityRegistration {
            name: name.clone(),
            kind: descriptor.kind,
            description: descriptor.description,
            contract,
            activation,
            handler,
        };
        self.order.push(name.clone());
        self.entries.insert(name, Arc::new(registration));
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<CapabilityRegistration>> {
        self.entries.get(name).cloned()
    }

    /// Project every static registration onto `target`. Returns how many were applied.
    pub fn apply_static_to<T: CapabilityTarget + ?Sized>(&self, target: &T) -> usize {
        let mut applied = 0;
        for registration in self.iter().filter(|r| !r.is_dynamic()) {
            target.install(registration.clone());
            applied += 1;
        }
        applied
    }

    /// All registrations in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<CapabilityRegistration>> {
        self.order.iter().filter_map(|name| self.entries.get(name))
    }

    pub fn static_count(&self) -> usize {
        self.iter().filter(|r| !r.is_dynamic()).count()
    }

    pub fn dynamic_names(&self) -> Vec<&str> {
        self.iter()
            .filter(|r| r.is_dynamic())
            .map(|r| r.name())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::FnCapability;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl CapabilityTarget for Recorder {
        fn install(&self, registration: Arc<CapabilityRegistration>) {
            self.0.lock().unwrap().push(registration.name().to_string());
        }
    }

    fn echo() -> FnCapability<impl Fn(Value, &InvocationContext) -> HandlerResult + Send + Sync> {
        FnCapability(|params: Value, _ctx: &InvocationContext| Ok(params))
    }

    fn tool(name: &str) -> Descriptor {
        Descriptor::tool(name, "test tool", ParamContract::empty().schema().clone())
    }

    #[test]
    fn static_and_dynamic_are_tagged() {
        let mut registry = CapabilityRegistry::new();
        registry.register_static(tool("a"), echo()).unwrap();
        registry.register_dynamic(tool("b"), echo()).unwrap();

        assert!(!registry.lookup("a").unwrap().is_dynamic());
        assert!(registry.lookup("b").unwrap().is_dynamic());
        assert!(registry.lookup("c").is_none());
        assert_eq!(registry.dynamic_names(), vec!["b"]);
        assert_eq!(registry.static_count(), 1);
    }

    #[test]
    fn apply_static_withholds_dynamic() {
        let mut registry = CapabilityRegistry::new();
        registry.register_static(tool("a"), echo()).unwrap();
        registry.register_dynamic(tool("b"), echo()).unwrap();
        registry.register_static(tool("c"), echo()).unwrap();

        let target = Recorder::default();
        assert_eq!(registry.apply_static_to(&target), 2);
        assert_eq!(*target.0.lock().unwrap(), vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn configuration_errors() {
        let mut registry = CapabilityRegistry::new();
        assert_eq!(
            registry.register_static(tool("  "), echo()),
            Err(RegistryError::EmptyName)
        );

        registry.register_static(tool("a"), echo()).unwrap();
        assert_eq!(
            registry.register_dynamic(tool("a"), echo()),
            Err(RegistryError::Duplicate("a".into()))
        );
        assert!(!registry.lookup("a").unwrap().is_dynamic());

        let bad = Descriptor::tool("bad", "bad contract", json!({"type": "string"}));
        assert!(matches!(
            registry.register_static(bad, echo()),
            Err(RegistryError::InvalidContract { .. })
        ));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn invoke_checks_contract_first() {
        let mut registry = CapabilityRegistry::new();
        let contract = ParamContract::object().required("text", "string", "Input").build();
        registry
            .register_static(Descriptor::tool("echo", "echo", contract), echo())
            .unwrap();
        let registration = registry.lookup("echo").unwrap();
        let ctx = InvocationContext::new("s1", None);

        let err = registration.invoke(json!({}), &ctx).await.unwrap_err();
        assert_eq!(err.code, -32602);

        let ok = registration.invoke(json!({"text": "hi"}), &ctx).await.unwrap();
        assert_eq!(ok["text"], "hi");
    }

    #[test]
    fn listing_shapes() {
        let mut registry = CapabilityRegistry::new();
        registry.register_static(tool("t"), echo()).unwrap();
        registry
            .register_static(Descriptor::resource("docs://x", "a doc"), echo())
            .unwrap();

        assert!(registry.lookup("t").unwrap().listing()["inputSchema"].is_object());
        assert_eq!(registry.lookup("docs://x").unwrap().listing()["uri"], "docs://x");
    }
}
