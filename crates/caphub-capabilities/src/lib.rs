//! caphub Capabilities
//!
//! Each capability implements the `Capability` trait and is registered with
//! the `CapabilityRegistry` under a unique name, tagged as a tool, resource,
//! or prompt and as static (always on) or dynamic (granted per session).

pub mod analysis;
pub mod catalog;
pub mod contract;
pub mod documents;
pub mod prompts;
pub mod registry;

use std::future::Future;
use std::pin::Pin;

use caphub_protocol::{HandlerResult, Identity};
use serde::Deserialize;
use serde_json::Value;

pub use catalog::default_registry;
pub use contract::ParamContract;
pub use registry::{
    Activation, CapabilityKind, CapabilityRegistration, CapabilityRegistry, CapabilityTarget,
    Descriptor, RegistryError,
};

/// Session-scoped context handed to every capability invocation.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    pub session_id: String,
    pub identity: Option<Identity>,
}

impl InvocationContext {
    pub fn new(session_id: impl Into<String>, identity: Option<Identity>) -> Self {
        Self {
            session_id: session_id.into(),
            identity,
        }
    }
}

/// Trait implemented by every invocable capability.
///
/// `params` has already been checked against the registration's contract.
pub trait Capability: Send + Sync {
    fn invoke(
        &self,
        params: Value,
        ctx: &InvocationContext,
    ) -> impl Future<Output = HandlerResult> + Send;
}

/// Object-safe version of `Capability` so registrations can be stored by name.
pub(crate) trait CapabilityDyn: Send + Sync {
    fn invoke_dyn<'a>(
        &'a self,
        params: Value,
        ctx: &'a InvocationContext,
    ) -> Pin<Box<dyn Future<Output = HandlerResult> + Send + 'a>>;
}

impl<T: Capability> CapabilityDyn for T {
    fn invoke_dyn<'a>(
        &'a self,
        params: Value,
        ctx: &'a InvocationContext,
    ) -> Pin<Box<dyn Future<Output = HandlerResult> + Send + 'a>> {
        Box::pin(self.invoke(params, ctx))
    }
}

/// Adapter turning a synchronous closure into a capability.
pub struct FnCapability<F>(pub F);

impl<F> Capability for FnCapability<F>
where
    F: Fn(Value, &InvocationContext) -> HandlerResult + Send + Sync,
{
    async fn invoke(&self, params: Value, ctx: &InvocationContext) -> HandlerResult {
        (self.0)(params, ctx)
    }
}

pub(crate) fn parse_params<T: for<'de> Deserialize<'de>>(
    params: Value,
) -> Result<T, caphub_protocol::CapError> {
    serde_json::from_value(params).map_err(|e| {
        caphub_protocol::CapError::invalid_params(format!("Invalid parameters: {e}"))
    })
}
