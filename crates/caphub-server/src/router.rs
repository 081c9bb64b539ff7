//! caphub Server Router — resolves the session, then dispatches by method.

use std::sync::Arc;

use caphub_capabilities::{
    CapabilityKind, CapabilityRegistration, CapabilityRegistry, InvocationContext,
};
use caphub_protocol::methods::is_known_method;
use caphub_protocol::{
    extract_message_text, CapError, HandlerResult, Methods, RequestContext,
};
use caphub_transport::{push_channel, PushReceiver, RequestHandler};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::activation::ActivationPolicy;
use crate::config::ServerConfig;
use crate::instance::ServerInstance;
use crate::manager::SessionServerManager;
use crate::notifier::NotificationChannel;
use crate::store::{SessionRecord, SessionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerState {
    Running,
    Shutdown,
}

/// The caphub server — owns the registry, sessions and activation policy.
pub struct CapServer {
    config: ServerConfig,
    registry: Arc<CapabilityRegistry>,
    manager: Arc<SessionServerManager>,
    notifier: NotificationChannel,
    policy: ActivationPolicy,
    state: RwLock<ServerState>,
}

#[derive(Deserialize)]
struct NamedParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Deserialize)]
struct ReadParams {
    uri: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateOptions {
    #[serde(default)]
    complete_on_finish: bool,
}

impl CapServer {
    /// Build a server over `registry` with the default activation rules.
    pub fn new(config: ServerConfig, registry: CapabilityRegistry) -> Self {
        let registry = Arc::new(registry);
        let store = Arc::new(SessionStore::new());
        let manager = SessionServerManager::new(registry.clone(), store);
        let notifier = NotificationChannel::new(manager.clone());
        let policy = ActivationPolicy::new(manager.clone(), notifier.clone()).with_default_rules();

        info!(
            "caphub server ready: {} capabilities ({} dynamic)",
            registry.len(),
            registry.dynamic_names().len()
        );
        Self {
            config,
            registry,
            manager,
            notifier,
            policy,
            state: RwLock::new(ServerState::Running),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<SessionServerManager> {
        &self.manager
    }

    pub fn store(&self) -> &SessionStore {
        self.manager.store()
    }

    pub fn notifier(&self) -> &NotificationChannel {
        &self.notifier
    }

    /// Close sessions that outlived the configured TTL.
    pub fn evict_expired(&self) -> usize {
        self.manager.evict_expired(self.config.session_ttl)
    }

    /// Stop accepting requests and close every session.
    pub fn shutdown(&self) {
        {
            let mut state = self.state.write();
            if *state == ServerState::Shutdown {
                return;
            }
            *state = ServerState::Shutdown;
        }
        info!("Shutting down caphub server...");
        self.manager.close_all();
        info!("caphub server shutdown complete");
    }

    /// Reject requests naming capabilities the registry does not have,
    /// before any session state exists for them.
    fn precheck(&self, method: &str, params: Option<&Value>) -> Result<(), CapError> {
        let (kind, name) = match method {
            Methods::TOOLS_CALL => (CapabilityKind::Tool, parse::<NamedParams>(params)?.name),
            Methods::PROMPTS_GET => (CapabilityKind::Prompt, parse::<NamedParams>(params)?.name),
            Methods::RESOURCES_READ => (CapabilityKind::Resource, parse::<ReadParams>(params)?.uri),
            _ => return Ok(()),
        };
        match self.registry.lookup(&name) {
            Some(reg) if reg.kind() == kind => Ok(()),
            _ => Err(not_found(kind, &name)),
        }
    }

    async fn dispatch(
        &self,
        record: SessionRecord,
        instance: Arc<ServerInstance>,
        method: &str,
        params: Option<Value>,
    ) -> HandlerResult {
        let session_id = record.id.clone();
        match method {
            Methods::INITIALIZE => Ok(json!({
                "protocolVersion": self.config.protocol_version,
                "serverInfo": {
                    "name": self.config.server_name,
                    "version": self.config.server_version,
                },
                "capabilities": {
                    "tools": { "listChanged": true },
                    "resources": {},
                    "prompts": {},
                },
                "sessionId": session_id,
            })),
            Methods::PING | Methods::NOTIFICATIONS_INITIALIZED => Ok(json!({})),

            Methods::TOOLS_LIST => Ok(json!({ "tools": listings(&instance, CapabilityKind::Tool) })),
            Methods::RESOURCES_LIST => {
                Ok(json!({ "resources": listings(&instance, CapabilityKind::Resource) }))
            }
            Methods::PROMPTS_LIST => {
                Ok(json!({ "prompts": listings(&instance, CapabilityKind::Prompt) }))
            }

            Methods::TOOLS_CALL => {
                let p: NamedParams = parse(params.as_ref())?;
                let value = invoke(&record, &instance, CapabilityKind::Tool, &p.name, p.arguments).await?;
                Ok(json!({
                    "content": [{ "type": "text", "text": value.to_string() }],
                    "structuredContent": value,
                }))
            }
            Methods::RESOURCES_READ => {
                let p: ReadParams = parse(params.as_ref())?;
                invoke(&record, &instance, CapabilityKind::Resource, &p.uri, Value::Null).await
            }
            Methods::PROMPTS_GET => {
                let p: NamedParams = parse(params.as_ref())?;
                invoke(&record, &instance, CapabilityKind::Prompt, &p.name, p.arguments).await
            }

            Methods::GENERATE => self.generate(&session_id, &instance, params),
            Methods::SESSION_PROGRESS => Ok(json!({
                "sessionId": session_id,
                "progress": self.store().last_progress(&session_id),
            })),
            Methods::SESSION_INFO => Ok(self
                .store()
                .get(&session_id)
                .unwrap_or(record)
                .info()),

            _ => Err(CapError::method_not_found(method)),
        }
    }

    /// Inspect the message, widen the session if it triggers, and report progress.
    fn generate(
        &self,
        session_id: &str,
        instance: &ServerInstance,
        params: Option<Value>,
    ) -> HandlerResult {
        let text = extract_message_text(params.as_ref());
        let options: GenerateOptions = params
            .and_then(|p| serde_json::from_value(p).ok())
            .unwrap_or_default();

        self.notifier
            .send_progress(session_id, "received", 0.0, "Message received");
        let outcome = self.policy.analyze(session_id, &text);
        debug!("Session {session_id}: activation outcome {outcome:?}");
        self.notifier
            .send_progress(session_id, "analyzed", 50.0, "Message analyzed");
        self.notifier
            .send_progress(session_id, "done", 100.0, "Generation complete");

        let tools: Vec<String> = instance
            .list(CapabilityKind::Tool)
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        let result = json!({
            "text": text,
            "activated": outcome.activated(),
            "tools": tools,
        });

        if options.complete_on_finish {
            self.notifier.send_complete(session_id, true, None);
        }
        Ok(result)
    }
}

impl RequestHandler for CapServer {
    async fn handle_request(
        &self,
        ctx: RequestContext,
        method: &str,
        params: Option<Value>,
    ) -> HandlerResult {
        if *self.state.read() == ServerState::Shutdown {
            return Err(CapError::server_error("Server is shutting down"));
        }
        if !is_known_method(method) {
            return Err(CapError::method_not_found(method));
        }
        self.precheck(method, params.as_ref())?;

        let RequestContext {
            session_id,
            new_session,
            identity,
        } = ctx;
        let record = self.store().get_or_create(&session_id, None, identity);
        let instance = self.manager.get_or_create(&session_id);
        if new_session {
            debug!("New session {session_id} via {method}");
        }

        self.dispatch(record, instance, method, params).await
    }

    fn open_listener(&self, ctx: RequestContext) -> Result<PushReceiver, CapError> {
        if *self.state.read() == ServerState::Shutdown {
            return Err(CapError::server_error("Server is shutting down"));
        }
        let session_id = ctx.session_id;
        let (channel, receiver) = push_channel();
        let channel_id = channel.id();
        self.store().get_or_create(&session_id, Some(channel), ctx.identity);
        let instance = self.manager.get_or_create(&session_id);

        let store = Arc::downgrade(self.manager.store());
        let instance = Arc::downgrade(&instance);
        Ok(receiver.on_close(move || {
            let Some(instance) = instance.upgrade() else {
                return;
            };
            let owned = match store.upgrade().and_then(|s| s.bound_channel(&session_id)) {
                Some(Some(bound)) => bound == channel_id,
                // A newer listen connection replaced this one and went away.
                Some(None) => false,
                None => true,
            };
            if !owned {
                return;
            }
            match instance.shutdown() {
                Ok(()) => info!("Session {session_id}: listen connection closed"),
                Err(e) => debug!("Session {session_id}: {e}"),
            }
        }))
    }

    fn terminate(&self, session_id: &str) {
        self.manager.close(session_id);
    }

    fn session_count(&self) -> usize {
        self.store().len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn parse<T: for<'de> Deserialize<'de>>(params: Option<&Value>) -> Result<T, CapError> {
    let value = params.cloned().unwrap_or_else(|| json!({}));
    serde_json::from_value(value)
        .map_err(|e| CapError::invalid_params(format!("Invalid parameters: {e}")))
}

fn not_found(kind: CapabilityKind, name: &str) -> CapError {
    match kind {
        CapabilityKind::Tool => CapError::tool_not_found(name),
        CapabilityKind::Resource => CapError::resource_not_found(name),
        CapabilityKind::Prompt => CapError::prompt_not_found(name),
    }
}

fn listings(instance: &ServerInstance, kind: CapabilityKind) -> Vec<Value> {
    instance
        .list(kind)
        .iter()
        .map(|r| r.listing())
        .collect()
}

/// Run a capability installed on the session's instance.
///
/// Registered-but-not-granted names are reported as not found. Errors
/// outside the protocol range become `InternalError`.
async fn invoke(
    record: &SessionRecord,
    instance: &ServerInstance,
    kind: CapabilityKind,
    name: &str,
    params: Value,
) -> HandlerResult {
    let registration: Arc<CapabilityRegistration> = instance
        .get(name)
        .filter(|r| r.kind() == kind)
        .ok_or_else(|| not_found(kind, name))?;
    let ctx = InvocationContext::new(record.id.clone(), record.identity.clone());
    registration.invoke(params, &ctx).await.map_err(|e| {
        if e.is_protocol_error() {
            e
        } else {
            warn!("{name} failed in session {}: {e}", record.id);
            CapError::internal(e.message)
        }
    })
}
