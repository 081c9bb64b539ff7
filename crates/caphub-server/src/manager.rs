//! Session server manager — one `ServerInstance` per live session.
//!
//! Every instance gets a close callback when it is created. Whatever ends
//! the session (explicit termination, completion, a dropped listen
//! connection, the eviction sweep) goes through `ServerInstance::shutdown`,
//! which runs that callback, which runs `teardown`. There is no second
//! cleanup path.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use caphub_capabilities::CapabilityRegistry;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::instance::ServerInstance;
use crate::store::SessionStore;

pub struct SessionServerManager {
    this: Weak<SessionServerManager>,
    registry: Arc<CapabilityRegistry>,
    store: Arc<SessionStore>,
    instances: RwLock<HashMap<String, Arc<ServerInstance>>>,
}

impl SessionServerManager {
    pub fn new(registry: Arc<CapabilityRegistry>, store: Arc<SessionStore>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            registry,
            store,
            instances: RwLock::new(HashMap::new()),
        })
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Return the session's instance, creating it on first access.
    ///
    /// A new instance receives every static registration and a close callback
    /// wired to `teardown`. An existing instance is returned untouched.
    pub fn get_or_create(&self, session_id: &str) -> Arc<ServerInstance> {
        if let Some(instance) = self.instances.read().get(session_id) {
            return instance.clone();
        }

        let mut instances = self.instances.write();
        if let Some(instance) = instances.get(session_id) {
            return instance.clone();
        }

        let instance = Arc::new(ServerInstance::new(session_id));
        let applied = self.registry.apply_static_to(instance.as_ref());

        let manager = self.this.clone();
        let weak_instance = Arc::downgrade(&instance);
        let id = session_id.to_string();
        instance.binding().on_closed(move || {
            if let (Some(manager), Some(instance)) = (manager.upgrade(), weak_instance.upgrade()) {
                manager.teardown(&id, &instance);
            }
        });

        instances.insert(session_id.to_string(), instance.clone());
        info!("Session instance created: {session_id} ({applied} static capabilities)");
        instance
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<ServerInstance>> {
        self.instances.read().get(session_id).cloned()
    }

    /// Grant dynamic capabilities to a live session.
    ///
    /// Unknown or non-dynamic names are skipped with a warning; names the
    /// session already has are skipped silently. Returns true iff at least
    /// one capability was newly granted.
    pub fn enable_dynamic<S: AsRef<str>>(&self, session_id: &str, names: &[S]) -> bool {
        let Some(instance) = self.get(session_id) else {
            warn!("enable_dynamic: no instance for session {session_id}");
            return false;
        };

        let mut added = Vec::new();
        for name in names.iter().map(AsRef::as_ref) {
            let Some(registration) = self.registry.lookup(name) else {
                warn!("enable_dynamic: unknown capability {name} (session {session_id})");
                continue;
            };
            if !registration.is_dynamic() {
                warn!("enable_dynamic: {name} is not dynamic (session {session_id})");
                continue;
            }
            if instance.grant(registration) {
                added.push(name);
            }
        }

        if added.is_empty() {
            debug!("enable_dynamic: nothing new for session {session_id}");
            return false;
        }
        self.store.record_enabled(session_id, added.iter().copied());
        info!("Session {session_id}: enabled {}", added.join(", "));
        true
    }

    /// End a session. Unknown ids are a no-op; shutdown failures are logged.
    pub fn close(&self, session_id: &str) {
        let Some(instance) = self.get(session_id) else {
            // A record can exist before its instance does.
            self.store.delete(session_id);
            return;
        };
        if let Err(e) = instance.shutdown() {
            warn!("Session {session_id}: shutdown failed: {e}");
        }
        // Idempotent when the close callback already ran.
        self.teardown(session_id, &instance);
    }

    /// Close every tracked session. Used at process shutdown.
    pub fn close_all(&self) {
        let ids: Vec<String> = self.instances.read().keys().cloned().collect();
        let count = ids.len();
        for id in ids {
            self.close(&id);
        }
        for id in self.store.ids() {
            self.store.delete(&id);
        }
        info!("Closed {count} session instances");
    }

    /// Close every instance older than `ttl`. Returns how many were closed.
    pub fn evict_expired(&self, ttl: Duration) -> usize {
        let expired: Vec<String> = self
            .instances
            .read()
            .iter()
            .filter(|(_, instance)| instance.age() >= ttl)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            info!("Session {id}: evicted after {}s", ttl.as_secs());
            self.close(id);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }

    /// The single cleanup routine. Only removes `instance` if it is still
    /// the one registered under `session_id`.
    fn teardown(&self, session_id: &str, instance: &Arc<ServerInstance>) {
        let removed = {
            let mut instances = self.instances.write();
            match instances.get(session_id) {
                Some(current) if Arc::ptr_eq(current, instance) => instances.remove(session_id),
                _ => None,
            }
        };
        if removed.is_none() {
            return;
        }
        instance.clear();
        self.store.delete(session_id);
        info!("Session closed: {session_id}");
    }
}
