//! Server instances — the live, session-bound capability set.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use caphub_capabilities::{CapabilityKind, CapabilityRegistration, CapabilityTarget};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InstanceError {
    #[error("instance for session {0} is already closed")]
    AlreadyClosed(String),
}

type CloseCallback = Box<dyn FnOnce() + Send>;

/// The instance's end of the session transport.
///
/// Closing is a one-shot event: the first `close` runs the installed
/// callback, every later call reports `AlreadyClosed`.
pub struct TransportBinding {
    session_id: String,
    closed: AtomicBool,
    on_closed: Mutex<Option<CloseCallback>>,
}

impl TransportBinding {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            closed: AtomicBool::new(false),
            on_closed: Mutex::new(None),
        }
    }

    /// Install the callback run when the binding closes. Replaces any earlier one.
    pub fn on_closed(&self, callback: impl FnOnce() + Send + 'static) {
        *self.on_closed.lock() = Some(Box::new(callback));
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn close(&self) -> Result<(), InstanceError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(InstanceError::AlreadyClosed(self.session_id.clone()));
        }
        // Callback runs outside the lock; it may re-enter the manager.
        let callback = self.on_closed.lock().take();
        if let Some(callback) = callback {
            callback();
        }
        Ok(())
    }
}

/// One session's protocol handler state: the capabilities it may invoke.
pub struct ServerInstance {
    session_id: String,
    created_at: Instant,
    capabilities: RwLock<BTreeMap<String, Arc<CapabilityRegistration>>>,
    installs: AtomicUsize,
    binding: TransportBinding,
}

impl ServerInstance {
    pub fn new(session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        Self {
            binding: TransportBinding::new(session_id.clone()),
            session_id,
            created_at: Instant::now(),
            capabilities: RwLock::new(BTreeMap::new()),
            installs: AtomicUsize::new(0),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn binding(&self) -> &TransportBinding {
        &self.binding
    }

    /// Add a capability unless one with the same name is present. True if added.
    pub fn grant(&self, registration: Arc<CapabilityRegistration>) -> bool {
        let mut capabilities = self.capabilities.write();
        if capabilities.contains_key(registration.name()) {
            return false;
        }
        debug!("Session {}: granted {}", self.session_id, registration.name());
        capabilities.insert(registration.name().to_string(), registration);
        self.installs.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn get(&self, name: &str) -> Option<Arc<CapabilityRegistration>> {
        self.capabilities.read().get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.capabilities.read().contains_key(name)
    }

    /// Installed capabilities of one kind, ordered by name.
    pub fn list(&self, kind: CapabilityKind) -> Vec<Arc<CapabilityRegistration>> {
        self.capabilities
            .read()
            .values()
            .filter(|r| r.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.capabilities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.read().is_empty()
    }

    /// Total successful grants over the instance's life.
    pub fn install_count(&self) -> usize {
        self.installs.load(Ordering::Relaxed)
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn is_closed(&self) -> bool {
        self.binding.is_closed()
    }

    /// Close the transport binding, which fires the teardown callback.
    pub fn shutdown(&self) -> Result<(), InstanceError> {
        self.binding.close()
    }

    /// Drop every granted capability.
    pub fn clear(&self) {
        self.capabilities.write().clear();
    }
}

impl CapabilityTarget for ServerInstance {
    fn install(&self, registration: Arc<CapabilityRegistration>) {
        self.grant(registration);
    }
}

impl std::fmt::Debug for ServerInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerInstance")
            .field("session_id", &self.session_id)
            .field("capabilities", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
