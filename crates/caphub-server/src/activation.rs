//! Activation policy — widens a session's capability set from message content.
//!
//! Rules are an ordered list of `{trigger, bundle}` pairs. The policy runs at
//! most once per session: the first message that matches any rule marks the
//! session analyzed and every matching bundle is enabled together.

use std::collections::BTreeSet;
use std::sync::Arc;

use caphub_capabilities::catalog::{ANALYSIS_TOOLS, DOCUMENT_TOOLS};
use tracing::{debug, info};

use crate::manager::SessionServerManager;
use crate::notifier::NotificationChannel;

/// Predicate over the extracted message text.
pub trait Trigger: Send + Sync {
    fn matches(&self, text: &str) -> bool;
}

/// Case-insensitive whole-word match against a fixed keyword set.
///
/// A keyword of several words ("word count") matches that run of adjacent
/// words. "information" does not match "format".
pub struct KeywordTrigger {
    keywords: Vec<Vec<String>>,
}

impl KeywordTrigger {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| words(k.as_ref()))
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }
}

impl Trigger for KeywordTrigger {
    fn matches(&self, text: &str) -> bool {
        let text = words(text);
        self.keywords
            .iter()
            .any(|k| text.windows(k.len()).any(|w| w == k.as_slice()))
    }
}

/// Lowercased words, split on anything that is not alphanumeric.
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

pub struct ActivationRule {
    pub name: String,
    pub trigger: Box<dyn Trigger>,
    pub bundle: Vec<String>,
}

impl ActivationRule {
    pub fn new<T: Trigger + 'static>(name: impl Into<String>, trigger: T, bundle: &[&str]) -> Self {
        Self {
            name: name.into(),
            trigger: Box::new(trigger),
            bundle: bundle.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// What `analyze` did for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    NoSession,
    AlreadyAnalyzed,
    NoMatch,
    /// Names newly granted, in bundle order.
    Activated(Vec<String>),
    /// A rule matched but every target was already enabled.
    NothingNew,
}

impl ActivationOutcome {
    pub fn activated(&self) -> &[String] {
        match self {
            Self::Activated(names) => names,
            _ => &[],
        }
    }
}

pub struct ActivationPolicy {
    rules: Vec<ActivationRule>,
    manager: Arc<SessionServerManager>,
    notifier: NotificationChannel,
}

impl ActivationPolicy {
    pub fn new(manager: Arc<SessionServerManager>, notifier: NotificationChannel) -> Self {
        Self {
            rules: Vec::new(),
            manager,
            notifier,
        }
    }

    pub fn with_rule(mut self, rule: ActivationRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// The document and analysis rules for the sample capability set.
    pub fn with_default_rules(self) -> Self {
        self.with_rule(ActivationRule::new(
            "documents",
            KeywordTrigger::new([
                "document",
                "documents",
                "summarize",
                "summary",
                "word count",
                "format",
            ]),
            DOCUMENT_TOOLS,
        ))
        .with_rule(ActivationRule::new(
            "analysis",
            KeywordTrigger::new(["keyword", "keywords", "compare", "analyze", "analyse"]),
            ANALYSIS_TOOLS,
        ))
    }

    pub fn rules(&self) -> &[ActivationRule] {
        &self.rules
    }

    pub fn analyze(&self, session_id: &str, text: &str) -> ActivationOutcome {
        let store = self.manager.store();
        match store.is_analyzed(session_id) {
            None => return ActivationOutcome::NoSession,
            Some(true) => return ActivationOutcome::AlreadyAnalyzed,
            Some(false) => {}
        }
        if text.trim().is_empty() {
            return ActivationOutcome::NoMatch;
        }

        let mut seen = BTreeSet::new();
        let mut bundle = Vec::new();
        for rule in self.rules.iter().filter(|r| r.trigger.matches(text)) {
            debug!("Session {session_id}: activation rule {} matched", rule.name);
            for name in &rule.bundle {
                if seen.insert(name.as_str()) {
                    bundle.push(name.as_str());
                }
            }
        }
        if bundle.is_empty() {
            return ActivationOutcome::NoMatch;
        }

        // Concurrent requests on one session race here; only one wins.
        if !store.mark_analyzed(session_id) {
            return ActivationOutcome::AlreadyAnalyzed;
        }

        let before = store
            .get(session_id)
            .map(|r| r.enabled_dynamic)
            .unwrap_or_default();
        if !self.manager.enable_dynamic(session_id, &bundle) {
            return ActivationOutcome::NothingNew;
        }
        let added: Vec<String> = bundle
            .iter()
            .filter(|name| !before.contains(**name))
            .map(|name| name.to_string())
            .collect();

        info!("Session {session_id}: activated {}", added.join(", "));
        self.notifier.send_notification(
            session_id,
            &format!("New tools activated: {}", added.join(", ")),
        );
        ActivationOutcome::Activated(added)
    }
}
