//! Inbound router dispatching broker messages to handlers by topic.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{EventType, WILDCARD_TOPIC};

use crate::HandlerError;

/// A handler for messages arriving on one or more topics.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Returns the name of this handler, used in logs and dispatch reports.
    fn name(&self) -> &'static str;

    /// Applies one message. `body` is the raw envelope.
    async fn handle(&self, topic: &str, body: &[u8]) -> Result<(), HandlerError>;
}

/// Topic a handler is registered under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TopicPattern {
    Exact(String),
    /// Matches every topic (`#`).
    Wildcard,
}

impl TopicPattern {
    pub fn parse(pattern: &str) -> Self {
        if pattern == WILDCARD_TOPIC {
            TopicPattern::Wildcard
        } else {
            TopicPattern::Exact(pattern.to_string())
        }
    }

    pub fn matches(&self, topic: &str) -> bool {
        match self {
            TopicPattern::Exact(exact) => exact == topic,
            TopicPattern::Wildcard => true,
        }
    }

    /// Returns the pattern as a broker binding key.
    pub fn as_str(&self) -> &str {
        match self {
            TopicPattern::Exact(exact) => exact,
            TopicPattern::Wildcard => WILDCARD_TOPIC,
        }
    }
}

impl From<&str> for TopicPattern {
    fn from(pattern: &str) -> Self {
        TopicPattern::parse(pattern)
    }
}

impl From<EventType> for TopicPattern {
    fn from(event_type: EventType) -> Self {
        TopicPattern::Exact(event_type.as_topic().to_string())
    }
}

impl std::fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A handler that failed during one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    pub handler: &'static str,
    pub error: String,
}

/// Outcome of dispatching one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that ran, in invocation order.
    pub invoked: Vec<&'static str>,
    pub failures: Vec<HandlerFailure>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn was_handled(&self) -> bool {
        !self.invoked.is_empty()
    }
}

/// Maps topic patterns to handlers.
///
/// Built once at startup and then shared read-only with the consumer loop.
/// For a given topic, every matching handler runs: exact registrations first,
/// then wildcard registrations, each group in registration order. Handlers run
/// one after another on the caller's task.
#[derive(Default)]
pub struct EventRouter {
    handlers: HashMap<TopicPattern, Vec<Arc<dyn EventHandler>>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a topic pattern.
    pub fn register(&mut self, pattern: impl Into<TopicPattern>, handler: Arc<dyn EventHandler>) {
        let pattern = pattern.into();
        tracing::debug!(%pattern, handler = handler.name(), "registered event handler");
        self.handlers.entry(pattern).or_default().push(handler);
    }

    /// Returns the number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    /// Returns the registered patterns, exact topics first in lexical order.
    pub fn patterns(&self) -> Vec<TopicPattern> {
        let mut patterns: Vec<_> = self.handlers.keys().cloned().collect();
        patterns.sort();
        patterns
    }

    fn matching(&self, topic: &str) -> impl Iterator<Item = &Arc<dyn EventHandler>> {
        let exact = self.handlers.get(&TopicPattern::Exact(topic.to_string()));
        let wildcard = self.handlers.get(&TopicPattern::Wildcard);
        exact.into_iter().chain(wildcard).flatten()
    }

    /// Delivers a message to every handler whose pattern matches `topic`.
    ///
    /// Never fails: handler errors are logged and collected in the report.
    #[tracing::instrument(skip(self, body), fields(body_len = body.len()))]
    pub async fn dispatch(&self, topic: &str, body: &[u8]) -> DispatchReport {
        metrics::counter!("events_received_total").increment(1);
        let mut report = DispatchReport::default();

        for handler in self.matching(topic) {
            report.invoked.push(handler.name());
            if let Err(e) = handler.handle(topic, body).await {
                metrics::counter!("event_handler_failures_total").increment(1);
                tracing::error!(handler = handler.name(), error = %e, "event handler failed");
                report.failures.push(HandlerFailure {
                    handler: handler.name(),
                    error: e.to_string(),
                });
            }
        }

        if !report.was_handled() {
            tracing::debug!("no handler registered for topic");
        }
        report
    }
}
