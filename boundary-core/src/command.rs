//! Command execution contracts: handler registration, the lifecycle event
//! sink, and the record persisted alongside a command's resulting
//! transaction.
//!
//! The concrete executor - the transaction-scoped "hydrate, decide,
//! append" loop described for C4 - lives in `boundary-postgres`, tied to
//! that crate's transactional store handle. This module only fixes the
//! shape handlers and observers are written against.
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::append_condition::AppendCondition;
use crate::event::NewEvent;
use crate::event_store::EventStore;

/// A type-erased error, used at the command-handler boundary because a
/// single registry holds handlers for many distinct command types, each
/// with its own domain error.
pub type DynError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A command as submitted by a caller, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCommandRecord {
    command_type: String,
    payload: Vec<u8>,
}

impl NewCommandRecord {
    pub fn new(command_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            command_type: command_type.into(),
            payload,
        }
    }

    pub fn command_type(&self) -> &str {
        &self.command_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// A command record as stored: the transaction it produced, with its
/// occurred-at timestamp taken from the database at append time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    transaction_id: i64,
    command_type: String,
    payload: Vec<u8>,
    occurred_at: i64,
}

impl CommandRecord {
    pub fn new(
        transaction_id: i64,
        command_type: impl Into<String>,
        payload: Vec<u8>,
        occurred_at: i64,
    ) -> Self {
        Self {
            transaction_id,
            command_type: command_type.into(),
            payload,
            occurred_at,
        }
    }

    pub fn transaction_id(&self) -> i64 {
        self.transaction_id
    }

    pub fn command_type(&self) -> &str {
        &self.command_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn occurred_at(&self) -> i64 {
        self.occurred_at
    }
}

/// The decision a handler makes: the events to append and the condition
/// that must hold for the append to succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub events: Vec<NewEvent>,
    pub condition: AppendCondition,
}

impl CommandOutcome {
    pub fn new(events: Vec<NewEvent>, condition: AppendCondition) -> Self {
        Self { events, condition }
    }
}

/// Handles one command type: given a transaction-scoped store handle and
/// the raw command payload, projects whatever state it needs and returns
/// the events to append plus the condition guarding them.
#[async_trait]
pub trait CommandHandler<ES: EventStore>: Send + Sync {
    /// The command type this handler is registered for.
    fn command_type(&self) -> &'static str;

    async fn handle(&self, store: &ES, payload: &[u8]) -> Result<CommandOutcome, DynError>;
}

/// Maps command type to handler. Built once at startup, mirroring the
/// explicit, constructor-driven wiring this crate uses in place of a
/// runtime dependency-injection graph.
pub struct CommandRegistry<ES: EventStore> {
    handlers: HashMap<&'static str, Box<dyn CommandHandler<ES>>>,
}

impl<ES: EventStore> CommandRegistry<ES> {
    pub fn builder() -> CommandRegistryBuilder<ES> {
        CommandRegistryBuilder {
            handlers: HashMap::new(),
        }
    }

    pub fn get(&self, command_type: &str) -> Option<&dyn CommandHandler<ES>> {
        self.handlers.get(command_type).map(|h| h.as_ref())
    }
}

pub struct CommandRegistryBuilder<ES: EventStore> {
    handlers: HashMap<&'static str, Box<dyn CommandHandler<ES>>>,
}

impl<ES: EventStore> CommandRegistryBuilder<ES> {
    pub fn register(mut self, handler: impl CommandHandler<ES> + 'static) -> Self {
        self.handlers.insert(handler.command_type(), Box::new(handler));
        self
    }

    pub fn build(self) -> CommandRegistry<ES> {
        CommandRegistry {
            handlers: self.handlers,
        }
    }
}

/// The result of a successful command execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionResult {
    /// `true` when the command's effect was already present (the append's
    /// idempotency guard tripped); no new events were stored.
    pub was_idempotent: bool,
    /// The transaction id the events were appended under. `None` when
    /// `was_idempotent` is `true`, since no new transaction was opened for
    /// this call's own events.
    pub transaction_id: Option<i64>,
}

/// Lifecycle events the command executor reports through a
/// [`CommandEventSink`]. There is no metrics backend in this crate; the
/// sink is the seam a host application attaches one to.
#[derive(Debug, Clone)]
pub enum CommandLifecycleEvent<'a> {
    Started { command_type: &'a str },
    Succeeded { command_type: &'a str, duration: Duration },
    Idempotent { command_type: &'a str },
    Failed { command_type: &'a str, error: &'a str },
}

/// Observes command lifecycle events. Implementations must not fail or
/// block meaningfully; this is a reporting seam, not a veto point.
pub trait CommandEventSink: Send + Sync {
    fn emit(&self, event: CommandLifecycleEvent<'_>);
}

/// A sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCommandEventSink;

impl CommandEventSink for NoopCommandEventSink {
    fn emit(&self, _event: CommandLifecycleEvent<'_>) {}
}

/// A sink that logs each lifecycle event as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCommandEventSink;

impl CommandEventSink for TracingCommandEventSink {
    fn emit(&self, event: CommandLifecycleEvent<'_>) {
        match event {
            CommandLifecycleEvent::Started { command_type } => {
                tracing::info!(command_type, "command started");
            }
            CommandLifecycleEvent::Succeeded {
                command_type,
                duration,
            } => {
                tracing::info!(command_type, ?duration, "command succeeded");
            }
            CommandLifecycleEvent::Idempotent { command_type } => {
                tracing::info!(command_type, "command was idempotent, no new events appended");
            }
            CommandLifecycleEvent::Failed {
                command_type,
                error,
            } => {
                tracing::warn!(command_type, error, "command failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_result_reports_transaction_id_only_when_not_idempotent() {
        let fresh = ExecutionResult {
            was_idempotent: false,
            transaction_id: Some(7),
        };
        assert_eq!(fresh.transaction_id, Some(7));

        let idempotent = ExecutionResult {
            was_idempotent: true,
            transaction_id: None,
        };
        assert!(idempotent.transaction_id.is_none());
    }
}
