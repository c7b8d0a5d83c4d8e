//! The command executor: looks up a handler by command type, runs
//! it inside one transaction, appends its decision, and folds idempotency
//! into a positive result instead of propagating it as failure.
use std::time::Instant;

use boundary_core::command::{
    CommandEventSink, CommandLifecycleEvent, CommandRegistry, ExecutionResult, NewCommandRecord,
    NoopCommandEventSink,
};
use boundary_core::{CommandError, EventStore};

use crate::error::Error;
use crate::event_store::{PgEventStore, PgTransactionalStore};

/// Runs registered command handlers against [`PgEventStore`].
pub struct PgCommandExecutor {
    store: PgEventStore,
    registry: CommandRegistry<PgTransactionalStore>,
    sink: Box<dyn CommandEventSink>,
}

impl PgCommandExecutor {
    pub fn new(store: PgEventStore, registry: CommandRegistry<PgTransactionalStore>) -> Self {
        Self {
            store,
            registry,
            sink: Box::new(NoopCommandEventSink),
        }
    }

    pub fn with_event_sink(mut self, sink: Box<dyn CommandEventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Executes `command_type` with `payload`: project, handle, append,
    /// record, returning whether the handler's decision was actually
    /// appended or had already been recorded.
    pub async fn execute(
        &self,
        command_type: &str,
        payload: &[u8],
    ) -> Result<ExecutionResult, CommandError<boundary_core::DynError>> {
        self.sink.emit(CommandLifecycleEvent::Started { command_type });
        let started = Instant::now();

        let handler = self
            .registry
            .get(command_type)
            .ok_or_else(|| CommandError::UnknownCommandType(command_type.to_string()))?;

        let persist_commands = self.store.config().persist_commands;
        let outcome = self
            .store
            .execute_in_transaction(move |tx_store| async move {
                let outcome = handler
                    .handle(&tx_store, payload)
                    .await
                    .map_err(Error::HandlerFailed)?;

                match tx_store.append_if(outcome.events, outcome.condition).await {
                    Ok(result) => {
                        if persist_commands {
                            tx_store
                                .store_command(NewCommandRecord::new(
                                    command_type.to_string(),
                                    payload.to_vec(),
                                ))
                                .await?;
                        }
                        Ok(Attempt::Appended(result.transaction_id()))
                    }
                    Err(Error::Idempotency) => Ok(Attempt::Idempotent),
                    Err(other) => Err(other),
                }
            })
            .await;

        match outcome {
            Ok(Attempt::Appended(transaction_id)) => {
                self.sink.emit(CommandLifecycleEvent::Succeeded {
                    command_type,
                    duration: started.elapsed(),
                });
                Ok(ExecutionResult {
                    was_idempotent: false,
                    transaction_id: Some(transaction_id),
                })
            }
            Ok(Attempt::Idempotent) => {
                self.sink.emit(CommandLifecycleEvent::Idempotent { command_type });
                Ok(ExecutionResult {
                    was_idempotent: true,
                    transaction_id: None,
                })
            }
            Err(err) => {
                let classified = classify(err);
                self.sink.emit(CommandLifecycleEvent::Failed {
                    command_type,
                    error: &classified.to_string(),
                });
                Err(classified)
            }
        }
    }
}

enum Attempt {
    Appended(i64),
    Idempotent,
}

fn classify(err: Error) -> CommandError<boundary_core::DynError> {
    match err {
        Error::Concurrency => CommandError::Concurrency,
        Error::Idempotency => {
            unreachable!("idempotency must be intercepted inside execute_in_transaction")
        }
        Error::HandlerFailed(source) => CommandError::Domain(source),
        other => CommandError::Infrastructure(Box::new(other)),
    }
}
