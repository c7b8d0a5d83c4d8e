//! Backend-agnostic contracts for a Dynamic Consistency Boundary (DCB)
//! event store: the event, tag, cursor, query, and append-condition types
//! (C1), the event store contract (C2), the projection engine (C3), the
//! command execution contracts (C4), and the leader election, progress
//! tracking, event fetching, and generic processor runtime contracts that
//! back the outbox (C9) and view (C10) adapters.
//!
//! A concrete PostgreSQL backend lives in the sibling `boundary-postgres`
//! crate.
pub mod append_condition;
#[cfg(feature = "codec")]
pub mod codec;
pub mod command;
pub mod config;
pub mod cursor;
pub mod error;
pub mod event;
pub mod event_store;
pub mod fetcher;
pub mod identifier;
pub mod leader;
pub mod outbox;
pub mod processor;
pub mod progress;
pub mod projector;
pub mod query;
pub mod tag;
pub mod testing;
pub mod view;

#[doc(inline)]
pub use crate::append_condition::AppendCondition;
#[cfg(feature = "codec")]
#[doc(inline)]
pub use crate::codec::CodecEventDecoder;
#[doc(inline)]
pub use crate::command::{
    CommandEventSink, CommandHandler, CommandLifecycleEvent, CommandOutcome, CommandRecord,
    CommandRegistry, DynError, ExecutionResult, NewCommandRecord, NoopCommandEventSink,
    TracingCommandEventSink,
};
#[doc(inline)]
pub use crate::cursor::Cursor;
#[doc(inline)]
pub use crate::error::{CommandError, ProcessorError, StoreError};
#[doc(inline)]
pub use crate::event::{NewEvent, PersistedEvent};
#[doc(inline)]
pub use crate::event_store::{AppendResult, EventStore};
#[doc(inline)]
pub use crate::fetcher::EventFetcher;
#[doc(inline)]
pub use crate::leader::{
    LeaderElector, LeaderEvent, LeaderEventSink, LeaderState, NoopLeaderEventSink,
    TracingLeaderEventSink,
};
#[doc(inline)]
pub use crate::outbox::{OutboxProcessorKey, OutboxPublisher, PublishMode};
#[doc(inline)]
pub use crate::processor::{CycleOutcome, ProcessorConfig, ProcessorCycle, ProcessorRuntime};
#[doc(inline)]
pub use crate::progress::{ProcessorStatus, ProgressDetails, ProgressTracker};
#[doc(inline)]
pub use crate::projector::{project, EventDecoder, Projected, ProjectError, Projection};
#[doc(inline)]
pub use crate::query::{Query, QueryItem};
#[doc(inline)]
pub use crate::tag::{Tag, TagError, TagSet};
#[doc(inline)]
pub use crate::testing::{Decision, TestHarness};
#[doc(inline)]
pub use crate::view::{ViewProcessorKey, ViewProjector, ViewSubscription};

pub type BoxDynError = Box<dyn std::error::Error + 'static + Send + Sync>;
