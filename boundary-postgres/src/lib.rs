//! PostgreSQL backend for the `boundary-core` Dynamic Consistency Boundary
//! contracts: the event store, schema migrator, command executor, leader
//! elector, and the outbox/views processor cycles, progress trackers, and
//! fetchers that back them.
mod clock;
mod command_executor;
mod config;
mod error;
mod event_store;
mod fetcher;
mod instance;
mod leader;
mod migrator;
mod outbox;
mod predicate;
mod progress;
mod view;

pub use crate::clock::{Clock, FixedClock, SystemClock};
pub use crate::command_executor::PgCommandExecutor;
pub use crate::config::{
    OutboxTopicPredicates, PgEventStoreConfig, PgTransactionIsolation, ViewSubscriptions,
};
pub use crate::error::Error;
pub use crate::event_store::{PgEventStore, PgTransactionalStore};
pub use crate::fetcher::{PgOutboxFetcher, PgViewFetcher};
pub use crate::instance::{FixedInstanceIdProvider, InstanceIdProvider, UuidInstanceIdProvider};
pub use crate::leader::PgLeaderElector;
pub use crate::migrator::Migrator;
pub use crate::outbox::PgOutboxCycle;
pub use crate::progress::{PgOutboxProgressTracker, PgViewProgressTracker};
pub use crate::view::{PgViewCycle, PgViewProjector};
