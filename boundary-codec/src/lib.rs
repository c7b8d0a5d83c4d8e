//! # Event payload codec
//!
//! Traits and implementations for converting event payloads to and from the
//! opaque bytes the event store persists.
pub mod serde;
pub use crate::serde::{Deserializer, Error, Serde, Serializer};
