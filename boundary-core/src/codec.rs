//! Bridges a `boundary-codec` [`Deserializer`] into this crate's
//! [`EventDecoder`], for callers that want to use that codec crate without
//! writing their own adapter. Gated behind the `codec` feature so the core
//! crate's event store, projection engine, and processor runtime stay
//! usable with no codec dependency at all.
use boundary_codec::Deserializer;

use crate::projector::EventDecoder;

/// Adapts any `boundary-codec` [`Deserializer<T>`] into an [`EventDecoder<T>`].
/// The event type the payload carries on the wire is ignored - the codec
/// deserializes the whole payload into `T` directly, so this adapter suits
/// single-event-type or self-describing (e.g. JSON enum tag) payloads.
pub struct CodecEventDecoder<S>(pub S);

impl<S, T> EventDecoder<T> for CodecEventDecoder<S>
where
    S: Deserializer<T> + Send + Sync,
{
    type Error = S::Error;

    fn decode(&self, _event_type: &str, payload: &[u8]) -> Result<T, Self::Error> {
        self.0.deserialize(payload.to_vec())
    }
}

#[cfg(all(test, feature = "codec-json"))]
mod tests {
    use super::*;
    use boundary_codec::serde::json::Json;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Deposited {
        amount: i64,
    }

    #[test]
    fn it_decodes_through_the_wrapped_codec() {
        let decoder = CodecEventDecoder(Json::<Deposited>::default());
        let payload = serde_json::to_vec(&Deposited { amount: 42 }).unwrap();
        let decoded = decoder.decode("Deposited", &payload).unwrap();
        assert_eq!(decoded, Deposited { amount: 42 });
    }
}
