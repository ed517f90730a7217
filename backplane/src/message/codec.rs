/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Envelope codec: maps wire envelopes back into typed payloads.
//!
//! Encoding is driven by the payload itself (every [`Message`] knows its tag
//! and serialization); decoding an *erased* payload requires a registered
//! decoder for the envelope's type tag. Unknown tags fail closed: the caller
//! drops and logs the envelope, it is never coerced into another type.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::common::BoxPayload;
use crate::message::{MessageError, WireEnvelope};
use crate::traits::Message;

/// Type alias for the decoder function stored in the registry.
///
/// The function takes raw payload bytes and returns either a boxed
/// [`Payload`](crate::traits::Payload) trait object or a parse report.
type DecoderFn = Arc<dyn Fn(&[u8]) -> Result<BoxPayload, String> + Send + Sync>;

/// Registry mapping message type tags to decoders.
///
/// Every message type that must be decodable *without* static knowledge of
/// its concrete type (service inputs arriving over wired pipelines, for
/// example) registers here. Component descriptors register their message
/// types when they are added to a manager's registry; applications may add
/// further types through
/// [`HostRuntime::register_message`](crate::common::HostRuntime::register_message).
///
/// The registry uses [`DashMap`] internally and is safe to access
/// concurrently; registration and decoding can happen simultaneously.
#[derive(Default)]
pub struct EnvelopeCodec {
    /// Maps type tags to decoder functions.
    decoders: DashMap<String, DecoderFn>,
}

impl std::fmt::Debug for EnvelopeCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeCodec")
            .field("registered_types", &self.decoders.len())
            .finish()
    }
}

impl EnvelopeCodec {
    /// Creates a new, empty codec.
    #[must_use]
    pub fn new() -> Self {
        Self {
            decoders: DashMap::new(),
        }
    }

    /// Registers the decoder for message type `M` under its stable type tag.
    ///
    /// Re-registering the same tag replaces the previous decoder; this is
    /// harmless for identical types and logged for visibility.
    pub fn register<M>(&self)
    where
        M: Message,
    {
        let decoder: DecoderFn = Arc::new(|bytes: &[u8]| {
            let message: M = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
            Ok(Box::new(message) as BoxPayload)
        });
        if self
            .decoders
            .insert(M::TYPE_TAG.to_string(), decoder)
            .is_some()
        {
            trace!(type_tag = M::TYPE_TAG, "decoder re-registered");
        }
    }

    /// Whether a decoder is registered for `type_tag`.
    #[must_use]
    pub fn is_registered(&self, type_tag: &str) -> bool {
        self.decoders.contains_key(type_tag)
    }

    /// Number of registered message types.
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.decoders.len()
    }

    /// Decodes an envelope's payload into an erased [`Payload`](crate::traits::Payload).
    ///
    /// # Errors
    ///
    /// * [`MessageError::UnknownType`] when no decoder is registered for the
    ///   envelope's tag.
    /// * [`MessageError::Malformed`] when the registered decoder rejects the
    ///   payload bytes.
    pub fn decode(&self, envelope: &WireEnvelope) -> Result<BoxPayload, MessageError> {
        let Some(decoder) = self
            .decoders
            .get(&envelope.type_tag)
            .map(|entry| entry.value().clone())
        else {
            return Err(MessageError::UnknownType(envelope.type_tag.clone()));
        };
        decoder(&envelope.payload).map_err(|reason| MessageError::Malformed {
            type_tag: envelope.type_tag.clone(),
            reason,
        })
    }
}

/// Decodes an envelope's payload as the statically-known message type `M`.
///
/// The envelope's tag must match `M::TYPE_TAG` exactly; a mismatch is an
/// [`MessageError::UnknownType`] rather than a best-effort parse.
///
/// # Errors
///
/// Returns [`MessageError::UnknownType`] on a tag mismatch and
/// [`MessageError::Malformed`] when the payload bytes do not parse as `M`.
pub fn decode_typed<M>(envelope: &WireEnvelope) -> Result<M, MessageError>
where
    M: Message,
{
    if envelope.type_tag != M::TYPE_TAG {
        return Err(MessageError::UnknownType(envelope.type_tag.clone()));
    }
    serde_json::from_slice(&envelope.payload).map_err(|e| MessageError::Malformed {
        type_tag: envelope.type_tag.clone(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::traits::Message;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Reading {
        value: i64,
    }

    impl Message for Reading {
        const TYPE_TAG: &'static str = "test.reading";
    }

    #[test]
    fn registered_type_round_trips() {
        let codec = EnvelopeCodec::new();
        codec.register::<Reading>();

        let envelope = WireEnvelope::event(&Reading { value: 42 }).unwrap();
        let payload = codec.decode(&envelope).unwrap();
        let reading = payload.as_any().downcast_ref::<Reading>().unwrap();
        assert_eq!(reading.value, 42);
    }

    #[test]
    fn unknown_tag_fails_closed() {
        let codec = EnvelopeCodec::new();
        let envelope = WireEnvelope::event(&Reading { value: 1 }).unwrap();
        assert!(matches!(
            codec.decode(&envelope),
            Err(MessageError::UnknownType(_))
        ));
    }

    #[test]
    fn malformed_payload_is_rejected() {
        let codec = EnvelopeCodec::new();
        codec.register::<Reading>();

        let mut envelope = WireEnvelope::event(&Reading { value: 1 }).unwrap();
        envelope.payload = b"{\"value\":\"not a number\"}".to_vec();
        assert!(matches!(
            codec.decode(&envelope),
            Err(MessageError::Malformed { .. })
        ));
    }

    #[test]
    fn typed_decode_rejects_tag_mismatch() {
        #[derive(Debug, Clone, Serialize, Deserialize)]
        struct Other {
            value: i64,
        }
        impl Message for Other {
            const TYPE_TAG: &'static str = "test.other";
        }

        let envelope = WireEnvelope::event(&Reading { value: 7 }).unwrap();
        assert!(decode_typed::<Other>(&envelope).is_err());
        assert_eq!(decode_typed::<Reading>(&envelope).unwrap().value, 7);
    }
}
