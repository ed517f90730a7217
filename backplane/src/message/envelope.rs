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

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{MessageError, Topic};
use crate::traits::Payload;

/// Unique identifier correlating a request with its single reply.
pub type RequestId = Uuid;

/// Type tag carried by payload-less error replies.
pub const ERROR_TYPE_TAG: &str = "backplane.error";

/// The delivery role of an envelope.
///
/// This is a closed set: decoding rejects any kind it does not recognize,
/// rather than guessing at field presence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnvelopeKind {
    /// A plain published message; no reply is expected.
    Event,
    /// A message expecting exactly one correlated reply on `reply_topic`.
    Request {
        /// Correlation identifier, unique per request.
        request_id: RequestId,
        /// Where the executing component must publish the reply.
        reply_topic: Topic,
    },
    /// The single reply to an earlier request.
    Reply {
        /// The originating request's identifier.
        request_id: RequestId,
        /// `Some` when the remote action itself failed. Distinct from
        /// transport failures, which never produce a reply at all.
        error: Option<String>,
    },
}

/// The wire-level unit the bus moves: a type-tagged, timestamped, serialized
/// payload.
///
/// Envelopes are immutable once constructed. The `payload` bytes are the
/// codec-specific serialization of a concrete [`Message`](crate::traits::Message);
/// the bus never looks inside them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEnvelope {
    /// The delivery role of this envelope.
    pub kind: EnvelopeKind,
    /// Stable identifier of the payload's concrete message type.
    pub type_tag: String,
    /// Process-monotonic creation time, in seconds since the Unix epoch.
    pub timestamp: f64,
    /// Serialized payload bytes.
    pub payload: Vec<u8>,
}

impl WireEnvelope {
    /// Wraps a payload as a plain published event.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::SerializeFailed`] if the payload cannot be
    /// serialized.
    pub fn event(payload: &dyn Payload) -> Result<Self, MessageError> {
        Ok(Self {
            kind: EnvelopeKind::Event,
            type_tag: payload.type_tag().to_string(),
            timestamp: monotonic_stamp(),
            payload: payload.to_bytes()?,
        })
    }

    /// Wraps a payload as a request expecting one reply on `reply_topic`.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::SerializeFailed`] if the payload cannot be
    /// serialized.
    pub fn request(
        payload: &dyn Payload,
        request_id: RequestId,
        reply_topic: Topic,
    ) -> Result<Self, MessageError> {
        Ok(Self {
            kind: EnvelopeKind::Request {
                request_id,
                reply_topic,
            },
            type_tag: payload.type_tag().to_string(),
            timestamp: monotonic_stamp(),
            payload: payload.to_bytes()?,
        })
    }

    /// Wraps a payload as the successful reply to `request_id`.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::SerializeFailed`] if the payload cannot be
    /// serialized.
    pub fn reply(payload: &dyn Payload, request_id: RequestId) -> Result<Self, MessageError> {
        Ok(Self {
            kind: EnvelopeKind::Reply {
                request_id,
                error: None,
            },
            type_tag: payload.type_tag().to_string(),
            timestamp: monotonic_stamp(),
            payload: payload.to_bytes()?,
        })
    }

    /// Builds the error reply to `request_id`, carrying no payload.
    ///
    /// Error replies report that the remote action failed; the awaiting
    /// caller receives the reason and decides whether to retry.
    #[must_use]
    pub fn reply_error(request_id: RequestId, reason: &str) -> Self {
        Self {
            kind: EnvelopeKind::Reply {
                request_id,
                error: Some(reason.to_string()),
            },
            type_tag: ERROR_TYPE_TAG.to_string(),
            timestamp: monotonic_stamp(),
            payload: Vec::new(),
        }
    }

    /// The correlation identifier, for request and reply envelopes.
    #[must_use]
    pub fn request_id(&self) -> Option<RequestId> {
        match &self.kind {
            EnvelopeKind::Event => None,
            EnvelopeKind::Request { request_id, .. } | EnvelopeKind::Reply { request_id, .. } => {
                Some(*request_id)
            }
        }
    }

    /// Serializes the envelope for a byte-oriented transport.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::SerializeFailed`] on serializer failure.
    pub fn to_bytes(&self) -> Result<Vec<u8>, MessageError> {
        serde_json::to_vec(self).map_err(|e| MessageError::SerializeFailed(e.to_string()))
    }

    /// Parses an envelope from transport bytes. Fails closed: unknown
    /// envelope kinds and junk bytes are rejected, never coerced.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::Malformed`] if the bytes do not parse.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        serde_json::from_slice(bytes).map_err(|e| MessageError::Malformed {
            type_tag: "<envelope>".to_string(),
            reason: e.to_string(),
        })
    }
}

/// Last stamp handed out by [`monotonic_stamp`], stored as raw IEEE-754 bits.
static LAST_STAMP_BITS: AtomicU64 = AtomicU64::new(0);

/// Returns the current wall-clock time as epoch seconds, guaranteed strictly
/// greater than every stamp previously issued in this process.
///
/// Positive doubles order the same as their bit patterns, so when the clock
/// has not advanced past the last stamp the CAS loop bumps it by one ULP.
pub fn monotonic_stamp() -> f64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or_default();
    loop {
        let last_bits = LAST_STAMP_BITS.load(Ordering::Acquire);
        let last = f64::from_bits(last_bits);
        let next = if now > last {
            now
        } else {
            f64::from_bits(last.to_bits() + 1)
        };
        if LAST_STAMP_BITS
            .compare_exchange(last_bits, next.to_bits(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return next;
        }
    }
}
