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

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::common::config::CONFIG;
use crate::common::BusError;
use crate::message::{EnvelopeKind, MessageError, RequestId, WireEnvelope};

/// Errors surfaced to a caller awaiting a reply.
///
/// The three failure classes of a request are deliberately distinct:
/// a [`RequestError::Timeout`] says nothing about the remote action, a
/// [`RequestError::Remote`] means the action itself failed and the caller
/// may retry, and a [`RequestError::Transport`] means the request may never
/// have left this process.
#[derive(Debug)]
pub enum RequestError {
    /// No reply arrived within the bound.
    Timeout(Duration),
    /// The component executed the request and reported failure.
    Remote(String),
    /// The request could not be published.
    Transport(BusError),
    /// The reply payload could not be decoded, or the request could not be
    /// encoded.
    Codec(MessageError),
    /// The pending entry disappeared before resolution (the connector or
    /// its reply subscription was torn down mid-flight).
    ChannelClosed,
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestError::Timeout(bound) => {
                write!(f, "no reply within {}ms", bound.as_millis())
            }
            RequestError::Remote(reason) => write!(f, "remote execution failed: {reason}"),
            RequestError::Transport(inner) => write!(f, "transport failure: {inner}"),
            RequestError::Codec(inner) => write!(f, "codec failure: {inner}"),
            RequestError::ChannelClosed => write!(f, "reply channel closed before resolution"),
        }
    }
}

impl std::error::Error for RequestError {}

impl From<BusError> for RequestError {
    fn from(inner: BusError) -> Self {
        RequestError::Transport(inner)
    }
}

impl From<MessageError> for RequestError {
    fn from(inner: MessageError) -> Self {
        RequestError::Codec(inner)
    }
}

/// The raw resolution of one pending request: the reply envelope, or the
/// error that stands in for it.
pub(crate) type ReplyOutcome = Result<WireEnvelope, RequestError>;

/// The connector's one synchronization primitive: a table of pending
/// request identifiers to completion signals.
///
/// An entry is populated on send and resolved exactly once — by the
/// matching reply's arrival or by timeout expiry, whichever comes first.
/// A reply arriving for an identifier with no entry (late, duplicate, or
/// forged) is discarded and logged, never delivered.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReplyCorrelator {
    pending: Arc<DashMap<RequestId, oneshot::Sender<ReplyOutcome>>>,
}

impl ReplyCorrelator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a pending request and returns the completion signal the
    /// caller awaits.
    pub(crate) fn register(&self, request_id: RequestId) -> oneshot::Receiver<ReplyOutcome> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id, tx);
        trace!(%request_id, "request registered");
        rx
    }

    /// Resolves a pending request. Returns `false` when no entry existed —
    /// the at-most-one-reply invariant in action.
    pub(crate) fn resolve(&self, request_id: RequestId, outcome: ReplyOutcome) -> bool {
        match self.pending.remove(&request_id) {
            Some((_, tx)) => {
                // A dropped receiver means the awaiting side gave up between
                // removal and send; nothing further to do.
                let _ = tx.send(outcome);
                true
            }
            None => {
                if CONFIG.behavior.log_late_replies {
                    debug!(%request_id, "late or duplicate reply discarded");
                }
                false
            }
        }
    }

    /// Discards a pending request after timeout expiry so a late reply
    /// cannot resolve it.
    pub(crate) fn discard(&self, request_id: RequestId) {
        if self.pending.remove(&request_id).is_some() {
            trace!(%request_id, "pending request discarded");
        }
    }

    /// Number of requests currently awaiting replies.
    pub(crate) fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Handler body for the connector's private reply topic: classifies the
    /// envelope and resolves the matching pending entry.
    pub(crate) fn accept_reply(&self, envelope: WireEnvelope) {
        match &envelope.kind {
            EnvelopeKind::Reply { request_id, error } => {
                let request_id = *request_id;
                let outcome = match error {
                    Some(reason) => Err(RequestError::Remote(reason.clone())),
                    None => Ok(envelope),
                };
                self.resolve(request_id, outcome);
            }
            _ => warn!(type_tag = %envelope.type_tag, "non-reply traffic on reply topic; dropped"),
        }
    }
}
