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
/// Represents errors raised while encoding, decoding, or addressing messages.
///
/// Unknown and malformed envelopes are dropped and logged at the receiving
/// side; these variants exist so the drop sites (and local encode paths) can
/// report precisely what went wrong.
#[derive(Debug)]
pub enum MessageError {
    /// A payload could not be serialized into envelope bytes.
    SerializeFailed(String),
    /// An envelope carried a type tag with no registered decoder.
    UnknownType(String),
    /// An envelope or payload failed to parse.
    Malformed {
        /// The type tag the envelope claimed to carry.
        type_tag: String,
        /// The parser's report.
        reason: String,
    },
    /// A topic string did not follow the `{type}:{host}[:{instance}]` form.
    MalformedTopic(String),
}

impl std::fmt::Display for MessageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageError::SerializeFailed(reason) => {
                write!(f, "failed to serialize payload: {reason}")
            }
            MessageError::UnknownType(type_tag) => {
                write!(f, "no decoder registered for type tag '{type_tag}'")
            }
            MessageError::Malformed { type_tag, reason } => {
                write!(f, "malformed payload for type tag '{type_tag}': {reason}")
            }
            MessageError::MalformedTopic(topic) => {
                write!(f, "malformed topic '{topic}'")
            }
        }
    }
}

impl std::error::Error for MessageError {}
