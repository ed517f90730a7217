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

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::MessageError;

/// Component type segment reserved for per-host manager control topics.
pub(crate) const MANAGER_SEGMENT: &str = "manager";
/// Component type segment reserved for connector reply topics.
pub(crate) const CONNECTOR_SEGMENT: &str = "connector";
/// Suffix appended to a component type segment to derive its output topic.
const OUTPUT_SUFFIX: &str = ".out";

/// A deterministic bus address, rendered as `{type}:{host}[:{instance}]`.
///
/// A topic is derivable by any party that knows the `(component type, host,
/// instance)` triple, so a [`Connector`](crate::common::Connector) can find a
/// component without a discovery round-trip. The bus itself treats topics as
/// opaque keys; all structure lives here.
///
/// Topic names are unique per triple: no two live components share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Topic {
    component_type: String,
    host: String,
    instance: Option<String>,
}

impl Topic {
    /// Creates the topic for `component_type` on `host` with no instance
    /// qualifier.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::MalformedTopic`] if a segment is empty or
    /// contains the `:` separator.
    pub fn new(component_type: &str, host: &str) -> Result<Self, MessageError> {
        validate_segment(component_type)?;
        validate_segment(host)?;
        Ok(Self {
            component_type: component_type.to_string(),
            host: host.to_string(),
            instance: None,
        })
    }

    /// Creates the topic for a qualified instance of `component_type` on
    /// `host`, e.g. the second camera of a device.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::MalformedTopic`] if a segment is empty or
    /// contains the `:` separator.
    pub fn with_instance(
        component_type: &str,
        host: &str,
        instance: &str,
    ) -> Result<Self, MessageError> {
        validate_segment(component_type)?;
        validate_segment(host)?;
        validate_segment(instance)?;
        Ok(Self {
            component_type: component_type.to_string(),
            host: host.to_string(),
            instance: Some(instance.to_string()),
        })
    }

    /// Parses a rendered topic back into its triple.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::MalformedTopic`] unless the input has two or
    /// three non-empty `:`-separated segments.
    pub fn parse(raw: &str) -> Result<Self, MessageError> {
        let segments: Vec<&str> = raw.split(':').collect();
        match segments.as_slice() {
            [component_type, host] => Self::new(component_type, host),
            [component_type, host, instance] => Self::with_instance(component_type, host, instance),
            _ => Err(MessageError::MalformedTopic(raw.to_string())),
        }
    }

    /// The control topic of the component manager serving `host`.
    pub fn manager(host: &str) -> Result<Self, MessageError> {
        Self::new(MANAGER_SEGMENT, host)
    }

    /// The private reply topic of the connector identified by `connector_id`,
    /// created on `host`. Replies ride the same convention as every other
    /// stream: the connector itself is the addressed "component".
    pub(crate) fn reply(host: &str, connector_id: &Uuid) -> Self {
        // host was validated when the runtime topic carrying it was built,
        // and a UUID never contains the separator.
        Self {
            component_type: CONNECTOR_SEGMENT.to_string(),
            host: host.to_string(),
            instance: Some(connector_id.to_string()),
        }
    }

    /// Derives the output topic owned by the component addressed by this
    /// topic: the same triple with the component type suffixed `.out`.
    #[must_use]
    pub fn output(&self) -> Self {
        Self {
            component_type: format!("{}{OUTPUT_SUFFIX}", self.component_type),
            host: self.host.clone(),
            instance: self.instance.clone(),
        }
    }

    /// The component type segment.
    #[inline]
    #[must_use]
    pub fn component_type(&self) -> &str {
        &self.component_type
    }

    /// The host identity segment.
    #[inline]
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The optional instance qualifier.
    #[inline]
    #[must_use]
    pub fn instance(&self) -> Option<&str> {
        self.instance.as_deref()
    }
}

fn validate_segment(segment: &str) -> Result<(), MessageError> {
    if segment.is_empty() || segment.contains(':') {
        return Err(MessageError::MalformedTopic(segment.to_string()));
    }
    Ok(())
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.instance {
            Some(instance) => write!(f, "{}:{}:{}", self.component_type, self.host, instance),
            None => write!(f, "{}:{}", self.component_type, self.host),
        }
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.to_string()
    }
}

impl TryFrom<String> for Topic {
    type Error = MessageError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Topic::parse(&raw)
    }
}
