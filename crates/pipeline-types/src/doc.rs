//! Typed pump payloads.
//!
//! The pipeline moves two document shapes: raw documents as read from a
//! source, and processed documents ready for the index builder. How either
//! is serialized on the wire is the broker implementation's concern; these
//! carry only what the pipeline core needs (a locator and a timestamp) plus
//! an opaque payload.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::locator::Locator;

/// A document as read from the source, before processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    /// Position of this document in the source stream.
    pub locator: Locator,
    /// Source event time in milliseconds since epoch.
    pub timestamp_ms: i64,
    /// Field name to raw value.
    pub fields: HashMap<String, String>,
}

impl RawDocument {
    /// Create a raw document at the given stream position.
    pub fn new(locator: Locator, timestamp_ms: i64) -> Self {
        Self {
            locator,
            timestamp_ms,
            fields: HashMap::new(),
        }
    }

    /// Add a field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

/// A document after the processing stage, ready to index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedDocument {
    /// Position of the originating raw document.
    pub locator: Locator,
    /// Source event time in milliseconds since epoch.
    pub timestamp_ms: i64,
    /// Opaque processed payload.
    pub payload: Vec<u8>,
}

impl ProcessedDocument {
    /// Create a processed document at the given stream position.
    pub fn new(locator: Locator, timestamp_ms: i64, payload: Vec<u8>) -> Self {
        Self {
            locator,
            timestamp_ms,
            payload,
        }
    }
}
