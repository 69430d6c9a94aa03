//! Typed event log record as handed to the sink.

use base64::prelude::{Engine as _, BASE64_STANDARD};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::codec;

/// Raw windows-1251 bytes recovered from a text column.
///
/// Serialized as base64 so the bytes reach the sink untouched; call
/// [`LegacyText::decode`] for a readable `String`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyText(Vec<u8>);

impl LegacyText {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode the bytes as windows-1251.
    pub fn decode(&self) -> String {
        codec::decode_codepage_bytes(&self.0)
    }
}

impl From<Vec<u8>> for LegacyText {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl Serialize for LegacyText {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_STANDARD.encode(&self.0))
    }
}

/// A code column and the name it resolves to (empty when the lookup misses).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CodeRef {
    pub code: i64,
    pub name: String,
}

/// A code column resolved to a name and a uuid (both empty on a miss).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdentifiedRef {
    pub code: i64,
    pub name: String,
    pub uuid: String,
}

/// One event log row, decoded and enriched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub severity: i64,
    pub connection_id: i64,
    pub session_id: i64,
    pub transaction_status: i64,
    pub transaction_timestamp: DateTime<Utc>,
    pub transaction_id: i64,
    pub user: IdentifiedRef,
    pub computer: CodeRef,
    pub application: CodeRef,
    pub event_type: CodeRef,
    pub comment: String,
    pub metadata_codes: String,
    pub metadata: IdentifiedRef,
    pub session_data_split_code: i64,
    pub session_data_split_presentation: LegacyText,
    pub data_type: i64,
    pub data: LegacyText,
    pub data_presentation: String,
    pub work_server: CodeRef,
    pub primary_port: CodeRef,
    pub secondary_port: CodeRef,
}
