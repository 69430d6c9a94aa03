//! Legacy value conversion for the event log store.
//!
//! Two conversions are needed on every row:
//! - timestamps are stored as integer ticks counted from 0001-01-01, not from
//!   the Unix epoch
//! - payload text was written as windows-1251 bytes but the driver hands it
//!   back as if it were native text, so the bytes must be recovered

use chrono::{DateTime, Utc};
use encoding_rs::WINDOWS_1251;
use tracing::debug;

use crate::error::CodecError;
use crate::record::LegacyText;

/// Ticks per second in the store's representation.
const TICKS_PER_SECOND: i64 = 10_000;

/// Seconds between 0001-01-01T00:00:00Z and the Unix epoch.
const LEGACY_EPOCH_OFFSET_SECS: i64 = 62_135_596_800;

/// Convert a stored tick value to a UTC timestamp.
///
/// `unix_seconds = raw / 10_000 - 62_135_596_800`, truncating, with no
/// timezone adjustment. Values that leave chrono's range are reported as
/// [`CodecError::EpochOverflow`], never clamped.
pub fn decode_epoch(raw: i64) -> Result<DateTime<Utc>, CodecError> {
    let unix_seconds = (raw / TICKS_PER_SECOND)
        .checked_sub(LEGACY_EPOCH_OFFSET_SECS)
        .ok_or(CodecError::EpochOverflow(raw))?;
    DateTime::from_timestamp(unix_seconds, 0).ok_or(CodecError::EpochOverflow(raw))
}

/// Re-encode misdecoded text back into its windows-1251 bytes.
///
/// Characters windows-1251 cannot represent make the whole value fall back
/// to its original UTF-8 bytes; the read is never aborted.
pub fn recover_codepage_text(s: &str) -> LegacyText {
    let (bytes, _, had_unmappable) = WINDOWS_1251.encode(s);
    if had_unmappable {
        debug!(len = s.len(), "Text not representable in windows-1251, passing through");
        return LegacyText::from(s.as_bytes().to_vec());
    }
    LegacyText::from(bytes.into_owned())
}

/// Decode windows-1251 bytes into a `String`.
pub fn decode_codepage_bytes(bytes: &[u8]) -> String {
    let (text, _) = WINDOWS_1251.decode_without_bom_handling(bytes);
    text.into_owned()
}
