//! Cursor-based reader for one event log source.
//!
//! Design principles:
//! - A fresh read-only connection per `read_batch()`; the store may be
//!   rotated or compacted between polls
//! - The cursor only moves through `commit()`, after the sink confirmed
//! - Rows at or below the cursor, or repeating the previous row id, are dropped

mod queries;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Connection, Row};
use std::str::FromStr;
use tracing::{debug, info};

use crate::cache::{CacheStats, LookupCache, DEFAULT_CAPACITY};
use crate::codec;
use crate::error::ReadError;
use crate::record::{CodeRef, IdentifiedRef, LegacyText, Record};

/// Default rows per poll.
pub const DEFAULT_PAGE_SIZE: u32 = 3;

/// Records from one poll, ascending by id.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub records: Vec<Record>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Id and timestamp of the last record: the cursor and checkpoint to
    /// commit once this batch is accepted.
    pub fn last_position(&self) -> Option<(i64, DateTime<Utc>)> {
        self.records.last().map(|r| (r.id, r.timestamp))
    }
}

/// Reader for one configured event log.
pub struct SourceReader {
    name: String,
    location: String,
    cursor: i64,
    page_size: u32,
    split_cache: LookupCache<i64, LegacyText>,
}

impl SourceReader {
    /// Create a reader starting from the beginning of the log.
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            cursor: 0,
            page_size: DEFAULT_PAGE_SIZE,
            split_cache: LookupCache::new(DEFAULT_CAPACITY),
        }
    }

    /// Resume after `cursor` (the last id confirmed downstream).
    pub fn with_cursor(mut self, cursor: i64) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.split_cache = LookupCache::new(capacity);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.split_cache.stats()
    }

    /// Advance the cursor after a confirmed publish. Never moves backwards.
    pub fn commit(&mut self, last_id: i64) {
        if last_id > self.cursor {
            self.cursor = last_id;
        }
    }

    /// Fetch the next page of events after the cursor.
    ///
    /// An empty batch means the source is caught up. Any store error fails the
    /// whole call; the cursor is untouched either way.
    pub async fn read_batch(&mut self) -> Result<Batch, ReadError> {
        let options = connect_options(&self.location)?;
        let mut conn = SqliteConnection::connect_with(&options)
            .await
            .map_err(ReadError::Connect)?;

        let result = self.read_page(&mut conn).await;

        if let Err(e) = conn.close().await {
            debug!(source = %self.name, "Failed to close event log connection: {}", e);
        }
        result
    }

    async fn read_page(&mut self, conn: &mut SqliteConnection) -> Result<Batch, ReadError> {
        let rows = sqlx::query(queries::EVENT_PAGE)
            .bind(self.cursor)
            .bind(i64::from(self.page_size))
            .fetch_all(&mut *conn)
            .await
            .map_err(ReadError::Query)?;

        let mut filter = RowFilter::new(self.cursor);
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let id = int(row, "id")?;
            if !filter.admit(id) {
                info!(source = %self.name, id, "Multiple occurrences of row id omitted");
                continue;
            }
            let split_code = int(row, "sessionDataSplitCode")?;
            let presentation = self.session_data_split_presentation(conn, split_code).await?;
            records.push(decode_row(row, id, presentation)?);
        }

        debug!(
            source = %self.name,
            cursor = self.cursor,
            rows = rows.len(),
            records = records.len(),
            "Read page"
        );
        Ok(Batch { records })
    }

    async fn session_data_split_presentation(
        &mut self,
        conn: &mut SqliteConnection,
        code: i64,
    ) -> Result<LegacyText, ReadError> {
        if let Some(presentation) = self.split_cache.get(&code) {
            return Ok(presentation.clone());
        }

        let rows = sqlx::query(queries::DATA_SPLIT)
            .bind(code)
            .fetch_all(&mut *conn)
            .await
            .map_err(ReadError::Query)?;

        let mut parts = Vec::with_capacity(rows.len());
        for row in &rows {
            parts.push(format!(
                "{}: [{}] {}",
                text(row, "sessionParamName")?,
                int(row, "sessionValDataType")?,
                text(row, "sessionValData")?
            ));
        }
        // Split values share the payload's codepage; names and separators are
        // re-encoded with them so the field stays in one encoding.
        let presentation = codec::recover_codepage_text(&parts.join(", "));

        if let Some((evicted, _)) = self.split_cache.insert(code, presentation.clone()) {
            debug!(source = %self.name, code, evicted, "Session data split cache eviction");
        }
        debug!(
            source = %self.name,
            code,
            stats = ?self.split_cache.stats(),
            "Session data split cache miss"
        );
        Ok(presentation)
    }
}

/// Drops ids already delivered in an earlier batch or earlier in this page.
#[derive(Debug)]
struct RowFilter {
    cursor: i64,
    last_emitted: Option<i64>,
}

impl RowFilter {
    fn new(cursor: i64) -> Self {
        Self {
            cursor,
            last_emitted: None,
        }
    }

    fn admit(&mut self, id: i64) -> bool {
        if id <= self.cursor || self.last_emitted.is_some_and(|last| id <= last) {
            return false;
        }
        self.last_emitted = Some(id);
        true
    }
}

fn connect_options(location: &str) -> Result<SqliteConnectOptions, ReadError> {
    let options = if location.starts_with("sqlite:") {
        SqliteConnectOptions::from_str(location).map_err(ReadError::Connect)?
    } else {
        SqliteConnectOptions::new().filename(location)
    };
    Ok(options.read_only(true).create_if_missing(false))
}

fn decode_row(row: &SqliteRow, id: i64, presentation: LegacyText) -> Result<Record, ReadError> {
    let epoch = |column: &'static str| -> Result<DateTime<Utc>, ReadError> {
        codec::decode_epoch(int(row, column)?).map_err(|source| ReadError::Decode { id, source })
    };

    Ok(Record {
        id,
        timestamp: epoch("date")?,
        severity: int(row, "severity")?,
        connection_id: int(row, "connectID")?,
        session_id: int(row, "session")?,
        transaction_status: int(row, "transactionStatus")?,
        transaction_timestamp: epoch("transactionDate")?,
        transaction_id: int(row, "transactionID")?,
        user: IdentifiedRef {
            code: int(row, "userCode")?,
            name: text(row, "userName")?,
            uuid: text(row, "userUuid")?,
        },
        computer: code_ref(row, "computerCode", "computerName")?,
        application: code_ref(row, "appCode", "appName")?,
        event_type: code_ref(row, "eventCode", "eventName")?,
        comment: text(row, "comment")?,
        metadata_codes: text(row, "metadataCodes")?,
        metadata: IdentifiedRef {
            code: int(row, "metadataCode")?,
            name: text(row, "metadataName")?,
            uuid: text(row, "metadataUuid")?,
        },
        session_data_split_code: int(row, "sessionDataSplitCode")?,
        session_data_split_presentation: presentation,
        data_type: int(row, "dataType")?,
        data: codec::recover_codepage_text(&text(row, "data")?),
        data_presentation: text(row, "dataPresentation")?,
        work_server: code_ref(row, "workServerCode", "workServerName")?,
        primary_port: code_ref(row, "primaryPortCode", "primaryPortName")?,
        secondary_port: code_ref(row, "secondaryPortCode", "secondaryPortName")?,
    })
}

fn code_ref(row: &SqliteRow, code: &'static str, name: &'static str) -> Result<CodeRef, ReadError> {
    Ok(CodeRef {
        code: int(row, code)?,
        name: text(row, name)?,
    })
}

// NULL reads as 0 / "" so a sparse column never fails the batch.
fn int(row: &SqliteRow, column: &'static str) -> Result<i64, ReadError> {
    row.try_get::<Option<i64>, _>(column)
        .map(Option::unwrap_or_default)
        .map_err(|source| ReadError::Column { column, source })
}

fn text(row: &SqliteRow, column: &'static str) -> Result<String, ReadError> {
    row.try_get::<Option<String>, _>(column)
        .map(Option::unwrap_or_default)
        .map_err(|source| ReadError::Column { column, source })
}
