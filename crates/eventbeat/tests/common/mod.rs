//! Shared fixtures: a SQLite event log built on disk, plus recording
//! `Sink` and `CheckpointStore` implementations.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{Connection, Executor};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::TempDir;

use eventbeat::{PublishOutcome, Record, Sink, SinkError};
use eventbeat_checkpoint::{CheckpointError, CheckpointState, CheckpointStore};

const SCHEMA: &[&str] = &[
    "CREATE TABLE EventLog (
        rowID INTEGER PRIMARY KEY,
        severity INTEGER,
        date INTEGER,
        connectID INTEGER,
        session INTEGER,
        transactionStatus INTEGER,
        transactionDate INTEGER,
        transactionID INTEGER,
        userCode INTEGER,
        computerCode INTEGER,
        appCode INTEGER,
        eventCode INTEGER,
        comment TEXT,
        metadataCodes TEXT,
        sessionDataSplitCode INTEGER,
        dataType INTEGER,
        data TEXT,
        dataPresentation TEXT,
        workServerCode INTEGER,
        primaryPortCode INTEGER,
        secondaryPortCode INTEGER
    )",
    "CREATE TABLE UserCodes (code INTEGER PRIMARY KEY, name TEXT, uuid TEXT)",
    "CREATE TABLE ComputerCodes (code INTEGER PRIMARY KEY, name TEXT)",
    "CREATE TABLE AppCodes (code INTEGER PRIMARY KEY, name TEXT)",
    "CREATE TABLE EventCodes (code INTEGER PRIMARY KEY, name TEXT)",
    "CREATE TABLE WorkServerCodes (code INTEGER PRIMARY KEY, name TEXT)",
    "CREATE TABLE PrimaryPortCodes (code INTEGER PRIMARY KEY, name TEXT)",
    "CREATE TABLE SecondaryPortCodes (code INTEGER PRIMARY KEY, name TEXT)",
    "CREATE TABLE MetadataCodes (code INTEGER PRIMARY KEY, name TEXT, uuid TEXT)",
    "CREATE TABLE EventLogMetadata (eventLogID INTEGER, metadataCode INTEGER)",
    "CREATE TABLE SessionParamCodes (code INTEGER PRIMARY KEY, name TEXT)",
    "CREATE TABLE SessionDataCodes (
        sessionParamCode INTEGER, sessionValCode INTEGER, dataType INTEGER, data TEXT
    )",
    "CREATE TABLE SessionDataSplits (
        code INTEGER, sessionParamCode INTEGER, sessionValCode INTEGER
    )",
];

/// Unix seconds as a raw store tick value.
pub fn ticks(unix_secs: i64) -> i64 {
    (unix_secs + 62_135_596_800) * 10_000
}

/// One `EventLog` row. Unset codes are 0 and resolve to nothing.
#[derive(Debug, Clone, Default)]
pub struct Event {
    pub id: i64,
    pub unix_secs: i64,
    pub severity: i64,
    pub user_code: i64,
    pub computer_code: i64,
    pub app_code: i64,
    pub event_code: i64,
    pub comment: String,
    pub split_code: i64,
    pub data: String,
}

impl Event {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            unix_secs: 1_600_000_000 + id,
            comment: format!("event {}", id),
            ..Default::default()
        }
    }
}

/// A SQLite event log file inside a temp dir.
pub struct EventLogFixture {
    _temp: TempDir,
    pub path: PathBuf,
}

impl EventLogFixture {
    pub async fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join("1Cv8.lgd");
        let fixture = Self { _temp: temp, path };

        let mut conn = fixture.connect().await;
        for stmt in SCHEMA {
            conn.execute(*stmt).await.expect("Failed to create schema");
        }
        conn.close().await.expect("Failed to close fixture connection");
        fixture
    }

    pub fn location(&self) -> String {
        self.path.display().to_string()
    }

    async fn connect(&self) -> SqliteConnection {
        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true);
        SqliteConnection::connect_with(&options)
            .await
            .expect("Failed to open fixture database")
    }

    pub async fn insert_events(&self, events: &[Event]) {
        let mut conn = self.connect().await;
        for event in events {
            sqlx::query(
                "INSERT INTO EventLog (rowID, severity, date, connectID, session,
                    transactionStatus, transactionDate, transactionID, userCode, computerCode,
                    appCode, eventCode, comment, metadataCodes, sessionDataSplitCode, dataType,
                    data, dataPresentation, workServerCode, primaryPortCode, secondaryPortCode)
                 VALUES (?, ?, ?, 1, 2, 0, ?, 0, ?, ?, ?, ?, ?, '', ?, 0, ?, '', 0, 0, 0)",
            )
            .bind(event.id)
            .bind(event.severity)
            .bind(ticks(event.unix_secs))
            .bind(ticks(event.unix_secs))
            .bind(event.user_code)
            .bind(event.computer_code)
            .bind(event.app_code)
            .bind(event.event_code)
            .bind(&event.comment)
            .bind(event.split_code)
            .bind(&event.data)
            .execute(&mut conn)
            .await
            .expect("Failed to insert event");
        }
        conn.close().await.expect("Failed to close fixture connection");
    }

    /// Run arbitrary setup statements (code tables, metadata links).
    pub async fn exec(&self, statements: &[&str]) {
        let mut conn = self.connect().await;
        for stmt in statements {
            conn.execute(*stmt).await.expect("Failed to run fixture statement");
        }
        conn.close().await.expect("Failed to close fixture connection");
    }
}

/// Sink that records every accepted batch. Outcomes can be scripted; once
/// the script is exhausted every publish is accepted.
#[derive(Default)]
pub struct RecordingSink {
    script: Mutex<VecDeque<PublishOutcome>>,
    accepted: Mutex<Vec<Vec<Record>>>,
    attempts: Mutex<Vec<Vec<i64>>>,
    closed: Mutex<bool>,
}

impl RecordingSink {
    pub fn scripted(outcomes: impl IntoIterator<Item = PublishOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Ids of each accepted batch, in order.
    pub fn accepted_ids(&self) -> Vec<Vec<i64>> {
        self.accepted
            .lock()
            .unwrap()
            .iter()
            .map(|batch| batch.iter().map(|r| r.id).collect())
            .collect()
    }

    pub fn accepted_records(&self) -> Vec<Record> {
        self.accepted.lock().unwrap().iter().flatten().cloned().collect()
    }

    /// Ids of every publish attempt, accepted or not.
    pub fn attempts(&self) -> Vec<Vec<i64>> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}

#[async_trait]
impl Sink for RecordingSink {
    async fn publish(&self, records: &[Record]) -> PublishOutcome {
        self.attempts
            .lock()
            .unwrap()
            .push(records.iter().map(|r| r.id).collect());
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(PublishOutcome::Accepted);
        if outcome.is_accepted() {
            self.accepted.lock().unwrap().push(records.to_vec());
        }
        outcome
    }

    async fn close(&self) -> Result<(), SinkError> {
        *self.closed.lock().unwrap() = true;
        Ok(())
    }
}

/// In-memory checkpoint store that keeps every persist call.
#[derive(Default)]
pub struct RecordingCheckpoints {
    initial: HashMap<String, CheckpointState>,
    persisted: Mutex<Vec<(String, i64, DateTime<Utc>)>>,
    fail_persist: bool,
    fail_load: bool,
    shut_down: Mutex<bool>,
}

impl RecordingCheckpoints {
    pub fn with_state(name: &str, record_number: i64) -> Self {
        let mut initial = HashMap::new();
        initial.insert(
            name.to_string(),
            CheckpointState {
                name: name.to_string(),
                record_number,
                timestamp: Utc::now(),
            },
        );
        Self {
            initial,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_persist: true,
            ..Default::default()
        }
    }

    /// A store whose registry cannot be loaded.
    pub fn unreadable() -> Self {
        Self {
            fail_load: true,
            ..Default::default()
        }
    }

    pub fn persisted(&self) -> Vec<(String, i64, DateTime<Utc>)> {
        self.persisted.lock().unwrap().clone()
    }

    pub fn persisted_ids(&self, name: &str) -> Vec<i64> {
        self.persisted()
            .into_iter()
            .filter(|(n, _, _)| n == name)
            .map(|(_, id, _)| id)
            .collect()
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shut_down.lock().unwrap()
    }
}

impl CheckpointStore for RecordingCheckpoints {
    fn load_all(&self) -> eventbeat_checkpoint::Result<HashMap<String, CheckpointState>> {
        if self.fail_load {
            return Err(CheckpointError::Poisoned);
        }
        Ok(self.initial.clone())
    }

    fn persist(
        &self,
        name: &str,
        last_id: i64,
        last_timestamp: DateTime<Utc>,
    ) -> eventbeat_checkpoint::Result<()> {
        if self.fail_persist || self.is_shut_down() {
            return Err(CheckpointError::Closed);
        }
        self.persisted
            .lock()
            .unwrap()
            .push((name.to_string(), last_id, last_timestamp));
        Ok(())
    }

    fn shutdown(&self) -> eventbeat_checkpoint::Result<()> {
        *self.shut_down.lock().unwrap() = true;
        Ok(())
    }
}
