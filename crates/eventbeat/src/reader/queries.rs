//! SQL run against the event log store.

/// Next page of events after a cursor.
///
/// Binds: cursor (`rowID >`), page size. Every code column is resolved with a
/// left join so a missing dictionary entry yields `''` rather than dropping
/// the row. An event linked to several metadata objects comes back once per
/// object, consecutively; the reader keeps the first.
pub(crate) const EVENT_PAGE: &str = r#"
    SELECT
        T1.rowID AS id,
        T1.severity AS severity,
        T1.date AS date,
        T1.connectID AS connectID,
        T1.session AS session,
        T1.transactionStatus AS transactionStatus,
        T1.transactionDate AS transactionDate,
        T1.transactionID AS transactionID,
        T1.userCode AS userCode,
        ifnull(T2.name, '') AS userName,
        ifnull(T2.uuid, '') AS userUuid,
        T1.computerCode AS computerCode,
        ifnull(T3.name, '') AS computerName,
        T1.appCode AS appCode,
        ifnull(T4.name, '') AS appName,
        T1.eventCode AS eventCode,
        ifnull(T5.name, '') AS eventName,
        T1.comment AS comment,
        T1.metadataCodes AS metadataCodes,
        T1.sessionDataSplitCode AS sessionDataSplitCode,
        T1.dataType AS dataType,
        T1.data AS data,
        T1.dataPresentation AS dataPresentation,
        T1.workServerCode AS workServerCode,
        ifnull(T6.name, '') AS workServerName,
        T1.primaryPortCode AS primaryPortCode,
        ifnull(T7.name, '') AS primaryPortName,
        T1.secondaryPortCode AS secondaryPortCode,
        ifnull(T8.name, '') AS secondaryPortName,
        ifnull(T9.metadataCode, 0) AS metadataCode,
        ifnull(T10.name, '') AS metadataName,
        ifnull(T10.uuid, '') AS metadataUuid
    FROM EventLog T1
    LEFT OUTER JOIN UserCodes T2 ON T1.userCode = T2.code
    LEFT OUTER JOIN ComputerCodes T3 ON T1.computerCode = T3.code
    LEFT OUTER JOIN AppCodes T4 ON T1.appCode = T4.code
    LEFT OUTER JOIN EventCodes T5 ON T1.eventCode = T5.code
    LEFT OUTER JOIN WorkServerCodes T6 ON T1.workServerCode = T6.code
    LEFT OUTER JOIN PrimaryPortCodes T7 ON T1.primaryPortCode = T7.code
    LEFT OUTER JOIN SecondaryPortCodes T8 ON T1.secondaryPortCode = T8.code
    LEFT OUTER JOIN EventLogMetadata T9 ON T1.rowID = T9.eventLogID
    LEFT OUTER JOIN MetadataCodes T10 ON T9.metadataCode = T10.code
    WHERE T1.rowID > ?
    ORDER BY T1.rowID, T9.metadataCode
    LIMIT ?
"#;

/// Session parameter/value pairs behind a data split code.
///
/// Binds: data split code.
pub(crate) const DATA_SPLIT: &str = r#"
    SELECT
        T2.name AS sessionParamName,
        T3.dataType AS sessionValDataType,
        T3.data AS sessionValData
    FROM SessionDataSplits T1
    INNER JOIN SessionParamCodes T2 ON T1.sessionParamCode = T2.code
    INNER JOIN SessionDataCodes T3
        ON T1.sessionParamCode = T3.sessionParamCode
        AND T1.sessionValCode = T3.sessionValCode
    WHERE T1.code = ?
    ORDER BY T1.sessionParamCode
"#;
