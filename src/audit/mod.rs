//! Append-only journal of transfer attempts, with filtered queries and CSV
//! export.

use crate::db::{Direction, LogFilter, LogRecord, Outcome, Store, TransferLogEntry};
use crate::error::BridgeError;

pub struct AuditLog {
    store: Store,
}

impl AuditLog {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Journal one transfer attempt. Callers are responsible for passing
    /// ids of existing rows; a failed append means the attempt itself must
    /// be treated as failed.
    pub fn append(
        &self,
        direction: Direction,
        artifact_id: &str,
        contact_id: &str,
        outcome: Outcome,
        error_detail: Option<String>,
    ) -> Result<TransferLogEntry, BridgeError> {
        let entry = TransferLogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            direction,
            artifact_id: artifact_id.to_string(),
            contact_id: contact_id.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            outcome,
            error_detail,
        };
        self.store
            .append_log(&entry)
            .map_err(BridgeError::storage)?;
        Ok(entry)
    }

    pub fn query(&self, filter: &LogFilter) -> Result<Vec<LogRecord>, BridgeError> {
        self.store.query_logs(filter).map_err(BridgeError::storage)
    }

    pub fn get(&self, id: &str) -> Result<Option<LogRecord>, BridgeError> {
        self.store.get_log(id).map_err(BridgeError::storage)
    }

    /// All entries, newest first, as CSV. Every data field is quoted with
    /// doubled-quote escaping so embedded quotes and commas survive a
    /// round-trip through spreadsheet tools.
    pub fn export_csv(&self) -> Result<String, BridgeError> {
        let records = self.store.export_logs().map_err(BridgeError::storage)?;

        let mut csv = String::from(CSV_HEADER);
        csv.push('\n');
        for record in records {
            let fields = [
                record.entry.id.as_str(),
                record.entry.direction.as_str(),
                record.entry.outcome.as_str(),
                record.entry.timestamp.as_str(),
                record.artifact_name.as_str(),
                record.contact_name.as_str(),
                record.entry.error_detail.as_deref().unwrap_or(""),
            ];
            let row: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
            csv.push_str(&row.join(","));
            csv.push('\n');
        }
        Ok(csv)
    }
}

const CSV_HEADER: &str = "ID,Direction,Outcome,Timestamp,File Name,Contact Name,Error Detail";

fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}
