//! Validator key records as JSON objects on an OpenDAL operator

use async_trait::async_trait;
use opendal::{ErrorKind, Operator};
use tracing::{debug, info};

use crate::health::is_healthy;
use crate::{SyncStore, UpsertSummary};
use vks_core::{ValidatorKeyRecord, VksError, VksResult};

/// [`SyncStore`] over any OpenDAL backend.
#[derive(Clone)]
pub struct OperatorStore {
    op: Operator,
    prefix: String,
}

impl OperatorStore {
    pub fn new(op: Operator, prefix: &str) -> Self {
        Self {
            op,
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    fn records_dir(&self) -> String {
        if self.prefix.is_empty() {
            "validators/".to_string()
        } else {
            format!("{}/validators/", self.prefix)
        }
    }

    fn record_path(&self, public_key: &str) -> String {
        format!("{}{}.json", self.records_dir(), public_key)
    }

    async fn record_paths(&self) -> VksResult<Vec<String>> {
        let entries = match self.op.list(&self.records_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_error("listing records", e)),
        };

        let mut paths: Vec<String> = entries
            .into_iter()
            .map(|entry| entry.path().to_string())
            .filter(|path| path.ends_with(".json"))
            .collect();
        paths.sort();
        Ok(paths)
    }

    async fn read_record(&self, path: &str) -> VksResult<Option<ValidatorKeyRecord>> {
        let data = match self.op.read(path).await {
            Ok(buf) => buf.to_vec(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_error(&format!("reading {path}"), e)),
        };
        let record = serde_json::from_slice(&data)
            .map_err(|e| VksError::Storage(format!("parsing {path}: {e}")))?;
        Ok(Some(record))
    }
}

fn storage_error(context: &str, e: opendal::Error) -> VksError {
    VksError::Storage(format!("{context}: {e}"))
}

#[async_trait]
impl SyncStore for OperatorStore {
    async fn connection_check(&self) -> bool {
        is_healthy(&self.op).await
    }

    async fn count(&self) -> VksResult<u64> {
        Ok(self.record_paths().await?.len() as u64)
    }

    async fn records(&self) -> VksResult<Vec<ValidatorKeyRecord>> {
        let mut records = Vec::new();
        for path in self.record_paths().await? {
            if let Some(record) = self.read_record(&path).await? {
                records.push(record);
            }
        }
        debug!(count = records.len(), prefix = %self.prefix, "loaded key records");
        Ok(records)
    }

    async fn upsert(&self, records: &[ValidatorKeyRecord]) -> VksResult<UpsertSummary> {
        let mut summary = UpsertSummary::default();

        for record in records {
            let path = self.record_path(&record.public_key);
            let existing = self.read_record(&path).await?;

            match &existing {
                Some(stored) if stored == record => {
                    summary.unchanged += 1;
                    continue;
                }
                Some(_) => summary.updated += 1,
                None => summary.inserted += 1,
            }

            let json = serde_json::to_vec_pretty(record)
                .map_err(|e| VksError::Storage(format!("serializing {}: {e}", record.public_key)))?;
            self.op
                .write(&path, json)
                .await
                .map_err(|e| storage_error(&format!("writing {path}"), e))?;
            debug!(public_key = %record.public_key, group = record.group_index, "record written");
        }

        info!(
            inserted = summary.inserted,
            updated = summary.updated,
            unchanged = summary.unchanged,
            "store upsert complete"
        );
        Ok(summary)
    }
}
