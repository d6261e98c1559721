//! txlog/action — the tagged `Action` union persisted in `_delta_log/`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<SchemaField>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Action {
    #[serde(rename = "add")]
    AddFile {
        path: String,
        size: u64,
        #[serde(rename = "modificationTime")]
        modification_time: i64,
        #[serde(rename = "dataChange")]
        data_change: bool,
    },
    #[serde(rename = "remove")]
    RemoveFile {
        path: String,
        #[serde(rename = "deletionTimestamp")]
        deletion_timestamp: i64,
    },
    #[serde(rename = "metadata")]
    Metadata {
        id: String,
        name: Option<String>,
        description: Option<String>,
        schema: Schema,
        #[serde(rename = "partitionColumns")]
        partition_columns: Vec<String>,
        configuration: BTreeMap<String, String>,
    },
    #[serde(rename = "commitInfo")]
    CommitInfo {
        timestamp: i64,
        operation: String,
        #[serde(rename = "operationParameters")]
        operation_parameters: BTreeMap<String, String>,
        #[serde(rename = "operationMetrics")]
        operation_metrics: BTreeMap<String, String>,
    },
}
