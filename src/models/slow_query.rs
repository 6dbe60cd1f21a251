use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::instance::Instance;

/// How much of the SQL text goes into the `SQLBrief` summary field.
pub const SQL_BRIEF_CHARS: usize = 200;

/// One slow SQL execution as reported by the admin API.
///
/// Only the two fields the sync logic depends on are typed; everything else
/// the API sends (query times, lock time, rows examined, host address, ...)
/// is carried through `extra` untouched. The enrichment fields are `None`
/// until [`annotate`](Self::annotate) runs and are omitted from the stored
/// document when unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlowQueryRecord {
    /// Sole ordering and dedup key within an instance's record stream.
    #[serde(rename = "ExecutionStartTime")]
    pub execution_start_time: DateTime<Utc>,
    #[serde(rename = "SQLText", default)]
    pub sql_text: String,

    #[serde(rename = "InstanceID", skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(rename = "InstanceName", skip_serializing_if = "Option::is_none")]
    pub instance_name: Option<String>,
    #[serde(rename = "SQLBrief", skip_serializing_if = "Option::is_none")]
    pub sql_brief: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl SlowQueryRecord {
    /// Tag the record with its owning instance before storage.
    pub fn annotate(&mut self, instance: &Instance) {
        self.instance_id = Some(instance.id.clone());
        self.instance_name = Some(instance.description.clone());
        self.sql_brief = Some(sql_brief(&self.sql_text));
    }
}

/// First [`SQL_BRIEF_CHARS`] characters of the SQL text. Character-based,
/// not byte-based, so multi-byte SQL never splits mid-character.
pub fn sql_brief(sql: &str) -> String {
    sql.chars().take(SQL_BRIEF_CHARS).collect()
}
