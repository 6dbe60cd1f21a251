use serde::{Deserialize, Serialize};

/// A managed database deployment, as listed by the admin API. Fetched fresh
/// on every run, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    #[serde(rename = "DBInstanceId")]
    pub id: String,
    #[serde(rename = "DBInstanceDescription", default)]
    pub description: String,
}
