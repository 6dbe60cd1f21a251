use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::Value;
use std::time::Duration as StdDuration;

use crate::config::StoreConfig;
use crate::error::{Result, SyncError};
use crate::models::slow_query::SlowQueryRecord;

/// Where enriched records end up. The engine only sees this seam.
#[async_trait]
pub trait LogSink {
    /// Name of the daily partition for a local calendar date.
    fn partition(&self, date: NaiveDate) -> String;

    /// Most recent stored record for an instance, or `None` on cold start.
    /// Looks in today's local-date partition, falls back to yesterday's.
    /// Missing partitions and missing matches are both normal, not errors.
    async fn last_record(&self, instance_id: &str) -> Result<Option<SlowQueryRecord>>;

    /// Write one record into the named partition. The store creates the
    /// partition implicitly on first write. Failure comes back as an error
    /// value; the engine decides how to react.
    async fn save_record(&self, record: &SlowQueryRecord, partition: &str) -> Result<()>;
}

/// The record's own UTC timestamp shifted into the operator's day. Log
/// buckets align to the local calendar, not the UTC one, so a query at
/// 20:00Z lands in the next day's bucket under UTC+8.
pub fn local_partition_date(ts: DateTime<Utc>, offset_hours: i32) -> NaiveDate {
    (ts + Duration::hours(i64::from(offset_hours))).date_naive()
}

/// `{base}-YYYY.MM.DD`.
pub fn partition_name(base: &str, date: NaiveDate) -> String {
    format!("{base}-{}", date.format("%Y.%m.%d"))
}

/// Pull the newest hit out of a store search response. Any missing or
/// malformed piece means "no usable prior record" and the caller falls back
/// to the cold-start watermark.
fn parse_last_record(response: &Value) -> Option<SlowQueryRecord> {
    let hit = response.get("hits")?.get("hits")?.as_array()?.first()?;
    let source = hit.get("_source")?;
    serde_json::from_value(source.clone()).ok()
}

/// Document-store sink speaking the store's REST interface.
pub struct EsStore {
    http: reqwest::Client,
    base_url: String,
    index_base: String,
    username: Option<String>,
    password: Option<String>,
    offset_hours: i32,
}

impl EsStore {
    pub fn new(cfg: &StoreConfig, offset_hours: i32, timeout: StdDuration) -> anyhow::Result<Self> {
        let host = cfg
            .hosts
            .first()
            .ok_or_else(|| anyhow::anyhow!("store host list is empty"))?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: format!("{}://{}:{}", cfg.protocol.to_lowercase(), host, cfg.port),
            index_base: cfg.index_base.clone(),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            offset_hours,
        })
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.username {
            Some(user) => req.basic_auth(user, self.password.as_deref()),
            None => req,
        }
    }

    /// Newest record for the instance in one partition. `Ok(None)` covers
    /// both a missing partition (HTTP 404) and a partition with no hits.
    async fn search_latest(
        &self,
        partition: &str,
        instance_id: &str,
    ) -> Result<Option<SlowQueryRecord>> {
        let url = format!(
            "{}/{}/_search",
            self.base_url,
            urlencoding::encode(partition)
        );
        let query = serde_json::json!({
            "size": 1,
            "query": { "match": { "InstanceID": instance_id } },
            "sort": [ { "ExecutionStartTime": { "order": "desc" } } ],
        });

        let resp = self.authed(self.http.post(&url).json(&query)).send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(partition, "partition not found");
            return Ok(None);
        }
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(SyncError::Store {
                status: status.as_u16(),
                body,
            });
        }
        let response: Value =
            serde_json::from_str(&body).map_err(|source| SyncError::MalformedResponse {
                context: "search",
                source,
            })?;
        Ok(parse_last_record(&response))
    }
}

#[async_trait]
impl LogSink for EsStore {
    fn partition(&self, date: NaiveDate) -> String {
        partition_name(&self.index_base, date)
    }

    async fn last_record(&self, instance_id: &str) -> Result<Option<SlowQueryRecord>> {
        let today = local_partition_date(Utc::now(), self.offset_hours);
        let yesterday = today - Duration::days(1);
        for date in [today, yesterday] {
            let partition = self.partition(date);
            if let Some(record) = self.search_latest(&partition, instance_id).await? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    async fn save_record(&self, record: &SlowQueryRecord, partition: &str) -> Result<()> {
        let url = format!("{}/{}/_doc", self.base_url, urlencoding::encode(partition));
        let resp = self.authed(self.http.post(&url).json(record)).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::WriteFailure {
                partition: partition.to_string(),
                reason: format!("status {status}: {body}"),
            });
        }
        Ok(())
    }
}
