use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;

use crate::config::ApiConfig;
use crate::error::{Result, SyncError};
use crate::models::instance::Instance;
use crate::models::slow_query::SlowQueryRecord;

/// Where slow-query records come from. The sync engine only sees this seam,
/// so tests can substitute a canned source.
#[async_trait]
pub trait SlowLogSource {
    async fn list_instances(&self) -> Result<Vec<Instance>>;

    /// Slow-query records for one instance within `[start, end)`, in the
    /// order the API returns them (assumed chronological). An empty result
    /// is a normal outcome, not an error.
    async fn fetch_slow_records(
        &self,
        instance_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SlowQueryRecord>>;
}

/// One page of a paginated listing.
pub struct Page<T> {
    /// Total item count across all pages, as reported by the API.
    pub total: u64,
    pub items: Vec<T>,
}

/// Drain a paginated listing into one ordered Vec.
///
/// Pages are requested starting from 1 until the cumulative count reaches the
/// API-reported total. Both listing operations share this loop so the
/// termination rule exists exactly once; the page size must stay fixed across
/// pages for the count to line up. A zero-item listing still costs one
/// request, since the total is only learnable from a page.
pub(crate) async fn fetch_all_pages<T, F, Fut>(page_size: u32, mut fetch_page: F) -> Result<Vec<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut items = Vec::new();
    let mut received: u64 = 0;
    let mut page_num: u32 = 1;
    loop {
        let page = fetch_page(page_num).await?;
        items.extend(page.items);
        received += u64::from(page_size);
        if page.total > received {
            page_num += 1;
        } else {
            return Ok(items);
        }
    }
}

#[derive(Debug, Deserialize)]
struct InstancePage {
    #[serde(rename = "TotalRecordCount")]
    total_record_count: u64,
    #[serde(rename = "Items", default)]
    items: InstanceItems,
}

#[derive(Debug, Deserialize, Default)]
struct InstanceItems {
    #[serde(rename = "DBInstance", default)]
    db_instance: Vec<Instance>,
}

#[derive(Debug, Deserialize)]
struct SlowLogPage {
    #[serde(rename = "TotalRecordCount")]
    total_record_count: u64,
    #[serde(rename = "Items", default)]
    items: SlowLogItems,
}

#[derive(Debug, Deserialize, Default)]
struct SlowLogItems {
    #[serde(rename = "SQLSlowRecord", default)]
    sql_slow_record: Vec<SlowQueryRecord>,
}

/// Client for the managed-database administrative API.
///
/// Credentials ride on every request; signing and transport details are the
/// HTTP client's problem. No retry anywhere: any failed page fails the call.
pub struct AdminApiClient {
    http: reqwest::Client,
    cfg: ApiConfig,
    base_url: String,
}

impl AdminApiClient {
    pub fn new(cfg: &ApiConfig, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: cfg.base_url(),
            cfg: cfg.clone(),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        action: &'static str,
        params: Vec<(String, String)>,
    ) -> Result<T> {
        let mut query: Vec<(String, String)> = vec![
            ("Action".to_string(), action.to_string()),
            ("Format".to_string(), "JSON".to_string()),
            ("RegionId".to_string(), self.cfg.region.clone()),
        ];
        query.extend(params);

        tracing::debug!(action, "admin API request");
        let resp = self
            .http
            .get(&self.base_url)
            .query(&query)
            .basic_auth(&self.cfg.access_key_id, Some(&self.cfg.access_key_secret))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(SyncError::AdminApi {
                action,
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|source| SyncError::MalformedResponse {
            context: action,
            source,
        })
    }
}

/// The admin API takes minute-precision UTC bounds.
fn format_minute(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%MZ").to_string()
}

#[async_trait]
impl SlowLogSource for AdminApiClient {
    async fn list_instances(&self) -> Result<Vec<Instance>> {
        let page_size = self.cfg.page_size;
        fetch_all_pages(page_size, |page_num| {
            let params = vec![
                ("PageSize".to_string(), page_size.to_string()),
                ("PageNumber".to_string(), page_num.to_string()),
            ];
            async move {
                let page: InstancePage = self.call("DescribeDBInstances", params).await?;
                Ok(Page {
                    total: page.total_record_count,
                    items: page.items.db_instance,
                })
            }
        })
        .await
    }

    async fn fetch_slow_records(
        &self,
        instance_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SlowQueryRecord>> {
        let page_size = self.cfg.page_size;
        let start_s = format_minute(start);
        let end_s = format_minute(end);
        fetch_all_pages(page_size, |page_num| {
            let mut params = vec![
                ("DBInstanceId".to_string(), instance_id.to_string()),
                ("StartTime".to_string(), start_s.clone()),
                ("EndTime".to_string(), end_s.clone()),
                ("PageSize".to_string(), page_size.to_string()),
                ("PageNumber".to_string(), page_num.to_string()),
            ];
            if let Some(db) = &self.cfg.db_name {
                params.push(("DBName".to_string(), db.clone()));
            }
            async move {
                let page: SlowLogPage = self.call("DescribeSlowLogRecords", params).await?;
                Ok(Page {
                    total: page.total_record_count,
                    items: page.items.sql_slow_record,
                })
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fake a listing of `total` numbered items served `page_size` at a time.
    async fn collect(total: u64, page_size: u32, calls: &AtomicU32) -> Vec<u64> {
        fetch_all_pages(page_size, |page_num| {
            calls.fetch_add(1, Ordering::SeqCst);
            let first = u64::from(page_num - 1) * u64::from(page_size);
            let items: Vec<u64> = (first..total.min(first + u64::from(page_size))).collect();
            async move { Ok(Page { total, items }) }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_pagination_issues_ceil_n_over_p_requests() {
        let calls = AtomicU32::new(0);
        let items = collect(25, 10, &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(items.len(), 25);
        // Page order preserved.
        assert_eq!(items, (0..25).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_pagination_exact_multiple() {
        let calls = AtomicU32::new(0);
        let items = collect(30, 10, &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(items.len(), 30);
    }

    #[tokio::test]
    async fn test_pagination_single_page() {
        let calls = AtomicU32::new(0);
        let items = collect(7, 30, &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(items.len(), 7);
    }

    #[tokio::test]
    async fn test_pagination_empty_listing_costs_one_request() {
        let calls = AtomicU32::new(0);
        let items = collect(0, 30, &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_pagination_propagates_page_failure() {
        let result: Result<Vec<u64>> = fetch_all_pages(10, |page_num| async move {
            if page_num == 2 {
                Err(SyncError::AdminApi {
                    action: "DescribeDBInstances",
                    status: 429,
                    body: "Throttling".to_string(),
                })
            } else {
                Ok(Page {
                    total: 25,
                    items: vec![0; 10],
                })
            }
        })
        .await;
        assert!(matches!(result, Err(SyncError::AdminApi { status: 429, .. })));
    }

    #[test]
    fn test_format_minute_drops_seconds() {
        let t: DateTime<Utc> = "2024-03-01T09:30:45Z".parse().unwrap();
        assert_eq!(format_minute(t), "2024-03-01T09:30Z");
    }

    #[test]
    fn test_decode_slow_log_page() {
        let body = r#"{
            "TotalRecordCount": 2,
            "PageNumber": 1,
            "Items": {
                "SQLSlowRecord": [
                    {"ExecutionStartTime": "2024-03-01T01:05:00Z", "SQLText": "SELECT 1", "QueryTimes": "3"},
                    {"ExecutionStartTime": "2024-03-01T09:30:00Z", "SQLText": "SELECT 2"}
                ]
            }
        }"#;
        let page: SlowLogPage = serde_json::from_str(body).unwrap();
        assert_eq!(page.total_record_count, 2);
        assert_eq!(page.items.sql_slow_record.len(), 2);
        assert_eq!(page.items.sql_slow_record[0].extra["QueryTimes"], "3");
    }

    #[test]
    fn test_decode_instance_page_missing_items() {
        let page: InstancePage = serde_json::from_str(r#"{"TotalRecordCount": 0}"#).unwrap();
        assert_eq!(page.total_record_count, 0);
        assert!(page.items.db_instance.is_empty());
    }
}
