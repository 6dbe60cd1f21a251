use chrono::{DateTime, Duration, NaiveTime, Utc};

use crate::config::{SyncOptions, WriteFailurePolicy};
use crate::error::Result;
use crate::sink::{LogSink, local_partition_date};
use crate::source::SlowLogSource;

/// Where to resume fetching for an instance.
///
/// With a prior stored record the watermark is its timestamp plus one step
/// (records at or before it are assumed ingested). On cold start it defaults
/// to `lookback_days` back truncated to midnight UTC, so a fresh instance
/// picks up as much as two days of history.
pub fn resume_watermark(
    last: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    opts: &SyncOptions,
) -> DateTime<Utc> {
    match last {
        Some(t) => t + Duration::seconds(opts.watermark_step_secs),
        None => (now - Duration::days(opts.lookback_days))
            .date_naive()
            .and_time(NaiveTime::MIN)
            .and_utc(),
    }
}

/// One full sync pass: list instances, then per instance compute the resume
/// watermark from the sink, fetch everything newer from the source, annotate
/// and write each record through. Strictly sequential; instances are
/// independent of each other.
pub struct SyncEngine<S, K> {
    source: S,
    sink: K,
    opts: SyncOptions,
}

impl<S, K> SyncEngine<S, K>
where
    S: SlowLogSource + Sync,
    K: LogSink + Sync,
{
    pub fn new(source: S, sink: K, opts: SyncOptions) -> Self {
        Self { source, sink, opts }
    }

    /// Run the pass and return the total number of records written.
    pub async fn run(&self) -> Result<u64> {
        let instances = self.source.list_instances().await?;
        tracing::info!("found {} database instances", instances.len());

        let mut written: u64 = 0;
        'instances: for instance in &instances {
            let now = Utc::now();
            // The remote API may not have flushed the current minute yet.
            let end = now - Duration::seconds(self.opts.end_lag_secs);

            let last = self.sink.last_record(&instance.id).await?;
            if last.is_none() {
                tracing::info!(
                    instance = %instance.id,
                    "no prior record, cold start from {} day(s) back",
                    self.opts.lookback_days
                );
            }
            let start = resume_watermark(last.map(|r| r.execution_start_time), now, &self.opts);

            tracing::debug!(instance = %instance.id, %start, %end, "fetching slow query records");
            let records = self
                .source
                .fetch_slow_records(&instance.id, start, end)
                .await?;
            tracing::info!(
                instance = %instance.id,
                count = records.len(),
                "fetched slow query records"
            );

            for mut record in records {
                record.annotate(instance);
                let date =
                    local_partition_date(record.execution_start_time, self.opts.local_offset_hours);
                let partition = self.sink.partition(date);
                match self.sink.save_record(&record, &partition).await {
                    Ok(()) => written += 1,
                    Err(e) => match self.opts.write_failure {
                        WriteFailurePolicy::AbortRun => return Err(e),
                        WriteFailurePolicy::SkipRecord => {
                            tracing::warn!(
                                instance = %instance.id,
                                partition,
                                "write failed, skipping record: {e}"
                            );
                        }
                        WriteFailurePolicy::SkipInstance => {
                            tracing::warn!(
                                instance = %instance.id,
                                partition,
                                "write failed, abandoning instance: {e}"
                            );
                            continue 'instances;
                        }
                    },
                }
            }
        }

        Ok(written)
    }
}
