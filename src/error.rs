use thiserror::Error;

/// Failures a sync pass can hit. "Partition not found" and "no prior record
/// for an instance" are not errors — the sink and engine recover from those
/// locally and they never appear here.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("admin API {action} returned status {status}: {body}")]
    AdminApi {
        action: &'static str,
        status: u16,
        body: String,
    },

    #[error("malformed {context} response: {source}")]
    MalformedResponse {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("log store returned status {status}: {body}")]
    Store { status: u16, body: String },

    #[error("failed to write record to partition {partition}: {reason}")]
    WriteFailure { partition: String, reason: String },
}

pub type Result<T> = std::result::Result<T, SyncError>;
