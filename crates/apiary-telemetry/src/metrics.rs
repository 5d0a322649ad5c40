//! Error response metrics.
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `apiary_error_responses_total` | Counter | `status`, `code` | Error responses written by the finalizer |
//!
//! Metrics go through the `metrics` facade. Without an installed recorder
//! they are no-ops; install any exporter to collect them.

use metrics::{counter, describe_counter};

/// Name of the error response counter.
pub const ERROR_RESPONSES_TOTAL: &str = "apiary_error_responses_total";

/// Registers metric descriptions with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(
        ERROR_RESPONSES_TOTAL,
        "Total number of error responses, by status and error code"
    );
}

/// Records one error response.
pub fn record_error_response(status: u16, code: &str) {
    counter!(
        ERROR_RESPONSES_TOTAL,
        "status" => status.to_string(),
        "code" => code.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_name() {
        assert_eq!(ERROR_RESPONSES_TOTAL, "apiary_error_responses_total");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        describe_metrics();
        record_error_response(400, "BAD_REQUEST_ERROR");
        record_error_response(500, "INTERNAL_SERVER_ERROR");
    }
}
