//! Operation metrics for the storage primitives.

use std::time::Instant;

/// Records the outcome of one executor operation.
///
/// Two metrics are emitted per call:
/// 1. `mapstore_operations_total`: counter by provider, operation and status
/// 2. `mapstore_operation_duration_ms`: latency histogram with the same labels
///
/// # Examples
///
/// ```ignore
/// let start = Instant::now();
/// let result = run_query();
/// record_operation_metrics("sqlite", "query", start, status_of(&result));
/// ```
pub fn record_operation_metrics(
    provider: &'static str,
    operation: &'static str,
    start: Instant,
    status: &'static str,
) {
    metrics::counter!(
        "mapstore_operations_total",
        "provider" => provider,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "mapstore_operation_duration_ms",
        "provider" => provider,
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

/// Maps a result to its metrics status label.
pub const fn status_of<T>(result: &crate::Result<T>) -> &'static str {
    if result.is_ok() { "success" } else { "error" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_status_of() {
        assert_eq!(status_of(&Ok::<_, Error>(1)), "success");
        assert_eq!(
            status_of(&Err::<(), _>(Error::InvalidArgument("x".to_string()))),
            "error"
        );
    }

    #[test]
    fn test_record_without_recorder() {
        // No recorder installed: recording is a no-op.
        let start = Instant::now();
        record_operation_metrics("sqlite", "query", start, "success");
        record_operation_metrics("sqlite", "execute", start, "error");
    }

    #[test]
    fn test_record_concurrently() {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let status = if i % 2 == 0 { "success" } else { "error" };
                std::thread::spawn(move || {
                    record_operation_metrics("sqlite", "scalar", Instant::now(), status);
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread panicked");
        }
    }
}
