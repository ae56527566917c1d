use edge_telemetry::{metrics, new_request_ids, record_lost_row_appended};

#[test]
fn request_ids_non_empty() {
    let ids = new_request_ids();
    assert!(!ids.request_id.is_empty());
    assert!(!ids.trace_id.is_empty());
    assert_ne!(ids.request_id, ids.trace_id);
}

#[test]
fn counters_are_monotonic() {
    let before = metrics().snapshot().lost_rows_appended;
    record_lost_row_appended();
    record_lost_row_appended();
    assert!(metrics().snapshot().lost_rows_appended >= before + 2);
}
