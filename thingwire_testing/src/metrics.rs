//! Helpers for asserting on metrics recorded through `metrics-util`.

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

/// Create a debugging recorder and the snapshotter reading from it.
#[must_use]
pub fn debugging_recorder() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

fn find(snapshotter: &Snapshotter, name: &str, label: Option<(&str, &str)>) -> Option<DebugValue> {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .find(|(key, _, _, _)| {
            key.key().name() == name
                && label.is_none_or(|(label_key, label_value)| {
                    key.key()
                        .labels()
                        .any(|l| l.key() == label_key && l.value() == label_value)
                })
        })
        .map(|(_, _, _, value)| value)
}

/// Value of the counter `name`, optionally filtered by one label.
#[must_use]
pub fn counter_value(snapshotter: &Snapshotter, name: &str, label: Option<(&str, &str)>) -> Option<u64> {
    match find(snapshotter, name, label)? {
        DebugValue::Counter(value) => Some(value),
        _ => None,
    }
}

/// Value of the gauge `name`.
#[must_use]
pub fn gauge_value(snapshotter: &Snapshotter, name: &str) -> Option<f64> {
    match find(snapshotter, name, None)? {
        DebugValue::Gauge(value) => Some(value.into_inner()),
        _ => None,
    }
}
