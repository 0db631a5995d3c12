//! Metrics definitions for the feature toggle client.

use shared::metrics_defs::{MetricDef, MetricType};

pub const CACHE_REBUILD_SUCCESS: MetricDef = MetricDef {
    name: "featuretoggle.rebuild.success",
    metric_type: MetricType::Counter,
    description: "Number of snapshot rebuilds that installed a new snapshot",
};

pub const CACHE_REBUILD_FAILURE: MetricDef = MetricDef {
    name: "featuretoggle.rebuild.failure",
    metric_type: MetricType::Counter,
    description: "Number of snapshot rebuilds that failed and kept the previous snapshot",
};

pub const CACHE_REBUILD_DURATION: MetricDef = MetricDef {
    name: "featuretoggle.rebuild.duration",
    metric_type: MetricType::Histogram,
    description: "Time to fetch and install a snapshot in seconds",
};

pub const SNAPSHOT_ENTRIES: MetricDef = MetricDef {
    name: "featuretoggle.snapshot.entries",
    metric_type: MetricType::Gauge,
    description: "Number of entries in the current snapshot, type tags included",
};

pub const NOTIFICATION_IGNORED: MetricDef = MetricDef {
    name: "featuretoggle.notification.ignored",
    metric_type: MetricType::Counter,
    description: "Notifications for another namespace or a non-mutating operation",
};

pub const NOTIFICATION_MALFORMED: MetricDef = MetricDef {
    name: "featuretoggle.notification.malformed",
    metric_type: MetricType::Counter,
    description: "Notifications whose channel could not be parsed",
};

pub const ACCESSOR_DEFAULTED: MetricDef = MetricDef {
    name: "featuretoggle.accessor.defaulted",
    metric_type: MetricType::Counter,
    description: "Accessor calls that fell back to the default value, tagged by accessor",
};

pub const ALL_METRICS: &[MetricDef] = &[
    CACHE_REBUILD_SUCCESS,
    CACHE_REBUILD_FAILURE,
    CACHE_REBUILD_DURATION,
    SNAPSHOT_ENTRIES,
    NOTIFICATION_IGNORED,
    NOTIFICATION_MALFORMED,
    ACCESSOR_DEFAULTED,
];
