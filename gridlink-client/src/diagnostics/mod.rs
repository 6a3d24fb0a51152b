//! Client statistics and their periodic reporting.

mod statistics;

pub use statistics::{
    log_statistics, spawn_reporter, ClientStatistics, ConnectionStats, InvocationStats,
    StatisticsCollector,
};
