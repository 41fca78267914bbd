//! Monitored stations and the store collaborators that supply their history

pub mod model;
pub mod store;

pub use model::{
    LatestReading, LatestReadings, ProbeResult, Reading, Station, StationId, ThresholdRule,
    DEFAULT_FAILURE_THRESHOLD, DEFAULT_GAP_HOURS,
};
pub use store::{parse_threshold_rules, FileStore, MemoryStore, StationStore, StoreError};
