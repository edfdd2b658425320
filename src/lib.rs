pub mod config;
pub mod engine;
pub mod feed;
pub mod pipeline;
pub mod scheduler;
pub mod stream;

pub use config::{Config, Mode};
pub use engine::alert::{Alert, Direction};
pub use engine::goal_matrix::ProbabilityResult;
pub use engine::movers::AlertFilter;
pub use pipeline::{CycleReport, OddsMonitor, OddsSnapshotView};
pub use stream::AlertListener;
