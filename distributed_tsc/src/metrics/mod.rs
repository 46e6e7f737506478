//! Run records written alongside training.
//!
//! - [`ProgressWriter`]: learner 0's per-agent update, replay and
//!   available-experience CSVs
//! - [`TravelTimes`]: vehicle travel times of one actor episode
//! - [`write_test_metrics`]: test-mode controller histories

pub mod progress;
pub mod travel;

pub use progress::{timestamp, ProgressColumn, ProgressWriter};
pub use travel::{append_travel_time, tracks_travel_time, write_test_metrics, TravelTimes};
