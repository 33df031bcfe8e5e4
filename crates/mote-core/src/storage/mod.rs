//! In-memory sample storage
//!
//! History is kept only in RAM: one fixed-size circular buffer per metric,
//! sized by [`SAMPLE_WINDOW`]. Nothing is persisted across restarts.

mod sample_buffer;

pub use crate::config::SAMPLE_WINDOW;
pub use sample_buffer::SampleBuffer;
