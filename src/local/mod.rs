//! Local outgoing voices

pub mod recorder;

pub use recorder::{Recorder, RecorderSet};
