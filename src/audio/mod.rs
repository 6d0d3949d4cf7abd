//! Audio subsystem module

pub mod buffer;
pub mod device;

pub use buffer::{AudioFrame, RingBuffer};
pub use device::{DeviceCatalog, StaticDeviceCatalog};
