//! Remote voice stream to local playback endpoint binding

pub mod endpoint;
pub mod table;

pub use endpoint::{Endpoint, EndpointHandle, LinkParams, Speaker};
pub use table::{BindingStats, BindingTable};
