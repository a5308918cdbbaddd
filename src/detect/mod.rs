mod backend;
mod backends;
pub mod labels;
mod result;

pub use backend::{DetectionCapability, DetectorBackend};
pub use backends::ReplayBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{BoundingBox, Detection, DetectionResult};
