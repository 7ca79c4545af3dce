//! Low-level image operations shared by detection and the analyzers
//!
//! Binary masks, contrast-limited adaptive histogram equalization,
//! directional morphology and sliding-window variance. Everything here
//! returns new buffers; inputs are never modified.

pub mod mask;
pub mod clahe;
pub mod morphology;
pub mod variance;

pub use clahe::clahe;
pub use mask::Mask;
pub use morphology::{open_line, LineOrientation};
pub use variance::{local_mean, local_variance};
