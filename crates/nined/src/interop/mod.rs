//! Native interop surface
//!
//! These wrappers are what an embedding host reaches through to mix its own
//! Vulkan work with the translation layer: querying adopted handles, pacing
//! the command stream, cooperating on queue submission, and creating
//! translation-layer resources around which both sides synchronize.

pub mod device;
pub mod texture;

pub use device::{ExtImageDesc, InteropDevice};
pub use texture::InteropTexture;
