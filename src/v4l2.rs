pub mod api;
pub(crate) mod videodev;
pub mod vidioc;

pub use api::{close, ioctl, open};
