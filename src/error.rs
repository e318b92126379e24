use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Catalog error types
#[derive(Debug, Error)]
pub enum Error {
    /// The device node is missing, inaccessible or not a V4L2 device.
    #[error("failed to open device {}: {source}", path.display())]
    DeviceOpen { path: PathBuf, source: io::Error },

    /// A single control query/get/set call was rejected by the driver.
    #[error("control i/o failed for id {id:#010x}: {source}")]
    ControlIo { id: u32, source: io::Error },

    /// An operation was attempted on a closed catalog.
    #[error("catalog used after close")]
    UseAfterClose,

    /// Profile file i/o failed.
    #[error("profile i/o failed: {0}")]
    Io(#[from] io::Error),

    /// Profile (de)serialization failed.
    #[error("profile encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
