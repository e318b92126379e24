pub mod v4l2;

mod capability;
pub use capability::Capabilities;

pub mod control;
pub use control::Description;

mod catalog;
pub use catalog::{ApplyReport, ControlCatalog};

mod error;
pub use error::{Error, Result};

mod profile;
pub use profile::CameraProfile;
