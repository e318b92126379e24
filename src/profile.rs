use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::ControlCatalog;
use crate::control::Description;
use crate::error::Result;

/// Snapshot of a device's control state, suitable for saving to disk and
/// replaying onto a device later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraProfile {
    /// Card name of the device the profile was captured from.
    pub device: String,
    /// Discovered controls, keyed by name.
    pub controls: BTreeMap<String, Description>,
}

impl CameraProfile {
    /// Captures the current control state of an open catalog.
    pub fn capture(catalog: &ControlCatalog) -> Result<Self> {
        Ok(CameraProfile {
            device: catalog.capabilities().card.clone(),
            controls: catalog.enumerate()?,
        })
    }

    /// Writes the profile as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Reads a profile back from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let profile = serde_json::from_reader(BufReader::new(file))?;
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_profile() -> CameraProfile {
        let mut controls = BTreeMap::new();
        controls.insert(
            "Brightness".to_string(),
            Description {
                id: 0x0098_0900,
                name: "Brightness".to_string(),
                minimum: -64,
                maximum: 64,
                step: 1,
                default_value: 0,
                current_value: 12,
            },
        );
        controls.insert(
            "Vendor Knob".to_string(),
            Description {
                id: 0x0800_0000,
                name: "Vendor Knob".to_string(),
                minimum: 0,
                maximum: 3,
                step: 1,
                default_value: 1,
                current_value: 3,
            },
        );
        CameraProfile {
            device: "Test Camera".to_string(),
            controls,
        }
    }

    #[test]
    fn json_round_trip_preserves_every_field() {
        let profile = sample_profile();
        let json = serde_json::to_string_pretty(&profile).unwrap();
        let restored: CameraProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, profile);
    }

    #[test]
    fn save_and_load_from_disk() {
        let profile = sample_profile();
        let path = std::env::temp_dir().join(format!("uvccam-profile-{}.json", std::process::id()));

        profile.save(&path).unwrap();
        let restored = CameraProfile::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(restored, profile);
    }

    #[test]
    fn negative_bounds_survive_serialization() {
        let profile = sample_profile();
        let json = serde_json::to_string(&profile).unwrap();
        let restored: CameraProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.controls["Brightness"].minimum, -64);
    }
}
