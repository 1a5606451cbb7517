//! User preferences persisted to `usersettings.toml` in the working
//! directory. Only presentation-level choices live here; mesh loading never
//! touches this file.

use std::path::Path;

use serde::{Deserialize, Serialize};

pub const SETTINGS_FILE: &str = "usersettings.toml";

/// Mouse mapping for the orbit camera.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlScheme {
    /// Alt+Middle orbits, Middle pans.
    #[default]
    Industry,
    /// Middle orbits, Shift+Middle pans.
    Blender,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub control_scheme: ControlScheme,
}

impl UserSettings {
    /// Load from the default path; any failure falls back to defaults.
    pub fn load_or_default() -> Self {
        Self::load_from(Path::new(SETTINGS_FILE)).unwrap_or_else(|err| {
            log::info!("using default settings ({err})");
            Self::default()
        })
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(Path::new(SETTINGS_FILE))
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        log::info!("saved settings to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "veles3d-settings-test-{}.toml",
            std::process::id()
        ));
        let settings = UserSettings {
            control_scheme: ControlScheme::Blender,
        };
        settings.save_to(&path).expect("save");
        let loaded = UserSettings::load_from(&path).expect("load");
        assert_eq!(loaded, settings);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let missing = Path::new("veles3d-no-such-settings.toml");
        assert!(UserSettings::load_from(missing).is_err());
        assert_eq!(
            UserSettings::default().control_scheme,
            ControlScheme::Industry
        );
    }

    #[test]
    fn unknown_scheme_text_is_an_error_not_a_panic() {
        let path = std::env::temp_dir().join(format!(
            "veles3d-settings-bad-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "control_scheme = \"maya\"\n").expect("write");
        assert!(UserSettings::load_from(&path).is_err());
        let _ = std::fs::remove_file(path);
    }
}
