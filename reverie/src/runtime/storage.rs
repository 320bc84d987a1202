use std::error::Error;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use directories_next::{BaseDirs, UserDirs};

use super::settings::Settings;

pub fn config_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|base| base.config_dir().join("Reverie"))
}

/// `~/Documents/Reverie/units`, or `~/Reverie/units` when there is no
/// documents directory.
pub fn default_units_dir() -> String {
    let primary = UserDirs::new().and_then(|ud| {
        ud.document_dir().map(|dir| dir.join("Reverie").join("units"))
    });

    let fallback = BaseDirs::new()
        .map(|bd| bd.home_dir().join("Reverie").join("units"));

    primary
        .or(fallback)
        .unwrap_or_else(|| PathBuf::from("units"))
        .to_string_lossy()
        .into_owned()
}

pub fn settings_path(dir: &Path) -> PathBuf {
    dir.join("settings.json")
}

pub fn save_settings(
    path: &Path,
    settings: &Settings,
) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(settings)?;
    if let Some(parent_dir) = path.parent() {
        fs::create_dir_all(parent_dir)?;
    }
    fs::write(path, json)?;
    Ok(())
}

pub fn load_settings(path: &Path) -> Result<Settings, Box<dyn Error>> {
    let json = fs::read_to_string(path)?;
    let settings = serde_json::from_str::<Settings>(&json)?;
    Ok(settings)
}

pub fn load_settings_if_exists(
    path: &Path,
) -> Result<Option<Settings>, Box<dyn Error>> {
    match load_settings(path) {
        Ok(settings) => Ok(Some(settings)),
        Err(err) => {
            if err
                .downcast_ref::<std::io::Error>()
                .is_some_and(|e| e.kind() == ErrorKind::NotFound)
            {
                Ok(None)
            } else {
                Err(err)
            }
        }
    }
}
