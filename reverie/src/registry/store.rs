//! Disk persistence for script units.
//!
//! Every unit is a single `<name>.rhai` file in one flat directory. The
//! store never edits a unit after writing it; it only enumerates, reads and
//! (re)writes whole files.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{LoadError, WriteError};
use crate::core::logging::{debug, info, warn};

pub const UNIT_EXTENSION: &str = "rhai";

/// The native fallback program. Never written to disk.
pub const DEFAULT_UNIT: &str = "mesh";

/// Shared helper functions compiled into every script program.
pub const HELPERS_UNIT: &str = "helpers";

pub const RESERVED_UNITS: [&str; 2] = [DEFAULT_UNIT, HELPERS_UNIT];

/// Prepended to every generated unit.
pub const PREAMBLE: &str = "\
// reverie unit
//
// Render::draw_line(x1, y1, x2, y2)  Render::draw_rect(x, y, w, h, filled?)
// Render::draw_circle(x, y, r, filled?)  Render::turn_on_pixel(x, y)
// Render::draw_text(text, x, y)  Render::width()  Render::height()
// Input::is_key_pressed(name)  Input::mouse_x()  Input::mouse_y()
// Sound::play_tone(frequency, duration)
// helpers::lerp  helpers::clamp  helpers::dist  helpers::wrap
// rand()  rand_range(lo, hi)  rand_int(lo, hi)

";

const HELPERS_SOURCE: &str = include_str!("../../static/helpers.rhai");

pub fn is_reserved(name: &str) -> bool {
    RESERVED_UNITS.contains(&name)
}

pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Removes markdown code-fence marker lines (with or without a language
/// tag) so a raw model reply becomes plain source.
pub fn strip_code_fences(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for line in raw.lines() {
        if line.trim_start().starts_with("```") {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[derive(Clone, Debug)]
pub struct UnitStore {
    dir: PathBuf,
}

impl UnitStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn unit_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, UNIT_EXTENSION))
    }

    pub fn contains(&self, name: &str) -> bool {
        is_valid_name(name) && self.unit_path(name).is_file()
    }

    /// Sorted names of every saved unit, reserved units excluded. A missing
    /// directory is simply empty.
    pub fn enumerate_names(&self) -> BTreeSet<String> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                if err.kind() != ErrorKind::NotFound {
                    warn!(
                        "Unable to list units in {}: {}",
                        self.dir.display(),
                        err
                    );
                }
                return BTreeSet::new();
            }
        };

        entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|ext| ext.to_str())
                        == Some(UNIT_EXTENSION)
            })
            .filter_map(|path| {
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(str::to_string)
            })
            .filter(|name| !is_reserved(name))
            .collect()
    }

    /// Persists a model reply as unit `name`: fences stripped, preamble
    /// prepended. An existing unit with the same name is overwritten.
    pub fn write(&self, name: &str, raw: &str) -> Result<PathBuf, WriteError> {
        if is_reserved(name) {
            return Err(WriteError::Reserved(name.to_string()));
        }
        if !is_valid_name(name) {
            return Err(WriteError::InvalidName(name.to_string()));
        }

        let source = format!("{}{}", PREAMBLE, strip_code_fences(raw));
        let path = self.unit_path(name);

        self.write_file(name, &path, &source)?;
        info!("Saved unit {} to {}", name, path.display());

        Ok(path)
    }

    /// Names that could not have been written are never looked up, so a
    /// name cannot reach outside the units directory.
    pub fn read_source(&self, name: &str) -> Result<String, LoadError> {
        if !is_valid_name(name) {
            return Err(LoadError::NotFound(name.to_string()));
        }
        let path = self.unit_path(name);
        fs::read_to_string(&path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                LoadError::NotFound(name.to_string())
            } else {
                LoadError::Read {
                    name: name.to_string(),
                    source,
                }
            }
        })
    }

    /// Writes the stock helpers unit unless one already exists, so local
    /// edits to `helpers.rhai` survive restarts.
    pub fn install_helpers(&self) -> Result<(), WriteError> {
        let path = self.unit_path(HELPERS_UNIT);
        if path.exists() {
            return Ok(());
        }
        self.write_file(HELPERS_UNIT, &path, HELPERS_SOURCE)?;
        debug!("Installed helpers unit at {}", path.display());
        Ok(())
    }

    /// The helpers source on disk, or the stock copy when it is missing or
    /// unreadable.
    pub fn helpers_source(&self) -> String {
        match self.read_source(HELPERS_UNIT) {
            Ok(source) => source,
            Err(LoadError::NotFound(_)) => HELPERS_SOURCE.to_string(),
            Err(err) => {
                warn!("{}; using stock helpers", err);
                HELPERS_SOURCE.to_string()
            }
        }
    }

    fn write_file(
        &self,
        name: &str,
        path: &Path,
        contents: &str,
    ) -> Result<(), WriteError> {
        let io_err = |source| WriteError::Io {
            name: name.to_string(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(io_err)?;
        fs::write(path, contents).map_err(io_err)
    }
}
