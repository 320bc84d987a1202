//! Turning unit names into running programs.
//!
//! Names resolve to built-in (native) programs first and to script units in
//! the [`UnitStore`] second. The default program is always available and is
//! constructed without going through the lookup at all.

use std::collections::HashMap;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use thiserror::Error;

use crate::core::logging::info;
use crate::core::util::panic_message;
use crate::mesh;
use crate::program::{LoadedProgram, Program, ProgramConfig, ProgramFactory};

pub mod script;
pub mod store;
pub mod watch;

pub use script::{ScriptLimits, ScriptProgram};
pub use store::{DEFAULT_UNIT, HELPERS_UNIT, UnitStore};
pub use watch::UnitWatch;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no program or unit named `{0}`")]
    NotFound(String),

    #[error("unable to read unit `{name}`: {source}")]
    Read {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("unit `{name}` failed to compile: {message}")]
    Compile { name: String, message: String },

    #[error("unit `{name}` does not define `{function}`")]
    Contract { name: String, function: String },

    #[error("`{name}` failed to construct: {message}")]
    Construct { name: String, message: String },
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("`{0}` is a reserved unit name")]
    Reserved(String),

    #[error("invalid unit name `{0}`")]
    InvalidName(String),

    #[error("unable to write unit `{name}`: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

struct ProgramCategory {
    title: String,
    programs: Vec<String>,
}

/// Native programs known by name. The default program is always present.
pub struct Builtins {
    entries: HashMap<String, ProgramFactory>,
    display_names: HashMap<String, &'static str>,
    ordered_names: Vec<String>,
    categories: Vec<ProgramCategory>,
}

impl Default for Builtins {
    fn default() -> Self {
        let mut entries: HashMap<String, ProgramFactory> = HashMap::new();
        entries.insert(
            mesh::PROGRAM_CONFIG.name.to_string(),
            Box::new(|| -> Box<dyn Program> { Box::new(mesh::init()) }),
        );
        Self {
            entries,
            display_names: HashMap::new(),
            ordered_names: Vec::new(),
            categories: Vec::new(),
        }
    }
}

impl Builtins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(
        &mut self,
        config: &'static ProgramConfig,
        factory: F,
    ) -> Result<(), String>
    where
        F: Fn() -> Box<dyn Program> + Send + Sync + 'static,
    {
        let name = config.name.to_string();
        if store::is_reserved(&name) {
            return Err(format!("reserved program name: {}", name));
        }
        if self.entries.contains_key(&name) {
            return Err(format!("duplicate program registration: {}", name));
        }

        self.ordered_names.push(name.clone());
        self.display_names.insert(name.clone(), config.display_name);
        self.entries.insert(name, Box::new(factory));

        Ok(())
    }

    pub fn define_category(
        &mut self,
        title: impl Into<String>,
        programs: Vec<String>,
    ) -> Result<(), String> {
        let title = title.into();

        for name in &programs {
            if !self.display_names.contains_key(name) {
                return Err(format!(
                    "category '{}' references unknown program '{}'",
                    title, name
                ));
            }
        }

        self.categories.push(ProgramCategory { title, programs });

        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ProgramFactory> {
        self.entries.get(name)
    }

    /// Registered names in registration order, default excluded.
    pub fn names(&self) -> &[String] {
        &self.ordered_names
    }

    /// One line per category for the console, e.g.
    /// `Demos: Lameduck (lameduck), Pulse (pulse)`. Programs registered
    /// outside any category are listed last under `Other`.
    pub fn listing(&self) -> Vec<String> {
        let label = |name: &String| match self.display_names.get(name) {
            Some(display) => format!("{} ({})", display, name),
            None => name.clone(),
        };
        let line = |title: &str, programs: &[String]| {
            let labels: Vec<String> = programs.iter().map(label).collect();
            format!("{}: {}", title, labels.join(", "))
        };

        let mut lines: Vec<String> = self
            .categories
            .iter()
            .filter(|category| !category.programs.is_empty())
            .map(|category| line(&category.title, &category.programs))
            .collect();

        let uncategorized: Vec<String> = self
            .ordered_names
            .iter()
            .filter(|name| {
                !self
                    .categories
                    .iter()
                    .any(|category| category.programs.contains(name))
            })
            .cloned()
            .collect();
        if !uncategorized.is_empty() {
            lines.push(line("Other", &uncategorized));
        }

        lines
    }
}

pub struct Registry {
    store: UnitStore,
    builtins: Builtins,
    limits: ScriptLimits,
}

impl Registry {
    pub fn new(
        store: UnitStore,
        builtins: Builtins,
        limits: ScriptLimits,
    ) -> Self {
        Self {
            store,
            builtins,
            limits,
        }
    }

    pub fn store(&self) -> &UnitStore {
        &self.store
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    /// Looks `name` up as a built-in, then as a saved unit.
    pub fn load(&self, name: &str) -> Result<LoadedProgram, LoadError> {
        if let Some(factory) = self.builtins.get(name) {
            let program = panic::catch_unwind(AssertUnwindSafe(|| factory()))
                .map_err(|payload| LoadError::Construct {
                    name: name.to_string(),
                    message: panic_message(payload.as_ref()),
                })?;
            info!("Loaded built-in program {}", name);
            return Ok(LoadedProgram::new(name, program));
        }

        if name == HELPERS_UNIT {
            return Err(LoadError::NotFound(name.to_string()));
        }

        let source = self.store.read_source(name)?;
        let helpers = self.store.helpers_source();
        let program =
            ScriptProgram::load(name, &source, &helpers, &self.limits)?;
        info!("Loaded unit {}", name);

        Ok(LoadedProgram::new(name, Box::new(program)))
    }

    pub fn load_default(&self) -> LoadedProgram {
        LoadedProgram::new(DEFAULT_UNIT, Box::new(mesh::init()))
    }

    pub fn saved_names(&self) -> Vec<String> {
        self.store.enumerate_names().into_iter().collect()
    }

    /// File backing script unit `name`, if there is one.
    pub fn unit_path(&self, name: &str) -> Option<PathBuf> {
        if self.builtins.get(name).is_some() || !self.store.contains(name) {
            return None;
        }
        Some(self.store.unit_path(name))
    }
}
