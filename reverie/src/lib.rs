pub mod core;
pub mod generation;
pub mod io;
#[path = "sketches/mesh.rs"]
pub mod mesh;
#[path = "core/prelude.rs"]
pub mod prelude;
#[path = "sketches/program.rs"]
pub mod program;
#[path = "sketches/registration_macros.rs"]
mod registration_macros;
pub mod registry;
pub mod runtime;

pub use runtime::app::{AppConfig, build_host, run};
