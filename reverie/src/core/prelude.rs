pub use crate::core::logging::init_logger;
pub use crate::core::logging::{debug, error, info, trace, warn};
pub use crate::core::util::TWO_PI;
pub use crate::core::util::constrain;
pub use crate::core::util::lerp;
pub use crate::io::canvas::{CANVAS_H, CANVAS_W, Canvas, DrawCommand};
pub use crate::io::input::InputState;
pub use crate::program::*;
pub use crate::register_programs;
pub use crate::registry::Builtins;
