use std::any::Any;
use std::f32::consts::PI;

pub const TWO_PI: f32 = PI * 2.0;

/// Linear interpolation between two values. Returns a value between `start`
/// and `end` based on the interpolation parameter `t` (typically 0.0 to 1.0).
pub fn lerp(start: f32, end: f32, t: f32) -> f32 {
    start + (end - start) * t
}

/// Utilities to contain a value within a range
pub mod constrain {
    /// Clamp a value between min and max
    pub fn clamp(value: f32, min: f32, max: f32) -> f32 {
        value.max(min).min(max)
    }

    /// Values that overshoot enter from the opposite bound, e.g.
    /// `constrain::wrap(1.2, 0.0, 1.0) // => 0.2`
    pub fn wrap(value: f32, min: f32, max: f32) -> f32 {
        if min == max {
            return min;
        }
        let range = max - min;
        let value = value - min;
        min + (value - (value / range).floor() * range)
    }
}

/// Best-effort text of a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
