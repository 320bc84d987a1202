use std::fmt;

use thiserror::Error;

use crate::io::audio::ToneSink;
use crate::io::canvas::Canvas;
use crate::io::input::InputState;

/// Everything a program may touch during a frame.
///
/// The context is rebuilt by the host for every call, so programs cannot hold
/// on to the canvas or the input table between frames.
pub struct FrameContext<'a> {
    pub canvas: &'a mut Canvas,
    pub input: &'a InputState,
    pub tones: &'a dyn ToneSink,
}

impl<'a> FrameContext<'a> {
    pub fn new(
        canvas: &'a mut Canvas,
        input: &'a InputState,
        tones: &'a dyn ToneSink,
    ) -> Self {
        Self {
            canvas,
            input,
            tones,
        }
    }

    pub fn is_key_pressed(&self, key: &str) -> bool {
        self.input.is_key_pressed(key)
    }

    pub fn play_tone(&self, frequency: f32, duration: f32) {
        self.tones.play_tone(frequency, duration);
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
#[error("{0}")]
pub struct ProgramError(pub String);

impl ProgramError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A hot-swappable unit of sketch behavior.
///
/// The host drives the active program with `update` then `draw` once per
/// frame and never looks past this interface. Any `Err` (or panic) from
/// `update`/`draw` is treated as a runtime fault and the program is
/// discarded.
pub trait Program {
    /// `delta` is the positive number of seconds since the previous frame.
    fn update(
        &mut self,
        ctx: &mut FrameContext,
        delta: f32,
    ) -> Result<(), ProgramError>;

    fn draw(&mut self, ctx: &mut FrameContext) -> Result<(), ProgramError>;

    /// Short description of the current interaction affordances.
    fn instructions(&mut self) -> String;

    /// Follow-up prompt suggestions, usually zero to four.
    fn next_ideas(&mut self) -> Vec<String> {
        Vec::new()
    }
}

/// Static metadata for a built-in (native) program.
pub struct ProgramConfig {
    pub name: &'static str,
    pub display_name: &'static str,
}

pub type ProgramFactory =
    Box<dyn Fn() -> Box<dyn Program> + Send + Sync + 'static>;

/// A constructed program together with the unit name it was loaded from.
pub struct LoadedProgram {
    pub name: String,
    pub program: Box<dyn Program>,
}

impl LoadedProgram {
    pub fn new(name: impl Into<String>, program: Box<dyn Program>) -> Self {
        Self {
            name: name.into(),
            program,
        }
    }
}

impl fmt::Debug for LoadedProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedProgram")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
