//! The swap loop.
//!
//! The host owns exactly one active program and drives it once per frame
//! inside a fault boundary. Everything that replaces the active program
//! (generation results, reboots, saved-unit loads, live reloads, fault
//! recovery) goes through [`Host::activate`], and only ever happens between
//! frames, so a frame never drives a mix of two programs.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

use crate::core::logging::{debug, error, info, warn};
use crate::core::util::panic_message;
use crate::generation::{
    Conversation, GenerationOutcome, GenerationTask, Generator,
};
use crate::io::audio::ToneSink;
use crate::io::canvas::Canvas;
use crate::io::input::InputState;
use crate::program::{FrameContext, LoadedProgram, ProgramError};
use crate::registry::{DEFAULT_UNIT, LoadError, Registry, UnitWatch};

/// Deltas are clamped into `(0, MAX_DELTA]` so a stall (window drag, debugger
/// pause) does not fling physics-style programs across the canvas.
pub const MAX_DELTA: f32 = 0.25;
const MIN_DELTA: f32 = 0.001;

/// How often the overlay text is re-read from the active program.
const OVERLAY_REFRESH_FRAMES: u64 = 30;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HostState {
    Active,
    GeneratingAsync,
    SwappingSync,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Submit {
    Started,
    /// A generation is already in flight; nothing happened.
    Busy,
    /// Blank prompt; nothing happened.
    Empty,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    Update,
    Draw,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Update => write!(f, "update"),
            Phase::Draw => write!(f, "draw"),
        }
    }
}

/// A runtime failure the host recovered from.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("{program} faulted during {phase}: {message}")]
pub struct Fault {
    pub program: String,
    pub phase: Phase,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FrameReport {
    Ran,
    Recovered(Fault),
}

struct PendingGeneration {
    epoch: u64,
    task: GenerationTask,
}

pub struct Host {
    registry: Registry,
    generator: Generator,
    tones: Box<dyn ToneSink>,
    canvas: Canvas,
    input: InputState,
    active: LoadedProgram,
    instructions: String,
    ideas: Vec<String>,
    /// `None` only while lent to an in-flight generation.
    conversation: Option<Conversation>,
    pending: Option<PendingGeneration>,
    /// Bumped on every reboot; results from older epochs are discarded.
    epoch: u64,
    state: HostState,
    last_fault: Option<Fault>,
    frame_count: u64,
    watch_units: bool,
    watch: Option<UnitWatch>,
}

impl Host {
    pub fn new(
        registry: Registry,
        generator: Generator,
        tones: Box<dyn ToneSink>,
    ) -> Self {
        if let Err(err) = registry.store().install_helpers() {
            warn!("{}", err);
        }

        let active = registry.load_default();
        let conversation = generator.new_conversation();

        let mut host = Self {
            registry,
            generator,
            tones,
            canvas: Canvas::default(),
            input: InputState::new(),
            active,
            instructions: String::new(),
            ideas: Vec::new(),
            conversation: Some(conversation),
            pending: None,
            epoch: 0,
            state: HostState::Active,
            last_fault: None,
            frame_count: 0,
            watch_units: false,
            watch: None,
        };
        host.refresh_overlay();
        host.announce();
        host
    }

    /// Reload the active unit whenever its file changes on disk.
    pub fn with_unit_watch(mut self, enabled: bool) -> Self {
        self.watch_units = enabled;
        self.rewatch();
        self
    }

    pub fn submit_prompt(&mut self, prompt: &str) -> Submit {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Submit::Empty;
        }
        if self.pending.is_some() {
            debug!("Ignoring prompt while dreaming: {:?}", prompt);
            return Submit::Busy;
        }

        let conversation = self.take_conversation();
        let task = self.generator.spawn(conversation, prompt);
        self.pending = Some(PendingGeneration {
            epoch: self.epoch,
            task,
        });
        self.state = HostState::GeneratingAsync;

        Submit::Started
    }

    /// Submits the active program's idea at `index`, if it has one.
    pub fn submit_idea(&mut self, index: usize) -> Option<Submit> {
        let idea = self.ideas.get(index)?.clone();
        info!("Following idea: {}", idea);
        Some(self.submit_prompt(&idea))
    }

    /// Degraded synchronous variant of [`Host::submit_prompt`]. Freezes the
    /// caller for the whole network round trip.
    pub fn submit_prompt_blocking(&mut self, prompt: &str) -> Submit {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Submit::Empty;
        }
        if self.pending.is_some() {
            return Submit::Busy;
        }

        self.state = HostState::SwappingSync;
        let mut conversation = self.take_conversation();
        let loaded = self.generator.generate(
            &self.registry,
            &mut conversation,
            prompt,
        );
        self.conversation = Some(conversation);
        self.activate(loaded);
        self.state = HostState::Active;

        Submit::Started
    }

    /// Non-blocking. Returns true if a finished generation was consumed,
    /// whether or not its program was kept.
    pub fn poll_generation(&mut self) -> bool {
        let Some(pending) = &self.pending else {
            return false;
        };
        let Some(outcome) = pending.task.poll() else {
            return false;
        };

        let epoch = pending.epoch;
        self.pending = None;
        self.state = HostState::Active;
        self.finish_generation(epoch, outcome);

        true
    }

    fn finish_generation(&mut self, epoch: u64, outcome: GenerationOutcome) {
        let GenerationOutcome {
            name,
            conversation,
            result,
        } = outcome;

        if epoch != self.epoch {
            info!("Discarding {}; rebooted since it was requested", name);
            return;
        }

        self.conversation = Some(
            conversation.unwrap_or_else(|| self.generator.new_conversation()),
        );
        let loaded = self.generator.resolve(&self.registry, &name, result);
        self.activate(loaded);
    }

    /// Runs one frame: swap in anything pending, clear the canvas, then
    /// `update(delta)` and `draw()` on the active program.
    pub fn frame(&mut self, delta: f32) -> FrameReport {
        self.frame_count += 1;
        self.poll_generation();
        self.check_reload();

        self.canvas.clear();
        let delta = clamp_delta(delta);

        match self.drive(delta) {
            Ok(()) => {
                if self.frame_count % OVERLAY_REFRESH_FRAMES == 0 {
                    self.refresh_overlay();
                }
                FrameReport::Ran
            }
            Err(fault) => {
                error!("{}", fault);
                self.canvas.clear();
                self.last_fault = Some(fault.clone());
                let fallback = self.registry.load_default();
                self.activate(fallback);
                FrameReport::Recovered(fault)
            }
        }
    }

    fn drive(&mut self, delta: f32) -> Result<(), Fault> {
        let Self {
            active,
            canvas,
            input,
            tones,
            ..
        } = self;
        let mut ctx = FrameContext::new(canvas, input, &**tones);

        guarded(&active.name, Phase::Update, || {
            active.program.update(&mut ctx, delta)
        })?;
        guarded(&active.name, Phase::Draw, || active.program.draw(&mut ctx))
    }

    /// Back to the default program with a fresh conversation. An in-flight
    /// generation keeps running but its result will be thrown away.
    pub fn reboot(&mut self) {
        info!("Rebooting");
        self.epoch += 1;
        self.conversation = Some(self.generator.new_conversation());
        let fallback = self.registry.load_default();
        self.activate(fallback);
    }

    /// Activates a saved unit or built-in by name, falling back to the
    /// default program on failure. The error is returned for display.
    pub fn load_saved(&mut self, name: &str) -> Result<(), LoadError> {
        match self.registry.load(name) {
            Ok(loaded) => {
                self.activate(loaded);
                Ok(())
            }
            Err(err) => {
                warn!("{}", err);
                let fallback = self.registry.load_default();
                self.activate(fallback);
                Err(err)
            }
        }
    }

    fn activate(&mut self, loaded: LoadedProgram) {
        self.active = loaded;
        self.refresh_overlay();
        self.rewatch();
        self.announce();
    }

    fn announce(&self) {
        info!("Now running {}: {}", self.active.name, self.instructions);
        for (i, idea) in self.ideas.iter().enumerate() {
            info!("  idea {}: {}", i + 1, idea);
        }
    }

    fn refresh_overlay(&mut self) {
        self.instructions = self.active.program.instructions();
        self.ideas = self.active.program.next_ideas();
    }

    fn rewatch(&mut self) {
        self.watch = None;
        if !self.watch_units {
            return;
        }
        let Some(path) = self.registry.unit_path(&self.active.name) else {
            return;
        };
        match UnitWatch::start(path) {
            Ok(watch) => self.watch = Some(watch),
            Err(err) => warn!("Live reload unavailable: {}", err),
        }
    }

    fn check_reload(&mut self) {
        let changed = self
            .watch
            .as_ref()
            .is_some_and(|watch| watch.take_changed());
        if !changed {
            return;
        }

        let name = self.active.name.clone();
        info!("Reloading {}", name);
        if let Err(err) = self.load_saved(&name) {
            warn!("Reload of {} failed: {}", name, err);
        }
    }

    fn take_conversation(&mut self) -> Conversation {
        self.conversation
            .take()
            .unwrap_or_else(|| self.generator.new_conversation())
    }

    pub fn state(&self) -> HostState {
        self.state
    }

    pub fn is_generating(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_prompt(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.task.prompt())
    }

    pub fn active_name(&self) -> &str {
        &self.active.name
    }

    pub fn is_default_active(&self) -> bool {
        self.active.name == DEFAULT_UNIT
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn next_ideas(&self) -> &[String] {
        &self.ideas
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputState {
        &mut self.input
    }

    pub fn last_fault(&self) -> Option<&Fault> {
        self.last_fault.as_ref()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn saved_names(&self) -> Vec<String> {
        self.registry.saved_names()
    }

    /// Built-in programs grouped by category, one line each.
    pub fn program_listing(&self) -> Vec<String> {
        self.registry.builtins().listing()
    }
}

fn clamp_delta(delta: f32) -> f32 {
    if delta.is_finite() && delta > 0.0 {
        delta.min(MAX_DELTA)
    } else {
        MIN_DELTA
    }
}

fn guarded(
    program: &str,
    phase: Phase,
    call: impl FnOnce() -> Result<(), ProgramError>,
) -> Result<(), Fault> {
    let message = match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(err)) => err.to_string(),
        Err(payload) => {
            format!("panicked: {}", panic_message(payload.as_ref()))
        }
    };

    Err(Fault {
        program: program.to_string(),
        phase,
        message,
    })
}
