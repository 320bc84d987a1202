use reverie::prelude::*;

pub const PROGRAM_CONFIG: ProgramConfig = ProgramConfig {
    name: "pulse",
    display_name: "Pulse",
};

/// Home row as one octave of A minor.
const KEYS: [(&str, f32); 8] = [
    ("a", 220.0),
    ("s", 246.94),
    ("d", 261.63),
    ("f", 293.66),
    ("g", 329.63),
    ("h", 349.23),
    ("j", 392.0),
    ("k", 440.0),
];

const NOTE_SECONDS: f32 = 0.15;
const DECAY_PER_SECOND: f32 = 2.5;

pub struct Pulse {
    levels: [f32; KEYS.len()],
    held: [bool; KEYS.len()],
    time: f32,
}

pub fn init() -> Pulse {
    Pulse {
        levels: [0.0; KEYS.len()],
        held: [false; KEYS.len()],
        time: 0.0,
    }
}

impl Program for Pulse {
    fn update(
        &mut self,
        ctx: &mut FrameContext,
        delta: f32,
    ) -> Result<(), ProgramError> {
        self.time += delta;

        for (i, (key, frequency)) in KEYS.iter().enumerate() {
            let pressed = ctx.is_key_pressed(key);
            if pressed && !self.held[i] {
                ctx.play_tone(*frequency, NOTE_SECONDS);
                self.levels[i] = 1.0;
            }
            self.held[i] = pressed;

            if !pressed {
                self.levels[i] = constrain::clamp(
                    self.levels[i] - DECAY_PER_SECOND * delta,
                    0.0,
                    1.0,
                );
            }
        }

        Ok(())
    }

    fn draw(&mut self, ctx: &mut FrameContext) -> Result<(), ProgramError> {
        let canvas = &mut *ctx.canvas;
        let w = canvas.w() as f32;
        let h = canvas.h() as f32;
        let slot = w / KEYS.len() as f32;
        let floor = h - 40.0;

        for (i, level) in self.levels.iter().enumerate() {
            let x = i as f32 * slot + slot * 0.2;
            let bar_w = slot * 0.6;
            let idle =
                4.0 + (self.time * TWO_PI * 0.3 + i as f32).sin().abs() * 4.0;
            let bar_h = idle + level * (floor - 40.0);
            canvas.rect(x, floor - bar_h, bar_w, bar_h, *level > 0.0);
            canvas.text(KEYS[i].0, x + bar_w / 2.0 - 3.0, floor + 8.0);
        }

        let (mx, my) = ctx.input.mouse_position();
        canvas.circle(mx, my, 3.0, false);

        Ok(())
    }

    fn instructions(&mut self) -> String {
        "Play notes with A S D F G H J K.".to_string()
    }

    fn next_ideas(&mut self) -> Vec<String> {
        vec![
            "Add a drum loop".to_string(),
            "Make the bars bounce".to_string(),
        ]
    }
}
