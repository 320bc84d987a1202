use rand::Rng;
use reverie::prelude::*;

// A limping patrol unit lost in an ice field. Boots, loses signal, then
// drifts into a dream state that chirps now and then.

pub const PROGRAM_CONFIG: ProgramConfig = ProgramConfig {
    name: "lameduck",
    display_name: "Lameduck",
};

const PARTICLE_COUNT: usize = 20;
const SIGNAL_LOST_AT: f32 = 2.0;
const DREAMING_AT: f32 = 5.0;
const CHIRP_CHANCE: f64 = 0.02;
const STATIC_PIXELS: usize = 10;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    Boot,
    SignalLost,
    Dreaming,
}

struct Flake {
    x: f32,
    y: f32,
    velocity: f32,
    size: f32,
}

pub struct Lameduck {
    time: f32,
    phase: Phase,
    flakes: Vec<Flake>,
    signal_strength: f32,
    depth: f32,
}

pub fn init() -> Lameduck {
    let mut rng = rand::rng();
    let flakes = (0..PARTICLE_COUNT)
        .map(|_| Flake {
            x: rng.random_range(0.0..CANVAS_W as f32),
            y: rng.random_range(0.0..CANVAS_H as f32),
            velocity: rng.random_range(20.0..50.0),
            size: rng.random_range(1..=3) as f32,
        })
        .collect();

    Lameduck {
        time: 0.0,
        phase: Phase::Boot,
        flakes,
        signal_strength: 0.0,
        depth: 0.0,
    }
}

impl Lameduck {
    fn advance_phase(&mut self, ctx: &FrameContext) {
        match self.phase {
            Phase::Boot if self.time > SIGNAL_LOST_AT => {
                self.phase = Phase::SignalLost;
                ctx.play_tone(220.0, 0.1);
            }
            Phase::SignalLost if self.time > DREAMING_AT => {
                self.phase = Phase::Dreaming;
            }
            _ => {}
        }
    }

    fn draw_duck(&self, canvas: &mut Canvas) {
        let x = 200.0 + self.time.sin() * 50.0;
        let y = 150.0 + (self.time * 3.0).cos().abs() * 20.0;

        canvas.text("MOJAVE_OS v13.0 - COMPROMISED", 10.0, 10.0);
        canvas.text("STATUS: LAMEDUCK PROTOCOL", 10.0, 25.0);

        canvas.circle(x, y, 15.0, false);
        canvas.circle(x + 10.0, y - 10.0, 8.0, false);
        canvas.line(x, y + 15.0, x - 10.0, y + 25.0);
        // The bad leg
        canvas.line(x, y + 15.0, x + 10.0, y + 20.0);

        for i in (0..CANVAS_H).step_by(20) {
            let offset = (self.time * 10.0 + i as f32).sin() * 5.0;
            let row = i as f32 + offset.trunc();
            canvas.line(0.0, row, CANVAS_W as f32, row);
        }
    }
}

impl Program for Lameduck {
    fn update(
        &mut self,
        ctx: &mut FrameContext,
        delta: f32,
    ) -> Result<(), ProgramError> {
        let mut rng = rand::rng();

        self.time += delta;
        self.depth = (self.time * 0.5).sin() * 0.5 + 0.5;

        for flake in &mut self.flakes {
            flake.y += flake.velocity * delta;
            flake.x = constrain::wrap(
                flake.x + (self.time + flake.y * 0.01).sin() * 10.0 * delta,
                0.0,
                CANVAS_W as f32,
            );
            if flake.y > CANVAS_H as f32 {
                flake.y = -10.0;
                flake.x = rng.random_range(0.0..CANVAS_W as f32);
            }
        }

        self.advance_phase(ctx);

        if self.phase == Phase::Dreaming {
            self.signal_strength = (self.time * 2.0).sin().abs();
            if rng.random_bool(CHIRP_CHANCE) {
                let frequency = (440.0 + self.signal_strength * 440.0).trunc();
                ctx.play_tone(frequency, 0.05);
            }
        }

        Ok(())
    }

    fn draw(&mut self, ctx: &mut FrameContext) -> Result<(), ProgramError> {
        let mut rng = rand::rng();
        let canvas = &mut *ctx.canvas;

        for _ in 0..STATIC_PIXELS {
            canvas.pixel(
                rng.random_range(0..CANVAS_W) as f32,
                rng.random_range(0..CANVAS_H) as f32,
            );
        }

        if self.phase == Phase::Dreaming {
            self.draw_duck(canvas);
        }

        for flake in &self.flakes {
            canvas.rect(
                flake.x.trunc(),
                flake.y.trunc(),
                flake.size,
                flake.size,
                true,
            );
        }

        let bar_w = lerp(0.0, 390.0, self.depth).trunc();
        canvas.rect(5.0, 270.0, bar_w, 20.0, true);
        canvas.text("SUBPROCESS_RECOVERY", 110.0, 272.0);

        Ok(())
    }

    fn instructions(&mut self) -> String {
        "Observe the fragmented memory of Sector 13. Wait for synchronization."
            .to_string()
    }

    fn next_ideas(&mut self) -> Vec<String> {
        ["Deepen sleep", "Repair signal", "Sector 13", "Ice drift"]
            .map(String::from)
            .to_vec()
    }
}
