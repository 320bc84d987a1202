//! The default program: a breathing grid with sparks that flare and fade.
//!
//! This is what the host falls back to whenever anything goes wrong, so it
//! must construct without failing and never fault at runtime.

use rand::Rng;

use crate::io::canvas::{CANVAS_H, CANVAS_W};
use crate::program::{FrameContext, Program, ProgramConfig, ProgramError};

pub const PROGRAM_CONFIG: ProgramConfig = ProgramConfig {
    name: "mesh",
    display_name: "Mesh",
};

const COLS: usize = 20;
const ROWS: usize = 15;
const SPACING: f32 = 20.0;

const AMPLITUDE: f32 = 12.0;
const FREQUENCY: f32 = 1.5;
const WAVE_SPEED: f32 = 1.0;
const DISTORTION: f32 = 1.0;

// Per node, per second
const GLOW_CHANCE: f32 = 0.06;
const GLOW_DURATION: f32 = 1.2;
const GLOW_RADIUS: f32 = 4.0;

#[derive(Clone, Debug, Default)]
struct Node {
    origin: (f32, f32),
    position: (f32, f32),
    glow: f32,
}

impl Node {
    fn displace(&mut self, time: f32, center: (f32, f32)) {
        let dx = self.origin.0 - center.0;
        let dy = self.origin.1 - center.1;
        let distance = (dx * dx + dy * dy).sqrt();

        if distance == 0.0 {
            self.position = self.origin;
            return;
        }

        let pulse =
            (time * FREQUENCY).sin() * AMPLITUDE * (1.0 - DISTORTION * 0.5);
        let phase =
            time * FREQUENCY * WAVE_SPEED + distance * 0.05 * WAVE_SPEED;
        let ripple = phase.sin() * AMPLITUDE * DISTORTION * 0.5;
        let magnitude = pulse + ripple;

        self.position = (
            self.origin.0 + dx / distance * magnitude,
            self.origin.1 + dy / distance * magnitude,
        );
    }

    fn glow_radius(&self) -> f32 {
        (GLOW_RADIUS * self.glow / GLOW_DURATION).trunc()
    }
}

pub struct Mesh {
    time: f32,
    nodes: Vec<Node>,
}

pub fn init() -> Mesh {
    let offset_x = (CANVAS_W as f32 - (COLS - 1) as f32 * SPACING) / 2.0;
    let offset_y = (CANVAS_H as f32 - (ROWS - 1) as f32 * SPACING) / 2.0;

    let nodes = (0..ROWS)
        .flat_map(|row| (0..COLS).map(move |col| (row, col)))
        .map(|(row, col)| {
            let origin = (
                offset_x + col as f32 * SPACING,
                offset_y + row as f32 * SPACING,
            );
            Node {
                origin,
                position: origin,
                glow: 0.0,
            }
        })
        .collect();

    Mesh { time: 0.0, nodes }
}

impl Mesh {
    fn node(&self, row: usize, col: usize) -> &Node {
        &self.nodes[row * COLS + col]
    }
}

impl Program for Mesh {
    fn update(
        &mut self,
        _ctx: &mut FrameContext,
        delta: f32,
    ) -> Result<(), ProgramError> {
        self.time += delta;
        let center = (CANVAS_W as f32 / 2.0, CANVAS_H as f32 / 2.0);
        let mut rng = rand::rng();

        for node in &mut self.nodes {
            node.displace(self.time, center);

            if node.glow > 0.0 {
                node.glow = (node.glow - delta).max(0.0);
            } else if rng.random::<f32>() < GLOW_CHANCE * delta {
                node.glow = GLOW_DURATION;
            }
        }

        Ok(())
    }

    fn draw(&mut self, ctx: &mut FrameContext) -> Result<(), ProgramError> {
        for row in 0..ROWS {
            for col in 0..COLS {
                let (x, y) = self.node(row, col).position;
                if col + 1 < COLS {
                    let (nx, ny) = self.node(row, col + 1).position;
                    ctx.canvas.line(
                        x.trunc(),
                        y.trunc(),
                        nx.trunc(),
                        ny.trunc(),
                    );
                }
                if row + 1 < ROWS {
                    let (nx, ny) = self.node(row + 1, col).position;
                    ctx.canvas.line(
                        x.trunc(),
                        y.trunc(),
                        nx.trunc(),
                        ny.trunc(),
                    );
                }
            }
        }

        for node in self.nodes.iter().filter(|n| n.glow > 0.0) {
            let radius = node.glow_radius();
            let (x, y) = node.position;
            ctx.canvas.circle(x.trunc(), y.trunc(), radius, true);
        }

        Ok(())
    }

    fn instructions(&mut self) -> String {
        "Brain pattern steady... connection restarted or errored.".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::audio::ToneLog;
    use crate::io::canvas::{Canvas, DrawCommand};
    use crate::io::input::InputState;

    #[test]
    fn grid_is_centered_on_canvas() {
        let mesh = init();
        assert_eq!(mesh.nodes.len(), COLS * ROWS);
        assert_eq!(mesh.node(0, 0).origin, (10.0, 10.0));
        assert_eq!(mesh.node(ROWS - 1, COLS - 1).origin, (390.0, 290.0));
    }

    #[test]
    fn draws_every_grid_edge() {
        let mut mesh = init();
        let mut canvas = Canvas::default();
        let input = InputState::new();
        let tones = ToneLog::new();
        let mut ctx = FrameContext::new(&mut canvas, &input, &tones);

        mesh.update(&mut ctx, 1.0 / 60.0).unwrap();
        mesh.draw(&mut ctx).unwrap();

        let lines = canvas
            .commands()
            .iter()
            .filter(|c| matches!(c, DrawCommand::Line { .. }))
            .count();
        assert_eq!(lines, (COLS - 1) * ROWS + COLS * (ROWS - 1));
        assert!(tones.tones().is_empty());
    }

    #[test]
    fn glow_fades_out() {
        let mut node = Node {
            glow: GLOW_DURATION,
            ..Default::default()
        };
        assert_eq!(node.glow_radius(), GLOW_RADIUS);
        node.glow = GLOW_DURATION / 8.0;
        assert_eq!(node.glow_radius(), 0.0);
    }

    #[test]
    fn has_no_follow_up_ideas() {
        let mut mesh = init();
        assert!(mesh.next_ideas().is_empty());
        assert!(mesh.instructions().starts_with("Brain pattern steady"));
    }
}
