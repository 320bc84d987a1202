//! The fixed-resolution drawing surface programs render onto.
//!
//! The canvas is a display list rather than a pixel buffer: each primitive is
//! recorded as a [`DrawCommand`] and replayed by the window at whatever scale
//! it is presented at. Coordinates are canvas pixels with the origin at the
//! top-left corner and y pointing down.

pub const CANVAS_W: u32 = 400;
pub const CANVAS_H: u32 = 300;

#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
    },
    Rect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        filled: bool,
    },
    Circle {
        x: f32,
        y: f32,
        radius: f32,
        filled: bool,
    },
    Pixel {
        x: i32,
        y: i32,
    },
    Text {
        text: String,
        x: f32,
        y: f32,
    },
}

#[derive(Debug)]
pub struct Canvas {
    w: u32,
    h: u32,
    commands: Vec<DrawCommand>,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(CANVAS_W, CANVAS_H)
    }
}

impl Canvas {
    pub fn new(w: u32, h: u32) -> Self {
        Self {
            w,
            h,
            commands: Vec::new(),
        }
    }

    pub fn w(&self) -> u32 {
        self.w
    }

    pub fn h(&self) -> u32 {
        self.h
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.commands.push(DrawCommand::Line { x1, y1, x2, y2 });
    }

    pub fn rect(&mut self, x: f32, y: f32, w: f32, h: f32, filled: bool) {
        self.commands.push(DrawCommand::Rect {
            x,
            y,
            w,
            h,
            filled,
        });
    }

    pub fn circle(&mut self, x: f32, y: f32, radius: f32, filled: bool) {
        // Matches the reference surface: a non-positive radius draws nothing.
        if radius <= 0.0 {
            return;
        }
        self.commands.push(DrawCommand::Circle {
            x,
            y,
            radius,
            filled,
        });
    }

    /// Pixels outside the canvas are dropped.
    pub fn pixel(&mut self, x: f32, y: f32) {
        let (x, y) = (x.trunc() as i32, y.trunc() as i32);
        if x < 0 || y < 0 || x >= self.w as i32 || y >= self.h as i32 {
            return;
        }
        self.commands.push(DrawCommand::Pixel { x, y });
    }

    pub fn text(&mut self, text: impl Into<String>, x: f32, y: f32) {
        self.commands.push(DrawCommand::Text {
            text: text.into(),
            x,
            y,
        });
    }

    pub fn push(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }

    pub fn extend(&mut self, commands: impl IntoIterator<Item = DrawCommand>) {
        for command in commands {
            match command {
                DrawCommand::Pixel { x, y } => self.pixel(x as f32, y as f32),
                DrawCommand::Circle {
                    x,
                    y,
                    radius,
                    filled,
                } => self.circle(x, y, radius, filled),
                other => self.commands.push(other),
            }
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Maps a canvas point to a center-origin, y-up point scaled by `scale`,
    /// which is how the window presents the canvas.
    pub fn to_window(&self, x: f32, y: f32, scale: f32) -> (f32, f32) {
        (
            (x - self.w as f32 / 2.0) * scale,
            (self.h as f32 / 2.0 - y) * scale,
        )
    }

    /// Inverse of [`Canvas::to_window`].
    pub fn from_window(&self, x: f32, y: f32, scale: f32) -> (f32, f32) {
        let scale = if scale > 0.0 { scale } else { 1.0 };
        (
            x / scale + self.w as f32 / 2.0,
            self.h as f32 / 2.0 - y / scale,
        )
    }
}
