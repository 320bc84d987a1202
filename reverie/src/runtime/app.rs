use nannou::prelude::*;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Instant;

use super::frame_clock::FrameClock;
use super::host::{FrameReport, Host, Submit};
use super::settings::Settings;
use super::shell::{self, ShellCommand};
use crate::core::logging::{error, info, warn};
use crate::generation::{
    ChatCompletionsClient, ClientConfig, Generator, ModelClient,
    OfflineClient, load_system_instructions,
};
use crate::io::audio::default_tone_sink;
use crate::io::canvas::{CANVAS_H, CANVAS_W, Canvas, DrawCommand};
use crate::io::input::{MOUSE_LEFT, MOUSE_MIDDLE, MOUSE_RIGHT};
use crate::registry::{Builtins, Registry, UnitStore};

/// Height of the status strip under the canvas, in window points.
const OVERLAY_H: f32 = 96.0;
const OVERLAY_FONT_SIZE: u32 = 13;
const CANVAS_FONT_SIZE: f32 = 11.0;

/// Everything the app needs to build its host, handed over from `run` to
/// nannou's `model` function, which cannot capture state.
pub struct AppConfig {
    pub settings: Settings,
    pub builtins: Builtins,
    pub initial_program: Option<String>,
    pub offline: bool,
    pub console: bool,
}

static PENDING_CONFIG: Mutex<Option<AppConfig>> = Mutex::new(None);

pub fn run(config: AppConfig) -> Result<(), String> {
    {
        let mut pending = PENDING_CONFIG.lock();
        if pending.is_some() {
            return Err("reverie app is already running".to_string());
        }
        *pending = Some(config);
    }

    nannou::app(model)
        .update(update)
        .event(event)
        .view(view)
        .run();

    Ok(())
}

/// Wires settings into a ready-to-drive host. No window is involved, so this
/// is also how headless drivers get a host.
pub fn build_host(
    settings: &Settings,
    builtins: Builtins,
    offline: bool,
) -> Host {
    let store = UnitStore::new(&settings.units_dir);
    let registry =
        Registry::new(store.clone(), builtins, settings.script_limits());

    let instructions_path = Some(settings.system_instructions_path.trim())
        .filter(|path| !path.is_empty())
        .map(PathBuf::from);
    let system_instructions =
        load_system_instructions(instructions_path.as_deref());

    let generator = Generator::new(
        model_client(settings, offline),
        store,
        system_instructions,
    );
    let tones = default_tone_sink(settings.tone_volume);

    Host::new(registry, generator, tones).with_unit_watch(settings.watch_units)
}

fn model_client(settings: &Settings, offline: bool) -> Arc<dyn ModelClient> {
    if offline {
        return Arc::new(OfflineClient::new("started with --offline"));
    }

    let Some(api_key) = settings.api_key() else {
        warn!(
            "{} is not set; prompts will fall back to the default sketch",
            settings.api_key_env
        );
        return Arc::new(OfflineClient::new(format!(
            "{} is not set",
            settings.api_key_env
        )));
    };

    let config = ClientConfig {
        base_url: settings.api_base_url.clone(),
        model: settings.model.clone(),
        api_key,
        timeout: std::time::Duration::from_secs(settings.request_timeout_secs),
    };

    match ChatCompletionsClient::new(config) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            error!("Unable to create model client: {}", err);
            Arc::new(OfflineClient::new(err.to_string()))
        }
    }
}

struct AppModel {
    host: Host,
    clock: FrameClock,
    scale: f32,
    keys_held: HashSet<Key>,
    commands: Option<Receiver<ShellCommand>>,
    main_window_id: window::Id,
}

impl AppModel {
    /// Window y of the canvas center; the canvas sits above the overlay.
    fn canvas_offset_y(&self) -> f32 {
        OVERLAY_H / 2.0
    }

    fn to_canvas(&self, point: Point2) -> (f32, f32) {
        self.host.canvas().from_window(
            point.x,
            point.y - self.canvas_offset_y(),
            self.scale,
        )
    }

    fn on_command(&mut self, app: &App, command: ShellCommand) {
        match command {
            ShellCommand::Prompt(prompt) => self.submit(&prompt),
            ShellCommand::Idea(index) => self.follow_idea(index),
            ShellCommand::Reboot => self.host.reboot(),
            ShellCommand::Load(name) => {
                if let Err(err) = self.host.load_saved(&name) {
                    println!("{}", err);
                }
            }
            ShellCommand::List => self.print_list(),
            ShellCommand::Help => println!("{}", shell::HELP),
            ShellCommand::Quit => app.quit(),
        }
    }

    fn submit(&mut self, prompt: &str) {
        match self.host.submit_prompt(prompt) {
            Submit::Started => println!("dreaming: {}", prompt),
            Submit::Busy => println!("still dreaming; try again shortly"),
            Submit::Empty => {}
        }
    }

    fn follow_idea(&mut self, index: usize) {
        match self.host.submit_idea(index) {
            Some(Submit::Busy) => println!("still dreaming; try again shortly"),
            Some(_) => {}
            None => println!("no idea #{}", index + 1),
        }
    }

    fn print_list(&self) {
        for line in self.host.program_listing() {
            println!("{}", line);
        }
        let saved = self.host.saved_names();
        if saved.is_empty() {
            println!("no saved units yet");
        } else {
            for name in saved {
                println!("  {}", name);
            }
        }
    }
}

fn model(app: &App) -> AppModel {
    let config = PENDING_CONFIG.lock().take().unwrap_or_else(|| {
        error!("reverie started without a config; using defaults");
        AppConfig {
            settings: Settings::default(),
            builtins: Builtins::new(),
            initial_program: None,
            offline: false,
            console: true,
        }
    });

    let settings = config.settings;
    let scale = settings.window_scale.max(1) as f32;

    app.set_exit_on_escape(false);

    let main_window_id = match app
        .new_window()
        .title("reverie")
        .size(
            (CANVAS_W as f32 * scale) as u32,
            (CANVAS_H as f32 * scale + OVERLAY_H) as u32,
        )
        .build()
    {
        Ok(id) => id,
        Err(err) => {
            error!("Unable to create window: {:?}", err);
            std::process::exit(1);
        }
    };

    let mut host = build_host(&settings, config.builtins, config.offline);
    if let Some(name) = config.initial_program.as_deref() {
        if let Err(err) = host.load_saved(name) {
            error!("Unable to start with {}: {}", name, err);
        }
    }

    let commands = if config.console {
        println!("{}", shell::HELP);
        Some(shell::spawn_reader())
    } else {
        None
    };

    info!("Units directory: {}", settings.units_dir);

    AppModel {
        host,
        clock: FrameClock::with_start(settings.fps, Instant::now()),
        scale,
        keys_held: HashSet::new(),
        commands,
        main_window_id,
    }
}

fn update(app: &App, model: &mut AppModel, _update: Update) {
    let commands: Vec<ShellCommand> = model
        .commands
        .as_ref()
        .map(|rx| rx.try_iter().collect())
        .unwrap_or_default();

    for command in commands {
        model.on_command(app, command);
    }

    let tick = model.clock.tick(Instant::now());
    if !tick.should_render {
        return;
    }

    if let FrameReport::Recovered(fault) = model.host.frame(tick.delta) {
        warn!("Recovered from fault: {}", fault);
    }
}

fn event(app: &App, model: &mut AppModel, event: Event) {
    let Event::WindowEvent {
        id,
        simple: Some(event),
        ..
    } = event
    else {
        return;
    };

    if id != model.main_window_id {
        return;
    }

    match event {
        KeyPressed(key) => {
            if !model.keys_held.insert(key) {
                return;
            }

            if app.keys.mods.ctrl() {
                match key {
                    Key::R => model.host.reboot(),
                    Key::Key1 => model.follow_idea(0),
                    Key::Key2 => model.follow_idea(1),
                    Key::Key3 => model.follow_idea(2),
                    Key::Key4 => model.follow_idea(3),
                    _ => {}
                }
                return;
            }

            if let Some(name) = key_name(key) {
                model.host.input_mut().key_down(name);
            }
        }
        KeyReleased(key) => {
            model.keys_held.remove(&key);
            if let Some(name) = key_name(key) {
                model.host.input_mut().key_up(name);
            }
        }
        MouseMoved(point) => {
            let (x, y) = model.to_canvas(point);
            model.host.input_mut().set_mouse_position(x, y);
        }
        MousePressed(button) => {
            if let Some(name) = mouse_name(button) {
                model.host.input_mut().key_down(name);
            }
        }
        MouseReleased(button) => {
            if let Some(name) = mouse_name(button) {
                model.host.input_mut().key_up(name);
            }
        }
        Unfocused => {
            model.keys_held.clear();
            model.host.input_mut().clear();
        }
        _ => {}
    }
}

fn view(app: &App, model: &AppModel, frame: Frame) {
    let draw = app.draw();
    draw.background().color(BLACK);

    let canvas_draw = draw.y(model.canvas_offset_y());
    render_canvas(&canvas_draw, model.host.canvas(), model.scale);

    let window_rect = app.window_rect();
    draw_overlay(&draw, &model.host, model.clock.average_fps(), window_rect);

    if let Err(err) = draw.to_frame(app, &frame) {
        error!("Unable to render frame: {:?}", err);
    }
}

fn render_canvas(draw: &Draw, canvas: &Canvas, scale: f32) {
    let at = |x: f32, y: f32| {
        let (x, y) = canvas.to_window(x, y, scale);
        pt2(x, y)
    };

    for command in canvas.commands() {
        match command {
            DrawCommand::Line { x1, y1, x2, y2 } => {
                draw.line()
                    .start(at(*x1, *y1))
                    .end(at(*x2, *y2))
                    .weight(scale)
                    .color(WHITE);
            }
            DrawCommand::Rect { x, y, w, h, filled } => {
                let center = at(x + w / 2.0, y + h / 2.0);
                let rect = draw
                    .rect()
                    .xy(center)
                    .w_h(w.abs() * scale, h.abs() * scale);
                if *filled {
                    rect.color(WHITE);
                } else {
                    rect.no_fill().stroke(WHITE).stroke_weight(scale);
                }
            }
            DrawCommand::Circle {
                x,
                y,
                radius,
                filled,
            } => {
                let ellipse =
                    draw.ellipse().xy(at(*x, *y)).radius(radius * scale);
                if *filled {
                    ellipse.color(WHITE);
                } else {
                    ellipse.no_fill().stroke(WHITE).stroke_weight(scale);
                }
            }
            DrawCommand::Pixel { x, y } => {
                draw.rect()
                    .xy(at(*x as f32 + 0.5, *y as f32 + 0.5))
                    .w_h(scale, scale)
                    .color(WHITE);
            }
            DrawCommand::Text { text, x, y } => {
                let box_w = canvas.w() as f32;
                let box_h = CANVAS_FONT_SIZE * 2.0;
                draw.text(text)
                    .xy(at(x + box_w / 2.0, y + box_h / 2.0))
                    .w_h(box_w * scale, box_h * scale)
                    .font_size((CANVAS_FONT_SIZE * scale) as u32)
                    .left_justify()
                    .align_text_top()
                    .color(WHITE);
            }
        }
    }
}

fn draw_overlay(draw: &Draw, host: &Host, fps: f32, window_rect: Rect) {
    let strip = Rect::from_w_h(window_rect.w(), OVERLAY_H)
        .align_bottom_of(window_rect);

    draw.line()
        .start(pt2(strip.left(), strip.top()))
        .end(pt2(strip.right(), strip.top()))
        .weight(1.0)
        .color(GRAY);

    let mut lines = vec![format!(
        "{} | {} | {:.0} fps",
        host.active_name(),
        host.instructions(),
        fps
    )];
    for (i, idea) in host.next_ideas().iter().take(4).enumerate() {
        lines.push(format!("Ctrl+{}: {}", i + 1, idea));
    }
    match host.pending_prompt() {
        Some(prompt) => lines.push(format!("dreaming: {} ...", prompt)),
        None => lines.push("type a prompt in the console".to_string()),
    }

    let text_rect = strip.pad(8.0);
    draw.text(&lines.join("\n"))
        .xy(text_rect.xy())
        .wh(text_rect.wh())
        .font_size(OVERLAY_FONT_SIZE)
        .left_justify()
        .align_text_top()
        .color(WHITE);
}

fn mouse_name(button: MouseButton) -> Option<&'static str> {
    match button {
        MouseButton::Left => Some(MOUSE_LEFT),
        MouseButton::Right => Some(MOUSE_RIGHT),
        MouseButton::Middle => Some(MOUSE_MIDDLE),
        _ => None,
    }
}

/// Key names as programs see them through `Input::is_key_pressed`.
fn key_name(key: Key) -> Option<&'static str> {
    let name = match key {
        Key::A => "a",
        Key::B => "b",
        Key::C => "c",
        Key::D => "d",
        Key::E => "e",
        Key::F => "f",
        Key::G => "g",
        Key::H => "h",
        Key::I => "i",
        Key::J => "j",
        Key::K => "k",
        Key::L => "l",
        Key::M => "m",
        Key::N => "n",
        Key::O => "o",
        Key::P => "p",
        Key::Q => "q",
        Key::R => "r",
        Key::S => "s",
        Key::T => "t",
        Key::U => "u",
        Key::V => "v",
        Key::W => "w",
        Key::X => "x",
        Key::Y => "y",
        Key::Z => "z",
        Key::Key0 => "0",
        Key::Key1 => "1",
        Key::Key2 => "2",
        Key::Key3 => "3",
        Key::Key4 => "4",
        Key::Key5 => "5",
        Key::Key6 => "6",
        Key::Key7 => "7",
        Key::Key8 => "8",
        Key::Key9 => "9",
        Key::Space => "space",
        Key::Return => "return",
        Key::Escape => "escape",
        Key::Back => "backspace",
        Key::Tab => "tab",
        Key::Left => "left",
        Key::Right => "right",
        Key::Up => "up",
        Key::Down => "down",
        Key::LShift => "left shift",
        Key::RShift => "right shift",
        Key::LControl => "left ctrl",
        Key::RControl => "right ctrl",
        Key::LAlt => "left alt",
        Key::RAlt => "right alt",
        Key::Comma => ",",
        Key::Period => ".",
        Key::Slash => "/",
        Key::Minus => "-",
        Key::Equals => "=",
        Key::Semicolon => ";",
        _ => return None,
    };
    Some(name)
}
