//! Rhai-backed programs.
//!
//! Each unit gets its own [`Engine`] with the `Render`, `Input` and `Sound`
//! bindings registered as static modules and the helpers unit compiled into
//! a `helpers` module. Bindings never touch host state directly: they record
//! into a per-program [`ScriptFrame`] which is synced from the frame context
//! before every call and flushed back into it afterwards.

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

use rand::Rng;
use rand::distr::Uniform;
use rhai::{
    AST, CallFnOptions, Dynamic, Engine, EvalAltResult, FLOAT, INT,
    ImmutableString, Map, Module, Scope,
};

use super::LoadError;
use super::store::HELPERS_UNIT;
use crate::core::logging::{debug, info, warn};
use crate::io::canvas::{CANVAS_H, CANVAS_W, DrawCommand};
use crate::io::input::InputState;
use crate::program::{FrameContext, Program, ProgramError};

type RhaiResult<T> = Result<T, Box<EvalAltResult>>;

/// Functions every unit must define, with their arities.
pub const REQUIRED_FUNCTIONS: [(&str, usize); 4] = [
    ("update", 1),
    ("draw", 0),
    ("get_instructions", 0),
    ("get_next_idea", 0),
];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScriptLimits {
    /// Per call; runaway loops surface as a runtime fault. Zero is raised
    /// to one since Rhai reads zero as unlimited.
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_expr_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_operations: 5_000_000,
            max_call_levels: 64,
            max_expr_depth: 128,
            max_string_size: 64 * 1024,
            max_array_size: 100_000,
            max_map_size: 10_000,
        }
    }
}

impl ScriptLimits {
    pub fn with_max_operations(max_operations: u64) -> Self {
        Self {
            max_operations: max_operations.max(1),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
struct ScriptFrame {
    input: InputState,
    commands: Vec<DrawCommand>,
    tones: Vec<(f32, f32)>,
}

type SharedFrame = Rc<RefCell<ScriptFrame>>;

pub struct ScriptProgram {
    name: String,
    engine: Engine,
    ast: AST,
    scope: Scope<'static>,
    state: Dynamic,
    frame: SharedFrame,
    instructions: String,
    ideas: Vec<String>,
}

impl ScriptProgram {
    /// Compiles, validates and constructs unit `name`.
    ///
    /// Construction runs the unit's top-level statements, then `init()` if
    /// defined, then one call each to `get_instructions()` and
    /// `get_next_idea()`. Any failure along the way yields a [`LoadError`]
    /// and no program.
    pub fn load(
        name: &str,
        source: &str,
        helpers: &str,
        limits: &ScriptLimits,
    ) -> Result<Self, LoadError> {
        let frame = SharedFrame::default();
        let mut engine = build_engine(name, limits, &frame);

        let helpers_ast =
            engine.compile(helpers).map_err(|err| LoadError::Compile {
                name: HELPERS_UNIT.to_string(),
                message: err.to_string(),
            })?;
        let helpers_module =
            Module::eval_ast_as_new(Scope::new(), &helpers_ast, &engine)
                .map_err(|err| LoadError::Construct {
                    name: HELPERS_UNIT.to_string(),
                    message: err.to_string(),
                })?;
        engine.register_static_module(HELPERS_UNIT, helpers_module.into());

        let ast = engine.compile(source).map_err(|err| LoadError::Compile {
            name: name.to_string(),
            message: err.to_string(),
        })?;

        check_contract(name, &ast)?;

        let construct_err = |err: Box<EvalAltResult>| LoadError::Construct {
            name: name.to_string(),
            message: err.to_string(),
        };

        let mut scope = Scope::new();
        engine
            .run_ast_with_scope(&mut scope, &ast)
            .map_err(construct_err)?;

        let state = if defines(&ast, "init", 0) {
            let value = engine
                .call_fn_with_options::<Dynamic>(
                    CallFnOptions::new().eval_ast(false),
                    &mut scope,
                    &ast,
                    "init",
                    (),
                )
                .map_err(construct_err)?;
            if value.is_unit() {
                Dynamic::from_map(Map::new())
            } else {
                value
            }
        } else {
            Dynamic::from_map(Map::new())
        };

        let mut program = Self {
            name: name.to_string(),
            engine,
            ast,
            scope,
            state,
            frame,
            instructions: String::new(),
            ideas: Vec::new(),
        };

        program.instructions = program
            .fetch_instructions()
            .map_err(|err| LoadError::Construct {
                name: name.to_string(),
                message: format!("get_instructions: {}", err),
            })?;
        program.ideas =
            program.fetch_ideas().map_err(|err| LoadError::Construct {
                name: name.to_string(),
                message: format!("get_next_idea: {}", err),
            })?;

        debug!("Constructed script program {}", name);

        Ok(program)
    }

    fn call(
        &mut self,
        function: &str,
        args: impl rhai::FuncArgs,
    ) -> RhaiResult<Dynamic> {
        let options = CallFnOptions::new()
            .eval_ast(false)
            .bind_this_ptr(&mut self.state);
        self.engine.call_fn_with_options::<Dynamic>(
            options,
            &mut self.scope,
            &self.ast,
            function,
            args,
        )
    }

    fn sync_input(&self, input: &InputState) {
        self.frame.borrow_mut().input = input.clone();
    }

    fn flush(&self, ctx: &mut FrameContext) {
        let (commands, tones) = {
            let mut frame = self.frame.borrow_mut();
            (mem::take(&mut frame.commands), mem::take(&mut frame.tones))
        };
        ctx.canvas.extend(commands);
        for (frequency, duration) in tones {
            ctx.play_tone(frequency, duration);
        }
    }

    /// Drops anything recorded outside update/draw.
    fn discard(&self) {
        let mut frame = self.frame.borrow_mut();
        frame.commands.clear();
        frame.tones.clear();
    }

    fn fetch_instructions(&mut self) -> RhaiResult<String> {
        let value = self.call("get_instructions", ());
        self.discard();
        let value = value?;
        if value.is_string() {
            Ok(value.to_string())
        } else {
            Err(format!(
                "expected a string, got {}",
                value.type_name()
            )
            .into())
        }
    }

    fn fetch_ideas(&mut self) -> RhaiResult<Vec<String>> {
        let value = self.call("get_next_idea", ());
        self.discard();
        let value = value?;
        if value.is_unit() {
            return Ok(Vec::new());
        }
        let type_name = value.type_name();
        let items = value.into_array().map_err(|_| -> Box<EvalAltResult> {
            format!("expected an array of strings, got {}", type_name).into()
        })?;
        Ok(items.into_iter().map(|item| item.to_string()).collect())
    }
}

impl Program for ScriptProgram {
    fn update(
        &mut self,
        ctx: &mut FrameContext,
        delta: f32,
    ) -> Result<(), ProgramError> {
        self.sync_input(ctx.input);
        let result = self.call("update", (delta as FLOAT,));
        self.flush(ctx);
        result
            .map(|_| ())
            .map_err(|err| ProgramError::new(err.to_string()))
    }

    fn draw(&mut self, ctx: &mut FrameContext) -> Result<(), ProgramError> {
        self.sync_input(ctx.input);
        let result = self.call("draw", ());
        self.flush(ctx);
        result
            .map(|_| ())
            .map_err(|err| ProgramError::new(err.to_string()))
    }

    fn instructions(&mut self) -> String {
        match self.fetch_instructions() {
            Ok(text) => self.instructions = text,
            Err(err) => {
                warn!("{}: get_instructions failed: {}", self.name, err)
            }
        }
        self.instructions.clone()
    }

    fn next_ideas(&mut self) -> Vec<String> {
        match self.fetch_ideas() {
            Ok(ideas) => self.ideas = ideas,
            Err(err) => warn!("{}: get_next_idea failed: {}", self.name, err),
        }
        self.ideas.clone()
    }
}

fn defines(ast: &AST, function: &str, arity: usize) -> bool {
    ast.iter_functions()
        .any(|f| f.name == function && f.params.len() == arity)
}

fn check_contract(name: &str, ast: &AST) -> Result<(), LoadError> {
    for (function, arity) in REQUIRED_FUNCTIONS {
        if !defines(ast, function, arity) {
            return Err(LoadError::Contract {
                name: name.to_string(),
                function: format!("{}/{}", function, arity),
            });
        }
    }
    Ok(())
}

fn build_engine(
    name: &str,
    limits: &ScriptLimits,
    frame: &SharedFrame,
) -> Engine {
    let mut engine = Engine::new();

    engine.set_max_operations(limits.max_operations.max(1));
    engine.set_max_call_levels(limits.max_call_levels);
    engine.set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth);
    engine.set_max_string_size(limits.max_string_size);
    engine.set_max_array_size(limits.max_array_size);
    engine.set_max_map_size(limits.max_map_size);

    let print_name = name.to_string();
    engine.on_print(move |text| info!("[{}] {}", print_name, text));
    let debug_name = name.to_string();
    engine.on_debug(move |text, _source, pos| {
        debug!("[{}] {} {}", debug_name, pos, text)
    });

    engine.register_static_module("Render", render_module(frame).into());
    engine.register_static_module("Input", input_module(frame).into());
    engine.register_static_module("Sound", sound_module(frame).into());
    register_random(&mut engine);

    engine
}

/// Scripts freely mix ints and floats; every numeric binding accepts both.
fn number(value: &Dynamic, arg: &str) -> RhaiResult<f32> {
    if let Ok(float) = value.as_float() {
        return Ok(float as f32);
    }
    if let Ok(int) = value.as_int() {
        return Ok(int as f32);
    }
    Err(format!("{} must be a number, got {}", arg, value.type_name()).into())
}

fn truthy(value: &Dynamic) -> bool {
    if let Ok(flag) = value.as_bool() {
        return flag;
    }
    number(value, "filled").is_ok_and(|n| n != 0.0)
}

fn render_module(frame: &SharedFrame) -> Module {
    let mut module = Module::new();

    let f = frame.clone();
    module.set_native_fn(
        "draw_line",
        move |x1: Dynamic,
              y1: Dynamic,
              x2: Dynamic,
              y2: Dynamic|
              -> RhaiResult<()> {
            let command = DrawCommand::Line {
                x1: number(&x1, "x1")?,
                y1: number(&y1, "y1")?,
                x2: number(&x2, "x2")?,
                y2: number(&y2, "y2")?,
            };
            f.borrow_mut().commands.push(command);
            Ok(())
        },
    );

    let f = frame.clone();
    module.set_native_fn(
        "draw_rect",
        move |x: Dynamic,
              y: Dynamic,
              w: Dynamic,
              h: Dynamic|
              -> RhaiResult<()> {
            push_rect(&f, &x, &y, &w, &h, false)
        },
    );
    let f = frame.clone();
    module.set_native_fn(
        "draw_rect",
        move |x: Dynamic,
              y: Dynamic,
              w: Dynamic,
              h: Dynamic,
              filled: Dynamic|
              -> RhaiResult<()> {
            push_rect(&f, &x, &y, &w, &h, truthy(&filled))
        },
    );

    let f = frame.clone();
    module.set_native_fn(
        "draw_circle",
        move |x: Dynamic, y: Dynamic, radius: Dynamic| -> RhaiResult<()> {
            push_circle(&f, &x, &y, &radius, false)
        },
    );
    let f = frame.clone();
    module.set_native_fn(
        "draw_circle",
        move |x: Dynamic,
              y: Dynamic,
              radius: Dynamic,
              filled: Dynamic|
              -> RhaiResult<()> {
            push_circle(&f, &x, &y, &radius, truthy(&filled))
        },
    );

    let f = frame.clone();
    module.set_native_fn(
        "turn_on_pixel",
        move |x: Dynamic, y: Dynamic| -> RhaiResult<()> {
            let command = DrawCommand::Pixel {
                x: number(&x, "x")?.trunc() as i32,
                y: number(&y, "y")?.trunc() as i32,
            };
            f.borrow_mut().commands.push(command);
            Ok(())
        },
    );

    let f = frame.clone();
    module.set_native_fn(
        "draw_text",
        move |text: Dynamic, x: Dynamic, y: Dynamic| -> RhaiResult<()> {
            let command = DrawCommand::Text {
                text: text.to_string(),
                x: number(&x, "x")?,
                y: number(&y, "y")?,
            };
            f.borrow_mut().commands.push(command);
            Ok(())
        },
    );

    module.set_native_fn("width", || -> RhaiResult<INT> {
        Ok(CANVAS_W as INT)
    });
    module.set_native_fn("height", || -> RhaiResult<INT> {
        Ok(CANVAS_H as INT)
    });

    module
}

fn push_rect(
    frame: &SharedFrame,
    x: &Dynamic,
    y: &Dynamic,
    w: &Dynamic,
    h: &Dynamic,
    filled: bool,
) -> RhaiResult<()> {
    let command = DrawCommand::Rect {
        x: number(x, "x")?,
        y: number(y, "y")?,
        w: number(w, "w")?,
        h: number(h, "h")?,
        filled,
    };
    frame.borrow_mut().commands.push(command);
    Ok(())
}

fn push_circle(
    frame: &SharedFrame,
    x: &Dynamic,
    y: &Dynamic,
    radius: &Dynamic,
    filled: bool,
) -> RhaiResult<()> {
    let command = DrawCommand::Circle {
        x: number(x, "x")?,
        y: number(y, "y")?,
        radius: number(radius, "radius")?,
        filled,
    };
    frame.borrow_mut().commands.push(command);
    Ok(())
}

fn input_module(frame: &SharedFrame) -> Module {
    let mut module = Module::new();

    let f = frame.clone();
    module.set_native_fn(
        "is_key_pressed",
        move |key: ImmutableString| -> RhaiResult<bool> {
            Ok(f.borrow().input.is_key_pressed(key.as_str()))
        },
    );

    let f = frame.clone();
    module.set_native_fn("mouse_x", move || -> RhaiResult<FLOAT> {
        Ok(f.borrow().input.mouse_position().0 as FLOAT)
    });

    let f = frame.clone();
    module.set_native_fn("mouse_y", move || -> RhaiResult<FLOAT> {
        Ok(f.borrow().input.mouse_position().1 as FLOAT)
    });

    module
}

fn sound_module(frame: &SharedFrame) -> Module {
    let mut module = Module::new();

    let f = frame.clone();
    module.set_native_fn(
        "play_tone",
        move |frequency: Dynamic, duration: Dynamic| -> RhaiResult<()> {
            let tone = (
                number(&frequency, "frequency")?,
                number(&duration, "duration")?,
            );
            f.borrow_mut().tones.push(tone);
            Ok(())
        },
    );

    module
}

/// A panic inside a native function cannot unwind through the Rhai call
/// stack, so these return errors for every input `rand` would reject.
fn register_random(engine: &mut Engine) {
    engine.register_fn("rand", || rand::rng().random::<FLOAT>());

    engine.register_fn(
        "rand_range",
        |lo: Dynamic, hi: Dynamic| -> RhaiResult<FLOAT> {
            let lo = number(&lo, "lo")? as FLOAT;
            let hi = number(&hi, "hi")? as FLOAT;
            if !lo.is_finite() || !hi.is_finite() {
                return Err("rand_range bounds must be finite".into());
            }
            if lo >= hi {
                return Ok(lo);
            }
            let range = Uniform::new(lo, hi).map_err(
                |err| -> Box<EvalAltResult> {
                    format!("rand_range({}, {}): {}", lo, hi, err).into()
                },
            )?;
            Ok(rand::rng().sample(range))
        },
    );

    engine.register_fn("rand_int", |lo: INT, hi: INT| -> INT {
        if lo >= hi {
            return lo;
        }
        rand::rng().random_range(lo..=hi)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::audio::ToneLog;
    use crate::io::canvas::Canvas;
    use crate::io::input::MOUSE_LEFT;

    const HELPERS: &str = include_str!("../../static/helpers.rhai");

    const BOUNCE: &str = r#"
        fn init() { #{ t: 0.0, hits: 0 } }
        fn update(dt) {
            this.t += dt;
            if Input::is_key_pressed("space") {
                this.hits += 1;
                Sound::play_tone(440, 0.1);
            }
        }
        fn draw() {
            Render::draw_circle(helpers::lerp(0, 400, 0.5), 150, 10, true);
            Render::draw_rect(1, 2, 3, 4);
            Render::turn_on_pixel(10.7, 20.2);
            Render::draw_text(`t=${this.hits}`, 5, 5);
        }
        fn get_instructions() { "Press space." }
        fn get_next_idea() { ["louder", "faster"] }
    "#;

    fn load(source: &str) -> Result<ScriptProgram, LoadError> {
        let limits = ScriptLimits::default();
        ScriptProgram::load("test_unit", source, HELPERS, &limits)
    }

    #[test]
    fn constructs_and_caches_metadata() {
        let mut program = load(BOUNCE).unwrap();
        assert_eq!(program.instructions(), "Press space.");
        assert_eq!(program.next_ideas(), vec!["louder", "faster"]);
    }

    #[test]
    fn update_and_draw_reach_the_context() {
        let mut program = load(BOUNCE).unwrap();
        let mut canvas = Canvas::default();
        let mut input = InputState::new();
        input.key_down("space");
        let tones = ToneLog::new();

        let mut ctx = FrameContext::new(&mut canvas, &input, &tones);
        program.update(&mut ctx, 0.5).unwrap();
        program.draw(&mut ctx).unwrap();

        assert_eq!(tones.tones(), vec![(440.0, 0.1)]);
        assert_eq!(
            canvas.commands(),
            &[
                DrawCommand::Circle {
                    x: 200.0,
                    y: 150.0,
                    radius: 10.0,
                    filled: true
                },
                DrawCommand::Rect {
                    x: 1.0,
                    y: 2.0,
                    w: 3.0,
                    h: 4.0,
                    filled: false
                },
                DrawCommand::Pixel { x: 10, y: 20 },
                DrawCommand::Text {
                    text: "t=1".to_string(),
                    x: 5.0,
                    y: 5.0
                },
            ]
        );
    }

    #[test]
    fn missing_draw_is_a_contract_error() {
        let source = r#"
            fn update(dt) {}
            fn get_instructions() { "" }
            fn get_next_idea() { [] }
        "#;
        match load(source) {
            Err(LoadError::Contract { function, .. }) => {
                assert_eq!(function, "draw/0")
            }
            other => panic!("expected contract error, got {:?}", other.err()),
        }
    }

    #[test]
    fn syntax_error_is_a_compile_error() {
        assert!(matches!(
            load("fn update(dt) { let = ; }"),
            Err(LoadError::Compile { .. })
        ));
    }

    #[test]
    fn failing_init_is_a_construct_error() {
        let source = r#"
            fn init() { throw "no"; }
            fn update(dt) {}
            fn draw() {}
            fn get_instructions() { "" }
            fn get_next_idea() { [] }
        "#;
        assert!(matches!(load(source), Err(LoadError::Construct { .. })));
    }

    #[test]
    fn non_string_instructions_fail_construction() {
        let source = r#"
            fn update(dt) {}
            fn draw() {}
            fn get_instructions() { 42 }
            fn get_next_idea() { [] }
        "#;
        assert!(matches!(load(source), Err(LoadError::Construct { .. })));
    }

    #[test]
    fn runtime_error_surfaces_as_program_error() {
        let source = r#"
            fn init() { #{ zero: 0 } }
            fn update(dt) { let x = 1 / this.zero; }
            fn draw() {}
            fn get_instructions() { "" }
            fn get_next_idea() { [] }
        "#;
        let mut program = load(source).unwrap();
        let mut canvas = Canvas::default();
        let input = InputState::new();
        let tones = ToneLog::new();
        let mut ctx = FrameContext::new(&mut canvas, &input, &tones);

        assert!(program.update(&mut ctx, 0.1).is_err());
    }

    #[test]
    fn operation_limit_stops_runaway_loops() {
        let source = r#"
            fn update(dt) { loop { } }
            fn draw() {}
            fn get_instructions() { "" }
            fn get_next_idea() { [] }
        "#;
        let mut program = ScriptProgram::load(
            "spin",
            source,
            HELPERS,
            &ScriptLimits::with_max_operations(10_000),
        )
        .unwrap();
        let mut canvas = Canvas::default();
        let input = InputState::new();
        let tones = ToneLog::new();
        let mut ctx = FrameContext::new(&mut canvas, &input, &tones);

        assert!(program.update(&mut ctx, 0.1).is_err());
    }

    #[test]
    fn non_finite_random_bounds_fail_construction() {
        let source = r#"
            fn init() {
                let nan = (-1.0).sqrt();
                #{ x: rand_range(nan, 1.0) }
            }
            fn update(dt) {}
            fn draw() {}
            fn get_instructions() { "" }
            fn get_next_idea() { [] }
        "#;
        match load(source) {
            Err(LoadError::Construct { message, .. }) => {
                assert!(message.contains("finite"), "{}", message)
            }
            other => panic!("expected construct error, got {:?}", other.err()),
        }
    }

    #[test]
    fn overflowing_random_range_is_an_error() {
        let source = r#"
            fn update(dt) {
                let a = rand_range(0.0, 1.0e300 * 1.0e300);
            }
            fn draw() {
                let b = rand_range(-1.0e308, 1.0e308);
            }
            fn get_instructions() { "" }
            fn get_next_idea() { [] }
        "#;
        let mut program = load(source).unwrap();
        let mut canvas = Canvas::default();
        let input = InputState::new();
        let tones = ToneLog::new();
        let mut ctx = FrameContext::new(&mut canvas, &input, &tones);

        assert!(program.update(&mut ctx, 0.1).is_err());
        assert!(program.draw(&mut ctx).is_err());
    }

    #[test]
    fn random_range_stays_in_bounds() {
        let source = r#"
            fn init() { #{ x: rand_range(2, 3), y: rand_range(5, 5) } }
            fn update(dt) {}
            fn draw() {}
            fn get_instructions() { `${this.x >= 2.0 && this.x < 3.0}` }
            fn get_next_idea() { [`${this.y}`] }
        "#;
        let mut program = load(source).unwrap();
        assert_eq!(program.instructions(), "true");
        assert_eq!(program.next_ideas(), vec!["5.0"]);
    }

    #[test]
    fn mouse_reads_through_input_module() {
        let source = r#"
            fn update(dt) {
                if Input::is_key_pressed("mouse left") {
                    Render::draw_line(0, 0, Input::mouse_x(), Input::mouse_y());
                }
            }
            fn draw() {}
            fn get_instructions() { "" }
            fn get_next_idea() { [] }
        "#;
        let mut program = load(source).unwrap();
        let mut canvas = Canvas::default();
        let mut input = InputState::new();
        input.key_down(MOUSE_LEFT);
        input.set_mouse_position(30.0, 40.0);
        let tones = ToneLog::new();
        let mut ctx = FrameContext::new(&mut canvas, &input, &tones);

        program.update(&mut ctx, 0.1).unwrap();
        assert_eq!(
            canvas.commands(),
            &[DrawCommand::Line {
                x1: 0.0,
                y1: 0.0,
                x2: 30.0,
                y2: 40.0
            }]
        );
    }

    #[test]
    fn later_metadata_failure_keeps_last_good_value() {
        let source = r#"
            fn init() { #{ broken: false } }
            fn update(dt) { this.broken = true; }
            fn draw() {}
            fn get_instructions() {
                if this.broken { throw "gone"; }
                "steady"
            }
            fn get_next_idea() { ["one"] }
        "#;
        let mut program = load(source).unwrap();
        let mut canvas = Canvas::default();
        let input = InputState::new();
        let tones = ToneLog::new();
        let mut ctx = FrameContext::new(&mut canvas, &input, &tones);

        program.update(&mut ctx, 0.1).unwrap();
        assert_eq!(program.instructions(), "steady");
    }
}
