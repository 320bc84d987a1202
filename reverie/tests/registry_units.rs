use std::fs;
use std::path::PathBuf;

use reverie::io::audio::ToneLog;
use reverie::io::canvas::Canvas;
use reverie::io::input::InputState;
use reverie::program::FrameContext;
use reverie::registry::{
    Builtins, HELPERS_UNIT, LoadError, Registry, ScriptLimits, UnitStore,
};

fn sample_units_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("dreams")
        .join("units")
}

fn registry_in(dir: &std::path::Path) -> Registry {
    Registry::new(UnitStore::new(dir), Builtins::new(), ScriptLimits::default())
}

#[test]
fn bundled_sample_units_load_and_run() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_in(dir.path());
    registry.store().install_helpers().unwrap();

    let samples = UnitStore::new(sample_units_dir()).enumerate_names();
    assert!(samples.contains("saturn"));
    assert!(samples.contains("bouncing"));

    for name in &samples {
        let source = fs::read_to_string(
            UnitStore::new(sample_units_dir()).unit_path(name),
        )
        .unwrap();
        registry.store().write(name, &source).unwrap();

        let mut loaded = registry
            .load(name)
            .unwrap_or_else(|err| panic!("{} failed to load: {}", name, err));

        let mut canvas = Canvas::default();
        let mut input = InputState::new();
        input.key_down("space");
        input.key_down("mouse left");
        input.set_mouse_position(100.0, 50.0);
        let tones = ToneLog::new();

        for _ in 0..30 {
            canvas.clear();
            let mut ctx = FrameContext::new(&mut canvas, &input, &tones);
            loaded
                .program
                .update(&mut ctx, 1.0 / 30.0)
                .unwrap_or_else(|err| panic!("{} update: {}", name, err));
            loaded
                .program
                .draw(&mut ctx)
                .unwrap_or_else(|err| panic!("{} draw: {}", name, err));
        }

        assert!(!canvas.is_empty(), "{} drew nothing", name);
        assert!(!loaded.program.instructions().is_empty());
        assert!(!loaded.program.next_ideas().is_empty());
    }
}

#[test]
fn helpers_are_not_a_loadable_unit() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_in(dir.path());
    registry.store().install_helpers().unwrap();

    assert!(registry.store().unit_path(HELPERS_UNIT).is_file());
    assert!(registry.saved_names().is_empty());
    assert!(matches!(
        registry.load(HELPERS_UNIT),
        Err(LoadError::NotFound(_))
    ));
}

#[test]
fn edited_helpers_are_picked_up() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_in(dir.path());
    fs::write(
        registry.store().unit_path(HELPERS_UNIT),
        "fn shout(s) { s + \"!\" }",
    )
    .unwrap();
    // An existing helpers file is left alone.
    registry.store().install_helpers().unwrap();

    registry
        .store()
        .write(
            "echo",
            r#"
            fn update(dt) { }
            fn draw() { }
            fn get_instructions() { helpers::shout("hi") }
            fn get_next_idea() { [] }
            "#,
        )
        .unwrap();

    let mut loaded = registry.load("echo").unwrap();
    assert_eq!(loaded.program.instructions(), "hi!");
}
