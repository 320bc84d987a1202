use clap::Parser;
use std::path::PathBuf;

use reverie::prelude::*;
use reverie::runtime::settings::Settings;
use reverie::runtime::storage;

mod sketches;
use sketches::{lameduck, pulse};

#[derive(Parser, Debug)]
#[command(version, about = "Describe a sketch and watch it appear")]
struct Args {
    /// Built-in program or saved unit to start with instead of the default
    initial: Option<String>,

    /// Settings file (defaults to the platform config directory)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Write the effective settings back to the settings file and continue
    #[arg(long)]
    save_settings: bool,

    #[arg(long)]
    units_dir: Option<String>,

    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    base_url: Option<String>,

    #[arg(long)]
    fps: Option<f32>,

    /// Never contact the model; prompts resolve to the default sketch
    #[arg(long)]
    offline: bool,

    /// Disable live reload of the running unit
    #[arg(long)]
    no_watch: bool,

    /// Do not read prompts from stdin
    #[arg(long)]
    no_console: bool,
}

fn main() {
    init_logger();
    let args = Args::parse();

    let settings_path = args
        .settings
        .clone()
        .or_else(|| {
            storage::config_dir().map(|dir| storage::settings_path(&dir))
        });

    let mut settings = match settings_path.as_deref() {
        Some(path) => match storage::load_settings_if_exists(path) {
            Ok(Some(settings)) => {
                info!("Loaded settings from {}", path.display());
                settings
            }
            Ok(None) => Settings::default(),
            Err(err) => {
                error!(
                    "Unable to read settings at {}: {}",
                    path.display(),
                    err
                );
                Settings::default()
            }
        },
        None => Settings::default(),
    };

    apply_overrides(&mut settings, &args);

    if args.save_settings {
        match settings_path.as_deref() {
            Some(path) => match storage::save_settings(path, &settings) {
                Ok(()) => info!("Saved settings to {}", path.display()),
                Err(err) => error!("Unable to save settings: {}", err),
            },
            None => warn!("No settings location available; not saving"),
        }
    }

    let builtins = builtin_programs().unwrap_or_else(|err| {
        eprintln!("reverie program registry failed: {}", err);
        std::process::exit(1);
    });

    let config = reverie::AppConfig {
        settings,
        builtins,
        initial_program: args.initial,
        offline: args.offline,
        console: !args.no_console,
    };

    if let Err(err) = reverie::run(config) {
        eprintln!("reverie runtime failed: {}", err);
        std::process::exit(1);
    }
}

fn builtin_programs() -> Result<Builtins, String> {
    reverie::register_programs! {
        {
            title: "Demos",
            programs: [
                lameduck,
                pulse,
            ]
        },
    }
}

fn apply_overrides(settings: &mut Settings, args: &Args) {
    if let Some(units_dir) = &args.units_dir {
        settings.units_dir = units_dir.clone();
    }
    if let Some(model) = &args.model {
        settings.model = model.clone();
    }
    if let Some(base_url) = &args.base_url {
        settings.api_base_url = base_url.clone();
    }
    if let Some(fps) = args.fps.filter(|fps| *fps > 0.0) {
        settings.fps = fps;
    }
    if args.no_watch {
        settings.watch_units = false;
    }
}
