use anyhow::{Context, Result};
use soundbox::app::{App, Flow};
use soundbox::audio::{device, RodioFactory};
use soundbox::config::{Paths, SettingsStore};
use soundbox::input::HotkeyListener;
use soundbox::{shell, telemetry, update};
use std::process::ExitCode;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> ExitCode {
    let paths = match Paths::resolve() {
        Ok(paths) => paths,
        Err(e) => {
            eprintln!("soundbox: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = telemetry::init(&paths.trace_log_file()) {
        eprintln!("soundbox: logging disabled: {e:#}");
    }
    tracing::info!("soundbox {} starting", env!("CARGO_PKG_VERSION"));

    match run(&paths).await {
        Ok(()) => {
            tracing::info!("soundbox exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("fatal: {:#}", e);
            if let Err(log_err) = telemetry::write_crash_log(&paths.crash_log_file(), &e) {
                eprintln!("soundbox: {log_err:#}");
            }
            eprintln!("soundbox: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(paths: &Paths) -> Result<()> {
    let mut settings =
        SettingsStore::load(&paths.settings_file()).context("failed to load settings")?;
    if settings.get().default_output.is_empty() {
        if let Some(name) = device::default_output_name() {
            settings
                .update(|s| s.default_output = name)
                .context("failed to save settings")?;
        }
    }
    println!("✓ Settings loaded from {}", paths.settings_file().display());

    let mut update_check =
        tokio::task::spawn_blocking(|| update::check_for_update(env!("CARGO_PKG_VERSION")));
    let mut update_done = false;

    let mut app = App::new(
        settings,
        paths.keybinds_file(),
        Box::new(RodioFactory),
        std::io::stdout(),
    )?;

    let (chord_tx, mut chord_rx) = mpsc::unbounded_channel();
    let listener =
        HotkeyListener::start(app.keybinds(), chord_tx).context("failed to start hotkey listener")?;
    app.attach_listener(listener);
    println!("✓ Hotkey listener running");

    println!("\nSoundBox is running. Type 'help' for commands, Ctrl+C to exit.\n");
    app.show_list()?;

    let mut lines = shell::spawn_stdin_reader();
    let mut tick = tokio::time::interval(tokio::time::Duration::from_millis(250));

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else {
                    tracing::info!("stdin closed");
                    break;
                };
                if app.handle_line(&line)? == Flow::Quit {
                    break;
                }
            }
            Some(event) = chord_rx.recv() => {
                app.handle_chord_event(event)?;
            }
            _ = tick.tick() => {
                app.on_tick()?;
            }
            result = &mut update_check, if !update_done => {
                update_done = true;
                if let Ok(Some(latest)) = result {
                    println!(
                        "A new version of SoundBox is available: {latest}. \
                         You are using version {}.",
                        env!("CARGO_PKG_VERSION")
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                println!("\nShutting down...");
                break;
            }
        }
    }

    Ok(())
}
