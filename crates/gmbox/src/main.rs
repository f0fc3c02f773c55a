mod lcd;
mod menu;
mod mpv;
mod music;
mod route;

use clap::Parser;
use crossterm::event::{Event, KeyCode, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc;
use tracing::{info, warn};

use gmbox_core::config::Config;
use gmbox_core::keymap::{KeyId, Keymap};
use gmbox_core::platform;

use lcd::NoopLcd;
use menu::{AudioOutput, Greeting, LcdMenu};
use music::MusicController;

/// Numberpad soundboard and LCD menu for running ambient sound cues at the
/// game table.
#[derive(Parser, Debug)]
#[command(name = "gmbox", version, about)]
struct Cli {
    /// Spit out verbose logging.
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let data_dir = platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("gmbox.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let default_filter = if cli.debug { "debug" } else { "info" };
    let log_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    // The terminal itself is the keypad, so logs go to a file; tell the
    // operator where.
    eprintln!("gmbox log: {}", log_path.display());

    let config = Config::load()?;
    info!("config loaded from {}", Config::config_path().display());
    let keymap = Keymap::from_bindings(&config.keys)?;
    if keymap.is_empty() {
        warn!("keymap is empty; key presses will do nothing");
    } else {
        info!("{} key bindings loaded", keymap.len());
    }
    if !config.paths.audio_dir.exists() {
        warn!(
            "audio directory does not exist: {}",
            config.paths.audio_dir.display()
        );
    }

    // ── LCD menu loop ────────────────────────────────────────────────────────
    // No plate driver is linked on this build; the no-op stub keeps the menu
    // harmless on machines without the hardware.
    warn!("LCD plate not available; falling back to no-op display");
    let mut lcd_menu = LcdMenu::new(NoopLcd);
    lcd_menu.add_item(Box::new(Greeting::new()));
    match route::AmixerRoute::new() {
        Ok(routes) => lcd_menu.add_item(Box::new(AudioOutput::new(routes))),
        Err(err) => warn!("audio route control unavailable: {:#}", err),
    }
    lcd_menu.refresh();
    let poll_interval = std::time::Duration::from_millis(config.menu.poll_interval_ms);
    let _menu_task = tokio::task::spawn_blocking(move || lcd_menu.run(poll_interval));

    // ── music loop ───────────────────────────────────────────────────────────
    let (key_tx, key_rx) = mpsc::channel::<KeyId>(64);
    crossterm::terminal::enable_raw_mode()?;
    let _input_task = tokio::task::spawn_blocking(move || read_keys(key_tx));

    let controller = MusicController::new(
        mpv::MpvBackend::new(),
        keymap,
        config.paths.audio_dir.clone(),
        &config.music,
    );
    info!(
        "gmbox started at volume {}; waiting for keypress",
        controller.volume()
    );
    controller.run(key_rx).await;

    crossterm::terminal::disable_raw_mode()?;
    Ok(())
}

/// Blocking key reader: forwards press events to the music controller.
/// Ctrl-C ends the process (raw mode swallows the usual signal).
fn read_keys(tx: mpsc::Sender<KeyId>) {
    loop {
        let event = match crossterm::event::read() {
            Ok(event) => event,
            Err(err) => {
                warn!("key input error: {}", err);
                break;
            }
        };
        let Event::Key(key) = event else { continue };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            let _ = crossterm::terminal::disable_raw_mode();
            std::process::exit(0);
        }
        let id = match key.code {
            KeyCode::Char(c) => Some(KeyId::Char(c)),
            KeyCode::Enter => Some(KeyId::Enter),
            KeyCode::Backspace => Some(KeyId::Backspace),
            _ => None,
        };
        if let Some(id) = id {
            if tx.blocking_send(id).is_err() {
                break;
            }
        }
    }
}
