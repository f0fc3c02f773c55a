//! Music controller: key-press → playback action dispatch.
//!
//! Single-owner sequential loop: key events arrive on an mpsc channel and
//! each one, volume fade included, is handled to completion before the next
//! is taken.  That ordering is load-bearing: a fade always finishes before
//! the next action touches the player.
//!
//! At most one playback session is active.  A session owns its player handle
//! exclusively and the handle is stopped and released before a replacement
//! is opened.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use gmbox_core::config::MusicConfig;
use gmbox_core::keymap::{self, KeyAction, KeyId, Keymap};

/// Number of discrete volume steps in a fade.
const FADE_STEPS: u32 = 30;

/// Fade applied to live volume-step changes; short enough to read as an
/// instant step, long enough to stay smooth.
const VOLUME_STEP_FADE: Duration = Duration::from_millis(50);

/// Settle time between starting playback and the first fade step.
const PLAY_SETTLE: Duration = Duration::from_millis(10);

/// One open track on the media engine.  Implementations: [`crate::mpv`]
/// (one mpv child per session), mock players in tests.
#[allow(async_fn_in_trait)]
pub trait Player {
    async fn play(&mut self) -> Result<()>;
    async fn toggle_pause(&mut self) -> Result<()>;
    async fn set_volume(&mut self, volume: u8) -> Result<()>;
    async fn get_volume(&mut self) -> Result<u8>;
    /// Stop playback and release the native resource.
    async fn stop(&mut self) -> Result<()>;
}

/// Opens tracks on the media engine.
#[allow(async_fn_in_trait)]
pub trait PlayerBackend {
    type Handle: Player;
    async fn open(&self, path: &Path) -> Result<Self::Handle>;
}

/// The one live sound, when there is one.
struct Session<P> {
    player: P,
}

pub struct MusicController<B: PlayerBackend> {
    backend: B,
    keymap: Keymap,
    audio_dir: PathBuf,
    /// Process-wide volume state, 0-100.  Outlives sessions; feeds the next
    /// fade-in target.
    volume: u8,
    volume_step: u8,
    stop_fade: Duration,
    session: Option<Session<B::Handle>>,
}

impl<B: PlayerBackend> MusicController<B> {
    pub fn new(backend: B, keymap: Keymap, audio_dir: PathBuf, music: &MusicConfig) -> Self {
        // The keymap's fades are validated at resolution time; the stop fade
        // comes straight from the config and needs the same guard, or
        // Duration::from_secs_f32 panics on the first Stop.
        let stop_fade_secs = if keymap::fade_is_valid(music.stop_fade_secs) {
            music.stop_fade_secs
        } else {
            warn!(
                "invalid stop_fade_secs {}; using {}",
                music.stop_fade_secs,
                keymap::DEFAULT_FADE_SECS
            );
            keymap::DEFAULT_FADE_SECS
        };
        Self {
            backend,
            keymap,
            audio_dir,
            volume: music.default_volume.min(100),
            volume_step: music.volume_step,
            stop_fade: Duration::from_secs_f32(stop_fade_secs),
            session: None,
        }
    }

    /// Consume key events until the input source goes away.  Errors stay
    /// local to the dispatch that raised them.
    pub async fn run(mut self, mut keys: mpsc::Receiver<KeyId>) {
        info!("music controller ready; waiting for keypress");
        while let Some(key) = keys.recv().await {
            if let Err(err) = self.dispatch(key).await {
                error!("error handling key {:?}: {:#}", key, err);
            }
        }
        // Input source gone; release the player on the way out.
        let _ = self.stop_music(Duration::ZERO).await;
    }

    /// Handle one key press to completion.
    pub async fn dispatch(&mut self, key: KeyId) -> Result<()> {
        debug!("pressed key {:?}", key);
        let Some(action) = self.keymap.lookup(&key).cloned() else {
            return Ok(());
        };
        match action {
            KeyAction::NoOp => Ok(()),
            KeyAction::Stop => self.stop_music(self.stop_fade).await,
            KeyAction::TogglePause => self.toggle_pause().await,
            KeyAction::VolumeUp => self.change_volume(self.volume_step as i16).await,
            KeyAction::VolumeDown => self.change_volume(-(self.volume_step as i16)).await,
            KeyAction::PlayTrack {
                file,
                volume_percent,
                fade_secs,
            } => {
                let fade = Duration::from_secs_f32(fade_secs);
                // The outgoing track fades on the incoming track's clock.
                self.stop_music(fade).await?;
                let path = self.audio_dir.join(&file);
                if !path.exists() {
                    warn!("song file not found: {}", path.display());
                    return Ok(());
                }
                self.start_music(&path, volume_percent, fade).await
            }
        }
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    #[allow(dead_code)]
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    async fn stop_music(&mut self, fade: Duration) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            debug!("stopping music");
            fade_volume(&mut session.player, 0, fade).await?;
            session.player.stop().await?;
        }
        Ok(())
    }

    async fn start_music(&mut self, path: &Path, volume_percent: u8, fade: Duration) -> Result<()> {
        info!("starting song: {}", path.display());
        let mut player = self.backend.open(path).await?;
        player.set_volume(0).await?;
        player.play().await?;
        tokio::time::sleep(PLAY_SETTLE).await;
        // Per-track percent is a ceiling relative to the global volume.
        let target = (self.volume as u16 * volume_percent.min(100) as u16 / 100) as u8;
        fade_volume(&mut player, target, fade).await?;
        self.session = Some(Session { player });
        Ok(())
    }

    async fn toggle_pause(&mut self) -> Result<()> {
        if let Some(session) = self.session.as_mut() {
            debug!("toggled pause");
            session.player.toggle_pause().await?;
        }
        Ok(())
    }

    async fn change_volume(&mut self, delta: i16) -> Result<()> {
        let old = self.volume;
        let new = (old as i16 + delta).clamp(0, 100) as u8;
        if new == old {
            info!("volume NOT changed from {} to {}", old, new);
            return Ok(());
        }
        self.volume = new;
        if let Some(session) = self.session.as_mut() {
            fade_volume(&mut session.player, new, VOLUME_STEP_FADE).await?;
        }
        debug!("changed volume from {} to {}", old, new);
        Ok(())
    }
}

/// Linear fade from the player's current volume to `target` over `duration`,
/// in [`FADE_STEPS`] equal steps.  Blocks the calling task for the full
/// duration and always lands exactly on `target`.
async fn fade_volume<P: Player>(player: &mut P, target: u8, duration: Duration) -> Result<()> {
    let start = player.get_volume().await? as f32;
    let target_f = target.min(100) as f32;
    for step in 1..=FADE_STEPS {
        let volume = start + (target_f - start) * step as f32 / FADE_STEPS as f32;
        player
            .set_volume(volume.round().clamp(0.0, 100.0) as u8)
            .await?;
        tokio::time::sleep(duration / FADE_STEPS).await;
    }
    debug!("faded volume from {} to {}", start.round(), target);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gmbox_core::keymap::KeyBinding;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    /// Call log shared between the backend and every player it opens.
    /// Entries like "open#2 battle.mp3", "play#2", "volume#2=55", "stop#2".
    #[derive(Clone, Default)]
    struct CallLog(Arc<Mutex<Vec<String>>>);

    impl CallLog {
        fn push(&self, entry: String) {
            self.0.lock().unwrap().push(entry);
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }

        fn position(&self, entry: &str) -> Option<usize> {
            self.entries().iter().position(|e| e == entry)
        }
    }

    struct MockPlayer {
        id: usize,
        log: CallLog,
        volume: u8,
    }

    impl Player for MockPlayer {
        async fn play(&mut self) -> Result<()> {
            self.log.push(format!("play#{}", self.id));
            Ok(())
        }

        async fn toggle_pause(&mut self) -> Result<()> {
            self.log.push(format!("pause#{}", self.id));
            Ok(())
        }

        async fn set_volume(&mut self, volume: u8) -> Result<()> {
            self.volume = volume;
            self.log.push(format!("volume#{}={}", self.id, volume));
            Ok(())
        }

        async fn get_volume(&mut self) -> Result<u8> {
            Ok(self.volume)
        }

        async fn stop(&mut self) -> Result<()> {
            self.log.push(format!("stop#{}", self.id));
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockBackend {
        log: CallLog,
        opened: Arc<Mutex<usize>>,
    }

    impl PlayerBackend for MockBackend {
        type Handle = MockPlayer;

        async fn open(&self, path: &Path) -> Result<MockPlayer> {
            let mut opened = self.opened.lock().unwrap();
            *opened += 1;
            let id = *opened;
            drop(opened);
            self.log.push(format!(
                "open#{} {}",
                id,
                path.file_name().unwrap().to_string_lossy()
            ));
            Ok(MockPlayer {
                id,
                log: self.log.clone(),
                volume: 0,
            })
        }
    }

    fn keymap(bindings: &[(&str, KeyBinding)]) -> Keymap {
        let table: BTreeMap<String, KeyBinding> = bindings
            .iter()
            .map(|(k, b)| (k.to_string(), b.clone()))
            .collect();
        Keymap::from_bindings(&table).unwrap()
    }

    fn controller_with(
        audio_dir: PathBuf,
        bindings: &[(&str, KeyBinding)],
    ) -> (MusicController<MockBackend>, CallLog) {
        let backend = MockBackend::default();
        let log = backend.log.clone();
        let controller = MusicController::new(
            backend,
            keymap(bindings),
            audio_dir,
            &MusicConfig::default(),
        );
        (controller, log)
    }

    fn touch(dir: &std::path::Path, name: &str) {
        std::fs::write(dir.join(name), b"not really audio").unwrap();
    }

    #[tokio::test]
    async fn test_unmapped_key_produces_no_calls() {
        let (mut controller, log) = controller_with(PathBuf::from("/tmp"), &[]);
        controller.dispatch(KeyId::Char('z')).await.unwrap();
        assert!(log.entries().is_empty());
    }

    #[tokio::test]
    async fn test_noop_binding_is_swallowed() {
        let bindings = [("/", KeyBinding::Simple("none".to_string()))];
        let (mut controller, log) = controller_with(PathBuf::from("/tmp"), &bindings);
        controller.dispatch(KeyId::Char('/')).await.unwrap();
        assert!(log.entries().is_empty());
    }

    #[tokio::test]
    async fn test_stop_without_session_is_silent() {
        let bindings = [("enter", KeyBinding::Simple("stop".to_string()))];
        let (mut controller, log) = controller_with(PathBuf::from("/tmp"), &bindings);
        controller.dispatch(KeyId::Enter).await.unwrap();
        assert!(log.entries().is_empty());
    }

    #[tokio::test]
    async fn test_toggle_pause_without_session_is_silent() {
        let bindings = [("backspace", KeyBinding::Simple("pause".to_string()))];
        let (mut controller, log) = controller_with(PathBuf::from("/tmp"), &bindings);
        controller.dispatch(KeyId::Backspace).await.unwrap();
        assert!(log.entries().is_empty());
    }

    #[tokio::test]
    async fn test_volume_clamps_and_is_idempotent_at_bounds() {
        let bindings = [
            ("+", KeyBinding::Simple("volume-up".to_string())),
            ("-", KeyBinding::Simple("volume-down".to_string())),
        ];
        let (mut controller, _log) = controller_with(PathBuf::from("/tmp"), &bindings);
        assert_eq!(controller.volume(), 100);

        // Up at the ceiling stays put.
        controller.dispatch(KeyId::Char('+')).await.unwrap();
        assert_eq!(controller.volume(), 100);

        for _ in 0..15 {
            controller.dispatch(KeyId::Char('-')).await.unwrap();
        }
        assert_eq!(controller.volume(), 0);

        controller.dispatch(KeyId::Char('-')).await.unwrap();
        assert_eq!(controller.volume(), 0);

        controller.dispatch(KeyId::Char('+')).await.unwrap();
        assert_eq!(controller.volume(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_scenario_opens_plays_then_fades() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "battle.mp3");
        let bindings = [(
            "1",
            KeyBinding::Track {
                file: "battle.mp3".to_string(),
                volume: 100,
                fade: 1.5,
            },
        )];
        let (mut controller, log) = controller_with(dir.path().to_path_buf(), &bindings);

        controller.dispatch(KeyId::Char('1')).await.unwrap();

        let entries = log.entries();
        assert_eq!(entries[0], "open#1 battle.mp3");
        assert_eq!(entries[1], "volume#1=0");
        assert_eq!(entries[2], "play#1");
        // Fade steps follow play and end exactly at the target.
        assert_eq!(entries.last().unwrap(), "volume#1=100");
        assert!(controller.has_session());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacement_releases_first_session_before_opening_second() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "forest.mp3");
        touch(dir.path(), "tavern.mp3");
        let bindings = [
            ("1", KeyBinding::Simple("forest.mp3".to_string())),
            ("2", KeyBinding::Simple("tavern.mp3".to_string())),
        ];
        let (mut controller, log) = controller_with(dir.path().to_path_buf(), &bindings);

        controller.dispatch(KeyId::Char('1')).await.unwrap();
        controller.dispatch(KeyId::Char('2')).await.unwrap();

        let stop_first = log.position("stop#1").expect("first session stopped");
        let open_second = log.position("open#2 tavern.mp3").expect("second opened");
        assert!(stop_first < open_second);
        assert!(controller.has_session());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_file_aborts_with_no_session() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "real.mp3");
        let bindings = [
            ("1", KeyBinding::Simple("real.mp3".to_string())),
            ("2", KeyBinding::Simple("ghost.mp3".to_string())),
        ];
        let (mut controller, log) = controller_with(dir.path().to_path_buf(), &bindings);

        controller.dispatch(KeyId::Char('1')).await.unwrap();
        assert!(controller.has_session());

        controller.dispatch(KeyId::Char('2')).await.unwrap();
        // Old session already released, nothing new opened.
        assert!(!controller.has_session());
        assert!(log.position("stop#1").is_some());
        assert!(log.position("open#2 ghost.mp3").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_track_percent_scales_global_volume() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "storm.ogg");
        let bindings = [
            ("-", KeyBinding::Simple("volume-down".to_string())),
            (
                "9",
                KeyBinding::Track {
                    file: "storm.ogg".to_string(),
                    volume: 50,
                    fade: 0.5,
                },
            ),
        ];
        let (mut controller, log) = controller_with(dir.path().to_path_buf(), &bindings);

        // Global 100 → 80, track ceiling 50% ⇒ fade target 40.
        controller.dispatch(KeyId::Char('-')).await.unwrap();
        controller.dispatch(KeyId::Char('-')).await.unwrap();
        controller.dispatch(KeyId::Char('9')).await.unwrap();
        assert_eq!(log.entries().last().unwrap(), "volume#1=40");
    }

    #[tokio::test(start_paused = true)]
    async fn test_volume_step_refades_active_session() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "town.mp3");
        let bindings = [
            ("2", KeyBinding::Simple("town.mp3".to_string())),
            ("-", KeyBinding::Simple("volume-down".to_string())),
        ];
        let (mut controller, log) = controller_with(dir.path().to_path_buf(), &bindings);

        controller.dispatch(KeyId::Char('2')).await.unwrap();
        controller.dispatch(KeyId::Char('-')).await.unwrap();
        assert_eq!(controller.volume(), 90);
        assert_eq!(log.entries().last().unwrap(), "volume#1=90");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fade_lands_exactly_on_target() {
        let log = CallLog::default();
        let mut player = MockPlayer {
            id: 1,
            log: log.clone(),
            volume: 37,
        };
        fade_volume(&mut player, 62, Duration::from_millis(300))
            .await
            .unwrap();
        assert_eq!(player.volume, 62);
        // 30 steps were applied.
        assert_eq!(log.entries().len(), FADE_STEPS as usize);
    }

    #[tokio::test(start_paused = true)]
    async fn test_negative_stop_fade_falls_back_instead_of_panicking() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "drums.mp3");
        let bindings = [
            ("1", KeyBinding::Simple("drums.mp3".to_string())),
            ("enter", KeyBinding::Simple("stop".to_string())),
        ];
        let backend = MockBackend::default();
        let log = backend.log.clone();
        let config = MusicConfig {
            stop_fade_secs: -1.0,
            ..MusicConfig::default()
        };
        let mut controller = MusicController::new(
            backend,
            keymap(&bindings),
            dir.path().to_path_buf(),
            &config,
        );

        // Stop must run a normal fade-out on the default clock, not panic
        // converting the bad duration.
        controller.dispatch(KeyId::Char('1')).await.unwrap();
        controller.dispatch(KeyId::Enter).await.unwrap();
        assert!(!controller.has_session());
        assert!(log.position("stop#1").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_fades_to_zero_then_releases() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "cave.m4a");
        let bindings = [
            ("4", KeyBinding::Simple("cave.m4a".to_string())),
            ("enter", KeyBinding::Simple("stop".to_string())),
        ];
        let (mut controller, log) = controller_with(dir.path().to_path_buf(), &bindings);

        controller.dispatch(KeyId::Char('4')).await.unwrap();
        controller.dispatch(KeyId::Enter).await.unwrap();

        assert!(!controller.has_session());
        let entries = log.entries();
        let stop = log.position("stop#1").expect("player released");
        // The last volume write before release is the zero landing.
        assert_eq!(entries[stop - 1], "volume#1=0");
    }
}
