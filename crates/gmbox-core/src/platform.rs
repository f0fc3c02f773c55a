use std::path::PathBuf;

/// Numeric control id of the Pi's audio route selector, as exposed by amixer.
pub const AMIXER_ROUTE_NUMID: u32 = 3;

/// Socket path for a single mpv playback process.  Each playback session
/// spawns its own mpv, so the path carries the process id of gmbox plus a
/// per-session counter to stay unique.
pub fn mpv_socket_name(session: u64) -> String {
    format!(
        "{}/gmbox-mpv-{}-{}.sock",
        std::env::temp_dir().display(),
        std::process::id(),
        session
    )
}

pub fn mpv_socket_arg(session: u64) -> String {
    format!("--input-ipc-server={}", mpv_socket_name(session))
}

/// ~/.local/share/gmbox/ (XDG standard; avoid the macOS Application
/// Support folder for consistency).
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".local")
        .join("share")
        .join("gmbox")
}

/// ~/.config/gmbox/
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("gmbox")
}

/// Default directory holding the sound cue files.
pub fn default_audio_dir() -> PathBuf {
    data_dir().join("audio")
}

fn find_beside_exe(name: &str) -> Option<PathBuf> {
    let current_exe = std::env::current_exe().ok()?;
    let dir = current_exe.parent()?;
    let p = dir.join(name);
    if p.exists() {
        return Some(p);
    }
    None
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var("PATH").ok()?;
    for dir in path.split(':') {
        let p = PathBuf::from(dir).join(name);
        if p.exists() {
            return Some(p);
        }
    }
    None
}

/// Find the mpv binary for playback: beside the current exe first, then PATH.
pub fn find_mpv_binary() -> Option<PathBuf> {
    if let Some(p) = find_beside_exe("mpv") {
        return Some(p);
    }
    find_on_path("mpv")
}

/// Find the amixer binary for audio-route switching.
pub fn find_amixer_binary() -> Option<PathBuf> {
    if let Some(p) = find_beside_exe("amixer") {
        return Some(p);
    }
    find_on_path("amixer")
}
