//! Audio-route switching via the system amixer utility.
//!
//! The Pi exposes its output selector as a numeric mixer control; reading it
//! back means running `amixer cget` and pulling the `values=<n>` integer out
//! of the text output.  Unparsable output is treated as "route unknown"
//! (index 0); a failed invocation is an error local to the one action that
//! triggered it.

use std::path::PathBuf;
use std::process::Command;
use std::sync::OnceLock;

use anyhow::Context;
use regex::Regex;
use tracing::{debug, warn};

use gmbox_core::platform::{self, AMIXER_ROUTE_NUMID};

/// Selectable output destinations, in route-index order.
pub const ROUTE_LABELS: [&str; 3] = ["Auto", "Headphones", "HDMI"];

/// Seam over the routing utility.  `Send` because the menu items holding it
/// live on the menu's blocking task.
pub trait RouteControl: Send {
    /// Index of the currently active output route.
    fn active_route(&self) -> anyhow::Result<usize>;
    fn set_route(&self, route: usize) -> anyhow::Result<()>;
}

/// Shells out to amixer for the Pi's `numid=3` route selector.
pub struct AmixerRoute {
    binary: PathBuf,
}

impl AmixerRoute {
    pub fn new() -> anyhow::Result<Self> {
        let binary =
            platform::find_amixer_binary().context("amixer binary not found on PATH")?;
        Ok(Self { binary })
    }
}

impl RouteControl for AmixerRoute {
    fn active_route(&self) -> anyhow::Result<usize> {
        let output = Command::new(&self.binary)
            .args(["cget", &format!("numid={}", AMIXER_ROUTE_NUMID)])
            .output()
            .context("running amixer cget")?;
        if !output.status.success() {
            anyhow::bail!("amixer cget exited with {}", output.status);
        }
        let route = parse_route(&String::from_utf8_lossy(&output.stdout));
        debug!(route, "read active audio route");
        Ok(route)
    }

    fn set_route(&self, route: usize) -> anyhow::Result<()> {
        let status = Command::new(&self.binary)
            .args([
                "cset",
                &format!("numid={}", AMIXER_ROUTE_NUMID),
                &route.to_string(),
            ])
            .status()
            .context("running amixer cset")?;
        if !status.success() {
            anyhow::bail!("amixer cset exited with {}", status);
        }
        debug!(route, "switched audio route");
        Ok(())
    }
}

fn route_re() -> &'static Regex {
    static ROUTE_RE: OnceLock<Regex> = OnceLock::new();
    // Anchored on the value line (": values=N").  The control-description
    // line above it also says "values=", but that one is the channel count.
    ROUTE_RE.get_or_init(|| Regex::new(r":\s*values=(\d+)").expect("static regex"))
}

/// Extract the route index from amixer output.  Unknown shapes map to 0.
fn parse_route(output: &str) -> usize {
    match route_re()
        .captures(output)
        .and_then(|caps| caps[1].parse().ok())
    {
        Some(route) => route,
        None => {
            warn!("could not parse route from amixer output; assuming route 0");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AMIXER_CGET_OUTPUT: &str = "\
numid=3,iface=MIXER,name='PCM Playback Route'
  ; type=INTEGER,access=rw------,values=1,min=0,max=2,step=0
  : values=2
";

    #[test]
    fn test_parse_route_from_value_line() {
        assert_eq!(parse_route(": values=2"), 2);
        assert_eq!(parse_route(": values=0"), 0);
    }

    #[test]
    fn test_parse_route_skips_channel_count_line() {
        // The type line carries a "values=1" channel count; only the
        // ": values=2" line holds the actual route.
        assert_eq!(parse_route(AMIXER_CGET_OUTPUT), 2);
    }

    #[test]
    fn test_parse_route_garbage_defaults_to_zero() {
        assert_eq!(parse_route("no integers here"), 0);
        assert_eq!(parse_route(""), 0);
    }
}
