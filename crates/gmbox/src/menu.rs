//! LCD menu navigator.
//!
//! A flat, circular list of items behind the plate's five buttons.  Up/Down
//! move the cursor, Left/Right/Select are delegated to the active item, and
//! the two-line display is redrawn after every interaction.  Items that do
//! not support a direction report [`ItemOutcome::Unsupported`] and the
//! navigator answers with a short red backlight flash instead of failing.

use std::time::Duration;

use tracing::{debug, error, warn};

use crate::lcd::{Button, LcdPlate};
use crate::route::{RouteControl, ROUTE_LABELS};

/// How long the backlight stays red after an unsupported button.
const FLASH: Duration = Duration::from_millis(200);

/// How often a held button is re-checked while waiting for release.
const RELEASE_POLL: Duration = Duration::from_millis(5);

/// Result of delegating a button to a menu item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Done,
    /// The item has no behavior for this button.
    Unsupported,
}

/// One entry in the menu.  The navigator owns the display; items only
/// produce text and react to buttons.  `Send` because the menu loop runs on
/// its own blocking task.
pub trait MenuItem: Send {
    /// First display line.
    fn name(&self) -> &str;
    /// Second display line, re-rendered on every refresh.
    fn active_text(&self) -> String;
    fn select(&mut self) -> ItemOutcome;
    fn move_left(&mut self) -> ItemOutcome;
    fn move_right(&mut self) -> ItemOutcome;
}

pub struct LcdMenu<L: LcdPlate> {
    lcd: L,
    items: Vec<Box<dyn MenuItem>>,
    /// Always in `[0, items.len())` while the list is non-empty.
    active_idx: usize,
}

impl<L: LcdPlate> LcdMenu<L> {
    pub fn new(lcd: L) -> Self {
        Self {
            lcd,
            items: Vec::new(),
            active_idx: 0,
        }
    }

    pub fn add_item(&mut self, item: Box<dyn MenuItem>) {
        self.items.push(item);
    }

    pub fn active_item(&self) -> Option<&dyn MenuItem> {
        self.items.get(self.active_idx).map(|i| i.as_ref())
    }

    /// Handle one button press to completion, then redraw.
    pub fn dispatch(&mut self, button: Button) {
        if self.items.is_empty() {
            warn!("menu has no items; ignoring {:?}", button);
            return;
        }
        debug!("menu button {:?}", button);
        let len = self.items.len();
        match button {
            Button::Down => self.active_idx = (self.active_idx + 1) % len,
            Button::Up => self.active_idx = (self.active_idx + len - 1) % len,
            Button::Select => {
                let outcome = self.items[self.active_idx].select();
                self.react(outcome);
            }
            Button::Left => {
                let outcome = self.items[self.active_idx].move_left();
                self.react(outcome);
            }
            Button::Right => {
                let outcome = self.items[self.active_idx].move_right();
                self.react(outcome);
            }
        }
        self.refresh();
    }

    /// Redraw both display lines from the active item.
    pub fn refresh(&mut self) {
        let Some(item) = self.items.get(self.active_idx) else {
            return;
        };
        let text = format!("{}\n{}", item.name(), item.active_text());
        self.lcd.clear();
        self.lcd.message(&text);
    }

    fn react(&mut self, outcome: ItemOutcome) {
        if outcome == ItemOutcome::Unsupported {
            self.lcd.set_color(1.0, 0.0, 0.0);
            std::thread::sleep(FLASH);
            self.lcd.set_color(1.0, 1.0, 1.0);
        }
    }

    /// Poll the plate's buttons forever.  Each detected press is dispatched
    /// to completion, then we block until the button is physically released
    /// before polling resumes (debounce-by-blocking).
    pub fn run(mut self, poll_interval: Duration) {
        loop {
            for button in Button::ALL {
                if self.lcd.is_pressed(button) {
                    self.dispatch(button);
                    while self.lcd.is_pressed(button) {
                        std::thread::sleep(RELEASE_POLL);
                    }
                }
            }
            std::thread::sleep(poll_interval);
        }
    }
}

// ── items ─────────────────────────────────────────────────────────────────────

/// Static boot screen.  Read-only: every interaction is unsupported.
pub struct Greeting {
    name: String,
    text: String,
}

impl Greeting {
    pub fn new() -> Self {
        Self {
            name: "gmbox".to_string(),
            text: "Ready to roll".to_string(),
        }
    }
}

impl Default for Greeting {
    fn default() -> Self {
        Self::new()
    }
}

impl MenuItem for Greeting {
    fn name(&self) -> &str {
        &self.name
    }

    fn active_text(&self) -> String {
        self.text.clone()
    }

    fn select(&mut self) -> ItemOutcome {
        ItemOutcome::Unsupported
    }

    fn move_left(&mut self) -> ItemOutcome {
        ItemOutcome::Unsupported
    }

    fn move_right(&mut self) -> ItemOutcome {
        ItemOutcome::Unsupported
    }
}

/// Audio-output selector.  Left/Right cycle a locally-highlighted route;
/// Select commits it through the routing utility.  The highlighted label is
/// marked with `*` when it matches the live system route.
pub struct AudioOutput<R: RouteControl> {
    routes: R,
    highlighted: usize,
}

impl<R: RouteControl> AudioOutput<R> {
    pub fn new(routes: R) -> Self {
        // Start the highlight on the actual route when it can be read.
        let highlighted = match routes.active_route() {
            Ok(route) if route < ROUTE_LABELS.len() => route,
            Ok(route) => {
                warn!("active route {} outside known table; highlighting 0", route);
                0
            }
            Err(err) => {
                warn!("could not read active route: {:#}", err);
                0
            }
        };
        Self {
            routes,
            highlighted,
        }
    }
}

impl<R: RouteControl> MenuItem for AudioOutput<R> {
    fn name(&self) -> &str {
        "Audio Output"
    }

    fn active_text(&self) -> String {
        let label = ROUTE_LABELS[self.highlighted];
        let is_active = match self.routes.active_route() {
            Ok(route) => route == self.highlighted,
            Err(err) => {
                warn!("could not read active route: {:#}", err);
                false
            }
        };
        if is_active {
            format!("{} *", label)
        } else {
            label.to_string()
        }
    }

    fn select(&mut self) -> ItemOutcome {
        if let Err(err) = self.routes.set_route(self.highlighted) {
            error!(
                "failed to switch audio route to {}: {:#}",
                ROUTE_LABELS[self.highlighted], err
            );
        }
        ItemOutcome::Done
    }

    fn move_left(&mut self) -> ItemOutcome {
        self.highlighted = (self.highlighted + ROUTE_LABELS.len() - 1) % ROUTE_LABELS.len();
        ItemOutcome::Done
    }

    fn move_right(&mut self) -> ItemOutcome {
        self.highlighted = (self.highlighted + 1) % ROUTE_LABELS.len();
        ItemOutcome::Done
    }
}
