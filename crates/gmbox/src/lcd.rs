//! Seam over the character LCD plate (16x2 display + five buttons).
//!
//! The real plate is external hardware; when it is absent the program keeps
//! running against [`NoopLcd`], which swallows display calls and reports
//! every button as released.

use tracing::debug;

/// The five buttons on the plate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Select,
    Left,
    Right,
    Up,
    Down,
}

impl Button {
    pub const ALL: [Button; 5] = [
        Button::Select,
        Button::Left,
        Button::Right,
        Button::Up,
        Button::Down,
    ];
}

/// Display + button operations of the plate.
pub trait LcdPlate {
    fn clear(&mut self);
    fn message(&mut self, text: &str);
    /// Backlight color, each channel 0.0-1.0.
    fn set_color(&mut self, r: f32, g: f32, b: f32);
    fn is_pressed(&mut self, button: Button) -> bool;
}

/// Fallback used when no plate is detected.  Accepts everything, shows
/// nothing, never reports a press.
#[derive(Debug, Default)]
pub struct NoopLcd;

impl LcdPlate for NoopLcd {
    fn clear(&mut self) {
        debug!("lcd stub: clear");
    }

    fn message(&mut self, text: &str) {
        debug!("lcd stub: message {:?}", text);
    }

    fn set_color(&mut self, r: f32, g: f32, b: f32) {
        debug!("lcd stub: set_color {} {} {}", r, g, b);
    }

    fn is_pressed(&mut self, _button: Button) -> bool {
        false
    }
}
