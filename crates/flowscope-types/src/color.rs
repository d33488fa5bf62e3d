//! RGB values and the four-aspect signal color.
//!
//! Signal systems report their display state as one character per
//! controlled index. Only four aspects are distinguished for rendering:
//! priority green, permissive green, yellow, and red. The mapping from
//! state character to aspect and from aspect to display color are both
//! pure lookups with no behavior attached.

use serde::{Deserialize, Serialize};

/// An opaque RGB color triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    /// Red channel (0-255).
    pub r: u8,
    /// Green channel (0-255).
    pub g: u8,
    /// Blue channel (0-255).
    pub b: u8,
}

impl Rgb {
    /// Create a color from its channels.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Display aspect of one controlled signal index.
///
/// Derived from the engine's single-character state code: `'G'` is a
/// priority (protected) green, `'g'` a permissive green, `'y'` yellow,
/// and every other code renders as red.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalColor {
    /// Protected green phase (`'G'`).
    FullGreen,
    /// Permissive green phase (`'g'`).
    Green,
    /// Yellow / amber phase (`'y'`).
    Yellow,
    /// Red or any unrecognized state code.
    Red,
}

impl SignalColor {
    /// Map an engine state character to a display aspect.
    pub const fn from_state_code(code: char) -> Self {
        match code {
            'G' => Self::FullGreen,
            'g' => Self::Green,
            'y' => Self::Yellow,
            _ => Self::Red,
        }
    }

    /// The RGB color used to render this aspect.
    pub const fn rgb(self) -> Rgb {
        match self {
            Self::FullGreen => Rgb::new(3, 255, 0),
            Self::Green => Rgb::new(2, 179, 2),
            Self::Yellow => Rgb::new(255, 255, 0),
            Self::Red => Rgb::new(255, 0, 0),
        }
    }
}
