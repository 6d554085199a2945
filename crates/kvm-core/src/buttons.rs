//! Pointer button identifiers and the logical → physical button table.
//!
//! # Why buttons 4 and 5 are special (for beginners)
//!
//! X11 has no scroll-wheel event.  A wheel notch arrives as a press/release
//! of button 4 (away from the user) or 5 (towards the user).  The symbolic
//! [`ButtonId`] space therefore skips them: native buttons 1–3 keep their
//! number, native 6, 7, ... become symbolic 4, 5, ..., and the wheel is
//! expressed through the two virtual buttons [`ButtonId::WHEEL_FORWARD`]
//! (−1) and [`ButtonId::WHEEL_BACKWARD`] (−2).
//!
//! The server may also remap buttons (left-handed mice swap 1 and 3), so
//! injection goes through a [`ButtonMap`] built from the server's pointer
//! mapping.

/// Symbolic pointer button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ButtonId(pub u8);

impl ButtonId {
    pub const NONE: ButtonId = ButtonId(0);
    pub const LEFT: ButtonId = ButtonId(1);
    pub const MIDDLE: ButtonId = ButtonId(2);
    pub const RIGHT: ButtonId = ButtonId(3);
    /// Virtual button −1: one wheel notch away from the user.
    pub const WHEEL_FORWARD: ButtonId = ButtonId(u8::MAX);
    /// Virtual button −2: one wheel notch towards the user.
    pub const WHEEL_BACKWARD: ButtonId = ButtonId(u8::MAX - 1);

    pub fn is_none(self) -> bool {
        self == ButtonId::NONE
    }
}

/// Native button that scrolls away from the user.
pub const X_WHEEL_FORWARD: u32 = 4;
/// Native button that scrolls towards the user.
pub const X_WHEEL_BACKWARD: u32 = 5;

/// Maps a native button number to a [`ButtonId`].
///
/// Buttons 4 and 5 are wheel-only at this layer and map to
/// [`ButtonId::NONE`], as does 0.
pub fn button_from_x(button: u32) -> ButtonId {
    match button {
        1..=3 => ButtonId(button as u8),
        6..=255 => ButtonId((button - 2) as u8),
        _ => ButtonId::NONE,
    }
}

/// Logical → physical button table.
///
/// `buttons[logical - 1]` is the physical button that produces `logical`.
/// A zero entry means no physical button is mapped to that logical number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ButtonMap {
    buttons: Vec<u32>,
}

impl ButtonMap {
    /// Builds the table from the server's pointer mapping.
    ///
    /// `mapping[i]` is the logical button produced by physical button
    /// `i + 1`, exactly as returned by `XGetPointerMapping`.  The table is
    /// sized to the largest logical button in `mapping`.  Zero entries
    /// (disabled buttons) are skipped.
    pub fn from_pointer_mapping(mapping: &[u8]) -> Self {
        let size = mapping.iter().copied().max().unwrap_or(0) as usize;
        let mut buttons = vec![0u32; size];
        for (physical, &logical) in mapping.iter().enumerate() {
            if logical != 0 {
                buttons[logical as usize - 1] = physical as u32 + 1;
            }
        }
        Self { buttons }
    }

    /// Identity table for `count` buttons.
    pub fn identity(count: u8) -> Self {
        let mapping: Vec<u8> = (1..=count).collect();
        Self::from_pointer_mapping(&mapping)
    }

    /// Number of logical buttons in the table.
    pub fn len(&self) -> usize {
        self.buttons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buttons.is_empty()
    }

    /// Maps a [`ButtonId`] to the physical button to inject, or 0 when the
    /// button is out of range or unmapped.
    pub fn to_x(&self, button: ButtonId) -> u32 {
        let logical = match button {
            ButtonId::WHEEL_FORWARD => X_WHEEL_FORWARD,
            ButtonId::WHEEL_BACKWARD => X_WHEEL_BACKWARD,
            ButtonId(id) if id >= 4 => u32::from(id) + 2,
            ButtonId(id) => u32::from(id),
        };

        if logical < 1 || logical as usize > self.buttons.len() {
            return 0;
        }
        self.buttons[logical as usize - 1]
    }
}
