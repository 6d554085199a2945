//! Symbolic key identifiers and modifier masks.
//!
//! A [`KeyId`] is the platform-independent name of a key as seen by the
//! receivers of captured input.  Printable keys use their Unicode code point
//! directly (`'a'` is `KeyId(0x61)`).  Non-printing keys live in the private
//! `0xE000`–`0xEFFF` block:
//!
//! | Block            | Contents                                         |
//! |------------------|--------------------------------------------------|
//! | `0xEF00–0xEFFF`  | Function/editing keys (X11 miscellany + 0xEF00)  |
//! | `0xEE00–0xEEFF`  | ISO 9995 keys (only left-tab is used)            |
//! | `0xE000–0xE0FF`  | Browser, media and application launch keys       |
//!
//! # Why reuse the X11 miscellany layout? (for beginners)
//!
//! X11 assigns its function and editing keys to keysyms `0xFF00`–`0xFFFF`
//! (`XK_Return` = `0xFF0D`, `XK_Left` = `0xFF51`, ...).  Shifting that whole
//! block down to `0xEF00` keeps the low byte identical, so the translation for
//! an entire range of keys is a single subtraction instead of a table.

use bitflags::bitflags;

/// Platform-independent key identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct KeyId(pub u32);

impl KeyId {
    /// No key / unmapped.
    pub const NONE: KeyId = KeyId(0x0000);

    // ── Editing and control keys ──────────────────────────────────────────────
    pub const BACKSPACE: KeyId = KeyId(0xEF08);
    pub const TAB: KeyId = KeyId(0xEF09);
    pub const LINEFEED: KeyId = KeyId(0xEF0A);
    pub const CLEAR: KeyId = KeyId(0xEF0B);
    pub const RETURN: KeyId = KeyId(0xEF0D);
    pub const PAUSE: KeyId = KeyId(0xEF13);
    pub const SCROLL_LOCK: KeyId = KeyId(0xEF14);
    pub const SYS_REQ: KeyId = KeyId(0xEF15);
    pub const ESCAPE: KeyId = KeyId(0xEF1B);
    pub const DELETE: KeyId = KeyId(0xEFFF);

    // ── Cursor control ────────────────────────────────────────────────────────
    pub const HOME: KeyId = KeyId(0xEF50);
    pub const LEFT: KeyId = KeyId(0xEF51);
    pub const UP: KeyId = KeyId(0xEF52);
    pub const RIGHT: KeyId = KeyId(0xEF53);
    pub const DOWN: KeyId = KeyId(0xEF54);
    pub const PAGE_UP: KeyId = KeyId(0xEF55);
    pub const PAGE_DOWN: KeyId = KeyId(0xEF56);
    pub const END: KeyId = KeyId(0xEF57);
    pub const BEGIN: KeyId = KeyId(0xEF58);

    // ── Misc functions ────────────────────────────────────────────────────────
    pub const SELECT: KeyId = KeyId(0xEF60);
    pub const PRINT: KeyId = KeyId(0xEF61);
    pub const EXECUTE: KeyId = KeyId(0xEF62);
    pub const INSERT: KeyId = KeyId(0xEF63);
    pub const UNDO: KeyId = KeyId(0xEF65);
    pub const REDO: KeyId = KeyId(0xEF66);
    pub const MENU: KeyId = KeyId(0xEF67);
    pub const FIND: KeyId = KeyId(0xEF68);
    pub const CANCEL: KeyId = KeyId(0xEF69);
    pub const HELP: KeyId = KeyId(0xEF6A);
    pub const BREAK: KeyId = KeyId(0xEF6B);
    pub const MODE_SWITCH: KeyId = KeyId(0xEF7E);
    pub const NUM_LOCK: KeyId = KeyId(0xEF7F);

    // ── Keypad ────────────────────────────────────────────────────────────────
    pub const KP_ENTER: KeyId = KeyId(0xEF8D);
    pub const KP_0: KeyId = KeyId(0xEFB0);
    pub const KP_9: KeyId = KeyId(0xEFB9);

    // ── Function keys ─────────────────────────────────────────────────────────
    pub const F1: KeyId = KeyId(0xEFBE);
    pub const F12: KeyId = KeyId(0xEFC9);

    // ── Modifiers ─────────────────────────────────────────────────────────────
    pub const SHIFT_L: KeyId = KeyId(0xEFE1);
    pub const SHIFT_R: KeyId = KeyId(0xEFE2);
    pub const CONTROL_L: KeyId = KeyId(0xEFE3);
    pub const CONTROL_R: KeyId = KeyId(0xEFE4);
    pub const CAPS_LOCK: KeyId = KeyId(0xEFE5);
    pub const SHIFT_LOCK: KeyId = KeyId(0xEFE6);
    pub const META_L: KeyId = KeyId(0xEFE7);
    pub const META_R: KeyId = KeyId(0xEFE8);
    pub const ALT_L: KeyId = KeyId(0xEFE9);
    pub const ALT_R: KeyId = KeyId(0xEFEA);
    pub const SUPER_L: KeyId = KeyId(0xEFEB);
    pub const SUPER_R: KeyId = KeyId(0xEFEC);
    pub const HYPER_L: KeyId = KeyId(0xEFED);
    pub const HYPER_R: KeyId = KeyId(0xEFEE);

    // ── ISO 9995 ──────────────────────────────────────────────────────────────
    pub const LEFT_TAB: KeyId = KeyId(0xEE20);

    // ── Browser, media and launch keys ────────────────────────────────────────
    pub const EJECT: KeyId = KeyId(0xE001);
    pub const SLEEP: KeyId = KeyId(0xE05F);
    pub const WWW_BACK: KeyId = KeyId(0xE0A6);
    pub const WWW_FORWARD: KeyId = KeyId(0xE0A7);
    pub const WWW_REFRESH: KeyId = KeyId(0xE0A8);
    pub const WWW_STOP: KeyId = KeyId(0xE0A9);
    pub const WWW_SEARCH: KeyId = KeyId(0xE0AA);
    pub const WWW_FAVORITES: KeyId = KeyId(0xE0AB);
    pub const WWW_HOME: KeyId = KeyId(0xE0AC);
    pub const AUDIO_MUTE: KeyId = KeyId(0xE0AD);
    pub const AUDIO_DOWN: KeyId = KeyId(0xE0AE);
    pub const AUDIO_UP: KeyId = KeyId(0xE0AF);
    pub const AUDIO_NEXT: KeyId = KeyId(0xE0B0);
    pub const AUDIO_PREV: KeyId = KeyId(0xE0B1);
    pub const AUDIO_STOP: KeyId = KeyId(0xE0B2);
    pub const AUDIO_PLAY: KeyId = KeyId(0xE0B3);
    pub const APP_MAIL: KeyId = KeyId(0xE0B4);
    pub const APP_MEDIA: KeyId = KeyId(0xE0B5);
    pub const APP_USER1: KeyId = KeyId(0xE0B6);
    pub const APP_USER2: KeyId = KeyId(0xE0B7);

    /// Returns `true` for [`KeyId::NONE`].
    pub fn is_none(self) -> bool {
        self == KeyId::NONE
    }
}

impl From<char> for KeyId {
    fn from(c: char) -> Self {
        KeyId(c as u32)
    }
}

bitflags! {
    /// Logical modifier state accompanying a key or button event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct KeyModifierMask: u32 {
        const SHIFT       = 0x0001;
        const CONTROL     = 0x0002;
        const ALT         = 0x0004;
        const META        = 0x0008;
        const SUPER       = 0x0010;
        const ALT_GR      = 0x0020;
        const CAPS_LOCK   = 0x1000;
        const NUM_LOCK    = 0x2000;
        const SCROLL_LOCK = 0x4000;
    }
}

impl KeyModifierMask {
    /// Both control and alt held: the chord that turns pause/break into delete.
    pub fn is_ctrl_alt(self) -> bool {
        self.contains(KeyModifierMask::CONTROL | KeyModifierMask::ALT)
    }
}

/// Raw (native) key code reported by the display server.
pub type KeyButton = u32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_id_from_char_uses_code_point() {
        assert_eq!(KeyId::from('a'), KeyId(0x61));
        assert_eq!(KeyId::from('\u{00e9}'), KeyId(0xe9));
    }

    #[test]
    fn test_ctrl_alt_requires_both_modifiers() {
        assert!((KeyModifierMask::CONTROL | KeyModifierMask::ALT).is_ctrl_alt());
        assert!((KeyModifierMask::CONTROL | KeyModifierMask::ALT | KeyModifierMask::SHIFT)
            .is_ctrl_alt());
        assert!(!KeyModifierMask::CONTROL.is_ctrl_alt());
        assert!(!KeyModifierMask::ALT.is_ctrl_alt());
    }
}
