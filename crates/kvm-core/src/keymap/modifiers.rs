//! Native modifier state → [`KeyModifierMask`].
//!
//! X11 reports modifier state as eight bits (Shift, Lock, Control, Mod1–Mod5).
//! Only the first three have a fixed meaning; which of Mod1–Mod5 carries Alt,
//! Num Lock or AltGr depends on the server's modifier mapping.  A
//! [`ModifierMap`] is built from that mapping (the keysyms bound to each slot)
//! and answers "which logical modifiers does this state word contain?".

use super::key_id::KeyModifierMask;
use super::linux_x11::KeySym;

/// Number of X11 modifier slots.
pub const MODIFIER_SLOTS: usize = 8;

const XK_SHIFT_L: KeySym = 0xFFE1;
const XK_SHIFT_R: KeySym = 0xFFE2;
const XK_CONTROL_L: KeySym = 0xFFE3;
const XK_CONTROL_R: KeySym = 0xFFE4;
const XK_CAPS_LOCK: KeySym = 0xFFE5;
const XK_SHIFT_LOCK: KeySym = 0xFFE6;
const XK_META_L: KeySym = 0xFFE7;
const XK_META_R: KeySym = 0xFFE8;
const XK_ALT_L: KeySym = 0xFFE9;
const XK_ALT_R: KeySym = 0xFFEA;
const XK_SUPER_L: KeySym = 0xFFEB;
const XK_SUPER_R: KeySym = 0xFFEC;
const XK_HYPER_L: KeySym = 0xFFED;
const XK_HYPER_R: KeySym = 0xFFEE;
const XK_MODE_SWITCH: KeySym = 0xFF7E;
const XK_ISO_LEVEL3_SHIFT: KeySym = 0xFE03;
const XK_NUM_LOCK: KeySym = 0xFF7F;
const XK_SCROLL_LOCK: KeySym = 0xFF14;

/// Maps each of the eight native modifier bits to logical modifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifierMap {
    slots: [KeyModifierMask; MODIFIER_SLOTS],
}

impl Default for ModifierMap {
    /// The layout of a stock XFree86/Xorg keyboard: Mod1 = Alt, Mod2 = Num
    /// Lock, Mod4 = Super, Mod5 = AltGr.
    fn default() -> Self {
        Self {
            slots: [
                KeyModifierMask::SHIFT,
                KeyModifierMask::CAPS_LOCK,
                KeyModifierMask::CONTROL,
                KeyModifierMask::ALT,
                KeyModifierMask::NUM_LOCK,
                KeyModifierMask::empty(),
                KeyModifierMask::SUPER,
                KeyModifierMask::ALT_GR,
            ],
        }
    }
}

impl ModifierMap {
    /// Builds the map from the keysyms bound to each modifier slot.
    ///
    /// `slots[i]` lists the (unshifted) keysyms of every keycode assigned to
    /// modifier `i`.  Missing trailing slots are treated as empty.
    pub fn from_slot_keysyms(slots: &[Vec<KeySym>]) -> Self {
        let mut map = [KeyModifierMask::empty(); MODIFIER_SLOTS];
        for (slot, keysyms) in map.iter_mut().zip(slots) {
            *slot = keysyms
                .iter()
                .fold(KeyModifierMask::empty(), |mask, &sym| mask | mask_for_keysym(sym));
        }
        Self { slots: map }
    }

    /// Converts a native modifier state word to logical modifiers.
    ///
    /// Bits above the eight modifier slots (button state) are ignored.
    pub fn map_modifier(&self, state: u32) -> KeyModifierMask {
        self.slots
            .iter()
            .enumerate()
            .filter(|(bit, _)| state & (1 << bit) != 0)
            .fold(KeyModifierMask::empty(), |mask, (_, slot)| mask | *slot)
    }
}

fn mask_for_keysym(keysym: KeySym) -> KeyModifierMask {
    match keysym {
        XK_SHIFT_L | XK_SHIFT_R | XK_SHIFT_LOCK => KeyModifierMask::SHIFT,
        XK_CONTROL_L | XK_CONTROL_R => KeyModifierMask::CONTROL,
        XK_ALT_L | XK_ALT_R => KeyModifierMask::ALT,
        XK_META_L | XK_META_R => KeyModifierMask::META,
        XK_SUPER_L | XK_SUPER_R | XK_HYPER_L | XK_HYPER_R => KeyModifierMask::SUPER,
        XK_MODE_SWITCH | XK_ISO_LEVEL3_SHIFT => KeyModifierMask::ALT_GR,
        XK_CAPS_LOCK => KeyModifierMask::CAPS_LOCK,
        XK_NUM_LOCK => KeyModifierMask::NUM_LOCK,
        XK_SCROLL_LOCK => KeyModifierMask::SCROLL_LOCK,
        _ => KeyModifierMask::empty(),
    }
}
