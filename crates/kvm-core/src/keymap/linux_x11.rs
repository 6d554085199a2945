//! X11 KeySym to [`KeyId`] translation.
//!
//! X11 keysym values are defined in X11/keysymdef.h and X11/XF86keysym.h.
//! Reference: https://gitlab.freedesktop.org/xorg/proto/xorgproto/-/blob/master/include/X11/keysymdef.h
//!
//! # How a keysym is classified (for beginners)
//!
//! The translation looks at the keysym with its low byte masked off and picks
//! one of five strategies:
//!
//! | Masked keysym  | Range                   | Strategy                           |
//! |----------------|-------------------------|------------------------------------|
//! | `0x0000_0000`  | Latin-1                 | pass through (keysym == code point)|
//! | `0x0000_FE00`  | ISO 9995 function keys  | only `ISO_Left_Tab` is mapped      |
//! | `0x0000_FF00`  | Miscellany              | shift down to `0xEF00`             |
//! | `0x1008_FF00`  | XFree86 "Internet" keys | 256-entry lookup table             |
//! | anything else  | legacy charsets, Unicode| keysym → UCS-4 table               |
//!
//! The first four cover every key on a typical keyboard without a lookup; the
//! table search is only needed for non-Latin layouts.

use super::key_id::KeyId;
use super::ucs4::{keysym_to_ucs4, UCS4_INVALID};

/// X11 keysym value.
pub type KeySym = u32;

/// `XK_ISO_Left_Tab`, produced by shift+tab on most layouts.
pub const XK_ISO_LEFT_TAB: KeySym = 0xFE20;

const RANGE_MASK: KeySym = 0xFFFF_FF00;
const RANGE_LATIN1: KeySym = 0x0000_0000;
const RANGE_ISO9995: KeySym = 0x0000_FE00;
const RANGE_MISCELLANY: KeySym = 0x0000_FF00;
const RANGE_INTERNET: KeySym = 0x1008_FF00;

/// Offset applied to miscellany keysyms (`0xFFxx` → `0xEFxx`).
const MISCELLANY_BASE: u32 = 0xEF00;

/// Maps the low byte of XFree86 "Internet" keysyms (`0x1008FFxx`) to key ids.
/// Most entries are unmapped.
static INTERNET_KEYS: [KeyId; 256] = internet_key_table();

const fn internet_key_table() -> [KeyId; 256] {
    let mut table = [KeyId::NONE; 256];
    table[0x11] = KeyId::AUDIO_DOWN; // XF86AudioLowerVolume
    table[0x12] = KeyId::AUDIO_MUTE; // XF86AudioMute
    table[0x13] = KeyId::AUDIO_UP; // XF86AudioRaiseVolume
    table[0x14] = KeyId::AUDIO_PLAY; // XF86AudioPlay
    table[0x15] = KeyId::AUDIO_STOP; // XF86AudioStop
    table[0x16] = KeyId::AUDIO_PREV; // XF86AudioPrev
    table[0x17] = KeyId::AUDIO_NEXT; // XF86AudioNext
    table[0x18] = KeyId::WWW_HOME; // XF86HomePage
    table[0x19] = KeyId::APP_MAIL; // XF86Mail
    table[0x1B] = KeyId::WWW_SEARCH; // XF86Search
    table[0x26] = KeyId::WWW_BACK; // XF86Back
    table[0x27] = KeyId::WWW_FORWARD; // XF86Forward
    table[0x28] = KeyId::WWW_STOP; // XF86Stop
    table[0x29] = KeyId::WWW_REFRESH; // XF86Refresh
    table[0x30] = KeyId::WWW_FAVORITES; // XF86Favorites
    table[0x32] = KeyId::APP_MEDIA; // XF86AudioMedia
    table[0x40] = KeyId::APP_USER1; // XF86Launch0
    table[0x41] = KeyId::APP_USER2; // XF86Launch1
    table
}

/// Translates an X11 keysym to a [`KeyId`].
///
/// Returns [`KeyId::NONE`] if the keysym has no symbolic equivalent.
///
/// # Panics
///
/// This function never panics.
pub fn keysym_to_key_id(keysym: KeySym) -> KeyId {
    match keysym & RANGE_MASK {
        RANGE_LATIN1 => KeyId(keysym),
        RANGE_ISO9995 => {
            if keysym == XK_ISO_LEFT_TAB {
                KeyId::LEFT_TAB
            } else {
                KeyId::NONE
            }
        }
        RANGE_MISCELLANY => KeyId(keysym - RANGE_MISCELLANY + MISCELLANY_BASE),
        RANGE_INTERNET => INTERNET_KEYS[(keysym & 0xFF) as usize],
        _ => match keysym_to_ucs4(keysym) {
            UCS4_INVALID => KeyId::NONE,
            ucs => KeyId(ucs),
        },
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin1_keysyms_pass_through() {
        assert_eq!(keysym_to_key_id(0x0061), KeyId::from('a'));
        assert_eq!(keysym_to_key_id(0x0041), KeyId::from('A'));
        assert_eq!(keysym_to_key_id(0x00E9), KeyId(0xE9));
    }

    #[test]
    fn test_keysym_zero_maps_to_none() {
        assert_eq!(keysym_to_key_id(0), KeyId::NONE);
    }

    #[test]
    fn test_iso_left_tab_is_the_only_mapped_iso_key() {
        assert_eq!(keysym_to_key_id(XK_ISO_LEFT_TAB), KeyId::LEFT_TAB);
        // XK_ISO_Level3_Shift
        assert_eq!(keysym_to_key_id(0xFE03), KeyId::NONE);
    }

    #[test]
    fn test_miscellany_keysyms_shift_to_ef_block() {
        assert_eq!(keysym_to_key_id(0xFF0D), KeyId::RETURN); // XK_Return
        assert_eq!(keysym_to_key_id(0xFF13), KeyId::PAUSE); // XK_Pause
        assert_eq!(keysym_to_key_id(0xFF6B), KeyId::BREAK); // XK_Break
        assert_eq!(keysym_to_key_id(0xFFFF), KeyId::DELETE); // XK_Delete
        assert_eq!(keysym_to_key_id(0xFFBE), KeyId::F1); // XK_F1
        assert_eq!(keysym_to_key_id(0xFFE1), KeyId::SHIFT_L); // XK_Shift_L
    }

    #[test]
    fn test_internet_keys_use_lookup_table() {
        assert_eq!(keysym_to_key_id(0x1008_FF12), KeyId::AUDIO_MUTE);
        assert_eq!(keysym_to_key_id(0x1008_FF26), KeyId::WWW_BACK);
        assert_eq!(keysym_to_key_id(0x1008_FF41), KeyId::APP_USER2);
    }

    #[test]
    fn test_unmapped_internet_keys_return_none() {
        assert_eq!(keysym_to_key_id(0x1008_FF00), KeyId::NONE);
        assert_eq!(keysym_to_key_id(0x1008_FFFF), KeyId::NONE);
    }

    #[test]
    fn test_internet_table_has_exactly_eighteen_entries() {
        let mapped = INTERNET_KEYS.iter().filter(|k| !k.is_none()).count();
        assert_eq!(mapped, 18);
    }

    #[test]
    fn test_legacy_charset_keysym_uses_ucs4_table() {
        // XK_Cyrillic_a
        assert_eq!(keysym_to_key_id(0x06C1), KeyId(0x0430));
    }

    #[test]
    fn test_unknown_keysym_returns_none() {
        assert_eq!(keysym_to_key_id(0x0000_0F12), KeyId::NONE);
    }

    #[test]
    fn test_translation_is_deterministic() {
        for keysym in [0x61, 0xFF0D, 0x1008_FF14, 0x06C1, 0xFE20, 0xABCD_EF01] {
            assert_eq!(keysym_to_key_id(keysym), keysym_to_key_id(keysym));
        }
    }
}
