//! Key identifiers and the X11 keysym translation tables.
//!
//! The canonical representation of a key is a [`KeyId`]: the Unicode code
//! point for printable keys, a private-use value for everything else.  Native
//! keysyms are translated at the capture boundary by [`key_from_keysym`].

pub mod key_id;
pub mod linux_x11;
pub mod modifiers;
pub mod ucs4;

pub use key_id::{KeyButton, KeyId, KeyModifierMask};
pub use linux_x11::KeySym;
pub use modifiers::ModifierMap;

/// Translates an X11 keysym to a [`KeyId`].
///
/// Pure: the same keysym always yields the same key.  Returns
/// [`KeyId::NONE`] for keysyms with no symbolic equivalent.
pub fn key_from_keysym(keysym: KeySym) -> KeyId {
    linux_x11::keysym_to_key_id(keysym)
}
