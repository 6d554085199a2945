//! # kvm-core
//!
//! Platform-independent services used by the X11 screen backend: key and
//! button identifiers, the keysym translation tables, the modifier and
//! button maps, clipboard/option identifiers and the software timer queue.
//!
//! This crate has no dependencies on a display server.  Everything in it is a
//! pure function or a plain data structure, so it can be tested anywhere.
//!
//! # Architecture overview (for beginners)
//!
//! A KVM screen sits between a windowing system and the rest of the switch.
//! When it is the *primary* screen it captures real keyboard and mouse input;
//! when it is a *secondary* screen it replays input it is given.  Either way
//! the rest of the switch talks in platform-neutral terms:
//!
//! - **`keymap`** – [`KeyId`] and [`KeyModifierMask`] plus the tables that
//!   translate X11 keysyms into them.
//!
//! - **`buttons`** – [`ButtonId`], the native ↔ symbolic button mapping and
//!   the logical → physical [`ButtonMap`].
//!
//! - **`domain`** – [`ClipboardId`] and the screen option codes.
//!
//! - **`timer`** – [`TimerQueue`], the periodic and one-shot timers the
//!   screen's main loop multiplexes with its event stream.

pub mod buttons;
pub mod domain;
pub mod keymap;
pub mod timer;

// Re-export the most-used types at the crate root so callers can write
// `kvm_core::KeyId` instead of `kvm_core::keymap::key_id::KeyId`.
pub use buttons::{button_from_x, ButtonId, ButtonMap};
pub use domain::{ClipboardId, OptionsList, OPTION_XTEST_XINERAMA_UNAWARE};
pub use keymap::{key_from_keysym, KeyButton, KeyId, KeyModifierMask, KeySym, ModifierMap};
pub use timer::{
    Clock, JobHandle, ManualClock, Stopwatch, TimerBatch, TimerQueue, ONE_SHOT_TIMER_ID,
};
