//! kvm-xscreen library entry point.
//!
//! An X11 screen for a software KVM switch.  As the *primary* it captures
//! the local keyboard and mouse and reports them to a
//! [`PrimaryScreenReceiver`]; as a *secondary* it replays input it is handed
//! through XTest.  Either way it serves the X clipboards, drives the
//! screensaver and multiplexes timers with its event stream.
//!
//! # Layers (for beginners)
//!
//! - **`domain`** – native event types, the error enum and the traits of
//!   the collaborators the screen calls but does not implement.
//! - **`application`** – the [`Screen`] and its main loop.
//! - **`infrastructure`** – the Xlib backend behind the
//!   [`XDisplay`](infrastructure::display::XDisplay) trait, configuration
//!   and fatal-error handling.
//!
//! Integration tests in `tests/` drive a [`Screen`] against the in-memory
//! [`MockServer`](infrastructure::display::mock::MockServer).

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::main_loop::CancelToken;
pub use application::screen::{Screen, ScreenParts};
pub use domain::collaborators::{
    ClipboardSink, ClipboardSlot, ClipboardSource, Job, KeyState, PrimaryScreenReceiver,
    ScreenReceiver, ScreenSaver, SubsystemFactory,
};
pub use domain::{ScreenError, ScreenRole};
