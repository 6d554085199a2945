//! Display backends.
//!
//! [`XDisplay`] is the seam between the screen and Xlib: every request the
//! screen makes to the X server goes through it.  The real implementation
//! lives in [`xlib`]; [`mock`] records requests and replays a scripted
//! event queue for tests.
//!
//! # Threading (for beginners)
//!
//! An Xlib connection must not be used from two threads at once.  The
//! screen keeps its `Box<dyn XDisplay>` behind its main mutex, so calls are
//! serialized.  The one thing that happens *without* the lock is the
//! blocking wait for input; that is why waiting lives in a separate
//! [`EventWaiter`] that only watches the connection's file descriptor and
//! never touches the Xlib handle.

pub mod mock;

#[cfg(target_os = "linux")]
pub mod xlib;

use std::sync::Arc;
use std::time::Duration;

use kvm_core::{KeyButton, KeySym};

use crate::domain::collaborators::ScreenReceiver;
use crate::domain::event::{
    Atom, EventMask, GrabStatus, ImLookup, KeyEvent, MappingEvent, NativeEvent, PointerState,
    Rect, Time, WindowId,
};

/// One open connection to an X server.
pub trait XDisplay: Send {
    // ── Server and screen ─────────────────────────────────────────────────

    /// Whether the server supports the named extension (e.g. `"XTEST"`).
    fn query_extension(&mut self, name: &str) -> bool;
    fn root_window(&self) -> WindowId;
    /// Size of the default screen.
    fn screen_size(&self) -> (i32, i32);
    /// Physical screens when Xinerama is active, empty otherwise.
    fn xinerama_screens(&mut self) -> Vec<Rect>;
    fn intern_atom(&mut self, name: &str) -> Atom;

    // ── Windows ───────────────────────────────────────────────────────────

    /// Creates an unmapped, input-only, override-redirect window with an
    /// invisible cursor, selecting `mask`.
    fn create_input_window(&mut self, rect: Rect, mask: EventMask) -> Option<WindowId>;
    fn destroy_window(&mut self, window: WindowId);
    fn select_input(&mut self, window: WindowId, mask: EventMask);
    /// The mask this client currently selects on `window`.
    fn event_mask(&mut self, window: WindowId) -> EventMask;
    /// Children of `window`, or `None` if the window is gone.
    fn query_tree(&mut self, window: WindowId) -> Option<Vec<WindowId>>;
    fn move_window(&mut self, window: WindowId, x: i32, y: i32);
    fn map_raised(&mut self, window: WindowId);
    fn unmap_window(&mut self, window: WindowId);
    fn delete_property(&mut self, window: WindowId, property: Atom);
    /// A fresh server timestamp, obtained through a property change on
    /// `window`.
    fn server_time(&mut self, window: WindowId) -> Time;

    // ── Error suppression ─────────────────────────────────────────────────

    /// Starts ignoring protocol errors.  Traps nest.
    fn push_error_trap(&mut self);
    /// Synchronizes, discards errors raised since the matching push and
    /// restores the previous handler.
    fn pop_error_trap(&mut self);

    // ── Input method ──────────────────────────────────────────────────────

    /// Opens an input method and a context on `window`.  Returns the extra
    /// events the context needs selected, or `None` when no usable input
    /// method exists.
    fn open_input_method(&mut self, window: WindowId) -> Option<EventMask>;
    fn close_input_method(&mut self);
    fn has_input_context(&self) -> bool;
    fn set_ic_focus(&mut self, focused: bool);
    fn reset_ic(&mut self);
    /// Offers the event to the input method; true if it consumed it.
    fn filter_event(&mut self, event: &NativeEvent) -> bool;
    fn lookup_keysym(&mut self, event: &KeyEvent) -> KeySym;
    fn lookup_keysym_im(&mut self, event: &KeyEvent) -> ImLookup;

    // ── Keyboard and pointer ──────────────────────────────────────────────

    fn auto_repeat_enabled(&mut self) -> bool;
    fn set_auto_repeat(&mut self, enabled: bool);
    fn grab_keyboard(&mut self, window: WindowId) -> GrabStatus;
    /// Grabs the pointer, confined to `window`.
    fn grab_pointer(&mut self, window: WindowId) -> GrabStatus;
    fn ungrab_keyboard(&mut self);
    fn warp_pointer(&mut self, x: i32, y: i32);
    fn query_pointer(&mut self) -> Option<PointerState>;
    /// `XGetPointerMapping`: logical button per physical button.
    fn pointer_mapping(&mut self) -> Vec<u8>;
    /// Keysyms bound to each of the eight modifier slots.
    fn modifier_keysyms(&mut self) -> Vec<Vec<KeySym>>;
    fn refresh_keyboard_mapping(&mut self, event: &MappingEvent);
    /// Name of the unshifted keysym on `keycode`.
    fn keysym_name(&mut self, keycode: KeyButton) -> Option<String>;

    // ── Synthetic input ───────────────────────────────────────────────────

    fn fake_key(&mut self, keycode: KeyButton, press: bool);
    fn fake_button(&mut self, button: u32, press: bool);
    /// Absolute motion on the default screen.
    fn fake_motion(&mut self, x: i32, y: i32);
    /// Keeps synthetic input flowing while another client grabs the server.
    fn xtest_grab_control(&mut self, impervious: bool);

    // ── Event queue ───────────────────────────────────────────────────────

    /// Sends `event` to `window` with an empty propagation mask.
    fn send_event(&mut self, window: WindowId, event: &NativeEvent);
    fn flush(&mut self);
    fn sync(&mut self);
    /// Flushes and returns the number of queued events.
    fn pending(&mut self) -> usize;
    /// Dequeues the next event, or `None` when nothing is queued.
    fn next_event(&mut self) -> Option<NativeEvent>;
    /// The next queued event without removing it.
    fn peek_event(&mut self) -> Option<NativeEvent>;
    /// Dequeues the first queued event matching `predicate`, without
    /// blocking.
    fn check_if_event(
        &mut self,
        predicate: &mut dyn FnMut(&NativeEvent) -> bool,
    ) -> Option<NativeEvent>;
    /// Dequeues the first queued event selected by `mask`, without
    /// blocking.
    fn check_mask_event(&mut self, mask: EventMask) -> Option<NativeEvent>;
    /// Dequeues the first event selected by `mask`, waiting for one if
    /// needed.  `None` only when the backend can never produce one.
    fn mask_event(&mut self, mask: EventMask) -> Option<NativeEvent>;
}

/// Blocks the main loop until the display has input.
pub trait EventWaiter: Send + Sync {
    /// Returns when the connection is readable, `timeout` passes (`None`
    /// waits forever) or [`EventWaiter::wake`] is called.
    fn wait(&self, timeout: Option<Duration>);

    /// Interrupts a current or the next `wait`.
    fn wake(&self);
}

/// A freshly opened display and its waiter.
pub struct Connection {
    pub display: Box<dyn XDisplay>,
    pub waiter: Arc<dyn EventWaiter>,
}

/// Opens display connections.
pub trait DisplayConnector: Send + Sync {
    /// Connects to `name`.  `receiver` is told if the connection is later
    /// lost.  `None` if the server cannot be reached.
    fn connect(&self, name: &str, receiver: Arc<dyn ScreenReceiver>) -> Option<Connection>;
}

/// Runs `f` with protocol errors suppressed.
pub fn ignoring_errors<R>(
    display: &mut dyn XDisplay,
    f: impl FnOnce(&mut dyn XDisplay) -> R,
) -> R {
    display.push_error_trap();
    let result = f(&mut *display);
    display.pop_error_trap();
    result
}
