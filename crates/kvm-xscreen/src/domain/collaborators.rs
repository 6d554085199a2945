//! Collaborators the screen talks to but does not implement.
//!
//! The logical key-state tables, the clipboard data model, the screensaver
//! controller, timer jobs and the consumers of decoded input all live
//! outside this crate.  The screen reaches them only through the traits
//! below, which keeps the dispatcher and the capture engine testable with
//! mocks.
//!
//! Except for [`Job::run`] and
//! [`PrimaryScreenReceiver::on_one_shot_timer_expired`], every method here is
//! called with the screen's main lock held, so implementations must not
//! call back into the [`Screen`](crate::application::screen::Screen).

use std::time::Duration;

use kvm_core::{ButtonId, ClipboardId, KeyButton, KeyId, KeyModifierMask};

use super::event::{Atom, NativeEvent, Time, WindowId};

/// Logical keyboard state owned by the caller.
pub trait KeyState: Send {
    /// Modifier bits the raw key toggles or holds, empty for ordinary keys.
    fn mask_for_key(&self, keycode: KeyButton) -> KeyModifierMask;

    /// Whether keys for `mask` only report presses (caps lock on some
    /// servers), so a release must be synthesized right after the press.
    fn is_half_duplex(&self, mask: KeyModifierMask) -> bool;

    /// Rebuilds the tables after the server's keyboard mapping changed.
    fn update_keys(&mut self);
}

/// Notifications every screen sends, whatever its role.
pub trait ScreenReceiver: Send + Sync {
    /// The display connection is gone; the process is about to exit.
    fn on_error(&self);

    /// Another client took ownership of the clipboard `id`.
    fn on_grab_clipboard(&self, id: ClipboardId);
}

/// Input captured by a primary screen.
pub trait PrimaryScreenReceiver: Send + Sync {
    fn on_key_down(&self, key: KeyId, mask: KeyModifierMask, button: KeyButton);
    fn on_key_up(&self, key: KeyId, mask: KeyModifierMask, button: KeyButton);
    fn on_key_repeat(&self, key: KeyId, mask: KeyModifierMask, count: i32, button: KeyButton);
    fn on_mouse_down(&self, button: ButtonId);
    fn on_mouse_up(&self, button: ButtonId);
    /// Absolute position while the pointer is on this screen.
    fn on_mouse_move_primary(&self, x: i32, y: i32);
    /// Relative motion while the pointer is parked off-screen.
    fn on_mouse_move_secondary(&self, dx: i32, dy: i32);
    /// Signed wheel motion, 120 per notch, positive away from the user.
    fn on_mouse_wheel(&self, delta: i32);
    fn on_screensaver(&self, activated: bool);
    /// Called with no screen lock held.
    fn on_one_shot_timer_expired(&self, id: u32);
}

/// One X selection (`CLIPBOARD` or `PRIMARY`) owned through a window.
pub trait ClipboardSlot: Send {
    /// Claims the selection as of `time`; false if the server refused.
    fn open(&mut self, time: Time) -> bool;
    fn empty(&mut self);
    fn close(&mut self);
    /// Another client took the selection at `time`.
    fn lost(&mut self, time: Time);
    fn add_request(
        &mut self,
        owner: WindowId,
        requestor: WindowId,
        target: Atom,
        time: Time,
        property: Atom,
    );
    /// Continues an incremental transfer; true if `requestor` was ours.
    fn process_request(&mut self, requestor: WindowId, time: Time, property: Atom) -> bool;
    /// Drops transfers to a destroyed window; true if any existed.
    fn destroy_request(&mut self, requestor: WindowId) -> bool;
    /// The selection atom this slot serves.
    fn selection(&self) -> Atom;
    /// The window that owns the selection.
    fn window(&self) -> WindowId;
}

/// Caller-supplied clipboard contents for [`set_clipboard`].
///
/// [`set_clipboard`]: crate::application::screen::Screen::set_clipboard
pub trait ClipboardSource {
    /// Copies the contents into `slot` as of `time`.
    fn copy_into(&self, slot: &mut dyn ClipboardSlot, time: Time) -> bool;
}

/// Receives a screen clipboard in [`get_clipboard`].
///
/// [`get_clipboard`]: crate::application::screen::Screen::get_clipboard
pub trait ClipboardSink {
    /// Copies the contents of `slot` as of `time`.
    fn copy_from(&mut self, slot: &mut dyn ClipboardSlot, time: Time) -> bool;
}

/// The local screensaver controller.
pub trait ScreenSaver: Send {
    /// Sends activation messages to `window`, or stops when `None`.
    fn set_notify(&mut self, window: Option<WindowId>);
    fn enable(&mut self);
    fn disable(&mut self);
    fn activate(&mut self);
    fn deactivate(&mut self);
    /// Sees every event the dispatcher did not consume; true if handled.
    fn on_pre_dispatch(&mut self, event: &NativeEvent) -> bool;
}

/// Work scheduled on the screen's timer queue.
pub trait Job: Send + Sync {
    /// Runs with no screen lock held.
    fn run(&self);
}

/// Builds the per-screen subsystems while the screen opens.
pub trait SubsystemFactory: Send + Sync {
    fn create_clipboard(
        &self,
        id: ClipboardId,
        window: WindowId,
        selection: Atom,
    ) -> Box<dyn ClipboardSlot>;

    fn create_screensaver(&self, window: WindowId) -> Box<dyn ScreenSaver>;
}

/// How long to wait before retrying a display that could not be opened.
pub const UNAVAILABLE_RETRY: Duration = Duration::from_secs(60);
