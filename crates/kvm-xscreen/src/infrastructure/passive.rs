//! Stand-in collaborators for running a screen on its own.
//!
//! The binary has no switch to report to, so it logs what a switch would
//! receive, keeps clipboard ownership as bookkeeping only, and leaves the
//! local screensaver alone.  Each piece can be swapped for a real
//! implementation through the traits in
//! [`collaborators`](crate::domain::collaborators).

use std::collections::HashMap;

use kvm_core::{ButtonId, ClipboardId, KeyButton, KeyId, KeyModifierMask};
use tracing::{debug, error, info, trace};

use crate::domain::collaborators::{
    ClipboardSlot, KeyState, PrimaryScreenReceiver, ScreenReceiver, ScreenSaver,
    SubsystemFactory,
};
use crate::domain::event::{Atom, NativeEvent, Time, WindowId};

// ── Receivers ─────────────────────────────────────────────────────────────────

/// Logs every notification at `info` (screen-level) or `debug` (input).
#[derive(Debug, Default)]
pub struct LoggingReceiver;

impl ScreenReceiver for LoggingReceiver {
    fn on_error(&self) {
        error!("screen reported a fatal display error");
    }

    fn on_grab_clipboard(&self, id: ClipboardId) {
        info!(%id, "clipboard taken by another client");
    }
}

impl PrimaryScreenReceiver for LoggingReceiver {
    fn on_key_down(&self, key: KeyId, mask: KeyModifierMask, button: KeyButton) {
        debug!("key down id=0x{:04x} mask={mask:?} button={button}", key.0);
    }

    fn on_key_up(&self, key: KeyId, mask: KeyModifierMask, button: KeyButton) {
        debug!("key up id=0x{:04x} mask={mask:?} button={button}", key.0);
    }

    fn on_key_repeat(&self, key: KeyId, mask: KeyModifierMask, count: i32, button: KeyButton) {
        debug!("key repeat id=0x{:04x} mask={mask:?} count={count} button={button}", key.0);
    }

    fn on_mouse_down(&self, button: ButtonId) {
        debug!(button = button.0, "mouse down");
    }

    fn on_mouse_up(&self, button: ButtonId) {
        debug!(button = button.0, "mouse up");
    }

    fn on_mouse_move_primary(&self, x: i32, y: i32) {
        trace!(x, y, "mouse move");
    }

    fn on_mouse_move_secondary(&self, dx: i32, dy: i32) {
        trace!(dx, dy, "relative mouse move");
    }

    fn on_mouse_wheel(&self, delta: i32) {
        debug!(delta, "mouse wheel");
    }

    fn on_screensaver(&self, activated: bool) {
        info!(activated, "screensaver");
    }

    fn on_one_shot_timer_expired(&self, id: u32) {
        debug!(id, "one-shot timer expired");
    }
}

// ── Key state ─────────────────────────────────────────────────────────────────

/// Key state that knows only which raw keys drive modifiers.
///
/// Keys whose mask intersects the half-duplex set report only presses and
/// get a synthesized release.
#[derive(Debug, Clone)]
pub struct LockKeyState {
    modifier_keys: HashMap<KeyButton, KeyModifierMask>,
    half_duplex: KeyModifierMask,
}

impl LockKeyState {
    /// No modifier keys; the three lock modifiers are half-duplex.
    pub fn new() -> Self {
        Self {
            modifier_keys: HashMap::new(),
            half_duplex: KeyModifierMask::CAPS_LOCK
                | KeyModifierMask::NUM_LOCK
                | KeyModifierMask::SCROLL_LOCK,
        }
    }

    /// Modifier keys at their usual evdev keycodes.
    pub fn evdev() -> Self {
        Self::new()
            .with_key(37, KeyModifierMask::CONTROL)
            .with_key(105, KeyModifierMask::CONTROL)
            .with_key(50, KeyModifierMask::SHIFT)
            .with_key(62, KeyModifierMask::SHIFT)
            .with_key(64, KeyModifierMask::ALT)
            .with_key(108, KeyModifierMask::ALT_GR)
            .with_key(133, KeyModifierMask::SUPER)
            .with_key(66, KeyModifierMask::CAPS_LOCK)
            .with_key(77, KeyModifierMask::NUM_LOCK)
            .with_key(78, KeyModifierMask::SCROLL_LOCK)
    }

    pub fn with_key(mut self, keycode: KeyButton, mask: KeyModifierMask) -> Self {
        self.modifier_keys.insert(keycode, mask);
        self
    }

    pub fn with_half_duplex(mut self, mask: KeyModifierMask) -> Self {
        self.half_duplex = mask;
        self
    }
}

impl Default for LockKeyState {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyState for LockKeyState {
    fn mask_for_key(&self, keycode: KeyButton) -> KeyModifierMask {
        self.modifier_keys
            .get(&keycode)
            .copied()
            .unwrap_or_default()
    }

    fn is_half_duplex(&self, mask: KeyModifierMask) -> bool {
        self.half_duplex.intersects(mask)
    }

    fn update_keys(&mut self) {
        debug!(keys = self.modifier_keys.len(), "key state refreshed");
    }
}

// ── Subsystems ────────────────────────────────────────────────────────────────

/// Builds [`PassiveClipboard`]s and [`PassiveScreenSaver`]s.
#[derive(Debug, Default)]
pub struct PassiveSubsystems;

impl SubsystemFactory for PassiveSubsystems {
    fn create_clipboard(
        &self,
        id: ClipboardId,
        window: WindowId,
        selection: Atom,
    ) -> Box<dyn ClipboardSlot> {
        Box::new(PassiveClipboard::new(id, window, selection))
    }

    fn create_screensaver(&self, _window: WindowId) -> Box<dyn ScreenSaver> {
        Box::new(PassiveScreenSaver::default())
    }
}

/// Tracks ownership of one selection but serves no data: every request is
/// dropped.
#[derive(Debug)]
pub struct PassiveClipboard {
    id: ClipboardId,
    window: WindowId,
    selection: Atom,
    /// Time we took ownership, while we own it.
    owned_since: Option<Time>,
    open: bool,
}

impl PassiveClipboard {
    pub fn new(id: ClipboardId, window: WindowId, selection: Atom) -> Self {
        Self {
            id,
            window,
            selection,
            owned_since: None,
            open: false,
        }
    }

    pub fn is_owned(&self) -> bool {
        self.owned_since.is_some()
    }
}

impl ClipboardSlot for PassiveClipboard {
    fn open(&mut self, time: Time) -> bool {
        if self.open {
            return false;
        }
        self.open = true;
        self.owned_since = Some(time);
        true
    }

    fn empty(&mut self) {
        trace!(id = %self.id, "clipboard emptied");
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn lost(&mut self, time: Time) {
        debug!(id = %self.id, time, "lost clipboard ownership");
        self.owned_since = None;
    }

    fn add_request(
        &mut self,
        _owner: WindowId,
        requestor: WindowId,
        target: Atom,
        _time: Time,
        _property: Atom,
    ) {
        debug!(id = %self.id, requestor, target, "ignoring clipboard request");
    }

    fn process_request(&mut self, _requestor: WindowId, _time: Time, _property: Atom) -> bool {
        false
    }

    fn destroy_request(&mut self, _requestor: WindowId) -> bool {
        false
    }

    fn selection(&self) -> Atom {
        self.selection
    }

    fn window(&self) -> WindowId {
        self.window
    }
}

/// Records what it was asked to do and leaves the real screensaver alone.
#[derive(Debug, Default)]
pub struct PassiveScreenSaver {
    notify: Option<WindowId>,
    disabled: bool,
    active: bool,
}

impl PassiveScreenSaver {
    pub fn notify_window(&self) -> Option<WindowId> {
        self.notify
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl ScreenSaver for PassiveScreenSaver {
    fn set_notify(&mut self, window: Option<WindowId>) {
        self.notify = window;
    }

    fn enable(&mut self) {
        self.disabled = false;
    }

    fn disable(&mut self) {
        self.disabled = true;
    }

    fn activate(&mut self) {
        self.active = true;
    }

    fn deactivate(&mut self) {
        self.active = false;
    }

    fn on_pre_dispatch(&mut self, _event: &NativeEvent) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_keys_are_half_duplex() {
        // Arrange
        let keys = LockKeyState::evdev();

        // Act
        let caps = keys.mask_for_key(66);
        let shift = keys.mask_for_key(50);

        // Assert
        assert_eq!(caps, KeyModifierMask::CAPS_LOCK);
        assert!(keys.is_half_duplex(caps));
        assert!(!keys.is_half_duplex(shift));
        assert!(!keys.is_half_duplex(keys.mask_for_key(38)));
    }

    #[test]
    fn test_half_duplex_set_can_be_narrowed() {
        let keys = LockKeyState::evdev().with_half_duplex(KeyModifierMask::CAPS_LOCK);

        assert!(keys.is_half_duplex(KeyModifierMask::CAPS_LOCK));
        assert!(!keys.is_half_duplex(KeyModifierMask::NUM_LOCK));
    }

    #[test]
    fn test_clipboard_tracks_ownership() {
        // Arrange
        let mut slot = PassiveClipboard::new(ClipboardId::CLIPBOARD, 0x40_0001, 101);

        // Act
        let opened = slot.open(5);
        let reopened = slot.open(6);
        slot.close();

        // Assert
        assert!(opened);
        assert!(!reopened);
        assert!(slot.is_owned());
        slot.lost(7);
        assert!(!slot.is_owned());
        assert_eq!(slot.selection(), 101);
    }

    #[test]
    fn test_screensaver_records_requests() {
        let mut saver = PassiveScreenSaver::default();

        saver.set_notify(Some(9));
        saver.disable();
        saver.activate();

        assert_eq!(saver.notify_window(), Some(9));
        assert!(saver.is_disabled());
        assert!(saver.is_active());
        assert!(!saver.on_pre_dispatch(&NativeEvent::Other { kind: 0 }));
    }
}
