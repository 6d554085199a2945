//! Capture and injection: the on-screen/off-screen transitions, the grab
//! protocol, pointer warps and synthetic input.
//!
//! # How a primary captures input (for beginners)
//!
//! While the pointer is on the primary, nothing special happens; the
//! screen only watches motion so it can notice the pointer reaching an
//! edge.  When the pointer *leaves*, the screen maps an invisible
//! full-screen window, grabs keyboard and pointer to it, and parks the
//! pointer at the center.  From then on every motion is measured relative
//! to the center and the pointer is warped back whenever it drifts away.
//!
//! A secondary does the reverse: it replays input with XTest and uses a
//! 1×1 hider window to hide the local pointer while it is parked.
//!
//! # Sentinels
//!
//! A warp generates motion of its own that must not be reported as user
//! motion.  [`Session::warp_cursor_no_flush`] brackets the warp with two
//! marked motion events sent to our own window; the motion handler skips
//! everything up to the second marker.

use std::thread;
use std::time::{Duration, Instant};

use kvm_core::{ButtonId, KeyButton};
use tracing::{debug, error, trace};

use super::screen::Session;
use crate::domain::event::{EventMask, GrabStatus, MotionEvent, NativeEvent, CURRENT_TIME};

/// Wheel motion of one notch.
pub const WHEEL_DELTA: i32 = 120;

/// Pause between grab attempts.
const GRAB_RETRY_INTERVAL: Duration = Duration::from_millis(50);
/// Give up grabbing after this long.
const GRAB_TIMEOUT: Duration = Duration::from_secs(1);

impl Session {
    // ── Transitions ───────────────────────────────────────────────────────

    pub(crate) fn enable(&mut self) {
        if !self.is_primary {
            self.auto_repeat = self.display.auto_repeat_enabled();

            // Park the hider window under the pointer's center position.
            let (x, y) = self.center;
            self.display.move_window(self.window, x, y);
            self.display.map_raised(self.window);
            self.fake_mouse_move(x, y);
        }
    }

    pub(crate) fn disable(&mut self) {
        if self.display.has_input_context() {
            self.display.set_ic_focus(false);
        }

        // Unmapping also drops any grab.
        self.display.unmap_window(self.window);

        if !self.is_primary && self.auto_repeat {
            self.display.set_auto_repeat(true);
        }
    }

    pub(crate) fn enter(&mut self) {
        if self.display.has_input_context() {
            self.display.set_ic_focus(false);
        }
        self.display.unmap_window(self.window);

        if !self.is_primary {
            // Fabricated keys must not repeat locally on top of the
            // repeats the primary forwards.
            self.auto_repeat = self.display.auto_repeat_enabled();
            self.display.set_auto_repeat(false);
        }

        self.on_screen = true;
        debug!("entered screen");
    }

    pub(crate) fn leave(&mut self) -> bool {
        if !self.is_primary {
            if self.auto_repeat {
                self.display.set_auto_repeat(true);
            }
            let (x, y) = self.center;
            self.display.move_window(self.window, x, y);
        }

        self.display.map_raised(self.window);

        if self.is_primary && !self.grab_mouse_and_keyboard() {
            self.display.unmap_window(self.window);
            return false;
        }

        let (x, y) = self.center;
        if self.is_primary {
            self.warp_cursor(x, y);
        } else {
            self.fake_mouse_move(x, y);
        }

        if self.display.has_input_context() {
            self.display.reset_ic();
            self.display.set_ic_focus(true);
        }

        self.on_screen = false;
        debug!("left screen");
        true
    }

    /// Grabs keyboard then pointer, retrying until [`GRAB_TIMEOUT`].
    ///
    /// The keyboard grab is released whenever the pointer grab fails, so
    /// two screens contending for the devices cannot each hold one.
    fn grab_mouse_and_keyboard(&mut self) -> bool {
        let started = Instant::now();
        trace!("grabbing keyboard and pointer");
        loop {
            // Keyboard first.
            loop {
                match self.display.grab_keyboard(self.window) {
                    GrabStatus::Success => break,
                    GrabStatus::NotViewable => {
                        error!("grab window is not viewable");
                        return false;
                    }
                    status => {
                        if started.elapsed() >= GRAB_TIMEOUT {
                            debug!(?status, "grab keyboard timed out");
                            return false;
                        }
                        trace!(?status, "waiting to grab keyboard");
                        thread::sleep(GRAB_RETRY_INTERVAL);
                    }
                }
            }
            trace!("grabbed keyboard");

            match self.display.grab_pointer(self.window) {
                GrabStatus::Success => break,
                status => {
                    self.display.ungrab_keyboard();
                    if started.elapsed() >= GRAB_TIMEOUT {
                        debug!(?status, "grab pointer timed out");
                        return false;
                    }
                    trace!(?status, "waiting to grab pointer");
                    thread::sleep(GRAB_RETRY_INTERVAL);
                }
            }
        }
        debug!("grabbed pointer and keyboard");
        true
    }

    // ── Warps ─────────────────────────────────────────────────────────────

    /// Warps and drops every input event queued up to the warp.
    pub(crate) fn warp_cursor(&mut self, x: i32, y: i32) {
        self.warp_cursor_no_flush(x, y);
        while self.display.check_mask_event(EventMask::INPUT).is_some() {}
        self.cursor = (x, y);
    }

    /// Warps between two sentinel motion events and waits for the server
    /// to process all three.
    pub(crate) fn warp_cursor_no_flush(&mut self, x: i32, y: i32) {
        let sentinel = NativeEvent::Motion(MotionEvent {
            window: self.window,
            time: CURRENT_TIME,
            x_root: x,
            y_root: y,
            send_event: true,
        });
        self.display.send_event(self.window, &sentinel);
        self.display.warp_pointer(x, y);
        self.display.send_event(self.window, &sentinel);
        self.display.sync();
        trace!(x, y, "warped pointer");
    }

    // ── Synthetic input ───────────────────────────────────────────────────

    pub(crate) fn fake_key(&mut self, keycode: KeyButton, press: bool) {
        self.display.fake_key(keycode, press);
        self.display.flush();
    }

    pub(crate) fn fake_mouse_button(&mut self, button: ButtonId, press: bool) {
        let native = self.buttons.to_x(button);
        if native != 0 {
            self.display.fake_button(native, press);
            self.display.flush();
        }
    }

    pub(crate) fn fake_mouse_move(&mut self, x: i32, y: i32) {
        if self.xinerama && self.xtest_xinerama_unaware {
            // XTest motion is relative to one physical screen here.
            self.display.warp_pointer(x, y);
        } else {
            self.display.fake_motion(x, y);
        }
        self.display.flush();
    }

    pub(crate) fn fake_mouse_wheel(&mut self, delta: i32) {
        let wheel = if delta >= 0 {
            ButtonId::WHEEL_FORWARD
        } else {
            ButtonId::WHEEL_BACKWARD
        };
        let native = self.buttons.to_x(wheel);
        if native == 0 {
            return;
        }

        let mut remaining = delta.unsigned_abs();
        while remaining >= WHEEL_DELTA as u32 {
            self.display.fake_button(native, true);
            self.display.fake_button(native, false);
            remaining -= WHEEL_DELTA as u32;
        }
        self.display.flush();
    }
}
