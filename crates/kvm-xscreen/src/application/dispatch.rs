//! Event dispatcher: routes every dequeued native event to the right
//! handler and translates captured input for the primary receiver.
//!
//! Routing order for one event:
//!
//! 1. When an input context exists, the keycode of the last press is
//!    remembered and the input method may consume the event.
//! 2. The event kind selects a handler.  Handlers for clipboard traffic,
//!    window creation and device input consume the event.
//! 3. Anything not consumed goes to the screensaver's pre-dispatch hook.
//!
//! # Telling a repeat from a release (for beginners)
//!
//! X reports auto-repeat as a release immediately followed by a press with
//! the same timestamp.  On a release the dispatcher looks for that press in
//! the queue; if it finds one it removes it and reports a single repeat
//! instead of an up/down pair.

use kvm_core::{
    button_from_x, key_from_keysym,
    buttons::{X_WHEEL_BACKWARD, X_WHEEL_FORWARD},
    KeyId, KeyModifierMask,
};
use tracing::{debug, trace};

use super::capture::WHEEL_DELTA;
use super::screen::{Receivers, Session};
use crate::domain::collaborators::PrimaryScreenReceiver;
use crate::domain::event::{
    Atom, ButtonEvent, EventMask, KeyEvent, MotionEvent, NativeEvent, Time, WindowId, NO_ATOM,
};
use crate::infrastructure::display::{ignoring_errors, XDisplay};
use kvm_core::ClipboardId;

/// Off-screen drift from the center that triggers a re-center warp.
const DRIFT_THRESHOLD: i32 = 32;

/// Pause or Break with control and alt held stands in for ctrl+alt+del.
fn is_ctrl_alt_del(key: KeyId, mask: KeyModifierMask) -> bool {
    (key == KeyId::PAUSE || key == KeyId::BREAK) && mask.is_ctrl_alt()
}

impl Session {
    /// Handles one event taken off the display queue.
    pub(crate) fn dispatch(&mut self, event: &NativeEvent, receivers: &Receivers) {
        if self.display.has_input_context() {
            // A composed press can come back from the input method with
            // keycode 0; remember the real one.
            match event {
                NativeEvent::KeyPress(key) if key.keycode != 0 => self.last_keycode = key.keycode,
                NativeEvent::KeyRelease(key) if key.keycode == self.last_keycode => {
                    self.last_keycode = 0
                }
                _ => {}
            }
            if self.display.filter_event(event) {
                trace!("input method consumed event");
                return;
            }
        }

        if self.handle_event(event, receivers) {
            return;
        }

        if let Some(saver) = self.screensaver.as_mut() {
            saver.on_pre_dispatch(event);
        }
    }

    /// Returns true when the event was consumed.
    fn handle_event(&mut self, event: &NativeEvent, receivers: &Receivers) -> bool {
        let primary = receivers.primary.as_deref();
        match *event {
            NativeEvent::CreateNotify { window } => {
                if self.is_primary {
                    self.select_events(window);
                }
                true
            }

            NativeEvent::Mapping(mapping) => {
                // Mapping changes come in bursts; act on the last one.
                if self.display.pending() > 0
                    && matches!(self.display.peek_event(), Some(NativeEvent::Mapping(_)))
                {
                    return true;
                }
                self.display.refresh_keyboard_mapping(&mapping);
                self.update_keys();
                debug!(request = ?mapping.request, "keyboard mapping changed");
                false
            }

            NativeEvent::LeaveNotify { .. } => {
                if !self.is_primary {
                    // The pointer left the hider window: hide it again.
                    self.display.unmap_window(self.window);
                }
                false
            }

            NativeEvent::SelectionClear { selection, time } => {
                match self.clipboard_for_selection(selection) {
                    Some(id) => {
                        if let Some(slot) = self.clipboards[id.index()].as_mut() {
                            slot.lost(time);
                        }
                        receivers.screen.on_grab_clipboard(id);
                        true
                    }
                    None => false,
                }
            }

            NativeEvent::SelectionNotify {
                requestor,
                property,
            } => {
                // Transfers we start are read elsewhere; just honour the
                // protocol by deleting the data.
                if property != NO_ATOM {
                    self.display.delete_property(requestor, property);
                }
                true
            }

            NativeEvent::SelectionRequest {
                owner,
                requestor,
                selection,
                target,
                property,
                time,
            } => match self.clipboard_for_selection(selection) {
                Some(id) => {
                    if let Some(slot) = self.clipboards[id.index()].as_mut() {
                        slot.add_request(owner, requestor, target, time, property);
                    }
                    true
                }
                None => false,
            },

            NativeEvent::PropertyNotify {
                window,
                atom,
                time,
                deleted: true,
            } => {
                self.process_clipboard_request(window, time, atom);
                true
            }

            NativeEvent::ClientMessage {
                message_type,
                format,
                data,
                ..
            } if self.is_primary && message_type == self.atom_screensaver && format == 32 => {
                if let Some(primary) = primary {
                    primary.on_screensaver(data[0] != 0);
                }
                true
            }

            NativeEvent::DestroyNotify { window } => {
                self.destroy_clipboard_request(window);
                false
            }

            NativeEvent::KeyPress(key) => {
                if let Some(primary) = primary {
                    self.on_key_press(&key, primary);
                }
                true
            }

            NativeEvent::KeyRelease(key) => {
                if let Some(primary) = primary {
                    self.on_key_release(&key, primary);
                }
                true
            }

            NativeEvent::ButtonPress(button) => {
                if let Some(primary) = primary {
                    on_mouse_press(&button, primary);
                }
                true
            }

            NativeEvent::ButtonRelease(button) => {
                if let Some(primary) = primary {
                    on_mouse_release(&button, primary);
                }
                true
            }

            NativeEvent::Motion(motion) => {
                if let Some(primary) = primary {
                    self.on_mouse_move(&motion, primary);
                }
                true
            }

            _ => false,
        }
    }

    // ── Window selection ──────────────────────────────────────────────────

    /// Selects motion and creation events on `window` and every existing
    /// descendant, except our own window.  Windows may vanish meanwhile, so
    /// errors are ignored.
    pub(crate) fn select_events(&mut self, window: WindowId) {
        let own = self.window;
        ignoring_errors(self.display.as_mut(), |display| {
            select_window_tree(display, window, own)
        });
    }

    // ── Clipboard routing ─────────────────────────────────────────────────

    fn clipboard_for_selection(&self, selection: Atom) -> Option<ClipboardId> {
        ClipboardId::all().find(|id| {
            self.clipboards[id.index()]
                .as_ref()
                .is_some_and(|slot| slot.selection() == selection)
        })
    }

    fn process_clipboard_request(&mut self, requestor: WindowId, time: Time, property: Atom) {
        for slot in self.clipboards.iter_mut().flatten() {
            if slot.process_request(requestor, time, property) {
                return;
            }
        }
    }

    fn destroy_clipboard_request(&mut self, requestor: WindowId) {
        for slot in self.clipboards.iter_mut().flatten() {
            if slot.destroy_request(requestor) {
                return;
            }
        }
    }

    // ── Keyboard ──────────────────────────────────────────────────────────

    fn map_key_from_x(&mut self, event: &KeyEvent, press: bool) -> KeyId {
        // Only presses can go through the input method.
        let keysym = if press && self.display.has_input_context() {
            self.display.lookup_keysym_im(event).keysym()
        } else {
            self.display.lookup_keysym(event)
        };
        key_from_keysym(keysym)
    }

    fn on_key_press(&mut self, event: &KeyEvent, primary: &dyn PrimaryScreenReceiver) {
        trace!(keycode = event.keycode, state = event.state, "key press");
        let mask = self.modifiers.map_modifier(event.state);
        let mut key = self.map_key_from_x(event, true);
        if key.is_none() {
            return;
        }
        if is_ctrl_alt_del(key, mask) {
            debug!("emulate ctrl+alt+del");
            key = KeyId::DELETE;
        }

        let keycode = if event.keycode == 0 {
            self.last_keycode
        } else {
            event.keycode
        };

        primary.on_key_down(key, mask, keycode);
        let key_mask = self.key_state.mask_for_key(keycode);
        if self.key_state.is_half_duplex(key_mask) {
            primary.on_key_up(key, mask | key_mask, keycode);
        }
    }

    fn on_key_release(&mut self, event: &KeyEvent, primary: &dyn PrimaryScreenReceiver) {
        let mask = self.modifiers.map_modifier(event.state);
        let mut key = self.map_key_from_x(event, false);
        if key.is_none() {
            return;
        }

        // A press with the same window, time and keycode means auto-repeat.
        let (window, time, keycode) = (event.window, event.time, event.keycode);
        let mut has_press = self
            .display
            .check_if_event(&mut |queued| {
                matches!(queued, NativeEvent::KeyPress(press)
                    if press.window == window && press.time == time && press.keycode == keycode)
            })
            .is_some();

        if is_ctrl_alt_del(key, mask) {
            debug!("emulate ctrl+alt+del");
            key = KeyId::DELETE;
            has_press = false;
        }

        if has_press {
            trace!(keycode, state = event.state, "key repeat");
            primary.on_key_repeat(key, mask, 1, keycode);
        } else {
            trace!(keycode, state = event.state, "key release");
            let key_mask = self.key_state.mask_for_key(keycode);
            if self.key_state.is_half_duplex(key_mask) {
                primary.on_key_down(key, mask, keycode);
            }
            primary.on_key_up(key, mask, keycode);
        }
    }

    // ── Pointer ───────────────────────────────────────────────────────────

    fn on_mouse_move(&mut self, event: &MotionEvent, primary: &dyn PrimaryScreenReceiver) {
        trace!(x = event.x_root, y = event.y_root, "motion");
        let dx = event.x_root - self.cursor.0;
        let dy = event.y_root - self.cursor.1;
        self.cursor = (event.x_root, event.y_root);

        if event.send_event {
            // Our own sentinel: skip the warp's motion up to and including
            // the matching sentinel.
            while let Some(next) = self.display.mask_event(EventMask::POINTER_MOTION) {
                if matches!(next, NativeEvent::Motion(motion) if motion.send_event) {
                    break;
                }
            }
        } else if self.on_screen {
            primary.on_mouse_move_primary(event.x_root, event.y_root);
        } else {
            // Re-center before reporting, so a report that moves the
            // pointer onto another screen is not undone by a later warp.
            let (cx, cy) = self.center;
            if (event.x_root - cx).abs() > DRIFT_THRESHOLD
                || (event.y_root - cy).abs() > DRIFT_THRESHOLD
            {
                self.warp_cursor_no_flush(cx, cy);
            }
            if dx != 0 || dy != 0 {
                primary.on_mouse_move_secondary(dx, dy);
            }
        }
    }
}

fn on_mouse_press(event: &ButtonEvent, primary: &dyn PrimaryScreenReceiver) {
    trace!(button = event.button, "button press");
    let button = button_from_x(event.button);
    if !button.is_none() {
        primary.on_mouse_down(button);
    }
}

fn on_mouse_release(event: &ButtonEvent, primary: &dyn PrimaryScreenReceiver) {
    trace!(button = event.button, "button release");
    let button = button_from_x(event.button);
    if !button.is_none() {
        primary.on_mouse_up(button);
    } else if event.button == X_WHEEL_FORWARD {
        primary.on_mouse_wheel(WHEEL_DELTA);
    } else if event.button == X_WHEEL_BACKWARD {
        primary.on_mouse_wheel(-WHEEL_DELTA);
    }
}

fn select_window_tree(display: &mut dyn XDisplay, top: WindowId, skip: WindowId) {
    let mut pending = vec![top];
    while let Some(window) = pending.pop() {
        if window == skip {
            continue;
        }
        display.select_input(
            window,
            EventMask::POINTER_MOTION | EventMask::SUBSTRUCTURE_NOTIFY,
        );
        if let Some(children) = display.query_tree(window) {
            pending.extend(children);
        }
    }
}
