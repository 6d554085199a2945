//! The X11 screen: lifecycle, shared state and the public operations.
//!
//! A [`Screen`] owns at most one display connection.  Everything that
//! exists only while the connection is open (the window, the clipboard
//! slots, the screensaver, the key state, the cursor bookkeeping) lives in
//! a [`Session`], so "closed" is simply "no session" and closing is
//! dropping it.
//!
//! # Locks (for beginners)
//!
//! Two mutexes guard the screen:
//!
//! - the **main lock** over [`ScreenState`], held by every operation that
//!   talks to the display, and by the main loop except while it waits;
//! - the **timer lock** over the [`TimerQueue`], so jobs can be scheduled
//!   from any thread without waiting for display I/O.
//!
//! When both are needed the main lock is taken first.  A poisoned lock is
//! recovered rather than propagated: the state it guards is plain data and
//! stays consistent between display requests.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use kvm_core::{
    ButtonId, ButtonMap, ClipboardId, Clock, KeyButton, ModifierMap, OptionsList, Stopwatch,
    TimerQueue, OPTION_XTEST_XINERAMA_UNAWARE,
};
use tracing::{debug, info, warn};

use super::main_loop::CancelToken;
use crate::domain::collaborators::{
    ClipboardSink, ClipboardSlot, ClipboardSource, Job, KeyState, PrimaryScreenReceiver,
    ScreenReceiver, ScreenSaver, SubsystemFactory, UNAVAILABLE_RETRY,
};
use crate::domain::event::{
    Atom, EventMask, Rect, Time, WindowId, ANY_BUTTON_MASK, NO_ATOM, NO_WINDOW,
};
use crate::domain::{ScreenError, ScreenRole};
use crate::infrastructure::display::{Connection, DisplayConnector, EventWaiter, XDisplay};

/// Events the primary's full-screen capture window listens for.
const CAPTURE_EVENTS: EventMask = EventMask::POINTER_MOTION
    .union(EventMask::BUTTON_PRESS)
    .union(EventMask::BUTTON_RELEASE)
    .union(EventMask::KEY_PRESS)
    .union(EventMask::KEY_RELEASE)
    .union(EventMask::KEYMAP_STATE)
    .union(EventMask::PROPERTY_CHANGE);

/// Client message the screensaver sends the primary's window.
pub const SCREENSAVER_ATOM: &str = "KVM_XSCREEN_SCREENSAVER";
/// Client message that stops the main loop.
pub const QUIT_ATOM: &str = "KVM_XSCREEN_QUIT";

fn selection_name(id: ClipboardId) -> &'static str {
    if id == ClipboardId::SELECTION {
        "PRIMARY"
    } else {
        "CLIPBOARD"
    }
}

// ── Construction parameters ───────────────────────────────────────────────────

/// The screen's collaborators.
///
/// A screen is primary exactly when it has a `primary_receiver`.
pub struct ScreenParts {
    pub receiver: Arc<dyn ScreenReceiver>,
    pub primary_receiver: Option<Arc<dyn PrimaryScreenReceiver>>,
    pub connector: Arc<dyn DisplayConnector>,
    pub subsystems: Box<dyn SubsystemFactory>,
}

#[derive(Clone)]
pub(crate) struct Receivers {
    pub(crate) screen: Arc<dyn ScreenReceiver>,
    pub(crate) primary: Option<Arc<dyn PrimaryScreenReceiver>>,
}

pub(crate) type JobQueue = TimerQueue<Arc<dyn Job>, Box<dyn Clock>>;

// ── Session ───────────────────────────────────────────────────────────────────

/// Everything that exists while the display is open.
pub(crate) struct Session {
    pub(crate) display: Box<dyn XDisplay>,
    pub(crate) waiter: Arc<dyn EventWaiter>,
    pub(crate) is_primary: bool,
    pub(crate) root: WindowId,
    /// Capture window on the primary, 1×1 hider window on a secondary.
    pub(crate) window: WindowId,
    pub(crate) shape: Rect,
    /// Where the pointer is parked while off-screen.
    pub(crate) center: (i32, i32),
    /// Last known pointer position.
    pub(crate) cursor: (i32, i32),
    pub(crate) on_screen: bool,
    /// More than one physical screen behind one X screen.
    pub(crate) xinerama: bool,
    pub(crate) xtest_xinerama_unaware: bool,
    pub(crate) buttons: ButtonMap,
    pub(crate) modifiers: ModifierMap,
    pub(crate) clipboards: [Option<Box<dyn ClipboardSlot>>; ClipboardId::COUNT],
    pub(crate) screensaver: Option<Box<dyn ScreenSaver>>,
    pub(crate) screensaver_notify: bool,
    pub(crate) atom_screensaver: Atom,
    pub(crate) atom_quit: Atom,
    /// Auto-repeat setting to restore when leaving a secondary.
    pub(crate) auto_repeat: bool,
    /// Keycode of the last press the input method saw; its composed
    /// result may arrive with keycode 0.
    pub(crate) last_keycode: KeyButton,
    pub(crate) key_state: Box<dyn KeyState>,
}

impl Session {
    fn new(
        connection: Connection,
        is_primary: bool,
        xtest_xinerama_unaware: bool,
        key_state: Box<dyn KeyState>,
    ) -> Self {
        let Connection { display, waiter } = connection;
        let root = display.root_window();
        Self {
            display,
            waiter,
            is_primary,
            root,
            window: NO_WINDOW,
            shape: Rect::default(),
            center: (0, 0),
            cursor: (0, 0),
            on_screen: is_primary,
            xinerama: false,
            xtest_xinerama_unaware,
            buttons: ButtonMap::default(),
            modifiers: ModifierMap::default(),
            clipboards: Default::default(),
            screensaver: None,
            screensaver_notify: false,
            atom_screensaver: NO_ATOM,
            atom_quit: NO_ATOM,
            auto_repeat: false,
            last_keycode: 0,
            key_state,
        }
    }

    /// Acquires the window and subsystems.  On error the caller releases
    /// whatever was acquired.
    fn initialize(&mut self, subsystems: &dyn SubsystemFactory) -> Result<(), ScreenError> {
        if !self.is_primary && !self.display.query_extension("XTEST") {
            return Err(ScreenError::OpenFailure(
                "XTEST extension not available".to_string(),
            ));
        }

        let (width, height) = self.display.screen_size();
        self.shape = Rect::new(0, 0, width, height);
        self.center = self.shape.center();
        let physical = self.display.xinerama_screens();
        if physical.len() > 1 {
            self.xinerama = true;
            self.center = physical[0].center();
        }
        self.cursor = self.center;
        debug!(
            width,
            height,
            xinerama = self.xinerama,
            "screen shape is {width}x{height}"
        );

        let (rect, mask) = if self.is_primary {
            (self.shape, CAPTURE_EVENTS)
        } else {
            (Rect::new(0, 0, 1, 1), EventMask::LEAVE_WINDOW)
        };
        self.window = self
            .display
            .create_input_window(rect, mask)
            .ok_or_else(|| ScreenError::OpenFailure("cannot create window".to_string()))?;
        debug!("window is 0x{:08x}", self.window);

        if self.is_primary {
            self.select_events(self.root);
            self.open_input_method();
        }

        for id in ClipboardId::all() {
            let selection = self.display.intern_atom(selection_name(id));
            self.clipboards[id.index()] =
                Some(subsystems.create_clipboard(id, self.window, selection));
        }

        self.atom_screensaver = self.display.intern_atom(SCREENSAVER_ATOM);
        self.screensaver = Some(subsystems.create_screensaver(self.window));
        self.atom_quit = self.display.intern_atom(QUIT_ATOM);

        if !self.is_primary {
            // Fabricated input must reach clients even during a server grab.
            self.display.xtest_grab_control(true);
        }

        self.update_keys();
        Ok(())
    }

    fn open_input_method(&mut self) {
        let Some(needed) = self.display.open_input_method(self.window) else {
            return;
        };
        let current = self.display.event_mask(self.window);
        self.display.select_input(self.window, current | needed);
        self.last_keycode = 0;
    }

    /// Rebuilds the modifier map and button table from the server, then
    /// lets the key state do the same.
    pub(crate) fn update_keys(&mut self) {
        let slots = self.display.modifier_keysyms();
        self.modifiers = if slots.is_empty() {
            ModifierMap::default()
        } else {
            ModifierMap::from_slot_keysyms(&slots)
        };
        self.buttons = ButtonMap::from_pointer_mapping(&self.display.pointer_mapping());
        self.key_state.update_keys();
    }

    /// Releases everything the session acquired and closes the display.
    fn release(mut self) {
        self.screensaver = None;
        self.clipboards = Default::default();
        if self.display.has_input_context() {
            self.display.close_input_method();
        }
        if self.window != NO_WINDOW {
            self.display.destroy_window(self.window);
        }
    }

    fn clipboard_time(&mut self, id: ClipboardId) -> Option<(&mut dyn ClipboardSlot, Time)> {
        let slot = self.clipboards.get_mut(id.index())?.as_deref_mut()?;
        let time = self.display.server_time(slot.window());
        Some((slot, time))
    }
}

pub(crate) struct ScreenState {
    pub(crate) session: Option<Session>,
    xtest_xinerama_unaware: bool,
}

// ── Screen ────────────────────────────────────────────────────────────────────

/// One X11 screen in either role.
pub struct Screen {
    display_name: String,
    pub(crate) receivers: Receivers,
    connector: Arc<dyn DisplayConnector>,
    subsystems: Box<dyn SubsystemFactory>,
    pub(crate) state: Mutex<ScreenState>,
    pub(crate) timers: Mutex<JobQueue>,
    pub(crate) cancel: CancelToken,
}

impl Screen {
    /// Creates a closed screen for the display `display_name`.
    pub fn new(display_name: impl Into<String>, parts: ScreenParts) -> Self {
        Self::with_clock(display_name, parts, Box::new(Stopwatch::new()))
    }

    /// Like [`Screen::new`], timing the timer queue with `clock`.
    pub fn with_clock(
        display_name: impl Into<String>,
        parts: ScreenParts,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            receivers: Receivers {
                screen: parts.receiver,
                primary: parts.primary_receiver,
            },
            connector: parts.connector,
            subsystems: parts.subsystems,
            state: Mutex::new(ScreenState {
                session: None,
                xtest_xinerama_unaware: true,
            }),
            timers: Mutex::new(TimerQueue::with_clock(clock)),
            cancel: CancelToken::default(),
        }
    }

    pub fn role(&self) -> ScreenRole {
        if self.receivers.primary.is_some() {
            ScreenRole::Primary
        } else {
            ScreenRole::Secondary
        }
    }

    pub fn is_primary(&self) -> bool {
        self.role() == ScreenRole::Primary
    }

    pub fn is_open(&self) -> bool {
        self.lock_state().session.is_some()
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// Connects to the display and acquires the window and subsystems.
    ///
    /// Opening an open screen does nothing.
    ///
    /// # Errors
    ///
    /// - [`ScreenError::Unavailable`] when the display cannot be reached.
    /// - [`ScreenError::OpenFailure`] when a secondary's server lacks XTest
    ///   or the window cannot be created.  Everything acquired so far is
    ///   released first.
    pub fn open(&self, key_state: Box<dyn KeyState>) -> Result<(), ScreenError> {
        let mut state = self.lock_state();
        if state.session.is_some() {
            warn!("screen is already open");
            return Ok(());
        }

        debug!(display = %self.display_name, "opening display");
        let connection = self
            .connector
            .connect(&self.display_name, Arc::clone(&self.receivers.screen))
            .ok_or_else(|| {
                warn!(display = %self.display_name, "cannot open display");
                ScreenError::Unavailable {
                    retry_after: UNAVAILABLE_RETRY,
                }
            })?;

        let mut session = Session::new(
            connection,
            self.is_primary(),
            state.xtest_xinerama_unaware,
            key_state,
        );
        if let Err(e) = session.initialize(self.subsystems.as_ref()) {
            warn!("open failed: {e}");
            session.release();
            return Err(e);
        }

        info!(display = %self.display_name, role = %self.role(), "screen opened");
        state.session = Some(session);
        Ok(())
    }

    /// Releases the window and subsystems and closes the display.  Closing
    /// a closed screen does nothing.
    pub fn close(&self) {
        let session = self.lock_state().session.take();
        if let Some(session) = session {
            // A loop blocked in `wait` must see the session gone.
            session.waiter.wake();
            session.release();
            debug!("closed display");
        }
    }

    // ── Capture transitions ───────────────────────────────────────────────

    /// Starts operating; a secondary parks its hider window at the center.
    pub fn enable(&self) -> Result<(), ScreenError> {
        self.with_session(Session::enable)
    }

    /// Stops operating and undoes [`Screen::enable`].
    pub fn disable(&self) -> Result<(), ScreenError> {
        self.with_session(Session::disable)
    }

    /// The pointer enters this screen.
    pub fn enter(&self) -> Result<(), ScreenError> {
        self.with_session(Session::enter)
    }

    /// The pointer leaves this screen.  `Ok(false)` when the primary could
    /// not grab the keyboard and pointer; the screen then stays on-screen.
    pub fn leave(&self) -> Result<bool, ScreenError> {
        self.with_session(Session::leave)
    }

    // ── Pointer and keyboard queries ──────────────────────────────────────

    pub fn shape(&self) -> Result<Rect, ScreenError> {
        self.with_session(|session| session.shape)
    }

    /// Where the server says the pointer is; the center if it cannot say.
    pub fn cursor_pos(&self) -> Result<(i32, i32), ScreenError> {
        self.with_session(|session| {
            session
                .display
                .query_pointer()
                .map_or(session.center, |pointer| (pointer.x, pointer.y))
        })
    }

    /// Width of the edge band that switches screens.
    pub fn jump_zone_size(&self) -> i32 {
        1
    }

    pub fn is_on_screen(&self) -> Result<bool, ScreenError> {
        self.with_session(|session| session.on_screen)
    }

    pub fn is_any_mouse_button_down(&self) -> Result<bool, ScreenError> {
        self.with_session(|session| {
            session
                .display
                .query_pointer()
                .is_some_and(|pointer| pointer.mask & ANY_BUTTON_MASK != 0)
        })
    }

    /// Human-readable name of the key on `keycode`.
    pub fn key_name(&self, keycode: KeyButton) -> Result<String, ScreenError> {
        self.with_session(|session| {
            session
                .display
                .keysym_name(keycode)
                .unwrap_or_else(|| format!("keycode {keycode}"))
        })
    }

    /// Rebuilds the modifier map, the button table and the key state.
    pub fn update_keys(&self) -> Result<(), ScreenError> {
        self.with_session(Session::update_keys)
    }

    // ── Pointer warps and synthetic input ─────────────────────────────────

    /// Warps the pointer and discards the input events queued before it.
    pub fn warp_cursor(&self, x: i32, y: i32) -> Result<(), ScreenError> {
        self.with_session(|session| session.warp_cursor(x, y))
    }

    pub fn fake_key_event(&self, keycode: KeyButton, press: bool) -> Result<(), ScreenError> {
        self.with_session(|session| session.fake_key(keycode, press))
    }

    /// Always false: ctrl+alt+del passes through as ordinary keys.
    pub fn fake_ctrl_alt_del(&self) -> bool {
        false
    }

    pub fn fake_mouse_button(&self, button: ButtonId, press: bool) -> Result<(), ScreenError> {
        self.with_session(|session| session.fake_mouse_button(button, press))
    }

    pub fn fake_mouse_move(&self, x: i32, y: i32) -> Result<(), ScreenError> {
        self.with_session(|session| session.fake_mouse_move(x, y))
    }

    /// Scrolls by `delta`, 120 per wheel notch.
    pub fn fake_mouse_wheel(&self, delta: i32) -> Result<(), ScreenError> {
        self.with_session(|session| session.fake_mouse_wheel(delta))
    }

    // ── Clipboards ────────────────────────────────────────────────────────

    /// Takes ownership of clipboard `id`, filling it from `source`.  With
    /// no source the clipboard is claimed empty.
    pub fn set_clipboard(
        &self,
        id: ClipboardId,
        source: Option<&dyn ClipboardSource>,
    ) -> Result<bool, ScreenError> {
        self.with_session(|session| {
            let Some((slot, time)) = session.clipboard_time(id) else {
                return false;
            };
            match source {
                Some(source) => source.copy_into(slot, time),
                None => {
                    if !slot.open(time) {
                        return false;
                    }
                    slot.empty();
                    slot.close();
                    true
                }
            }
        })
    }

    /// Copies clipboard `id` into `sink`.
    pub fn get_clipboard(
        &self,
        id: ClipboardId,
        sink: &mut dyn ClipboardSink,
    ) -> Result<bool, ScreenError> {
        self.with_session(|session| match session.clipboard_time(id) {
            Some((slot, time)) => sink.copy_from(slot, time),
            None => false,
        })
    }

    // ── Screensaver ───────────────────────────────────────────────────────

    /// With `notify`, asks for activation messages; otherwise keeps the
    /// local screensaver from starting.
    pub fn open_screensaver(&self, notify: bool) -> Result<(), ScreenError> {
        self.with_session(|session| {
            session.screensaver_notify = notify;
            let window = session.window;
            if let Some(saver) = session.screensaver.as_mut() {
                if notify {
                    saver.set_notify(Some(window));
                } else {
                    saver.disable();
                }
            }
        })
    }

    /// Undoes [`Screen::open_screensaver`].
    pub fn close_screensaver(&self) -> Result<(), ScreenError> {
        self.with_session(|session| {
            let notify = session.screensaver_notify;
            if let Some(saver) = session.screensaver.as_mut() {
                if notify {
                    saver.set_notify(None);
                } else {
                    saver.enable();
                }
            }
        })
    }

    pub fn screensaver(&self, activate: bool) -> Result<(), ScreenError> {
        self.with_session(|session| {
            if let Some(saver) = session.screensaver.as_mut() {
                if activate {
                    saver.activate();
                } else {
                    saver.deactivate();
                }
            }
        })
    }

    // ── Options ───────────────────────────────────────────────────────────

    pub fn reset_options(&self) {
        self.apply_xinerama_unaware(true);
    }

    /// Applies the options the screen recognizes and ignores the rest.
    pub fn set_options(&self, options: &OptionsList) {
        for &(code, value) in options {
            if code == OPTION_XTEST_XINERAMA_UNAWARE {
                self.apply_xinerama_unaware(value != 0);
            }
        }
    }

    fn apply_xinerama_unaware(&self, unaware: bool) {
        let mut state = self.lock_state();
        state.xtest_xinerama_unaware = unaware;
        if let Some(session) = state.session.as_mut() {
            session.xtest_xinerama_unaware = unaware;
        }
        debug!(unaware, "XTest is Xinerama unaware");
    }

    // ── Timers ────────────────────────────────────────────────────────────

    /// Runs `job` every `period`, replacing any timer the job already has.
    pub fn add_timer(&self, job: Arc<dyn Job>, period: Duration) {
        self.lock_timers().add(job, period);
    }

    pub fn remove_timer(&self, job: &Arc<dyn Job>) {
        self.lock_timers().remove(job);
    }

    /// Starts the one-shot timer, replacing an outstanding one, and
    /// returns its id.
    pub fn add_one_shot_timer(&self, period: Duration) -> u32 {
        self.lock_timers().add_one_shot(period)
    }

    // ── Helpers ───────────────────────────────────────────────────────────

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, ScreenState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_timers(&self) -> MutexGuard<'_, JobQueue> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> Result<R, ScreenError> {
        let mut state = self.lock_state();
        let session = state.session.as_mut().ok_or(ScreenError::NotOpen)?;
        Ok(f(session))
    }
}

impl Drop for Screen {
    fn drop(&mut self) {
        self.close();
    }
}
