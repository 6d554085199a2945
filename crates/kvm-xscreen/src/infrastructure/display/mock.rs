//! In-memory X server for tests.
//!
//! # Why a mock server?
//!
//! The real backend needs a running X server, moves the real pointer and
//! grabs the real keyboard.  [`MockServer`] replaces all of that with plain
//! state behind a mutex:
//!
//! - every request is recorded as a [`DisplayCall`], in order, so tests can
//!   assert exactly what the screen asked the server to do;
//! - events are scripted into a queue that the screen drains, peeks and
//!   searches exactly as it would the Xlib queue;
//! - events sent to a window the screen created come back through the
//!   queue, as they would from a real server, and so does the motion a warp
//!   generates.
//!
//! # Usage in tests
//!
//! ```ignore
//! let server = MockServer::new();
//! server.set_keysym(38, 0x61);
//! let connector = Arc::new(MockConnector::new(server.clone()));
//! // ... open a screen through `connector`, then:
//! server.push_event(NativeEvent::KeyPress(key(38)));
//! assert!(server.calls().contains(&DisplayCall::Flush));
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use kvm_core::{KeyButton, KeySym, ManualClock};

use super::{Connection, DisplayConnector, EventWaiter, XDisplay};
use crate::domain::collaborators::ScreenReceiver;
use crate::domain::event::{
    Atom, EventMask, GrabStatus, ImLookup, KeyEvent, MappingEvent, MotionEvent, NativeEvent,
    PointerState, Rect, Time, WindowId,
};

/// Root window of the mock server.
pub const MOCK_ROOT: WindowId = 1;

/// First id handed out by [`XDisplay::create_input_window`].
const FIRST_WINDOW: WindowId = 0x0040_0001;

/// A request the screen made, as recorded by the mock server.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayCall {
    CreateWindow { window: WindowId, rect: Rect, mask: EventMask },
    DestroyWindow(WindowId),
    SelectInput(WindowId, EventMask),
    MoveWindow(WindowId, i32, i32),
    MapRaised(WindowId),
    Unmap(WindowId),
    DeleteProperty(WindowId, Atom),
    PushErrorTrap,
    PopErrorTrap,
    OpenInputMethod(WindowId),
    CloseInputMethod,
    SetIcFocus(bool),
    ResetIc,
    SetAutoRepeat(bool),
    GrabKeyboard(WindowId),
    GrabPointer(WindowId),
    UngrabKeyboard,
    Warp(i32, i32),
    RefreshKeyboardMapping,
    FakeKey(KeyButton, bool),
    FakeButton(u32, bool),
    FakeMotion(i32, i32),
    XTestGrabControl(bool),
    SendEvent(WindowId, NativeEvent),
    Flush,
    Sync,
    Close,
}

/// Everything the mock server knows.  Tests configure the public fields
/// directly through [`MockServer::with_state`].
#[derive(Debug)]
pub struct MockServerState {
    pub calls: Vec<DisplayCall>,
    pub queue: VecDeque<NativeEvent>,
    pub has_xtest: bool,
    pub screen_size: (i32, i32),
    pub xinerama_screens: Vec<Rect>,
    /// Scripted keyboard grab results, consumed front first; afterwards
    /// every grab returns `keyboard_grab_default`.
    pub keyboard_grabs: VecDeque<GrabStatus>,
    pub keyboard_grab_default: GrabStatus,
    pub pointer_grabs: VecDeque<GrabStatus>,
    pub pointer_grab_default: GrabStatus,
    pub keysyms: HashMap<KeyButton, KeySym>,
    pub keysym_names: HashMap<KeyButton, String>,
    /// Whether an input method is available.
    pub input_method: bool,
    /// Extra events the input context asks for.
    pub input_method_mask: EventMask,
    /// Key events with these keycodes are swallowed by the input method.
    pub input_method_swallows: HashSet<KeyButton>,
    pub window_tree: HashMap<WindowId, Vec<WindowId>>,
    pub event_masks: HashMap<WindowId, EventMask>,
    pub pointer_mapping: Vec<u8>,
    pub modifier_keysyms: Vec<Vec<KeySym>>,
    pub auto_repeat: bool,
    pub pointer: PointerState,
    /// Whether a warp queues the motion event a real server would send.
    pub warp_generates_motion: bool,
    pub fail_window_creation: bool,
    pub connections: usize,
    has_ic: bool,
    own_windows: HashSet<WindowId>,
    atoms: HashMap<String, Atom>,
    next_window: WindowId,
    time: Time,
    trap_depth: usize,
}

impl Default for MockServerState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            queue: VecDeque::new(),
            has_xtest: true,
            screen_size: (1920, 1080),
            xinerama_screens: Vec::new(),
            keyboard_grabs: VecDeque::new(),
            keyboard_grab_default: GrabStatus::Success,
            pointer_grabs: VecDeque::new(),
            pointer_grab_default: GrabStatus::Success,
            keysyms: HashMap::new(),
            keysym_names: HashMap::new(),
            input_method: false,
            input_method_mask: EventMask::empty(),
            input_method_swallows: HashSet::new(),
            window_tree: HashMap::new(),
            event_masks: HashMap::new(),
            pointer_mapping: vec![1, 2, 3, 4, 5, 6, 7],
            modifier_keysyms: Vec::new(),
            auto_repeat: true,
            pointer: PointerState::default(),
            warp_generates_motion: true,
            fail_window_creation: false,
            connections: 0,
            has_ic: false,
            own_windows: HashSet::new(),
            atoms: HashMap::new(),
            next_window: FIRST_WINDOW,
            time: 1000,
            trap_depth: 0,
        }
    }
}

impl MockServerState {
    fn take_first(&mut self, mut matches: impl FnMut(&NativeEvent) -> bool) -> Option<NativeEvent> {
        let index = self.queue.iter().position(|event| matches(event))?;
        self.queue.remove(index)
    }
}

/// Shared handle to the mock server.  Clones see the same state.
#[derive(Debug, Clone, Default)]
pub struct MockServer {
    state: Arc<Mutex<MockServerState>>,
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` with the server state locked.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut MockServerState) -> R) -> R {
        f(&mut self.lock())
    }

    /// Opens a connection to this server.
    pub fn connect(&self) -> MockDisplay {
        self.lock().connections += 1;
        MockDisplay {
            server: self.clone(),
        }
    }

    pub fn push_event(&self, event: NativeEvent) {
        self.lock().queue.push_back(event);
    }

    pub fn set_keysym(&self, keycode: KeyButton, keysym: KeySym) {
        self.lock().keysyms.insert(keycode, keysym);
    }

    /// Copy of every request recorded so far.
    pub fn calls(&self) -> Vec<DisplayCall> {
        self.lock().calls.clone()
    }

    /// Returns and forgets the recorded requests.
    pub fn take_calls(&self) -> Vec<DisplayCall> {
        std::mem::take(&mut self.lock().calls)
    }

    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }

    /// Windows created by the screen and not yet destroyed.
    pub fn live_windows(&self) -> usize {
        self.lock().own_windows.len()
    }

    pub fn connections(&self) -> usize {
        self.lock().connections
    }

    pub fn has_input_context(&self) -> bool {
        self.lock().has_ic
    }

    /// The atom interned for `name`, if any client asked for it.
    pub fn atom(&self, name: &str) -> Option<Atom> {
        self.lock().atoms.get(name).copied()
    }

    fn lock(&self) -> MutexGuard<'_, MockServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One connection to a [`MockServer`].
#[derive(Debug)]
pub struct MockDisplay {
    server: MockServer,
}

impl MockDisplay {
    fn record(&self, call: DisplayCall) {
        self.server.lock().calls.push(call);
    }

    fn state(&self) -> MutexGuard<'_, MockServerState> {
        self.server.lock()
    }
}

impl Drop for MockDisplay {
    fn drop(&mut self) {
        let mut state = self.state();
        state.connections = state.connections.saturating_sub(1);
        state.has_ic = false;
        state.calls.push(DisplayCall::Close);
    }
}

impl XDisplay for MockDisplay {
    fn query_extension(&mut self, name: &str) -> bool {
        name != "XTEST" || self.state().has_xtest
    }

    fn root_window(&self) -> WindowId {
        MOCK_ROOT
    }

    fn screen_size(&self) -> (i32, i32) {
        self.state().screen_size
    }

    fn xinerama_screens(&mut self) -> Vec<Rect> {
        self.state().xinerama_screens.clone()
    }

    fn intern_atom(&mut self, name: &str) -> Atom {
        let mut state = self.state();
        let next = state.atoms.len() as Atom + 100;
        *state.atoms.entry(name.to_string()).or_insert(next)
    }

    fn create_input_window(&mut self, rect: Rect, mask: EventMask) -> Option<WindowId> {
        let mut state = self.state();
        if state.fail_window_creation {
            return None;
        }
        let window = state.next_window;
        state.next_window += 1;
        state.own_windows.insert(window);
        state.event_masks.insert(window, mask);
        state
            .calls
            .push(DisplayCall::CreateWindow { window, rect, mask });
        Some(window)
    }

    fn destroy_window(&mut self, window: WindowId) {
        let mut state = self.state();
        state.own_windows.remove(&window);
        state.calls.push(DisplayCall::DestroyWindow(window));
    }

    fn select_input(&mut self, window: WindowId, mask: EventMask) {
        let mut state = self.state();
        state.event_masks.insert(window, mask);
        state.calls.push(DisplayCall::SelectInput(window, mask));
    }

    fn event_mask(&mut self, window: WindowId) -> EventMask {
        self.state()
            .event_masks
            .get(&window)
            .copied()
            .unwrap_or_default()
    }

    fn query_tree(&mut self, window: WindowId) -> Option<Vec<WindowId>> {
        Some(
            self.state()
                .window_tree
                .get(&window)
                .cloned()
                .unwrap_or_default(),
        )
    }

    fn move_window(&mut self, window: WindowId, x: i32, y: i32) {
        self.record(DisplayCall::MoveWindow(window, x, y));
    }

    fn map_raised(&mut self, window: WindowId) {
        self.record(DisplayCall::MapRaised(window));
    }

    fn unmap_window(&mut self, window: WindowId) {
        self.record(DisplayCall::Unmap(window));
    }

    fn delete_property(&mut self, window: WindowId, property: Atom) {
        self.record(DisplayCall::DeleteProperty(window, property));
    }

    fn server_time(&mut self, _window: WindowId) -> Time {
        let mut state = self.state();
        state.time += 1;
        state.time
    }

    fn push_error_trap(&mut self) {
        let mut state = self.state();
        state.trap_depth += 1;
        state.calls.push(DisplayCall::PushErrorTrap);
    }

    fn pop_error_trap(&mut self) {
        let mut state = self.state();
        state.trap_depth = state.trap_depth.saturating_sub(1);
        state.calls.push(DisplayCall::PopErrorTrap);
    }

    fn open_input_method(&mut self, window: WindowId) -> Option<EventMask> {
        let mut state = self.state();
        state.calls.push(DisplayCall::OpenInputMethod(window));
        if !state.input_method {
            return None;
        }
        state.has_ic = true;
        Some(state.input_method_mask)
    }

    fn close_input_method(&mut self) {
        let mut state = self.state();
        state.has_ic = false;
        state.calls.push(DisplayCall::CloseInputMethod);
    }

    fn has_input_context(&self) -> bool {
        self.state().has_ic
    }

    fn set_ic_focus(&mut self, focused: bool) {
        self.record(DisplayCall::SetIcFocus(focused));
    }

    fn reset_ic(&mut self) {
        self.record(DisplayCall::ResetIc);
    }

    fn filter_event(&mut self, event: &NativeEvent) -> bool {
        let state = self.state();
        match event {
            NativeEvent::KeyPress(key) | NativeEvent::KeyRelease(key) => {
                state.has_ic && state.input_method_swallows.contains(&key.keycode)
            }
            _ => false,
        }
    }

    fn lookup_keysym(&mut self, event: &KeyEvent) -> KeySym {
        self.state()
            .keysyms
            .get(&event.keycode)
            .copied()
            .unwrap_or(0)
    }

    fn lookup_keysym_im(&mut self, event: &KeyEvent) -> ImLookup {
        match self.lookup_keysym(event) {
            0 => ImLookup::Nothing,
            keysym => ImLookup::KeySym(keysym),
        }
    }

    fn auto_repeat_enabled(&mut self) -> bool {
        self.state().auto_repeat
    }

    fn set_auto_repeat(&mut self, enabled: bool) {
        let mut state = self.state();
        state.auto_repeat = enabled;
        state.calls.push(DisplayCall::SetAutoRepeat(enabled));
    }

    fn grab_keyboard(&mut self, window: WindowId) -> GrabStatus {
        let mut state = self.state();
        state.calls.push(DisplayCall::GrabKeyboard(window));
        let fallback = state.keyboard_grab_default;
        state.keyboard_grabs.pop_front().unwrap_or(fallback)
    }

    fn grab_pointer(&mut self, window: WindowId) -> GrabStatus {
        let mut state = self.state();
        state.calls.push(DisplayCall::GrabPointer(window));
        let fallback = state.pointer_grab_default;
        state.pointer_grabs.pop_front().unwrap_or(fallback)
    }

    fn ungrab_keyboard(&mut self) {
        self.record(DisplayCall::UngrabKeyboard);
    }

    fn warp_pointer(&mut self, x: i32, y: i32) {
        let mut state = self.state();
        state.calls.push(DisplayCall::Warp(x, y));
        state.pointer.x = x;
        state.pointer.y = y;
        if state.warp_generates_motion {
            let time = state.time;
            state
                .queue
                .push_back(NativeEvent::Motion(MotionEvent {
                    window: MOCK_ROOT,
                    time,
                    x_root: x,
                    y_root: y,
                    send_event: false,
                }));
        }
    }

    fn query_pointer(&mut self) -> Option<PointerState> {
        Some(self.state().pointer)
    }

    fn pointer_mapping(&mut self) -> Vec<u8> {
        self.state().pointer_mapping.clone()
    }

    fn modifier_keysyms(&mut self) -> Vec<Vec<KeySym>> {
        self.state().modifier_keysyms.clone()
    }

    fn refresh_keyboard_mapping(&mut self, _event: &MappingEvent) {
        self.record(DisplayCall::RefreshKeyboardMapping);
    }

    fn keysym_name(&mut self, keycode: KeyButton) -> Option<String> {
        self.state().keysym_names.get(&keycode).cloned()
    }

    fn fake_key(&mut self, keycode: KeyButton, press: bool) {
        self.record(DisplayCall::FakeKey(keycode, press));
    }

    fn fake_button(&mut self, button: u32, press: bool) {
        self.record(DisplayCall::FakeButton(button, press));
    }

    fn fake_motion(&mut self, x: i32, y: i32) {
        let mut state = self.state();
        state.pointer.x = x;
        state.pointer.y = y;
        state.calls.push(DisplayCall::FakeMotion(x, y));
    }

    fn xtest_grab_control(&mut self, impervious: bool) {
        self.record(DisplayCall::XTestGrabControl(impervious));
    }

    fn send_event(&mut self, window: WindowId, event: &NativeEvent) {
        let mut state = self.state();
        state.calls.push(DisplayCall::SendEvent(window, *event));
        if !state.own_windows.contains(&window) {
            return;
        }
        let delivered = match *event {
            NativeEvent::Motion(mut motion) => {
                motion.send_event = true;
                NativeEvent::Motion(motion)
            }
            NativeEvent::KeyPress(mut key) => {
                key.send_event = true;
                NativeEvent::KeyPress(key)
            }
            other => other,
        };
        state.queue.push_back(delivered);
    }

    fn flush(&mut self) {
        self.record(DisplayCall::Flush);
    }

    fn sync(&mut self) {
        self.record(DisplayCall::Sync);
    }

    fn pending(&mut self) -> usize {
        self.state().queue.len()
    }

    fn next_event(&mut self) -> Option<NativeEvent> {
        self.state().queue.pop_front()
    }

    fn peek_event(&mut self) -> Option<NativeEvent> {
        self.state().queue.front().copied()
    }

    fn check_if_event(
        &mut self,
        predicate: &mut dyn FnMut(&NativeEvent) -> bool,
    ) -> Option<NativeEvent> {
        self.state().take_first(predicate)
    }

    fn check_mask_event(&mut self, mask: EventMask) -> Option<NativeEvent> {
        self.state().take_first(|event| mask.intersects(event.mask()))
    }

    fn mask_event(&mut self, mask: EventMask) -> Option<NativeEvent> {
        self.check_mask_event(mask)
    }
}

// ── Connector and waiter ──────────────────────────────────────────────────────

/// Waiter that never blocks.
///
/// Each wait is recorded; when a [`ManualClock`] is attached, the clock is
/// moved forward by the requested timeout (or by `idle_step` for an
/// unbounded wait), so timers come due as if the loop had really slept.
#[derive(Debug, Default)]
pub struct MockWaiter {
    pub waits: Mutex<Vec<Option<Duration>>>,
    pub wakes: Mutex<usize>,
    pub clock: Option<ManualClock>,
    pub idle_step: Duration,
}

impl MockWaiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: ManualClock) -> Self {
        Self {
            clock: Some(clock),
            idle_step: Duration::from_millis(10),
            ..Self::default()
        }
    }

    pub fn wait_count(&self) -> usize {
        self.waits.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl EventWaiter for MockWaiter {
    fn wait(&self, timeout: Option<Duration>) {
        self.waits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(timeout);
        if let Some(clock) = &self.clock {
            clock.advance(timeout.unwrap_or(self.idle_step));
        }
    }

    fn wake(&self) {
        *self.wakes.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }
}

/// Connects screens to a [`MockServer`].
pub struct MockConnector {
    pub server: MockServer,
    pub waiter: Arc<MockWaiter>,
    /// When false, every connection attempt fails as if the server were
    /// down.
    pub available: bool,
    /// Display names passed to `connect`.
    pub requested: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new(server: MockServer) -> Self {
        Self::with_waiter(server, Arc::new(MockWaiter::new()))
    }

    pub fn with_waiter(server: MockServer, waiter: Arc<MockWaiter>) -> Self {
        Self {
            server,
            waiter,
            available: true,
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable(server: MockServer) -> Self {
        Self {
            available: false,
            ..Self::new(server)
        }
    }
}

impl DisplayConnector for MockConnector {
    fn connect(&self, name: &str, _receiver: Arc<dyn ScreenReceiver>) -> Option<Connection> {
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name.to_string());
        if !self.available {
            return None;
        }
        Some(Connection {
            display: Box::new(self.server.connect()),
            waiter: Arc::clone(&self.waiter) as Arc<dyn EventWaiter>,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn motion(x: i32, y: i32) -> MotionEvent {
        MotionEvent {
            window: MOCK_ROOT,
            time: 0,
            x_root: x,
            y_root: y,
            send_event: false,
        }
    }

    #[test]
    fn test_send_event_to_own_window_comes_back_marked() {
        // Arrange
        let server = MockServer::new();
        let mut display = server.connect();
        let window = display
            .create_input_window(Rect::new(0, 0, 1, 1), EventMask::LEAVE_WINDOW)
            .expect("window");

        // Act
        display.send_event(window, &NativeEvent::Motion(motion(5, 6)));

        // Assert
        match display.next_event() {
            Some(NativeEvent::Motion(event)) => assert!(event.send_event),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_send_event_to_foreign_window_is_not_delivered() {
        let server = MockServer::new();
        let mut display = server.connect();

        display.send_event(0x99, &NativeEvent::Motion(motion(5, 6)));

        assert_eq!(display.pending(), 0);
    }

    #[test]
    fn test_check_mask_event_skips_unselected_events() {
        // Arrange
        let server = MockServer::new();
        server.push_event(NativeEvent::CreateNotify { window: 7 });
        server.push_event(NativeEvent::Motion(motion(1, 1)));
        let mut display = server.connect();

        // Act
        let found = display.check_mask_event(EventMask::POINTER_MOTION);

        // Assert
        assert_eq!(found, Some(NativeEvent::Motion(motion(1, 1))));
        assert_eq!(server.queued(), 1);
    }

    #[test]
    fn test_scripted_grab_results_fall_back_to_default() {
        let server = MockServer::new();
        server.with_state(|state| {
            state.keyboard_grabs.push_back(GrabStatus::AlreadyGrabbed);
        });
        let mut display = server.connect();

        assert_eq!(display.grab_keyboard(2), GrabStatus::AlreadyGrabbed);
        assert_eq!(display.grab_keyboard(2), GrabStatus::Success);
    }

    #[test]
    fn test_dropping_display_records_close() {
        let server = MockServer::new();
        let display = server.connect();
        assert_eq!(server.connections(), 1);

        drop(display);

        assert_eq!(server.connections(), 0);
        assert_eq!(server.calls().last(), Some(&DisplayCall::Close));
    }

    #[test]
    fn test_waiter_advances_attached_clock_by_timeout() {
        use kvm_core::Clock;

        let clock = ManualClock::new();
        let waiter = MockWaiter::with_clock(clock.clone());

        waiter.wait(Some(Duration::from_millis(250)));
        waiter.wait(None);

        assert_eq!(clock.elapsed(), Duration::from_millis(260));
        assert_eq!(waiter.wait_count(), 2);
    }
}
