//! Shared fixture for the integration tests: a [`Screen`] wired to the
//! mock X server, with recording collaborators.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use kvm_core::{ButtonId, ClipboardId, KeyButton, KeyId, KeyModifierMask, ManualClock};
use mockall::mock;

use kvm_xscreen::domain::event::{
    Atom, ButtonEvent, KeyEvent, MotionEvent, NativeEvent, Time, WindowId,
};
use kvm_xscreen::infrastructure::display::mock::{MockConnector, MockServer, MockWaiter, MOCK_ROOT};
use kvm_xscreen::infrastructure::passive::LockKeyState;
use kvm_xscreen::{
    ClipboardSlot, KeyState, PrimaryScreenReceiver, Screen, ScreenParts, ScreenReceiver,
    ScreenRole, ScreenSaver, SubsystemFactory,
};

// ── Screen receiver (mockall) ─────────────────────────────────────────────────

mock! {
    pub Receiver {}

    impl ScreenReceiver for Receiver {
        fn on_error(&self);
        fn on_grab_clipboard(&self, id: ClipboardId);
    }
}

/// A receiver that accepts any number of notifications.
pub fn quiet_receiver() -> Arc<dyn ScreenReceiver> {
    let mut receiver = MockReceiver::new();
    receiver.expect_on_error().return_const(());
    receiver.expect_on_grab_clipboard().return_const(());
    Arc::new(receiver)
}

// ── Primary receiver (recording) ──────────────────────────────────────────────

/// One notification a primary screen sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    KeyDown(KeyId, KeyModifierMask, KeyButton),
    KeyUp(KeyId, KeyModifierMask, KeyButton),
    KeyRepeat(KeyId, KeyModifierMask, i32, KeyButton),
    MouseDown(ButtonId),
    MouseUp(ButtonId),
    MovePrimary(i32, i32),
    MoveSecondary(i32, i32),
    Wheel(i32),
    ScreenSaver(bool),
    OneShot(u32),
}

#[derive(Debug, Default)]
pub struct RecordingPrimary {
    inputs: Mutex<Vec<Input>>,
}

impl RecordingPrimary {
    pub fn inputs(&self) -> Vec<Input> {
        self.inputs.lock().expect("lock").clone()
    }

    pub fn take(&self) -> Vec<Input> {
        std::mem::take(&mut *self.inputs.lock().expect("lock"))
    }

    fn push(&self, input: Input) {
        self.inputs.lock().expect("lock").push(input);
    }
}

impl PrimaryScreenReceiver for RecordingPrimary {
    fn on_key_down(&self, key: KeyId, mask: KeyModifierMask, button: KeyButton) {
        self.push(Input::KeyDown(key, mask, button));
    }

    fn on_key_up(&self, key: KeyId, mask: KeyModifierMask, button: KeyButton) {
        self.push(Input::KeyUp(key, mask, button));
    }

    fn on_key_repeat(&self, key: KeyId, mask: KeyModifierMask, count: i32, button: KeyButton) {
        self.push(Input::KeyRepeat(key, mask, count, button));
    }

    fn on_mouse_down(&self, button: ButtonId) {
        self.push(Input::MouseDown(button));
    }

    fn on_mouse_up(&self, button: ButtonId) {
        self.push(Input::MouseUp(button));
    }

    fn on_mouse_move_primary(&self, x: i32, y: i32) {
        self.push(Input::MovePrimary(x, y));
    }

    fn on_mouse_move_secondary(&self, dx: i32, dy: i32) {
        self.push(Input::MoveSecondary(dx, dy));
    }

    fn on_mouse_wheel(&self, delta: i32) {
        self.push(Input::Wheel(delta));
    }

    fn on_screensaver(&self, activated: bool) {
        self.push(Input::ScreenSaver(activated));
    }

    fn on_one_shot_timer_expired(&self, id: u32) {
        self.push(Input::OneShot(id));
    }
}

// ── Clipboard slots and screensaver (recording) ───────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotCall {
    Open(ClipboardId, Time),
    Empty(ClipboardId),
    Close(ClipboardId),
    Lost(ClipboardId, Time),
    AddRequest {
        id: ClipboardId,
        requestor: WindowId,
        target: Atom,
        property: Atom,
    },
    Process(ClipboardId, WindowId),
    Destroy(ClipboardId, WindowId),
}

pub type Log<T> = Arc<Mutex<Vec<T>>>;

/// Records every call; serves the requestors it was asked about.
pub struct RecordingSlot {
    id: ClipboardId,
    window: WindowId,
    selection: Atom,
    requestors: HashSet<WindowId>,
    log: Log<SlotCall>,
}

impl ClipboardSlot for RecordingSlot {
    fn open(&mut self, time: Time) -> bool {
        self.log.lock().expect("lock").push(SlotCall::Open(self.id, time));
        true
    }

    fn empty(&mut self) {
        self.log.lock().expect("lock").push(SlotCall::Empty(self.id));
    }

    fn close(&mut self) {
        self.log.lock().expect("lock").push(SlotCall::Close(self.id));
    }

    fn lost(&mut self, time: Time) {
        self.log.lock().expect("lock").push(SlotCall::Lost(self.id, time));
    }

    fn add_request(
        &mut self,
        _owner: WindowId,
        requestor: WindowId,
        target: Atom,
        _time: Time,
        property: Atom,
    ) {
        self.requestors.insert(requestor);
        self.log.lock().expect("lock").push(SlotCall::AddRequest {
            id: self.id,
            requestor,
            target,
            property,
        });
    }

    fn process_request(&mut self, requestor: WindowId, _time: Time, _property: Atom) -> bool {
        if !self.requestors.contains(&requestor) {
            return false;
        }
        self.log
            .lock()
            .expect("lock")
            .push(SlotCall::Process(self.id, requestor));
        true
    }

    fn destroy_request(&mut self, requestor: WindowId) -> bool {
        if !self.requestors.remove(&requestor) {
            return false;
        }
        self.log
            .lock()
            .expect("lock")
            .push(SlotCall::Destroy(self.id, requestor));
        true
    }

    fn selection(&self) -> Atom {
        self.selection
    }

    fn window(&self) -> WindowId {
        self.window
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaverCall {
    SetNotify(Option<WindowId>),
    Enable,
    Disable,
    Activate,
    Deactivate,
    PreDispatch(NativeEvent),
}

pub struct RecordingSaver {
    log: Log<SaverCall>,
}

impl RecordingSaver {
    fn push(&self, call: SaverCall) {
        self.log.lock().expect("lock").push(call);
    }
}

impl ScreenSaver for RecordingSaver {
    fn set_notify(&mut self, window: Option<WindowId>) {
        self.push(SaverCall::SetNotify(window));
    }

    fn enable(&mut self) {
        self.push(SaverCall::Enable);
    }

    fn disable(&mut self) {
        self.push(SaverCall::Disable);
    }

    fn activate(&mut self) {
        self.push(SaverCall::Activate);
    }

    fn deactivate(&mut self) {
        self.push(SaverCall::Deactivate);
    }

    fn on_pre_dispatch(&mut self, event: &NativeEvent) -> bool {
        self.push(SaverCall::PreDispatch(*event));
        false
    }
}

pub struct RecordingFactory {
    slots: Log<SlotCall>,
    saver: Log<SaverCall>,
}

impl SubsystemFactory for RecordingFactory {
    fn create_clipboard(
        &self,
        id: ClipboardId,
        window: WindowId,
        selection: Atom,
    ) -> Box<dyn ClipboardSlot> {
        Box::new(RecordingSlot {
            id,
            window,
            selection,
            requestors: HashSet::new(),
            log: Arc::clone(&self.slots),
        })
    }

    fn create_screensaver(&self, _window: WindowId) -> Box<dyn ScreenSaver> {
        Box::new(RecordingSaver {
            log: Arc::clone(&self.saver),
        })
    }
}

// ── Key state ─────────────────────────────────────────────────────────────────

/// Evdev lock-key state that counts its refreshes.
pub struct CountingKeyState {
    inner: LockKeyState,
    updates: Arc<AtomicUsize>,
}

impl KeyState for CountingKeyState {
    fn mask_for_key(&self, keycode: KeyButton) -> KeyModifierMask {
        self.inner.mask_for_key(keycode)
    }

    fn is_half_duplex(&self, mask: KeyModifierMask) -> bool {
        self.inner.is_half_duplex(mask)
    }

    fn update_keys(&mut self) {
        self.updates.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Fixture ───────────────────────────────────────────────────────────────────

pub const CAPS_LOCK_KEYCODE: KeyButton = 66;
pub const XK_CAPS_LOCK: u32 = 0xFFE5;
pub const XK_PAUSE: u32 = 0xFF13;
pub const XK_A: u32 = 0x61;

/// Control (bit 2) and Mod1 (bit 3) in a native state word.
pub const CONTROL_ALT_STATE: u32 = (1 << 2) | (1 << 3);

pub struct Fixture {
    pub server: MockServer,
    pub waiter: Arc<MockWaiter>,
    pub clock: ManualClock,
    pub input: Arc<RecordingPrimary>,
    pub slots: Log<SlotCall>,
    pub saver: Log<SaverCall>,
    pub key_updates: Arc<AtomicUsize>,
}

impl Fixture {
    pub fn new() -> Self {
        let clock = ManualClock::new();
        Self {
            server: MockServer::new(),
            waiter: Arc::new(MockWaiter::with_clock(clock.clone())),
            clock,
            input: Arc::new(RecordingPrimary::default()),
            slots: Log::default(),
            saver: Log::default(),
            key_updates: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn connector(&self) -> Arc<MockConnector> {
        Arc::new(MockConnector::with_waiter(
            self.server.clone(),
            Arc::clone(&self.waiter),
        ))
    }

    /// A closed screen in `role` reporting to `receiver`.
    pub fn screen_with(&self, role: ScreenRole, receiver: Arc<dyn ScreenReceiver>) -> Screen {
        self.screen_through(role, receiver, self.connector())
    }

    pub fn screen_through(
        &self,
        role: ScreenRole,
        receiver: Arc<dyn ScreenReceiver>,
        connector: Arc<MockConnector>,
    ) -> Screen {
        let primary_receiver = (role == ScreenRole::Primary)
            .then(|| Arc::clone(&self.input) as Arc<dyn PrimaryScreenReceiver>);
        Screen::with_clock(
            ":7",
            ScreenParts {
                receiver,
                primary_receiver,
                connector,
                subsystems: Box::new(RecordingFactory {
                    slots: Arc::clone(&self.slots),
                    saver: Arc::clone(&self.saver),
                }),
            },
            Box::new(self.clock.clone()),
        )
    }

    pub fn key_state(&self) -> Box<dyn KeyState> {
        Box::new(CountingKeyState {
            inner: LockKeyState::evdev(),
            updates: Arc::clone(&self.key_updates),
        })
    }

    /// An open screen in `role`, with the opening requests forgotten.
    pub fn open(&self, role: ScreenRole) -> Screen {
        let screen = self.screen_with(role, quiet_receiver());
        screen.open(self.key_state()).expect("open");
        self.server.take_calls();
        screen
    }

    pub fn key_updates(&self) -> usize {
        self.key_updates.load(Ordering::SeqCst)
    }

    pub fn slot_calls(&self) -> Vec<SlotCall> {
        self.slots.lock().expect("lock").clone()
    }

    pub fn saver_calls(&self) -> Vec<SaverCall> {
        self.saver.lock().expect("lock").clone()
    }
}

/// Dispatches everything queued so far, then returns.
pub fn pump(screen: &Screen) {
    screen.exit_main_loop().expect("exit_main_loop");
    screen.main_loop().expect("main_loop");
}

// ── Event builders ────────────────────────────────────────────────────────────

pub fn key(keycode: KeyButton, time: Time, state: u32) -> KeyEvent {
    KeyEvent {
        window: MOCK_ROOT,
        time,
        keycode,
        state,
        send_event: false,
    }
}

pub fn button(button: u32) -> ButtonEvent {
    ButtonEvent {
        window: MOCK_ROOT,
        time: 0,
        button,
        state: 0,
    }
}

pub fn motion(x: i32, y: i32) -> NativeEvent {
    NativeEvent::Motion(MotionEvent {
        window: MOCK_ROOT,
        time: 0,
        x_root: x,
        y_root: y,
        send_event: false,
    })
}
