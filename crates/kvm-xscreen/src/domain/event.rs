//! Native event model.
//!
//! The display backend converts every raw X event it dequeues into a
//! [`NativeEvent`], and converts the few events the screen sends itself
//! (warp sentinels, the quit message) back.  Only the event kinds the
//! dispatcher acts on carry fields; everything else arrives as
//! [`NativeEvent::Other`] and is only offered to the screensaver hook.
//!
//! # Server identifiers (for beginners)
//!
//! X11 names windows, atoms and timestamps with 32-bit protocol ids that
//! Xlib widens to `unsigned long`.  They are plain numbers here; `0` is the
//! protocol's `None` for windows and atoms and `CurrentTime` for
//! timestamps.

use bitflags::bitflags;
use kvm_core::KeyButton;

/// X window id.
pub type WindowId = u64;
/// Interned X atom.
pub type Atom = u64;
/// Server timestamp in milliseconds.
pub type Time = u64;

/// The protocol's `None` window.
pub const NO_WINDOW: WindowId = 0;
/// The protocol's `None` atom.
pub const NO_ATOM: Atom = 0;
/// `CurrentTime`: let the server pick the timestamp.
pub const CURRENT_TIME: Time = 0;

// ── Event payloads ────────────────────────────────────────────────────────────

/// Key press or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub window: WindowId,
    pub time: Time,
    pub keycode: KeyButton,
    /// Native modifier and button state before the event.
    pub state: u32,
    pub send_event: bool,
}

/// Pointer button press or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub window: WindowId,
    pub time: Time,
    pub button: u32,
    pub state: u32,
}

/// Pointer motion, in root window coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionEvent {
    pub window: WindowId,
    pub time: Time,
    pub x_root: i32,
    pub y_root: i32,
    /// Set on events that came through `XSendEvent`, i.e. our own sentinels.
    pub send_event: bool,
}

/// `MappingNotify` request kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingRequest {
    Modifier,
    Keyboard,
    Pointer,
}

/// Keyboard, modifier or pointer mapping change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingEvent {
    pub request: MappingRequest,
    pub first_keycode: KeyButton,
    pub count: i32,
}

/// A decoded X event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeEvent {
    KeyPress(KeyEvent),
    KeyRelease(KeyEvent),
    ButtonPress(ButtonEvent),
    ButtonRelease(ButtonEvent),
    Motion(MotionEvent),
    CreateNotify {
        window: WindowId,
    },
    DestroyNotify {
        window: WindowId,
    },
    Mapping(MappingEvent),
    LeaveNotify {
        window: WindowId,
    },
    SelectionClear {
        selection: Atom,
        time: Time,
    },
    SelectionNotify {
        requestor: WindowId,
        property: Atom,
    },
    SelectionRequest {
        owner: WindowId,
        requestor: WindowId,
        selection: Atom,
        target: Atom,
        property: Atom,
        time: Time,
    },
    PropertyNotify {
        window: WindowId,
        atom: Atom,
        time: Time,
        deleted: bool,
    },
    ClientMessage {
        window: WindowId,
        message_type: Atom,
        format: i32,
        data: [i64; 5],
    },
    /// Any event kind the screen does not decode; `kind` is the X type code.
    Other {
        kind: i32,
    },
}

impl NativeEvent {
    /// The event-selection bit that delivers this kind of event, or empty
    /// for events that are not selected through an input mask.
    pub fn mask(&self) -> EventMask {
        match self {
            NativeEvent::KeyPress(_) => EventMask::KEY_PRESS,
            NativeEvent::KeyRelease(_) => EventMask::KEY_RELEASE,
            NativeEvent::ButtonPress(_) => EventMask::BUTTON_PRESS,
            NativeEvent::ButtonRelease(_) => EventMask::BUTTON_RELEASE,
            NativeEvent::Motion(_) => EventMask::POINTER_MOTION,
            NativeEvent::LeaveNotify { .. } => EventMask::LEAVE_WINDOW,
            NativeEvent::PropertyNotify { .. } => EventMask::PROPERTY_CHANGE,
            NativeEvent::CreateNotify { .. } => EventMask::SUBSTRUCTURE_NOTIFY,
            NativeEvent::DestroyNotify { .. } => {
                EventMask::STRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_NOTIFY
            }
            _ => EventMask::empty(),
        }
    }
}

// ── Masks and statuses ────────────────────────────────────────────────────────

bitflags! {
    /// X input selection mask (the `*Mask` constants of `X.h`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventMask: i64 {
        const KEY_PRESS           = 1 << 0;
        const KEY_RELEASE         = 1 << 1;
        const BUTTON_PRESS        = 1 << 2;
        const BUTTON_RELEASE      = 1 << 3;
        const ENTER_WINDOW        = 1 << 4;
        const LEAVE_WINDOW        = 1 << 5;
        const POINTER_MOTION      = 1 << 6;
        const KEYMAP_STATE        = 1 << 14;
        const STRUCTURE_NOTIFY    = 1 << 17;
        const SUBSTRUCTURE_NOTIFY = 1 << 19;
        const FOCUS_CHANGE        = 1 << 21;
        const PROPERTY_CHANGE     = 1 << 22;
    }
}

impl EventMask {
    /// Every device event; discarded wholesale after a warp.
    pub const INPUT: EventMask = EventMask::POINTER_MOTION
        .union(EventMask::BUTTON_PRESS)
        .union(EventMask::BUTTON_RELEASE)
        .union(EventMask::KEY_PRESS)
        .union(EventMask::KEY_RELEASE)
        .union(EventMask::KEYMAP_STATE);
}

/// Result of a keyboard or pointer grab request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrabStatus {
    Success,
    AlreadyGrabbed,
    InvalidTime,
    NotViewable,
    Frozen,
}

impl GrabStatus {
    /// Decodes the `Grab*` status codes of `X.h`.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => GrabStatus::Success,
            1 => GrabStatus::AlreadyGrabbed,
            2 => GrabStatus::InvalidTime,
            3 => GrabStatus::NotViewable,
            _ => GrabStatus::Frozen,
        }
    }
}

/// Outcome of an input-method string lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImLookup {
    /// Nothing composed yet.
    Nothing,
    /// Characters only, no keysym.
    Chars,
    KeySym(kvm_core::KeySym),
    Both(kvm_core::KeySym),
}

impl ImLookup {
    /// The keysym to translate, 0 when the input method produced none.
    pub fn keysym(self) -> kvm_core::KeySym {
        match self {
            ImLookup::KeySym(keysym) | ImLookup::Both(keysym) => keysym,
            ImLookup::Nothing | ImLookup::Chars => 0,
        }
    }
}

// ── Geometry ──────────────────────────────────────────────────────────────────

/// Axis-aligned rectangle in root window coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }
}

/// Pointer position and the native button/modifier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PointerState {
    pub x: i32,
    pub y: i32,
    pub mask: u32,
}

/// `Button1Mask` .. `Button5Mask` of the native state.
pub const ANY_BUTTON_MASK: u32 = 0x1F << 8;
