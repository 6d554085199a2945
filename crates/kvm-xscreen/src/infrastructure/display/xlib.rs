//! Xlib backend for [`XDisplay`].
//!
//! Every call here is a thin wrapper over one or two Xlib requests.  The
//! only logic is the conversion between raw `XEvent` unions and
//! [`NativeEvent`], the input-method setup and the error-trap stack.
//!
//! # Safety (for beginners)
//!
//! Xlib is a C library; every call is `unsafe`.  The invariants this module
//! relies on:
//!
//! - `display` is a live connection from `XOpenDisplay` until `Drop`.
//! - An [`XlibDisplay`] is only used by one thread at a time.  The screen
//!   keeps it behind its main mutex, which is why the type may be `Send`.
//! - Structures Xlib allocates (`XQueryTree` children, Xinerama screens,
//!   IM styles, the modifier map) are freed with the matching Xlib call
//!   before the wrapper returns.

use std::ffi::{c_char, c_int, c_long, c_uint, c_ulong, c_ushort, c_void, CStr, CString};
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::os::unix::net::UnixStream;
use std::ptr;
use std::sync::Arc;
use std::time::Duration;

use kvm_core::{KeyButton, KeySym};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::{debug, warn};
use x11::{xinerama, xlib, xtest};

use super::{Connection, DisplayConnector, EventWaiter, XDisplay};
use crate::domain::collaborators::ScreenReceiver;
use crate::domain::event::{
    Atom, ButtonEvent, EventMask, GrabStatus, ImLookup, KeyEvent, MappingEvent, MappingRequest,
    MotionEvent, NativeEvent, PointerState, Rect, Time, WindowId, CURRENT_TIME,
};
use crate::infrastructure::fatal;

// ── Input method names ────────────────────────────────────────────────────────

const XN_QUERY_INPUT_STYLE: &[u8] = b"queryInputStyle\0";
const XN_INPUT_STYLE: &[u8] = b"inputStyle\0";
const XN_CLIENT_WINDOW: &[u8] = b"clientWindow\0";
const XN_FOCUS_WINDOW: &[u8] = b"focusWindow\0";
const XN_FILTER_EVENTS: &[u8] = b"filterEvents\0";

const XIM_PREEDIT_NOTHING: c_ulong = 0x0008;
const XIM_STATUS_NOTHING: c_ulong = 0x0400;
const XIM_STATUS_NONE: c_ulong = 0x0800;

// ── Xlib declarations missing from the `x11` crate ────────────────────────────

/// `XErrorHandler` from Xlib.h, as `XSetErrorHandler` takes and returns it.
type XErrorHandler =
    Option<unsafe extern "C" fn(*mut xlib::Display, *mut xlib::XErrorEvent) -> c_int>;

/// `XIMStyles` from Xlib.h.
#[repr(C)]
struct XIMStyles {
    count_styles: c_ushort,
    supported_styles: *mut c_ulong,
}

/// `QueuedAfterReading` mode for `XEventsQueued`.
const QUEUED_AFTER_READING: c_int = 1;

/// Property appended to for a fresh server timestamp.
const TIMESTAMP_ATOM: &str = "KVM_XSCREEN_TIMESTAMP";

fn c_name(name: &[u8]) -> *const c_char {
    name.as_ptr().cast()
}

fn xbool(value: bool) -> xlib::Bool {
    if value {
        xlib::True
    } else {
        xlib::False
    }
}

// ── Connector ─────────────────────────────────────────────────────────────────

/// Opens real X connections.
#[derive(Debug, Default)]
pub struct XlibConnector;

impl DisplayConnector for XlibConnector {
    fn connect(&self, name: &str, receiver: Arc<dyn ScreenReceiver>) -> Option<Connection> {
        let c_display = CString::new(name).ok()?;
        // SAFETY: `c_display` is a valid NUL-terminated string.
        let display = unsafe { xlib::XOpenDisplay(c_display.as_ptr()) };
        if display.is_null() {
            return None;
        }

        // SAFETY: `display` is live; the handler never returns.
        let fd = unsafe {
            xlib::XSetIOErrorHandler(Some(on_display_lost));
            xlib::XConnectionNumber(display)
        };
        fatal::register(receiver);

        // The display owns the connection from here on; dropping it undoes
        // the registration above.
        let display = XlibDisplay::new(display);
        // SAFETY: `display` keeps `fd` open for the length of this call.
        let waiter = match XlibWaiter::new(unsafe { BorrowedFd::borrow_raw(fd) }) {
            Ok(waiter) => waiter,
            Err(e) => {
                warn!("cannot create event waiter: {e}");
                return None;
            }
        };
        Some(Connection {
            display: Box::new(display),
            waiter: Arc::new(waiter),
        })
    }
}

unsafe extern "C" fn on_display_lost(_display: *mut xlib::Display) -> c_int {
    let code = fatal::report_display_lost();
    std::process::exit(code)
}

unsafe extern "C" fn ignore_protocol_error(
    _display: *mut xlib::Display,
    _error: *mut xlib::XErrorEvent,
) -> c_int {
    0
}

// ── Waiter ────────────────────────────────────────────────────────────────────

/// Polls the X connection together with a socket pair used for wake-ups.
///
/// The waiter holds its own duplicate of the connection fd, so closing the
/// display while a wait is in progress never leaves `poll` on a stale or
/// reused descriptor.
pub struct XlibWaiter {
    connection: OwnedFd,
    wake_rx: UnixStream,
    wake_tx: UnixStream,
}

impl XlibWaiter {
    fn new(connection: BorrowedFd<'_>) -> io::Result<Self> {
        let connection = connection.try_clone_to_owned()?;
        let (wake_rx, wake_tx) = UnixStream::pair()?;
        wake_rx.set_nonblocking(true)?;
        wake_tx.set_nonblocking(true)?;
        Ok(Self {
            connection,
            wake_rx,
            wake_tx,
        })
    }

    fn drain_wakeups(&self) {
        let mut buf = [0u8; 64];
        while matches!((&self.wake_rx).read(&mut buf), Ok(n) if n > 0) {}
    }
}

/// Size to retry `XmbLookupString` with, or `None` when the lookup is done.
/// On overflow the return value is the size the text needs.
fn lookup_buffer_len(status: xlib::Status, returned: c_int, current: usize) -> Option<usize> {
    let needed = usize::try_from(returned).ok()?;
    (status == xlib::XBufferOverflow && needed > current).then_some(needed)
}

fn poll_timeout(timeout: Option<Duration>) -> PollTimeout {
    match timeout {
        None => PollTimeout::NONE,
        Some(timeout) => {
            // Round up so a sub-millisecond remainder does not spin.
            let millis = timeout.as_nanos().div_ceil(1_000_000);
            i32::try_from(millis)
                .ok()
                .and_then(|millis| PollTimeout::try_from(millis).ok())
                .unwrap_or(PollTimeout::MAX)
        }
    }
}

impl EventWaiter for XlibWaiter {
    fn wait(&self, timeout: Option<Duration>) {
        let mut fds = [
            PollFd::new(self.connection.as_fd(), PollFlags::POLLIN),
            PollFd::new(self.wake_rx.as_fd(), PollFlags::POLLIN),
        ];
        match poll(&mut fds, poll_timeout(timeout)) {
            Ok(_) | Err(Errno::EINTR) => {}
            Err(e) => warn!("poll on display connection failed: {e}"),
        }
        self.drain_wakeups();
    }

    fn wake(&self) {
        // A full socket already holds a pending wake-up.
        let _ = (&self.wake_tx).write(&[1]);
    }
}

// ── Display ───────────────────────────────────────────────────────────────────

/// One Xlib connection.
pub struct XlibDisplay {
    display: *mut xlib::Display,
    root: xlib::Window,
    screen: c_int,
    blank_cursor: xlib::Cursor,
    im: xlib::XIM,
    ic: xlib::XIC,
    /// Raw form of the last dequeued event, for the input method.
    last_event: Option<xlib::XEvent>,
    /// Handlers replaced by nested error traps.
    error_traps: Vec<XErrorHandler>,
    timestamp_atom: Atom,
}

// SAFETY: only used by one thread at a time, under the screen's main lock.
unsafe impl Send for XlibDisplay {}

impl XlibDisplay {
    fn new(display: *mut xlib::Display) -> Self {
        // SAFETY: `display` is a live connection.
        let (root, screen) = unsafe {
            (
                xlib::XDefaultRootWindow(display),
                xlib::XDefaultScreen(display),
            )
        };
        Self {
            display,
            root,
            screen,
            blank_cursor: 0,
            im: ptr::null_mut(),
            ic: ptr::null_mut(),
            last_event: None,
            error_traps: Vec::new(),
            timestamp_atom: 0,
        }
    }

    fn blank_cursor(&mut self) -> xlib::Cursor {
        if self.blank_cursor != 0 {
            return self.blank_cursor;
        }
        // SAFETY: the bitmap is sized from the server's own answer and freed
        // once the cursor holds it.
        unsafe {
            let (mut width, mut height) = (1 as c_uint, 1 as c_uint);
            xlib::XQueryBestCursor(self.display, self.root, 1, 1, &mut width, &mut height);
            let data = vec![0u8; ((width as usize + 7) / 8) * height as usize];
            let bitmap = xlib::XCreateBitmapFromData(
                self.display,
                self.root,
                data.as_ptr().cast(),
                width,
                height,
            );
            let mut color: xlib::XColor = std::mem::zeroed();
            self.blank_cursor = xlib::XCreatePixmapCursor(
                self.display,
                bitmap,
                bitmap,
                &mut color,
                &mut color,
                0,
                0,
            );
            xlib::XFreePixmap(self.display, bitmap);
        }
        self.blank_cursor
    }

    fn raw_key_event(&self, event: &KeyEvent, kind: c_int) -> xlib::XKeyEvent {
        // SAFETY: every field of XKeyEvent is plain data.
        let mut raw: xlib::XKeyEvent = unsafe { std::mem::zeroed() };
        raw.type_ = kind;
        raw.send_event = xbool(event.send_event);
        raw.display = self.display;
        raw.window = event.window as xlib::Window;
        raw.root = self.root;
        raw.time = event.time as xlib::Time;
        raw.state = event.state as c_uint;
        raw.keycode = event.keycode as c_uint;
        raw.same_screen = xlib::True;
        raw
    }

    /// Converts an event the screen sends back into its raw form.
    fn to_raw(&self, event: &NativeEvent) -> xlib::XEvent {
        match *event {
            NativeEvent::KeyPress(key) => self.raw_key_event(&key, xlib::KeyPress).into(),
            NativeEvent::KeyRelease(key) => self.raw_key_event(&key, xlib::KeyRelease).into(),
            NativeEvent::Motion(motion) => {
                // SAFETY: plain data.
                let mut raw: xlib::XMotionEvent = unsafe { std::mem::zeroed() };
                raw.type_ = xlib::MotionNotify;
                raw.send_event = xbool(motion.send_event);
                raw.display = self.display;
                raw.window = motion.window as xlib::Window;
                raw.root = self.root;
                raw.time = motion.time as xlib::Time;
                raw.x = motion.x_root;
                raw.y = motion.y_root;
                raw.x_root = motion.x_root;
                raw.y_root = motion.y_root;
                raw.same_screen = xlib::True;
                raw.into()
            }
            NativeEvent::ClientMessage {
                window,
                message_type,
                format,
                data,
            } => {
                // SAFETY: plain data.
                let mut raw: xlib::XClientMessageEvent = unsafe { std::mem::zeroed() };
                raw.type_ = xlib::ClientMessage;
                raw.display = self.display;
                raw.window = window as xlib::Window;
                raw.message_type = message_type as xlib::Atom;
                raw.format = format;
                for (i, value) in data.iter().enumerate() {
                    raw.data.set_long(i, *value as c_long);
                }
                raw.into()
            }
            ref other => {
                // SAFETY: plain data.
                let mut raw: xlib::XAnyEvent = unsafe { std::mem::zeroed() };
                raw.type_ = event_type(other);
                raw.display = self.display;
                raw.into()
            }
        }
    }

    /// The raw event `event` was converted from, if it was the last one
    /// dequeued; otherwise a reconstruction.
    fn raw_for(&self, event: &NativeEvent) -> xlib::XEvent {
        match self.last_event {
            Some(raw) if from_raw(&raw) == *event => raw,
            _ => self.to_raw(event),
        }
    }

    fn timestamp_atom(&mut self) -> Atom {
        if self.timestamp_atom == 0 {
            self.timestamp_atom = self.intern_atom(TIMESTAMP_ATOM);
        }
        self.timestamp_atom
    }

    fn keysym_for(&self, keycode: KeyButton) -> Option<xlib::KeySym> {
        let keycode = u8::try_from(keycode).ok().filter(|&k| k != 0)?;
        // SAFETY: `display` is live.
        let keysym = unsafe { xlib::XkbKeycodeToKeysym(self.display, keycode, 0, 0) };
        (keysym != 0).then_some(keysym)
    }

    fn try_input_method(&mut self, window: WindowId) -> Option<EventMask> {
        // SAFETY: every pointer handed to the variadic IM calls is either a
        // NUL-terminated name, an out-parameter of the type the name
        // documents, or the terminating null.
        unsafe {
            self.im = xlib::XOpenIM(
                self.display,
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
            );
            if self.im.is_null() {
                debug!("no input method");
                return None;
            }

            let mut styles: *mut XIMStyles = ptr::null_mut();
            let failed = xlib::XGetIMValues(
                self.im,
                c_name(XN_QUERY_INPUT_STYLE),
                &mut styles as *mut *mut XIMStyles,
                ptr::null_mut::<c_void>(),
            );
            if !failed.is_null() || styles.is_null() {
                debug!("cannot query input method styles");
                return None;
            }
            let supported = std::slice::from_raw_parts(
                (*styles).supported_styles,
                usize::from((*styles).count_styles),
            );
            let style = supported.iter().copied().find(|&style| {
                style == XIM_PREEDIT_NOTHING | XIM_STATUS_NOTHING
                    || style == XIM_PREEDIT_NOTHING | XIM_STATUS_NONE
            });
            xlib::XFree(styles.cast());
            let Some(style) = style else {
                debug!("input method has no usable style");
                return None;
            };

            let window = window as xlib::Window;
            self.ic = xlib::XCreateIC(
                self.im,
                c_name(XN_INPUT_STYLE),
                style,
                c_name(XN_CLIENT_WINDOW),
                window,
                c_name(XN_FOCUS_WINDOW),
                window,
                ptr::null_mut::<c_void>(),
            );
            if self.ic.is_null() {
                debug!("cannot create input context");
                return None;
            }

            let mut mask: c_long = 0;
            let failed = xlib::XGetICValues(
                self.ic,
                c_name(XN_FILTER_EVENTS),
                &mut mask as *mut c_long,
                ptr::null_mut::<c_void>(),
            );
            if !failed.is_null() {
                debug!("cannot query input context events");
                return None;
            }
            Some(EventMask::from_bits_truncate(mask as i64))
        }
    }
}

impl Drop for XlibDisplay {
    fn drop(&mut self) {
        self.close_input_method();
        fatal::unregister();
        // SAFETY: `display` is live until XCloseDisplay.
        unsafe {
            if self.blank_cursor != 0 {
                xlib::XFreeCursor(self.display, self.blank_cursor);
            }
            xlib::XSetIOErrorHandler(None);
            xlib::XCloseDisplay(self.display);
        }
    }
}

impl XDisplay for XlibDisplay {
    fn query_extension(&mut self, name: &str) -> bool {
        let Ok(name) = CString::new(name) else {
            return false;
        };
        let (mut opcode, mut event, mut error) = (0, 0, 0);
        // SAFETY: valid name and out-parameters.
        unsafe {
            xlib::XQueryExtension(
                self.display,
                name.as_ptr(),
                &mut opcode,
                &mut event,
                &mut error,
            ) != 0
        }
    }

    fn root_window(&self) -> WindowId {
        self.root as WindowId
    }

    fn screen_size(&self) -> (i32, i32) {
        // SAFETY: `display` is live.
        unsafe {
            (
                xlib::XDisplayWidth(self.display, self.screen),
                xlib::XDisplayHeight(self.display, self.screen),
            )
        }
    }

    fn xinerama_screens(&mut self) -> Vec<Rect> {
        // SAFETY: the screen array is copied out and freed.
        unsafe {
            let (mut event, mut error) = (0, 0);
            if xinerama::XineramaQueryExtension(self.display, &mut event, &mut error) == 0
                || xinerama::XineramaIsActive(self.display) == 0
            {
                return Vec::new();
            }
            let mut count: c_int = 0;
            let screens = xinerama::XineramaQueryScreens(self.display, &mut count);
            if screens.is_null() {
                return Vec::new();
            }
            let rects = std::slice::from_raw_parts(screens, count.max(0) as usize)
                .iter()
                .map(|s| {
                    Rect::new(
                        i32::from(s.x_org),
                        i32::from(s.y_org),
                        i32::from(s.width),
                        i32::from(s.height),
                    )
                })
                .collect();
            xlib::XFree(screens.cast());
            rects
        }
    }

    fn intern_atom(&mut self, name: &str) -> Atom {
        let Ok(name) = CString::new(name) else {
            return 0;
        };
        // SAFETY: valid name.
        unsafe { xlib::XInternAtom(self.display, name.as_ptr(), xlib::False) as Atom }
    }

    fn create_input_window(&mut self, rect: Rect, mask: EventMask) -> Option<WindowId> {
        let cursor = self.blank_cursor();
        // SAFETY: the attributes are fully initialized for the value mask.
        let window = unsafe {
            let mut attrs: xlib::XSetWindowAttributes = std::mem::zeroed();
            attrs.do_not_propagate_mask = 0;
            attrs.override_redirect = xlib::True;
            attrs.cursor = cursor;
            attrs.event_mask = mask.bits() as c_long;
            xlib::XCreateWindow(
                self.display,
                self.root,
                rect.x,
                rect.y,
                rect.width.max(1) as c_uint,
                rect.height.max(1) as c_uint,
                0,
                0,
                xlib::InputOnly as c_uint,
                ptr::null_mut(),
                xlib::CWDontPropagate | xlib::CWEventMask | xlib::CWOverrideRedirect | xlib::CWCursor,
                &mut attrs,
            )
        };
        (window != 0).then_some(window as WindowId)
    }

    fn destroy_window(&mut self, window: WindowId) {
        // SAFETY: `display` is live.
        unsafe {
            xlib::XDestroyWindow(self.display, window as xlib::Window);
        }
    }

    fn select_input(&mut self, window: WindowId, mask: EventMask) {
        // SAFETY: `display` is live.
        unsafe {
            xlib::XSelectInput(self.display, window as xlib::Window, mask.bits() as c_long);
        }
    }

    fn event_mask(&mut self, window: WindowId) -> EventMask {
        // SAFETY: plain-data out-parameter.
        unsafe {
            let mut attrs: xlib::XWindowAttributes = std::mem::zeroed();
            if xlib::XGetWindowAttributes(self.display, window as xlib::Window, &mut attrs) == 0 {
                return EventMask::empty();
            }
            EventMask::from_bits_truncate(attrs.your_event_mask as i64)
        }
    }

    fn query_tree(&mut self, window: WindowId) -> Option<Vec<WindowId>> {
        // SAFETY: the child array is copied out and freed.
        unsafe {
            let (mut root, mut parent) = (0, 0);
            let mut children: *mut xlib::Window = ptr::null_mut();
            let mut count: c_uint = 0;
            if xlib::XQueryTree(
                self.display,
                window as xlib::Window,
                &mut root,
                &mut parent,
                &mut children,
                &mut count,
            ) == 0
            {
                return None;
            }
            if children.is_null() {
                return Some(Vec::new());
            }
            let list = std::slice::from_raw_parts(children, count as usize)
                .iter()
                .map(|&w| w as WindowId)
                .collect();
            xlib::XFree(children.cast());
            Some(list)
        }
    }

    fn move_window(&mut self, window: WindowId, x: i32, y: i32) {
        // SAFETY: `display` is live.
        unsafe {
            xlib::XMoveWindow(self.display, window as xlib::Window, x, y);
        }
    }

    fn map_raised(&mut self, window: WindowId) {
        // SAFETY: `display` is live.
        unsafe {
            xlib::XMapRaised(self.display, window as xlib::Window);
        }
    }

    fn unmap_window(&mut self, window: WindowId) {
        // SAFETY: `display` is live.
        unsafe {
            xlib::XUnmapWindow(self.display, window as xlib::Window);
        }
    }

    fn delete_property(&mut self, window: WindowId, property: Atom) {
        // SAFETY: `display` is live.
        unsafe {
            xlib::XDeleteProperty(
                self.display,
                window as xlib::Window,
                property as xlib::Atom,
            );
        }
    }

    fn server_time(&mut self, window: WindowId) -> Time {
        let atom = self.timestamp_atom();
        let previous = self.event_mask(window);
        self.select_input(window, previous | EventMask::PROPERTY_CHANGE);

        let mut target = (window as xlib::Window, atom as xlib::Atom);
        // SAFETY: a zero-length append changes nothing but still produces
        // the PropertyNotify we wait for; `target` outlives XIfEvent.
        let time = unsafe {
            let data: u8 = 0;
            xlib::XChangeProperty(
                self.display,
                window as xlib::Window,
                atom as xlib::Atom,
                xlib::XA_INTEGER,
                8,
                xlib::PropModeAppend,
                &data,
                0,
            );
            let mut event: xlib::XEvent = std::mem::zeroed();
            xlib::XIfEvent(
                self.display,
                &mut event,
                Some(is_timestamp_event),
                (&mut target as *mut (xlib::Window, xlib::Atom)).cast(),
            );
            xlib::XPropertyEvent::from(event).time as Time
        };

        self.select_input(window, previous);
        time
    }

    fn push_error_trap(&mut self) {
        // SAFETY: `display` is live; handlers are process-wide.
        let previous = unsafe {
            xlib::XSync(self.display, xlib::False);
            xlib::XSetErrorHandler(Some(ignore_protocol_error))
        };
        self.error_traps.push(previous);
    }

    fn pop_error_trap(&mut self) {
        let Some(previous) = self.error_traps.pop() else {
            warn!("unbalanced error trap");
            return;
        };
        // SAFETY: as for push.
        unsafe {
            xlib::XSync(self.display, xlib::False);
            xlib::XSetErrorHandler(previous);
        }
    }

    fn open_input_method(&mut self, window: WindowId) -> Option<EventMask> {
        let mask = self.try_input_method(window);
        if mask.is_none() {
            self.close_input_method();
        }
        mask
    }

    fn close_input_method(&mut self) {
        // SAFETY: the handles are live until nulled here.
        unsafe {
            if !self.ic.is_null() {
                xlib::XDestroyIC(self.ic);
                self.ic = ptr::null_mut();
            }
            if !self.im.is_null() {
                xlib::XCloseIM(self.im);
                self.im = ptr::null_mut();
            }
        }
    }

    fn has_input_context(&self) -> bool {
        !self.ic.is_null()
    }

    fn set_ic_focus(&mut self, focused: bool) {
        if self.ic.is_null() {
            return;
        }
        // SAFETY: `ic` is live.
        unsafe {
            if focused {
                xlib::XSetICFocus(self.ic);
            } else {
                xlib::XUnsetICFocus(self.ic);
            }
        }
    }

    fn reset_ic(&mut self) {
        if self.ic.is_null() {
            return;
        }
        // SAFETY: the returned string is ours to free.
        unsafe {
            let pending = xlib::XmbResetIC(self.ic);
            if !pending.is_null() {
                xlib::XFree(pending.cast());
            }
        }
    }

    fn filter_event(&mut self, event: &NativeEvent) -> bool {
        if self.ic.is_null() {
            return false;
        }
        let mut raw = self.raw_for(event);
        // SAFETY: `raw` is a complete event.
        unsafe { xlib::XFilterEvent(&mut raw, 0) != 0 }
    }

    fn lookup_keysym(&mut self, event: &KeyEvent) -> KeySym {
        let mut raw = self.raw_key_event(event, xlib::KeyPress);
        let mut keysym: xlib::KeySym = 0;
        let mut buf = [0 as c_char; 32];
        // SAFETY: buffer length matches; compose status may be null.
        unsafe {
            xlib::XLookupString(
                &mut raw,
                buf.as_mut_ptr(),
                buf.len() as c_int,
                &mut keysym,
                ptr::null_mut(),
            );
        }
        keysym as KeySym
    }

    fn lookup_keysym_im(&mut self, event: &KeyEvent) -> ImLookup {
        if self.ic.is_null() {
            return ImLookup::KeySym(self.lookup_keysym(event));
        }
        let mut raw = match self.raw_for(&NativeEvent::KeyPress(*event)) {
            raw if raw.get_type() == xlib::KeyPress => xlib::XKeyEvent::from(raw),
            _ => self.raw_key_event(event, xlib::KeyPress),
        };
        let mut keysym: xlib::KeySym = 0;
        let mut status: xlib::Status = 0;
        let mut buf = vec![0 as c_char; 64];
        loop {
            // SAFETY: buffer length matches.
            let needed = unsafe {
                xlib::XmbLookupString(
                    self.ic,
                    &mut raw,
                    buf.as_mut_ptr(),
                    buf.len() as c_int,
                    &mut keysym,
                    &mut status,
                )
            };
            match lookup_buffer_len(status, needed, buf.len()) {
                Some(len) => buf.resize(len, 0),
                None => break,
            }
        }
        let keysym = keysym as KeySym;
        match status {
            xlib::XLookupKeySym => ImLookup::KeySym(keysym),
            xlib::XLookupBoth => ImLookup::Both(keysym),
            xlib::XLookupChars => ImLookup::Chars,
            _ => ImLookup::Nothing,
        }
    }

    fn auto_repeat_enabled(&mut self) -> bool {
        // SAFETY: plain-data out-parameter.
        unsafe {
            let mut state: xlib::XKeyboardState = std::mem::zeroed();
            xlib::XGetKeyboardControl(self.display, &mut state);
            state.global_auto_repeat == xlib::AutoRepeatModeOn
        }
    }

    fn set_auto_repeat(&mut self, enabled: bool) {
        // SAFETY: `display` is live.
        unsafe {
            if enabled {
                xlib::XAutoRepeatOn(self.display);
            } else {
                xlib::XAutoRepeatOff(self.display);
            }
        }
    }

    fn grab_keyboard(&mut self, window: WindowId) -> GrabStatus {
        // SAFETY: `display` is live.
        let code = unsafe {
            xlib::XGrabKeyboard(
                self.display,
                window as xlib::Window,
                xlib::True,
                xlib::GrabModeAsync,
                xlib::GrabModeAsync,
                CURRENT_TIME as xlib::Time,
            )
        };
        GrabStatus::from_code(code)
    }

    fn grab_pointer(&mut self, window: WindowId) -> GrabStatus {
        let window = window as xlib::Window;
        // SAFETY: `display` is live.
        let code = unsafe {
            xlib::XGrabPointer(
                self.display,
                window,
                xlib::True,
                0,
                xlib::GrabModeAsync,
                xlib::GrabModeAsync,
                window,
                0,
                CURRENT_TIME as xlib::Time,
            )
        };
        GrabStatus::from_code(code)
    }

    fn ungrab_keyboard(&mut self) {
        // SAFETY: `display` is live.
        unsafe {
            xlib::XUngrabKeyboard(self.display, CURRENT_TIME as xlib::Time);
        }
    }

    fn warp_pointer(&mut self, x: i32, y: i32) {
        // SAFETY: `display` is live.
        unsafe {
            xlib::XWarpPointer(self.display, 0, self.root, 0, 0, 0, 0, x, y);
        }
    }

    fn query_pointer(&mut self) -> Option<PointerState> {
        // SAFETY: plain out-parameters.
        unsafe {
            let (mut root, mut child) = (0, 0);
            let (mut x, mut y, mut wx, mut wy) = (0, 0, 0, 0);
            let mut mask: c_uint = 0;
            let on_screen = xlib::XQueryPointer(
                self.display,
                self.root,
                &mut root,
                &mut child,
                &mut x,
                &mut y,
                &mut wx,
                &mut wy,
                &mut mask,
            );
            (on_screen != 0).then_some(PointerState { x, y, mask })
        }
    }

    fn pointer_mapping(&mut self) -> Vec<u8> {
        let mut map = [0u8; 256];
        // SAFETY: length matches the buffer.
        let count = unsafe {
            xlib::XGetPointerMapping(self.display, map.as_mut_ptr(), map.len() as c_int)
        };
        map[..count.clamp(0, 256) as usize].to_vec()
    }

    fn modifier_keysyms(&mut self) -> Vec<Vec<KeySym>> {
        // SAFETY: the modifier map is read within its bounds and freed.
        unsafe {
            let map = xlib::XGetModifierMapping(self.display);
            if map.is_null() {
                return Vec::new();
            }
            let per_slot = (*map).max_keypermod.max(0) as usize;
            let keycodes = std::slice::from_raw_parts((*map).modifiermap, 8 * per_slot);
            let slots = keycodes
                .chunks(per_slot.max(1))
                .take(8)
                .map(|slot| {
                    slot.iter()
                        .filter_map(|&keycode| self.keysym_for(KeyButton::from(keycode)))
                        .map(|keysym| keysym as KeySym)
                        .collect()
                })
                .collect();
            xlib::XFreeModifiermap(map);
            slots
        }
    }

    fn refresh_keyboard_mapping(&mut self, event: &MappingEvent) {
        // SAFETY: plain data.
        let mut raw: xlib::XMappingEvent = unsafe { std::mem::zeroed() };
        raw.type_ = xlib::MappingNotify;
        raw.display = self.display;
        raw.request = match event.request {
            MappingRequest::Modifier => xlib::MappingModifier,
            MappingRequest::Keyboard => xlib::MappingKeyboard,
            MappingRequest::Pointer => xlib::MappingPointer,
        };
        raw.first_keycode = event.first_keycode as c_int;
        raw.count = event.count;
        // SAFETY: `raw` is a complete mapping event.
        unsafe {
            xlib::XRefreshKeyboardMapping(&mut raw);
        }
    }

    fn keysym_name(&mut self, keycode: KeyButton) -> Option<String> {
        let keysym = self.keysym_for(keycode)?;
        // SAFETY: the returned string is static Xlib data.
        unsafe {
            let name = xlib::XKeysymToString(keysym);
            (!name.is_null()).then(|| CStr::from_ptr(name).to_string_lossy().into_owned())
        }
    }

    fn fake_key(&mut self, keycode: KeyButton, press: bool) {
        // SAFETY: `display` is live.
        unsafe {
            xtest::XTestFakeKeyEvent(self.display, keycode as c_uint, xbool(press), 0);
        }
    }

    fn fake_button(&mut self, button: u32, press: bool) {
        // SAFETY: `display` is live.
        unsafe {
            xtest::XTestFakeButtonEvent(self.display, button as c_uint, xbool(press), 0);
        }
    }

    fn fake_motion(&mut self, x: i32, y: i32) {
        // SAFETY: `display` is live.
        unsafe {
            xtest::XTestFakeMotionEvent(self.display, self.screen, x, y, 0);
        }
    }

    fn xtest_grab_control(&mut self, impervious: bool) {
        // SAFETY: `display` is live.
        unsafe {
            xtest::XTestGrabControl(self.display, xbool(impervious));
        }
    }

    fn send_event(&mut self, window: WindowId, event: &NativeEvent) {
        let mut raw = self.to_raw(event);
        // SAFETY: `raw` is a complete event.
        unsafe {
            xlib::XSendEvent(self.display, window as xlib::Window, xlib::False, 0, &mut raw);
        }
    }

    fn flush(&mut self) {
        // SAFETY: `display` is live.
        unsafe {
            xlib::XFlush(self.display);
        }
    }

    fn sync(&mut self) {
        // SAFETY: `display` is live.
        unsafe {
            xlib::XSync(self.display, xlib::False);
        }
    }

    fn pending(&mut self) -> usize {
        // SAFETY: `display` is live.
        unsafe { xlib::XPending(self.display).max(0) as usize }
    }

    fn next_event(&mut self) -> Option<NativeEvent> {
        // SAFETY: only dequeues when something is queued, so never blocks.
        let raw = unsafe {
            if xlib::XEventsQueued(self.display, QUEUED_AFTER_READING) == 0 {
                return None;
            }
            let mut raw: xlib::XEvent = std::mem::zeroed();
            xlib::XNextEvent(self.display, &mut raw);
            raw
        };
        self.last_event = Some(raw);
        Some(from_raw(&raw))
    }

    fn peek_event(&mut self) -> Option<NativeEvent> {
        // SAFETY: as for next_event.
        unsafe {
            if xlib::XEventsQueued(self.display, QUEUED_AFTER_READING) == 0 {
                return None;
            }
            let mut raw: xlib::XEvent = std::mem::zeroed();
            xlib::XPeekEvent(self.display, &mut raw);
            Some(from_raw(&raw))
        }
    }

    fn check_if_event(
        &mut self,
        predicate: &mut dyn FnMut(&NativeEvent) -> bool,
    ) -> Option<NativeEvent> {
        let mut predicate = predicate;
        // SAFETY: `predicate` outlives the call and the trampoline only
        // converts the event; it makes no Xlib calls.
        unsafe {
            let mut raw: xlib::XEvent = std::mem::zeroed();
            let found = xlib::XCheckIfEvent(
                self.display,
                &mut raw,
                Some(matches_predicate),
                (&mut predicate as *mut &mut dyn FnMut(&NativeEvent) -> bool).cast(),
            );
            (found != 0).then(|| from_raw(&raw))
        }
    }

    fn check_mask_event(&mut self, mask: EventMask) -> Option<NativeEvent> {
        // SAFETY: `display` is live.
        unsafe {
            let mut raw: xlib::XEvent = std::mem::zeroed();
            let found = xlib::XCheckMaskEvent(self.display, mask.bits() as c_long, &mut raw);
            (found != 0).then(|| from_raw(&raw))
        }
    }

    fn mask_event(&mut self, mask: EventMask) -> Option<NativeEvent> {
        // SAFETY: `display` is live.
        unsafe {
            let mut raw: xlib::XEvent = std::mem::zeroed();
            xlib::XMaskEvent(self.display, mask.bits() as c_long, &mut raw);
            Some(from_raw(&raw))
        }
    }
}

unsafe extern "C" fn matches_predicate(
    _display: *mut xlib::Display,
    event: *mut xlib::XEvent,
    arg: xlib::XPointer,
) -> xlib::Bool {
    let predicate = &mut *arg.cast::<&mut dyn FnMut(&NativeEvent) -> bool>();
    xbool(predicate(&from_raw(&*event)))
}

unsafe extern "C" fn is_timestamp_event(
    _display: *mut xlib::Display,
    event: *mut xlib::XEvent,
    arg: xlib::XPointer,
) -> xlib::Bool {
    let (window, atom) = *arg.cast::<(xlib::Window, xlib::Atom)>();
    let event = &*event;
    if event.get_type() != xlib::PropertyNotify {
        return xlib::False;
    }
    let property = xlib::XPropertyEvent::from(event);
    xbool(property.window == window && property.atom == atom)
}

// ── Event conversion ──────────────────────────────────────────────────────────

fn event_type(event: &NativeEvent) -> c_int {
    match event {
        NativeEvent::KeyPress(_) => xlib::KeyPress,
        NativeEvent::KeyRelease(_) => xlib::KeyRelease,
        NativeEvent::ButtonPress(_) => xlib::ButtonPress,
        NativeEvent::ButtonRelease(_) => xlib::ButtonRelease,
        NativeEvent::Motion(_) => xlib::MotionNotify,
        NativeEvent::CreateNotify { .. } => xlib::CreateNotify,
        NativeEvent::DestroyNotify { .. } => xlib::DestroyNotify,
        NativeEvent::Mapping(_) => xlib::MappingNotify,
        NativeEvent::LeaveNotify { .. } => xlib::LeaveNotify,
        NativeEvent::SelectionClear { .. } => xlib::SelectionClear,
        NativeEvent::SelectionNotify { .. } => xlib::SelectionNotify,
        NativeEvent::SelectionRequest { .. } => xlib::SelectionRequest,
        NativeEvent::PropertyNotify { .. } => xlib::PropertyNotify,
        NativeEvent::ClientMessage { .. } => xlib::ClientMessage,
        NativeEvent::Other { kind } => *kind,
    }
}

fn key_from_raw(raw: &xlib::XEvent) -> KeyEvent {
    let key = xlib::XKeyEvent::from(raw);
    KeyEvent {
        window: key.window as WindowId,
        time: key.time as Time,
        keycode: key.keycode as KeyButton,
        state: key.state as u32,
        send_event: key.send_event != 0,
    }
}

fn button_from_raw(raw: &xlib::XEvent) -> ButtonEvent {
    let button = xlib::XButtonEvent::from(raw);
    ButtonEvent {
        window: button.window as WindowId,
        time: button.time as Time,
        button: button.button as u32,
        state: button.state as u32,
    }
}

fn from_raw(raw: &xlib::XEvent) -> NativeEvent {
    match raw.get_type() {
        xlib::KeyPress => NativeEvent::KeyPress(key_from_raw(raw)),
        xlib::KeyRelease => NativeEvent::KeyRelease(key_from_raw(raw)),
        xlib::ButtonPress => NativeEvent::ButtonPress(button_from_raw(raw)),
        xlib::ButtonRelease => NativeEvent::ButtonRelease(button_from_raw(raw)),
        xlib::MotionNotify => {
            let motion = xlib::XMotionEvent::from(raw);
            NativeEvent::Motion(MotionEvent {
                window: motion.window as WindowId,
                time: motion.time as Time,
                x_root: motion.x_root,
                y_root: motion.y_root,
                send_event: motion.send_event != 0,
            })
        }
        xlib::CreateNotify => NativeEvent::CreateNotify {
            window: xlib::XCreateWindowEvent::from(raw).window as WindowId,
        },
        xlib::DestroyNotify => NativeEvent::DestroyNotify {
            window: xlib::XDestroyWindowEvent::from(raw).window as WindowId,
        },
        xlib::MappingNotify => {
            let mapping = xlib::XMappingEvent::from(raw);
            NativeEvent::Mapping(MappingEvent {
                request: match mapping.request {
                    xlib::MappingModifier => MappingRequest::Modifier,
                    xlib::MappingKeyboard => MappingRequest::Keyboard,
                    _ => MappingRequest::Pointer,
                },
                first_keycode: mapping.first_keycode.max(0) as KeyButton,
                count: mapping.count,
            })
        }
        xlib::LeaveNotify => NativeEvent::LeaveNotify {
            window: xlib::XCrossingEvent::from(raw).window as WindowId,
        },
        xlib::SelectionClear => {
            let clear = xlib::XSelectionClearEvent::from(raw);
            NativeEvent::SelectionClear {
                selection: clear.selection as Atom,
                time: clear.time as Time,
            }
        }
        xlib::SelectionNotify => {
            let notify = xlib::XSelectionEvent::from(raw);
            NativeEvent::SelectionNotify {
                requestor: notify.requestor as WindowId,
                property: notify.property as Atom,
            }
        }
        xlib::SelectionRequest => {
            let request = xlib::XSelectionRequestEvent::from(raw);
            NativeEvent::SelectionRequest {
                owner: request.owner as WindowId,
                requestor: request.requestor as WindowId,
                selection: request.selection as Atom,
                target: request.target as Atom,
                property: request.property as Atom,
                time: request.time as Time,
            }
        }
        xlib::PropertyNotify => {
            let property = xlib::XPropertyEvent::from(raw);
            NativeEvent::PropertyNotify {
                window: property.window as WindowId,
                atom: property.atom as Atom,
                time: property.time as Time,
                deleted: property.state == xlib::PropertyDelete,
            }
        }
        xlib::ClientMessage => {
            let message = xlib::XClientMessageEvent::from(raw);
            let mut data = [0i64; 5];
            for (i, value) in data.iter_mut().enumerate() {
                *value = message.data.get_long(i) as i64;
            }
            NativeEvent::ClientMessage {
                window: message.window as WindowId,
                message_type: message.message_type as Atom,
                format: message.format,
                data,
            }
        }
        kind => NativeEvent::Other { kind },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_timeout_rounds_up_and_saturates() {
        assert_eq!(poll_timeout(None), PollTimeout::NONE);
        assert_eq!(
            poll_timeout(Some(Duration::from_micros(1500))),
            PollTimeout::try_from(2i32).expect("in range")
        );
        assert_eq!(poll_timeout(Some(Duration::MAX)), PollTimeout::MAX);
    }

    #[test]
    fn test_lookup_buffer_grows_only_on_overflow() {
        assert_eq!(lookup_buffer_len(xlib::XBufferOverflow, 200, 64), Some(200));
        assert_eq!(lookup_buffer_len(xlib::XBufferOverflow, 32, 64), None);
        assert_eq!(lookup_buffer_len(xlib::XLookupBoth, 3, 64), None);
        assert_eq!(lookup_buffer_len(xlib::XBufferOverflow, -1, 64), None);
    }

    #[test]
    fn test_waiter_wake_interrupts_wait() {
        // Arrange: the read end of a fresh pair never becomes readable.
        let (idle, _keep) = UnixStream::pair().expect("pair");
        let waiter = XlibWaiter::new(idle.as_fd()).expect("waiter");

        // Act
        waiter.wake();
        let started = std::time::Instant::now();
        waiter.wait(Some(Duration::from_secs(5)));

        // Assert
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_waiter_keeps_watching_after_original_fd_closes() {
        // Arrange: the waiter's copy outlives the descriptor it came from.
        let (watched, peer) = UnixStream::pair().expect("pair");
        let waiter = XlibWaiter::new(watched.as_fd()).expect("waiter");
        drop(watched);

        // Act
        (&peer).write_all(&[7]).expect("write");
        let started = std::time::Instant::now();
        waiter.wait(Some(Duration::from_secs(5)));

        // Assert
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
