//! Opening, closing and the query/clipboard/screensaver operations.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{quiet_receiver, Fixture, SaverCall, SlotCall};
use kvm_core::ClipboardId;
use kvm_xscreen::application::screen::{QUIT_ATOM, SCREENSAVER_ATOM};
use kvm_xscreen::domain::event::{Rect, Time};
use kvm_xscreen::infrastructure::display::mock::{DisplayCall, MockConnector};
use kvm_xscreen::{ClipboardSink, ClipboardSlot, ClipboardSource, ScreenError, ScreenRole};

const WINDOW: u64 = 0x0040_0001;

// ── Open and close ────────────────────────────────────────────────────────────

#[test]
fn test_open_primary_creates_capture_window_and_subsystems() {
    // Arrange
    let fixture = Fixture::new();
    let screen = fixture.screen_with(ScreenRole::Primary, quiet_receiver());

    // Act
    screen.open(fixture.key_state()).unwrap();

    // Assert
    assert!(screen.is_open());
    assert!(screen.is_primary());
    let calls = fixture.server.calls();
    assert!(matches!(
        calls.first(),
        Some(DisplayCall::CreateWindow { window: WINDOW, rect, .. })
            if *rect == Rect::new(0, 0, 1920, 1080)
    ));
    assert!(fixture.server.atom("CLIPBOARD").is_some());
    assert!(fixture.server.atom("PRIMARY").is_some());
    assert!(fixture.server.atom(SCREENSAVER_ATOM).is_some());
    assert!(fixture.server.atom(QUIT_ATOM).is_some());
    assert_eq!(fixture.key_updates(), 1);
    assert_eq!(screen.shape().unwrap(), Rect::new(0, 0, 1920, 1080));
    assert!(screen.is_on_screen().unwrap());
}

#[test]
fn test_open_secondary_makes_xtest_impervious_to_grabs() {
    let fixture = Fixture::new();
    let screen = fixture.screen_with(ScreenRole::Secondary, quiet_receiver());

    screen.open(fixture.key_state()).unwrap();

    let calls = fixture.server.calls();
    assert!(matches!(
        calls.first(),
        Some(DisplayCall::CreateWindow { rect, .. }) if *rect == Rect::new(0, 0, 1, 1)
    ));
    assert!(calls.contains(&DisplayCall::XTestGrabControl(true)));
    assert!(!screen.is_on_screen().unwrap());
}

#[test]
fn test_open_twice_keeps_first_connection() {
    let fixture = Fixture::new();
    let screen = fixture.open(ScreenRole::Primary);

    screen.open(fixture.key_state()).unwrap();

    assert_eq!(fixture.server.connections(), 1);
    assert_eq!(fixture.server.live_windows(), 1);
}

#[test]
fn test_open_without_xtest_fails_and_releases_everything() {
    // Arrange
    let fixture = Fixture::new();
    fixture.server.with_state(|state| state.has_xtest = false);
    let screen = fixture.screen_with(ScreenRole::Secondary, quiet_receiver());

    // Act
    let result = screen.open(fixture.key_state());

    // Assert
    assert!(matches!(result, Err(ScreenError::OpenFailure(_))));
    assert!(!screen.is_open());
    assert_eq!(fixture.server.connections(), 0);
    assert_eq!(fixture.server.live_windows(), 0);
}

#[test]
fn test_primary_does_not_need_xtest() {
    let fixture = Fixture::new();
    fixture.server.with_state(|state| state.has_xtest = false);
    let screen = fixture.screen_with(ScreenRole::Primary, quiet_receiver());

    assert!(screen.open(fixture.key_state()).is_ok());
}

#[test]
fn test_open_fails_when_window_cannot_be_created() {
    let fixture = Fixture::new();
    fixture.server.with_state(|state| state.fail_window_creation = true);
    let screen = fixture.screen_with(ScreenRole::Primary, quiet_receiver());

    let result = screen.open(fixture.key_state());

    assert!(matches!(result, Err(ScreenError::OpenFailure(_))));
    assert_eq!(fixture.server.connections(), 0);
}

#[test]
fn test_open_unreachable_display_asks_for_retry() {
    // Arrange
    let fixture = Fixture::new();
    let connector = Arc::new(MockConnector::unavailable(fixture.server.clone()));
    let screen = fixture.screen_through(
        ScreenRole::Secondary,
        quiet_receiver(),
        Arc::clone(&connector),
    );

    // Act
    let result = screen.open(fixture.key_state());

    // Assert
    match result {
        Err(ScreenError::Unavailable { retry_after }) => {
            assert_eq!(retry_after, Duration::from_secs(60));
        }
        other => panic!("expected Unavailable, got {other:?}"),
    }
    assert_eq!(*connector.requested.lock().unwrap(), vec![":7".to_string()]);
    assert!(!screen.is_open());
}

#[test]
fn test_close_releases_window_and_is_idempotent() {
    // Arrange
    let fixture = Fixture::new();
    let screen = fixture.open(ScreenRole::Primary);

    // Act
    screen.close();
    screen.close();

    // Assert
    assert_eq!(
        fixture.server.take_calls(),
        vec![DisplayCall::DestroyWindow(WINDOW), DisplayCall::Close]
    );
    assert_eq!(fixture.server.connections(), 0);
    assert!(!screen.is_open());
}

#[test]
fn test_close_shuts_input_method() {
    let fixture = Fixture::new();
    fixture.server.with_state(|state| state.input_method = true);
    let screen = fixture.open(ScreenRole::Primary);
    assert!(fixture.server.has_input_context());

    screen.close();

    assert!(fixture
        .server
        .calls()
        .contains(&DisplayCall::CloseInputMethod));
    assert!(!fixture.server.has_input_context());
}

#[test]
fn test_dropping_screen_closes_display() {
    let fixture = Fixture::new();
    let screen = fixture.open(ScreenRole::Secondary);

    drop(screen);

    assert_eq!(fixture.server.connections(), 0);
    assert_eq!(fixture.server.live_windows(), 0);
}

#[test]
fn test_screen_can_reopen_after_close() {
    let fixture = Fixture::new();
    let screen = fixture.open(ScreenRole::Secondary);
    screen.close();

    screen.open(fixture.key_state()).unwrap();

    assert!(screen.is_open());
    assert_eq!(fixture.server.live_windows(), 1);
}

#[test]
fn test_operations_on_closed_screen_fail() {
    let fixture = Fixture::new();
    let screen = fixture.screen_with(ScreenRole::Secondary, quiet_receiver());

    assert!(matches!(screen.enable(), Err(ScreenError::NotOpen)));
    assert!(matches!(screen.enter(), Err(ScreenError::NotOpen)));
    assert!(matches!(screen.leave(), Err(ScreenError::NotOpen)));
    assert!(matches!(screen.warp_cursor(1, 1), Err(ScreenError::NotOpen)));
    assert!(matches!(screen.fake_key_event(38, true), Err(ScreenError::NotOpen)));
    assert!(matches!(
        screen.set_clipboard(ClipboardId::CLIPBOARD, None),
        Err(ScreenError::NotOpen)
    ));
    assert!(matches!(screen.key_name(38), Err(ScreenError::NotOpen)));
    assert!(matches!(screen.update_keys(), Err(ScreenError::NotOpen)));
}

// ── Queries ───────────────────────────────────────────────────────────────────

#[test]
fn test_key_name_falls_back_to_keycode() {
    let fixture = Fixture::new();
    fixture.server.with_state(|state| {
        state.keysym_names.insert(38, "a".to_string());
    });
    let screen = fixture.open(ScreenRole::Primary);

    assert_eq!(screen.key_name(38).unwrap(), "a");
    assert_eq!(screen.key_name(99).unwrap(), "keycode 99");
}

#[test]
fn test_mouse_button_state_comes_from_pointer_mask() {
    let fixture = Fixture::new();
    let screen = fixture.open(ScreenRole::Primary);
    assert!(!screen.is_any_mouse_button_down().unwrap());

    fixture.server.with_state(|state| state.pointer.mask = 1 << 8);

    assert!(screen.is_any_mouse_button_down().unwrap());
}

#[test]
fn test_fixed_answers() {
    let fixture = Fixture::new();
    let screen = fixture.screen_with(ScreenRole::Primary, quiet_receiver());

    assert_eq!(screen.jump_zone_size(), 1);
    assert!(!screen.fake_ctrl_alt_del());
}

#[test]
fn test_warp_cursor_moves_pointer_and_discards_input() {
    // Arrange
    let fixture = Fixture::new();
    let screen = fixture.open(ScreenRole::Primary);
    fixture.server.push_event(common::motion(1, 1));

    // Act
    screen.warp_cursor(300, 400).unwrap();

    // Assert
    assert!(fixture.server.calls().contains(&DisplayCall::Warp(300, 400)));
    assert_eq!(screen.cursor_pos().unwrap(), (300, 400));
    assert_eq!(fixture.server.queued(), 0);
}

#[test]
fn test_update_keys_refreshes_key_state() {
    let fixture = Fixture::new();
    let screen = fixture.open(ScreenRole::Primary);

    screen.update_keys().unwrap();

    assert_eq!(fixture.key_updates(), 2);
}

// ── Clipboards ────────────────────────────────────────────────────────────────

struct Claim;

impl ClipboardSource for Claim {
    fn copy_into(&self, slot: &mut dyn ClipboardSlot, time: Time) -> bool {
        if !slot.open(time) {
            return false;
        }
        slot.close();
        true
    }
}

#[derive(Default)]
struct Peek {
    seen: Option<Time>,
}

impl ClipboardSink for Peek {
    fn copy_from(&mut self, _slot: &mut dyn ClipboardSlot, time: Time) -> bool {
        self.seen = Some(time);
        true
    }
}

#[test]
fn test_set_clipboard_without_source_claims_it_empty() {
    // Arrange
    let fixture = Fixture::new();
    let screen = fixture.open(ScreenRole::Primary);

    // Act
    let claimed = screen.set_clipboard(ClipboardId::SELECTION, None).unwrap();

    // Assert
    assert!(claimed);
    let calls = fixture.slot_calls();
    assert!(matches!(calls[0], SlotCall::Open(ClipboardId::SELECTION, _)));
    assert_eq!(
        &calls[1..],
        &[
            SlotCall::Empty(ClipboardId::SELECTION),
            SlotCall::Close(ClipboardId::SELECTION),
        ]
    );
}

#[test]
fn test_set_clipboard_uses_server_time() {
    let fixture = Fixture::new();
    let screen = fixture.open(ScreenRole::Primary);

    let first = screen.set_clipboard(ClipboardId::CLIPBOARD, Some(&Claim)).unwrap();
    let second = screen.set_clipboard(ClipboardId::CLIPBOARD, Some(&Claim)).unwrap();

    assert!(first && second);
    let times: Vec<Time> = fixture
        .slot_calls()
        .into_iter()
        .filter_map(|call| match call {
            SlotCall::Open(_, time) => Some(time),
            _ => None,
        })
        .collect();
    assert_eq!(times.len(), 2);
    assert!(times[1] > times[0]);
}

#[test]
fn test_get_clipboard_hands_slot_to_sink() {
    let fixture = Fixture::new();
    let screen = fixture.open(ScreenRole::Secondary);
    let mut sink = Peek::default();

    let copied = screen.get_clipboard(ClipboardId::CLIPBOARD, &mut sink).unwrap();

    assert!(copied);
    assert!(sink.seen.is_some());
}

// ── Screensaver ───────────────────────────────────────────────────────────────

#[test]
fn test_screensaver_notify_mode_registers_window() {
    // Arrange
    let fixture = Fixture::new();
    let screen = fixture.open(ScreenRole::Primary);

    // Act
    screen.open_screensaver(true).unwrap();
    screen.screensaver(true).unwrap();
    screen.screensaver(false).unwrap();
    screen.close_screensaver().unwrap();

    // Assert
    assert_eq!(
        fixture.saver_calls(),
        vec![
            SaverCall::SetNotify(Some(WINDOW)),
            SaverCall::Activate,
            SaverCall::Deactivate,
            SaverCall::SetNotify(None),
        ]
    );
}

#[test]
fn test_screensaver_suppress_mode_disables_then_enables() {
    let fixture = Fixture::new();
    let screen = fixture.open(ScreenRole::Secondary);

    screen.open_screensaver(false).unwrap();
    screen.close_screensaver().unwrap();

    assert_eq!(
        fixture.saver_calls(),
        vec![SaverCall::Disable, SaverCall::Enable]
    );
}

// ── Options ───────────────────────────────────────────────────────────────────

#[test]
fn test_reset_options_restores_xinerama_unaware() {
    // Arrange
    let fixture = Fixture::new();
    fixture.server.with_state(|state| {
        state.xinerama_screens = vec![Rect::new(0, 0, 960, 1080), Rect::new(960, 0, 960, 1080)];
    });
    let screen = fixture.open(ScreenRole::Secondary);
    screen.set_options(&vec![(kvm_core::OPTION_XTEST_XINERAMA_UNAWARE, 0)]);

    // Act
    screen.reset_options();
    screen.fake_mouse_move(10, 10).unwrap();

    // Assert
    assert_eq!(fixture.server.take_calls()[0], DisplayCall::Warp(10, 10));
}

#[test]
fn test_options_set_before_open_apply_after_open() {
    let fixture = Fixture::new();
    fixture.server.with_state(|state| {
        state.xinerama_screens = vec![Rect::new(0, 0, 960, 1080), Rect::new(960, 0, 960, 1080)];
    });
    let screen = fixture.screen_with(ScreenRole::Secondary, quiet_receiver());
    screen.set_options(&vec![
        (kvm_core::domain::option_code(b"ZZZZ"), 7),
        (kvm_core::OPTION_XTEST_XINERAMA_UNAWARE, 0),
    ]);
    screen.open(fixture.key_state()).unwrap();
    fixture.server.take_calls();

    screen.fake_mouse_move(10, 10).unwrap();

    assert_eq!(fixture.server.take_calls()[0], DisplayCall::FakeMotion(10, 10));
}
