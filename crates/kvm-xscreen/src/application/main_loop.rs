//! The blocking main loop: waits for display events or the next timer,
//! runs due timers and dispatches every queued event.
//!
//! Only the loop's thread waits, and it waits *without* the main lock, so
//! other threads can keep calling the screen.  Two ways out:
//!
//! - [`Screen::exit_main_loop`] posts a quit message to the screen's own
//!   window; the loop returns `Ok(())` once it reaches that message, so
//!   every event queued before it is still handled.
//! - [`Screen::cancel_main_loop`] raises a [`CancelToken`] and wakes the
//!   waiter; the loop returns [`ScreenError::Cancelled`] at its next check.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::MutexGuard;

use kvm_core::ONE_SHOT_TIMER_ID;
use tracing::{debug, trace};

use super::screen::{Screen, ScreenState, Session};
use crate::domain::event::{NativeEvent, NO_ATOM};
use crate::domain::ScreenError;
use crate::infrastructure::display::ignoring_errors;

/// Cancellation request for a running main loop.
#[derive(Debug, Default)]
pub struct CancelToken {
    requested: AtomicBool,
}

impl CancelToken {
    pub fn cancel(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Fails with [`ScreenError::Cancelled`] if a cancel is pending,
    /// consuming it so the next loop starts fresh.
    pub(crate) fn check(&self) -> Result<(), ScreenError> {
        if self.requested.swap(false, Ordering::SeqCst) {
            Err(ScreenError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Session {
    fn is_quit_event(&self, event: &NativeEvent) -> bool {
        matches!(*event, NativeEvent::ClientMessage { window, message_type, .. }
            if self.atom_quit != NO_ATOM
                && window == self.window
                && message_type == self.atom_quit)
    }
}

impl Screen {
    /// Runs until [`Screen::exit_main_loop`] or [`Screen::cancel_main_loop`].
    ///
    /// # Errors
    ///
    /// - [`ScreenError::NotOpen`] when the screen is closed, before or
    ///   during the loop.
    /// - [`ScreenError::Cancelled`] after [`Screen::cancel_main_loop`].
    pub fn main_loop(&self) -> Result<(), ScreenError> {
        debug!("entering main loop");
        let mut state = self.lock_state();
        loop {
            // Decide how long to sleep while the lock is still held.
            let timeout = self.lock_timers().next_timeout();
            let session = state.session.as_mut().ok_or(ScreenError::NotOpen)?;
            let waiter = session.waiter.clone();
            let queued = session.display.pending();
            self.cancel.check()?;

            drop(state);
            if queued == 0 {
                trace!(?timeout, "waiting for events");
                waiter.wait(timeout);
            }
            state = self.lock_state();
            self.cancel.check()?;

            state = self.run_timers(state);

            let session = state.session.as_mut().ok_or(ScreenError::NotOpen)?;
            let pending = session.display.pending();
            for _ in 0..pending {
                let Some(event) = session.display.next_event() else {
                    break;
                };
                if session.is_quit_event(&event) {
                    debug!("leaving main loop");
                    return Ok(());
                }
                session.dispatch(&event, &self.receivers);
            }
        }
    }

    /// Makes the main loop return `Ok(())` after the events already queued.
    pub fn exit_main_loop(&self) -> Result<(), ScreenError> {
        let mut state = self.lock_state();
        let session = state.session.as_mut().ok_or(ScreenError::NotOpen)?;
        let quit = NativeEvent::ClientMessage {
            window: session.window,
            message_type: session.atom_quit,
            format: 32,
            data: [0; 5],
        };
        let window = session.window;
        ignoring_errors(session.display.as_mut(), |display| {
            display.send_event(window, &quit);
            display.flush();
        });
        debug!("requested main loop exit");
        Ok(())
    }

    /// Makes the main loop fail with [`ScreenError::Cancelled`] promptly,
    /// even while it waits.
    pub fn cancel_main_loop(&self) {
        self.cancel.cancel();
        let state = self.lock_state();
        if let Some(session) = state.session.as_ref() {
            session.waiter.wake();
        }
    }

    /// Runs the due jobs and the one-shot notification with both locks
    /// released, then re-takes the main lock.
    fn run_timers<'a>(
        &'a self,
        state: MutexGuard<'a, ScreenState>,
    ) -> MutexGuard<'a, ScreenState> {
        let batch = self.lock_timers().process();
        if batch.is_empty() {
            return state;
        }

        drop(state);
        trace!(jobs = batch.jobs.len(), "running timers");
        for job in &batch.jobs {
            job.run();
        }
        if batch.one_shot_expired {
            if let Some(primary) = self.receivers.primary.as_ref() {
                primary.on_one_shot_timer_expired(ONE_SHOT_TIMER_ID);
            }
        }
        self.lock_state()
    }
}
