//! What happens when the display connection dies.
//!
//! Xlib reports a broken connection through a process-wide I/O error
//! handler that receives nothing but the dead `Display*`.  No display call
//! is valid afterwards and Xlib exits if the handler returns, so the screen
//! cannot recover: it tells its receiver and exits with
//! [`DISPLAY_LOST_EXIT_CODE`].
//!
//! The handler needs to find the receiver with no context, so this module
//! keeps exactly one registered receiver.  Nothing else may use it.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{error, warn};

use crate::domain::collaborators::ScreenReceiver;

/// Exit status after the display connection is lost.
pub const DISPLAY_LOST_EXIT_CODE: i32 = 17;

static RECEIVER: Mutex<Option<Arc<dyn ScreenReceiver>>> = Mutex::new(None);

/// Makes `receiver` the one notified when the display is lost.
pub fn register(receiver: Arc<dyn ScreenReceiver>) {
    let mut slot = RECEIVER.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
        warn!("replacing the display-lost receiver of another screen");
    }
    *slot = Some(receiver);
}

/// Forgets the registered receiver.
pub fn unregister() {
    *RECEIVER.lock().unwrap_or_else(PoisonError::into_inner) = None;
}

/// Notifies the registered receiver and returns the status to exit with.
///
/// The receiver is taken out of the registry first, so a second report
/// never reaches it twice.
pub fn report_display_lost() -> i32 {
    error!("X display has unexpectedly disconnected");
    let receiver = RECEIVER
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if let Some(receiver) = receiver {
        receiver.on_error();
    }
    DISPLAY_LOST_EXIT_CODE
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use kvm_core::ClipboardId;

    use super::*;

    #[derive(Default)]
    struct CountingReceiver {
        errors: AtomicUsize,
    }

    impl ScreenReceiver for CountingReceiver {
        fn on_error(&self) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_grab_clipboard(&self, _id: ClipboardId) {}
    }

    #[test]
    fn test_report_notifies_registered_receiver_once() {
        // Arrange
        let receiver = Arc::new(CountingReceiver::default());
        register(receiver.clone());

        // Act
        let first = report_display_lost();
        let second = report_display_lost();

        // Assert
        assert_eq!(first, DISPLAY_LOST_EXIT_CODE);
        assert_eq!(second, DISPLAY_LOST_EXIT_CODE);
        assert_eq!(receiver.errors.load(Ordering::SeqCst), 1);
        unregister();
    }
}
