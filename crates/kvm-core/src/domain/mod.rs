//! Platform-independent domain values shared by the screen backends.
//!
//! Nothing in here touches a display connection; these are the identifiers
//! and option codes that flow between the screen and its receivers.

pub mod clipboard;
pub mod options;

pub use clipboard::ClipboardId;
pub use options::{option_code, OptionsList, OPTION_XTEST_XINERAMA_UNAWARE};
