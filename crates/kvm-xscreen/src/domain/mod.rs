//! Screen domain: the native event model, the collaborator traits and the
//! screen error type.

pub mod collaborators;
pub mod event;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for screen operations.
#[derive(Debug, Error)]
pub enum ScreenError {
    /// The display could not be opened; try again after `retry_after`.
    #[error("cannot open display, retry in {}s", retry_after.as_secs())]
    Unavailable { retry_after: Duration },

    /// A required capability is missing; retrying will not help.
    #[error("cannot open screen: {0}")]
    OpenFailure(String),

    #[error("screen is not open")]
    NotOpen,

    /// The main loop was asked to stop from another thread.
    #[error("main loop cancelled")]
    Cancelled,
}

/// Whether the screen captures input or injects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScreenRole {
    #[default]
    Primary,
    Secondary,
}

impl fmt::Display for ScreenRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScreenRole::Primary => f.write_str("primary"),
            ScreenRole::Secondary => f.write_str("secondary"),
        }
    }
}
