//! Application layer: the screen itself.
//!
//! # Sub-modules
//!
//! - **`screen`** – [`Screen`](screen::Screen), its lifecycle and the public
//!   operations, and the per-connection `Session` state.
//! - **`capture`** – entering and leaving the screen, the grab protocol,
//!   pointer warps and synthetic input.
//! - **`dispatch`** – routing of native events and translation of captured
//!   input for the primary receiver.
//! - **`main_loop`** – the blocking event/timer loop and its two exits.

pub mod capture;
pub mod dispatch;
pub mod main_loop;
pub mod screen;
