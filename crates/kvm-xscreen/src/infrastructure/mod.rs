//! Infrastructure layer: the display connection and process-level concerns.
//!
//! **Dependency rule**: this layer may depend on `domain` and `kvm_core`,
//! but MUST NOT be imported by the `domain` layer.
//!
//! # Sub-modules
//!
//! - **`display`** – the [`XDisplay`](display::XDisplay) seam, the Xlib
//!   backend (Linux only) and an in-memory server for tests.
//! - **`fatal`** – what happens when the display connection dies.
//! - **`config`** – the binary's TOML configuration.
//! - **`passive`** – stand-in collaborators the binary runs with.

pub mod config;
pub mod display;
pub mod fatal;
pub mod passive;
