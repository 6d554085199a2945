//! kvm-xscreen entry point.
//!
//! Opens the configured X display as a standalone primary or secondary
//! screen and runs its main loop until Ctrl-C.  With no switch attached,
//! captured input and clipboard changes are only logged.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()                  -- ~/.config/kvm-xscreen/config.toml
//!  └─ Screen::new(XlibConnector, …)  -- closed screen
//!  └─ open() / enable()
//!  └─ spawn_blocking(main_loop)      -- the X event/timer loop
//!  └─ select! { ctrl_c, loop ends }
//!  └─ disable() / close()
//! ```
//!
//! The main loop blocks its thread, so it runs on Tokio's blocking pool
//! while the async side waits for a shutdown signal.

#[cfg(target_os = "linux")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use std::sync::Arc;

    use anyhow::Context;
    use tracing::{error, info, warn};
    use tracing_subscriber::EnvFilter;

    use kvm_xscreen::infrastructure::config::load_config;
    use kvm_xscreen::infrastructure::display::xlib::XlibConnector;
    use kvm_xscreen::infrastructure::passive::{LockKeyState, LoggingReceiver, PassiveSubsystems};
    use kvm_xscreen::{PrimaryScreenReceiver, Screen, ScreenError, ScreenParts, ScreenRole};

    let config = load_config().unwrap_or_else(|e| {
        eprintln!("kvm-xscreen: {e}; using defaults");
        Default::default()
    });

    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.log_level)),
        )
        .init();

    let display_name = config.display_name();
    info!(display = %display_name, role = %config.screen.role, "kvm-xscreen starting");

    // ── Screen ────────────────────────────────────────────────────────────────
    let receiver = Arc::new(LoggingReceiver);
    let primary_receiver = (config.screen.role == ScreenRole::Primary)
        .then(|| Arc::clone(&receiver) as Arc<dyn PrimaryScreenReceiver>);
    let screen = Arc::new(Screen::new(
        display_name,
        ScreenParts {
            receiver,
            primary_receiver,
            connector: Arc::new(XlibConnector),
            subsystems: Box::new(PassiveSubsystems),
        },
    ));
    screen.set_options(&config.options());

    screen
        .open(Box::new(LockKeyState::evdev()))
        .context("failed to open screen")?;
    screen.enable()?;

    // ── Main loop ─────────────────────────────────────────────────────────────
    let looping = Arc::clone(&screen);
    let mut main_loop = tokio::task::spawn_blocking(move || looping.main_loop());

    let finished = tokio::select! {
        finished = &mut main_loop => Some(finished),
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("cannot listen for ctrl-c: {e}");
            }
            info!("shutdown signal received");
            None
        }
    };
    let outcome = match finished {
        Some(finished) => finished,
        None => {
            // Events queued before the quit message are still handled.
            screen.exit_main_loop()?;
            main_loop.await
        }
    };

    match outcome.context("main loop panicked")? {
        Ok(()) | Err(ScreenError::Cancelled) => {}
        Err(e) => error!("main loop failed: {e}"),
    }

    // ── Shutdown ──────────────────────────────────────────────────────────────
    if let Err(e) = screen.disable() {
        warn!("disable failed: {e}");
    }
    screen.close();
    info!("kvm-xscreen stopped");
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn main() -> anyhow::Result<()> {
    anyhow::bail!("kvm-xscreen needs an X11 display and only runs on Linux")
}
