//! Process-wide interrupt flag.
//!
//! SIGINT/SIGTERM only set a flag. Long-running loops (the timeout guard's
//! wait loop, snapshot downloads) poll it and unwind through normal error
//! returns so scoped temporaries are released on the way out.

use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Install the signal handler. Safe to call once per process.
pub fn install() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(|| {
        log::warn!("Interrupt received, stopping after the current step");
        INTERRUPTED.store(true, Ordering::SeqCst);
    })
}

/// Whether an interrupt has been received.
pub fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

