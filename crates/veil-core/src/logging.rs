//! Log redaction for amounts and balances
//!
//! Values wrapped in [`Redacted`] print as `<redacted>` unless sensitive
//! logging was switched on with [`set_reveal_sensitive`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

static REVEAL_SENSITIVE: AtomicBool = AtomicBool::new(false);

/// Print wrapped values in logs instead of `<redacted>`
pub fn set_reveal_sensitive(reveal: bool) {
    REVEAL_SENSITIVE.store(reveal, Ordering::Relaxed);
}

/// Whether sensitive values are printed
pub fn reveal_sensitive() -> bool {
    REVEAL_SENSITIVE.load(Ordering::Relaxed)
}

/// Log wrapper hiding its value by default
#[derive(Clone, Copy)]
pub struct Redacted<T>(pub T);

impl<T: fmt::Display> fmt::Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if reveal_sensitive() {
            fmt::Display::fmt(&self.0, f)
        } else {
            f.write_str("<redacted>")
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if reveal_sensitive() {
            fmt::Debug::fmt(&self.0, f)
        } else {
            f.write_str("<redacted>")
        }
    }
}
