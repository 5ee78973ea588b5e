//! Opt-in tracing for the passes. Logging is off by default and costs one
//! atomic load per call site when disabled.

use std::sync::atomic::{AtomicBool, Ordering};

use lazy_static::lazy_static;

lazy_static! {
    static ref ENABLED: AtomicBool = AtomicBool::new(false);
}

pub fn enable() {
    ENABLED.store(true, Ordering::Relaxed);
}

pub fn disable() {
    ENABLED.store(false, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

#[macro_export]
macro_rules! log {
    ($pass:literal, $($token:tt)*) => (
        if $crate::log::is_enabled() {
            use colored::Colorize;

            eprintln!(
                "<{}> [{}] {}",
                "LOG".black().on_purple(),
                $pass.black().on_green(),
                format_args!($($token)*)
            );
        }
    );
    ($($token:tt)*) => (
        if $crate::log::is_enabled() {
            use colored::Colorize;

            eprintln!("<{}> {}", "LOG".black().on_purple(), format_args!($($token)*));
        }
    );
}
