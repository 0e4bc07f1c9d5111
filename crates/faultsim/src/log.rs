//! Logging facilities.
//!
//! The macros take any value exposing a `name() -> &str` method (domains and repair schemes) and use that name as
//! the log target, so the output of a single chip or scheme can be filtered with `RUST_LOG`.

use atty::Stream;
use colored::{Color, ColoredString, Colorize};

/// Applies the color to the string if stderr (log) goes to console.
pub fn get_colored(s: &str, color: Color) -> ColoredString {
    if atty::is(Stream::Stderr) {
        s.color(color)
    } else {
        s.normal()
    }
}

/// Logs a message at the debug level.
///
/// # Examples
///
/// ```rust
/// use faultsim::log_debug;
///
/// struct Scheme {
///     name: String,
/// }
///
/// impl Scheme {
///     fn name(&self) -> &str {
///         &self.name
///     }
///
///     fn repair(&self) {
///         log_debug!(self, "found {} failures", 0);
///     }
/// }
///
/// Scheme { name: "chipkill".to_string() }.repair();
/// ```
#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $msg:expr) => (
        ::log::debug!(
            target: $ctx.name(),
            "[{} {}] {}",
            $crate::log::get_colored("DEBUG", $crate::colored::Color::Blue), $ctx.name(), $msg
        )
    );
    ($ctx:expr, $format:expr, $($arg:tt)+) => (
        ::log::debug!(
            target: $ctx.name(),
            concat!("[{} {}] ", $format),
            $crate::log::get_colored("DEBUG", $crate::colored::Color::Blue), $ctx.name(), $($arg)+
        )
    );
}

/// Logs a message at the trace level.
///
/// # Examples
///
/// See [`log_debug!`](crate::log_debug!).
#[macro_export]
macro_rules! log_trace {
    ($ctx:expr, $msg:expr) => (
        ::log::trace!(
            target: $ctx.name(),
            "[{} {}] {}",
            $crate::log::get_colored("TRACE", $crate::colored::Color::Cyan), $ctx.name(), $msg
        )
    );
    ($ctx:expr, $format:expr, $($arg:tt)+) => (
        ::log::trace!(
            target: $ctx.name(),
            concat!("[{} {}] ", $format),
            $crate::log::get_colored("TRACE", $crate::colored::Color::Cyan), $ctx.name(), $($arg)+
        )
    );
}

/// Logs a message at the warn level.
///
/// # Examples
///
/// See [`log_debug!`](crate::log_debug!).
#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $msg:expr) => (
        ::log::warn!(
            target: $ctx.name(),
            "[{}  {}] {}",
            $crate::log::get_colored("WARN", $crate::colored::Color::Yellow), $ctx.name(), $msg
        )
    );
    ($ctx:expr, $format:expr, $($arg:tt)+) => (
        ::log::warn!(
            target: $ctx.name(),
            concat!("[{}  {}] ", $format),
            $crate::log::get_colored("WARN", $crate::colored::Color::Yellow), $ctx.name(), $($arg)+
        )
    );
}

/// Logs a message at the error level.
///
/// # Examples
///
/// See [`log_debug!`](crate::log_debug!).
#[macro_export]
macro_rules! log_error {
    ($ctx:expr, $msg:expr) => (
        ::log::error!(
            target: $ctx.name(),
            "[{} {}] {}",
            $crate::log::get_colored("ERROR", $crate::colored::Color::Red), $ctx.name(), $msg
        )
    );
    ($ctx:expr, $format:expr, $($arg:tt)+) => (
        ::log::error!(
            target: $ctx.name(),
            concat!("[{} {}] ", $format),
            $crate::log::get_colored("ERROR", $crate::colored::Color::Red), $ctx.name(), $($arg)+
        )
    );
}
