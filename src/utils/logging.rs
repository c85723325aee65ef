//! Logging macros gated by a per-module `ENABLE_LOGS` switch.
//!
//! The frame path runs at sensor rate (30 Hz and up), so the noisier
//! modules can silence themselves without touching `RUST_LOG`:
//!
//! ```rust,ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_debug, log_info};
//!
//! log_info!("frame pump started");
//! ```
//!
//! Every macro expands to a check of the caller's `ENABLE_LOGS` constant,
//! so a module that forgets to define it fails to compile.

#[doc(hidden)]
#[macro_export]
macro_rules! __gated_log {
    ($level:ident, $($arg:tt)*) => {
        if ENABLE_LOGS {
            log::$level!($($arg)*);
        }
    };
}

/// `log::debug!` behind the module's `ENABLE_LOGS` switch.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::__gated_log!(debug, $($arg)*)
    };
}

/// `log::info!` behind the module's `ENABLE_LOGS` switch.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::__gated_log!(info, $($arg)*)
    };
}

/// `log::warn!` behind the module's `ENABLE_LOGS` switch.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::__gated_log!(warn, $($arg)*)
    };
}

/// `log::error!` behind the module's `ENABLE_LOGS` switch.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::__gated_log!(error, $($arg)*)
    };
}
