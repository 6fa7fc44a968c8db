/// Domain-aware logging macros.
///
/// Each macro injects a `domain` field automatically so callers never need to
/// remember the string literal.  The domain value names the subsystem the
/// event belongs to: `sys` (lifecycle), `io` (record input and output), `bin`
/// (the bin window), `agg` (flow aggregation), `conf` (configuration).
///
/// # Usage
///
/// ```ignore
/// use crate::log_macros::*;
///
/// fb_info!(sys, mode = ?mode, "engine bootstrap complete");
/// fb_warn!(io, error = %e, "skipping malformed record");
/// fb_debug!(bin, evicted = n, "timer pass");
/// ```
///
/// The macros accept any tracing-compatible field syntax after the domain
/// identifier.  The domain identifier is **not** a string — it is a bare
/// identifier that the macro converts to a `&str` literal.

// ---------------------------------------------------------------------------
// Core macro — dispatches to the matching tracing level macro.
// ---------------------------------------------------------------------------

/// Internal helper.  Do not call directly; use `fb_error!` … `fb_trace!`.
#[doc(hidden)]
macro_rules! fb_log {
    // With fields and message
    ($level:ident, $domain:ident, $($field:tt)*) => {
        tracing::$level!(domain = stringify!($domain), $($field)*)
    };
}

// ---------------------------------------------------------------------------
// Public per-level macros
// ---------------------------------------------------------------------------

/// Log at ERROR level with an automatic `domain` field.
///
/// ```ignore
/// fb_error!(io, error = %e, "record sink write failed");
/// ```
#[allow(unused_macros)]
macro_rules! fb_error {
    ($domain:ident, $($rest:tt)*) => {
        fb_log!(error, $domain, $($rest)*)
    };
}

/// Log at WARN level with an automatic `domain` field.
///
/// ```ignore
/// fb_warn!(io, error = %e, "skipping malformed record");
/// ```
macro_rules! fb_warn {
    ($domain:ident, $($rest:tt)*) => {
        fb_log!(warn, $domain, $($rest)*)
    };
}

/// Log at INFO level with an automatic `domain` field.
///
/// ```ignore
/// fb_info!(sys, replay = replay, "engine started");
/// ```
macro_rules! fb_info {
    ($domain:ident, $($rest:tt)*) => {
        fb_log!(info, $domain, $($rest)*)
    };
}

/// Log at DEBUG level with an automatic `domain` field.
///
/// ```ignore
/// fb_debug!(bin, evicted = report.bins_evicted, "timer pass");
/// ```
macro_rules! fb_debug {
    ($domain:ident, $($rest:tt)*) => {
        fb_log!(debug, $domain, $($rest)*)
    };
}

/// Log at TRACE level with an automatic `domain` field.
///
/// ```ignore
/// fb_trace!(io, start = record.start_micros, "record parsed");
/// ```
macro_rules! fb_trace {
    ($domain:ident, $($rest:tt)*) => {
        fb_log!(trace, $domain, $($rest)*)
    };
}
