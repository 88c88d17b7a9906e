//! Utilities for logging messages from the library.
//!
//! Set the `LESS_LOG` environment variable to see compiler warnings (unmatched
//! extends, ignored import errors, and the like) on stdout.

#[doc(hidden)]
#[macro_export]
macro_rules! less_log {
    (
        $session:expr,
        $($arg:tt)+
    ) => {
        if $session.log_enabled() {
            println!("{}", format_args!($($arg)+));
        }
    };
}
