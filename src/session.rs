//! Tracks metadata for a compilation session.
//!
//! When the calling program first uses one of the API entry points there is no
//! context yet where the library's code may start to track things.  This struct
//! provides that context.  It is cheap to clone and gets threaded through the
//! parser, the import machinery, and the visitor passes.

/// Metadata for a compilation session.
#[derive(Clone)]
pub struct Session {
    log_enabled: bool,
}

impl Default for Session {
    fn default() -> Session {
        Session::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            log_enabled: log_enabled_from_env(),
        }
    }

    pub fn new_for_test_suite() -> Self {
        Self { log_enabled: false }
    }

    pub fn log_enabled(&self) -> bool {
        self.log_enabled
    }
}

fn log_enabled_from_env() -> bool {
    std::env::var_os("LESS_LOG").is_some()
}
