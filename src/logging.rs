//! `log` backend.
//!
//! On wasm32 records go to the browser console through `console_log`, in the
//! page and in the worker alike. Native builds leave the facade alone so tests
//! and host binaries can install whatever logger they want.

use log::Level;

/// Maximum level forwarded to the console.
pub const DEFAULT_LEVEL: Level = Level::Debug;

/// Installs the console logger and, with the `console_error_panic_hook`
/// feature, the panic hook. Safe to call more than once.
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    // Redirect `log` messages to the console; a second call finds the logger set.
    #[cfg(target_arch = "wasm32")]
    console_log::init_with_level(DEFAULT_LEVEL).ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init();
        init();
        assert!(DEFAULT_LEVEL <= log::LevelFilter::Debug);
    }
}
