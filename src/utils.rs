//! Small cross-cutting helpers.

use once_cell::sync::OnceCell;

static LOG_INIT: OnceCell<()> = OnceCell::new();

/// Initializes `env_logger` exactly once. Mirrors the teacher's
/// `Once`-guarded `init_log` test helper, made reusable across every test
/// module instead of living inline in one `mod tests` block.
pub fn init_log() {
    LOG_INIT.get_or_init(|| {
        let _ = env_logger::Builder::from_default_env()
            .format_timestamp_micros()
            .is_test(true)
            .try_init();
    });
}
