//! Configuration access port trait.

use std::time::Duration;

/// Sectioned key/value lookups. Missing or unparsable values yield the
/// caller's default.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;

    /// Whole milliseconds, e.g. `page_delay_ms = 120`. Negative values clamp to zero.
    fn get_millis(&self, section: &str, key: &str, default: Duration) -> Duration {
        let ms = self.get_int(section, key, default.as_millis() as i64);
        Duration::from_millis(ms.max(0) as u64)
    }

    /// Fractional seconds, e.g. `backoff_base_secs = 1.5`.
    fn get_secs(&self, section: &str, key: &str, default: Duration) -> Duration {
        let secs = self.get_double(section, key, default.as_secs_f64());
        Duration::try_from_secs_f64(secs).unwrap_or(default)
    }
}
