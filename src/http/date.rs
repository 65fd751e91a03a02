use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Per-connection cache of the formatted `Date` header value.
///
/// IMF-fixdate has one-second granularity, so the formatted line is reused
/// until the clock ticks over.
#[derive(Debug, Default)]
pub(crate) struct DateCache {
    second: u64,
    line: String,
}

impl DateCache {
    #[inline]
    pub(crate) fn value(&mut self) -> &str {
        let now = SystemTime::now();
        let second = now
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        if second != self.second || self.line.is_empty() {
            self.second = second;
            self.line = httpdate::fmt_http_date(now);
        }
        &self.line
    }
}
