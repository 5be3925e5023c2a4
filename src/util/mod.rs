pub(crate) mod debounce;

use crate::models::TEMP_ID_PREFIX;
use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) use debounce::{BrowserScheduler, Debounced, Scheduler};

#[cfg(target_arch = "wasm32")]
pub(crate) fn now_ms() -> i64 {
    js_sys::Date::now().round() as i64
}

#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

static TEMP_SEQ: AtomicU64 = AtomicU64::new(1);

pub(crate) fn make_temp_id(now_ms: i64, seq: u64, rand: u32) -> String {
    format!("{TEMP_ID_PREFIX}{now_ms}-{seq}-{rand:08x}")
}

/// Fresh temporary id. The sequence number keeps ids unique even when the clock
/// does not advance between calls or the random source is unavailable.
pub(crate) fn next_temp_id() -> String {
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut buf = [0u8; 4];
    let rand = match getrandom::getrandom(&mut buf) {
        Ok(()) => u32::from_le_bytes(buf),
        Err(_) => 0,
    };
    make_temp_id(now_ms(), seq, rand)
}
