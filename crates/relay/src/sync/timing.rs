//! Stage timing for reconciliation passes

use log::debug;
use std::time::Instant;

/// Run `f` and log how long it took under `label`
pub fn timed<T>(label: &str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = f();
    debug!("{} took {}ms", label, start.elapsed().as_millis());
    out
}
