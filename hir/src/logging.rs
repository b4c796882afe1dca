//! Logging setup for the HIR library
//!
//! The library only emits records through the `log` facade; binaries and
//! tests choose the sink. `env_logger` is the default sink.
//!
//! # Targets
//!
//! - `hir::linear_scan` - per-phase events of the block ordering pass, gated
//!   by [`HirOptions::trace_linear_scan_level`](crate::HirOptions)
//! - `hir::merge` - join point reconciliation and phi insertion
//! - `hir::builder` - block creation and bailouts (emitted through `tracing`)
//!
//! ```bash
//! RUST_LOG=hir::linear_scan=trace hirscan graph.json
//! ```

use env_logger::Builder;
use log::{Level, LevelFilter};
use std::io::Write;
use std::sync::Once;

static INIT: Once = Once::new();

/// Log target used by the linear-scan ordering pass.
pub const LINEAR_SCAN_TARGET: &str = "hir::linear_scan";

/// Log target used by state merging.
pub const MERGE_TARGET: &str = "hir::merge";

/// Target of the builder's `tracing` events. They reach the `log` sink
/// through tracing's `log` feature when no subscriber is installed.
pub const BUILDER_TARGET: &str = "hir::builder";

/// Initialize logging at Warn level. Later calls are no-ops.
pub fn init() {
    init_with_level(LevelFilter::Warn);
}

/// Initialize logging with a specific level. Later calls are no-ops.
pub fn init_with_level(level: LevelFilter) {
    INIT.call_once(|| {
        Builder::new()
            .filter_level(level)
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{:5}] {} - {}",
                    record.level(),
                    record.target(),
                    record.args()
                )
            })
            .init();
    });
}

/// Initialize logging from `RUST_LOG`, defaulting to `warn`.
pub fn init_from_env() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    });
}

/// Initialize logging for tests.
///
/// Output goes through the test harness capture and stays at Warn unless
/// `RUST_LOG` says otherwise.
pub fn init_test() {
    // try_init() tolerates a sink installed by another test
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Warn)
        .parse_default_env()
        .is_test(true)
        .try_init();
}

/// Whether one of the `init*` functions (other than `init_test`) ran.
pub fn is_initialized() -> bool {
    INIT.is_completed()
}

/// Map a linear-scan trace level to the log level its events use.
///
/// Level 0 is silent. Level 1 (the final order table) is a debug event;
/// everything more detailed is trace.
pub fn linear_scan_level(trace_level: u8) -> Option<Level> {
    match trace_level {
        0 => None,
        1 => Some(Level::Debug),
        _ => Some(Level::Trace),
    }
}
