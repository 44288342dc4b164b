// perf.rs - Timing instrumentation for expansions
//
// Controlled via the OUTSCOPE_PERF environment variable.
//
// Usage:
//   OUTSCOPE_PERF=1 outscope ...        # Log stage timings
//   OUTSCOPE_PERF=verbose outscope ...  # Also warn when a stage exceeds its threshold

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

static PERF_ENABLED: OnceLock<bool> = OnceLock::new();
static PERF_VERBOSE: OnceLock<bool> = OnceLock::new();

#[cfg(test)]
static FORCE_ENABLED: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

/// Check if performance timing is enabled
pub fn is_enabled() -> bool {
    #[cfg(test)]
    if FORCE_ENABLED.load(Ordering::SeqCst) {
        return true;
    }
    *PERF_ENABLED.get_or_init(|| {
        std::env::var("OUTSCOPE_PERF")
            .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
            .unwrap_or(false)
    })
}

/// Check if verbose mode is enabled
pub fn is_verbose() -> bool {
    *PERF_VERBOSE.get_or_init(|| {
        std::env::var("OUTSCOPE_PERF")
            .map(|v| v.to_lowercase() == "verbose")
            .unwrap_or(false)
    })
}

/// RAII timing guard that logs duration on drop
///
/// ```
/// use outscope::perf::TimingGuard;
///
/// let _guard = TimingGuard::new("locate");
/// // ... do work ...
/// // Duration logged when _guard goes out of scope
/// ```
pub struct TimingGuard {
    start: Instant,
    name: &'static str,
    threshold_warn_ms: Option<u64>,
    enabled: bool,
}

impl TimingGuard {
    /// Duration is logged at INFO level when the guard is dropped.
    pub fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
            threshold_warn_ms: None,
            enabled: is_enabled(),
        }
    }

    /// Like [`TimingGuard::new`], additionally warning in verbose mode when
    /// the scope outlives `threshold_ms`.
    pub fn with_threshold(name: &'static str, threshold_ms: u64) -> Self {
        Self {
            start: Instant::now(),
            name,
            threshold_warn_ms: Some(threshold_ms),
            enabled: is_enabled(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Consume the guard without logging and return the duration.
    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        std::mem::forget(self); // Prevent Drop from running
        elapsed
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }

        let elapsed = self.start.elapsed();
        log::info!("[PERF] {} completed in {:?}", self.name, elapsed);

        if let Some(threshold) = self.threshold_warn_ms {
            if elapsed.as_millis() > threshold as u128 && is_verbose() {
                log::warn!(
                    "[PERF] {} exceeded threshold ({}ms > {}ms)",
                    self.name,
                    elapsed.as_millis(),
                    threshold
                );
            }
        }
    }
}

/// Per-expansion counters, logged once the expansion finishes
#[derive(Debug, Default, Clone)]
pub struct ExpansionMetrics {
    pub locate_duration: Option<Duration>,
    pub session_start_duration: Option<Duration>,
    pub free_identifiers: usize,
    pub resolved: usize,
    pub resolve_duration: Option<Duration>,
}

impl ExpansionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_summary(&self) {
        if !is_enabled() {
            return;
        }

        log::info!("[PERF] === Expansion Summary ===");

        if let Some(d) = self.locate_duration {
            log::info!("[PERF] Locate: {:?}", d);
        }
        if let Some(d) = self.session_start_duration {
            log::info!("[PERF] Session start: {:?}", d);
        }
        if let Some(d) = self.resolve_duration {
            log::info!(
                "[PERF] Resolve: {:?} ({}/{} identifiers, {} requests total)",
                d,
                self.resolved,
                self.free_identifiers,
                get_definition_requests()
            );
        }
    }
}

static DEFINITION_REQUESTS: AtomicUsize = AtomicUsize::new(0);

/// Increment the `textDocument/definition` request counter
pub fn increment_definition_requests() {
    DEFINITION_REQUESTS.fetch_add(1, Ordering::Relaxed);
}

/// Process-wide count of definition requests sent
pub fn get_definition_requests() -> usize {
    DEFINITION_REQUESTS.load(Ordering::Relaxed)
}
