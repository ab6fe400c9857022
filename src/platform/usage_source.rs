//! Authoritative per-category usage, as kept by the operating system.

use chrono::{DateTime, Local};

use crate::core::telemetry::UsageCategory;
use crate::error::{NetMeterError, Result};

/// Opaque historical usage service.
///
/// `query_usage` covers the half-open range `[start, end)` and returns rx + tx
/// bytes. Callers never pass an `end` in the future. Implementations may block.
pub trait UsageSource: Send + Sync {
    /// False when the service cannot be queried at all (e.g. access not granted).
    fn is_available(&self) -> bool;

    fn query_usage(
        &self,
        category: UsageCategory,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> Result<u64>;
}

/// Stand-in for hosts without an authoritative source; forces fallback mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableUsageSource;

impl UsageSource for UnavailableUsageSource {
    fn is_available(&self) -> bool {
        false
    }

    fn query_usage(
        &self,
        _category: UsageCategory,
        _start: DateTime<Local>,
        _end: DateTime<Local>,
    ) -> Result<u64> {
        Err(NetMeterError::usage_source(
            "no authoritative usage source on this platform",
        ))
    }
}
