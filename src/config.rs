use once_cell::sync::Lazy;

/// Address the HTTP listener binds to. Defaults to all interfaces.
pub static BIND_ADDRESS: Lazy<String> =
    Lazy::new(|| std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()));

/// Port the HTTP listener binds to. Defaults to 8080.
pub static BIND_PORT: Lazy<u16> = Lazy::new(|| {
    std::env::var("BIND_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080)
});

/// When set to a truthy value, allows the application to continue running even if database
/// migrations fail. Defaults to `false`.
pub static ALLOW_MIGRATION_FAILURE: Lazy<bool> = Lazy::new(|| truthy_env("ALLOW_MIGRATION_FAILURE"));

/// Commission policy for listings whose agent association cannot be resolved: when
/// enabled, the `created_by` reference is treated as the commission holder on
/// deletion reversal. Defaults to `false` (no reversal is attempted and the gap is
/// logged instead).
pub static COMMISSION_CREATOR_FALLBACK: Lazy<bool> =
    Lazy::new(|| truthy_env("COMMISSION_CREATOR_FALLBACK"));

/// Interval between revenue-audit ticks. Defaults to hourly.
pub static REVENUE_AUDIT_INTERVAL_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("REVENUE_AUDIT_INTERVAL_SECS")
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(3600)
});

/// How many days back the revenue-audit tick rechecks. Defaults to 7.
pub static REVENUE_AUDIT_LOOKBACK_DAYS: Lazy<i64> = Lazy::new(|| {
    std::env::var("REVENUE_AUDIT_LOOKBACK_DAYS")
        .ok()
        .and_then(|value| value.trim().parse::<i64>().ok())
        .unwrap_or(7)
});

/// When truthy, the revenue-audit tick rewrites drifted ledger rows from the
/// canonical listings instead of only logging the drift. Defaults to `false`.
pub static REVENUE_AUDIT_REPAIR: Lazy<bool> = Lazy::new(|| truthy_env("REVENUE_AUDIT_REPAIR"));

fn truthy_env(var: &str) -> bool {
    std::env::var(var)
        .ok()
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes")
        })
        .unwrap_or(false)
}
