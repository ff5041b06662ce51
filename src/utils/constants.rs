pub const PLAN_EVENTS_CHANNEL: &str = "featuregate:plans";

/// Seconds a redis usage hash outlives the end of its period.
pub const USAGE_RETENTION_SECS: i64 = 7 * 24 * 60 * 60;

/// KEYS[1] usage hash, ARGV[1] capability key, ARGV[2] delta,
/// ARGV[3] limit (-1 for unlimited), ARGV[4] expire-at unix seconds.
/// Returns {1, total} when applied and {0, current} when rejected.
pub const LUA_CONDITIONAL_INCREMENT: &str = r#"
    local usage_key = KEYS[1]
    local field = ARGV[1]
    local delta = tonumber(ARGV[2])
    local limit = tonumber(ARGV[3])
    local expire_at = tonumber(ARGV[4])

    local current = tonumber(redis.call('HGET', usage_key, field) or '0')

    if limit >= 0 and current + delta > limit then
        return {0, current}
    end

    local total = redis.call('HINCRBY', usage_key, field, delta)
    redis.call('EXPIREAT', usage_key, expire_at)
    return {1, total}
"#;
