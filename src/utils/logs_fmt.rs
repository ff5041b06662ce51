use once_cell::sync::Lazy;
use std::fmt;
use std::time::Instant;
use tracing_subscriber::fmt::time::FormatTime;

static START: Lazy<Instant> = Lazy::new(Instant::now);

pub struct UptimeSeconds;

impl FormatTime for UptimeSeconds {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        let elapsed = START.elapsed();
        write!(w, "{:.3}s", elapsed.as_secs_f64())
    }
}

pub fn abbrev(s: &str) -> String {
    if s.chars().count() > 14 {
        let head: String = s.chars().take(8).collect();
        let tail: String = s.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
        format!("{}...{}", head, tail)
    } else {
        s.to_string()
    }
}

/// Hides the password part of a connection url before it is logged.
pub fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let mut masked = url.to_string();
            masked.replace_range(colon_pos + 1..at_pos, "****");
            return masked;
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abbrev_keeps_short_ids() {
        assert_eq!(abbrev("sub-42"), "sub-42");
        assert_eq!(abbrev("0123456789abcdefghij"), "01234567...ghij");
    }

    #[test]
    fn mask_password_hides_secret() {
        assert_eq!(
            mask_password("postgres://gate:hunter2@db:5432/gate"),
            "postgres://gate:****@db:5432/gate"
        );
        assert_eq!(mask_password("postgres://db/gate"), "postgres://db/gate");
    }

    #[test]
    fn mask_password_handles_passwords_without_user() {
        assert_eq!(mask_password("redis://:s3cret@cache:6379"), "redis://:****@cache:6379");
    }
}
