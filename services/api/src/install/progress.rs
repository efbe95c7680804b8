//! Recognizes progress reports in the provisioning tool's output.
//!
//! Two forms are understood, anywhere case-insensitive:
//! `progress: 3/10` (colon or `=` optional) and a leading `[3/10]` counter.

use regex::Regex;
use std::sync::OnceLock;

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(?:progress\s*[:=]?\s*(\d+)\s*/\s*(\d+)|\[\s*(\d+)\s*/\s*(\d+)\s*\])",
        )
        .expect("static regex is valid")
    })
}

/// Returns `(completed, total)` if `line` is a progress report.
pub fn parse_progress(line: &str) -> Option<(u32, u32)> {
    let caps = pattern().captures(line)?;
    let completed = caps.get(1).or_else(|| caps.get(3))?.as_str().parse().ok()?;
    let total: u32 = caps.get(2).or_else(|| caps.get(4))?.as_str().parse().ok()?;
    if total == 0 {
        return None;
    }
    Some((completed, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_both_forms() {
        assert_eq!(parse_progress("progress: 3/10"), Some((3, 10)));
        assert_eq!(parse_progress("  PROGRESS 4 / 12 creating VPC"), Some((4, 12)));
        assert_eq!(parse_progress("Progress=1/2"), Some((1, 2)));
        assert_eq!(parse_progress("[7/9] waiting for masters"), Some((7, 9)));
    }

    #[test]
    fn ignores_noise() {
        assert_eq!(parse_progress(""), None);
        assert_eq!(parse_progress("I0101 12:00:00 creating subnet 10.0.0.0/16"), None);
        assert_eq!(parse_progress("progress: soon"), None);
        assert_eq!(parse_progress("progress: 1/0"), None);
        assert_eq!(parse_progress("progress: 99999999999/10"), None);
    }
}
