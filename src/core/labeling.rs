use chrono::{Local, LocalResult, TimeZone};

/// Local calendar date bucket for a capture timestamp, formatted YYYY-MM-DD.
pub fn day_key(captured_at_ms: i64) -> String {
    match Local.timestamp_millis_opt(captured_at_ms) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
            dt.format("%Y-%m-%d").to_string()
        }
        // Timestamps outside chrono's representable range never come from a
        // real capture; bucket them together rather than failing the scan.
        LocalResult::None => "0000-00-00".to_string(),
    }
}

/// Most frequent non-null label, ties broken by first-seen order.
pub fn majority_label<I>(labels: I) -> Option<String>
where
    I: IntoIterator<Item = Option<String>>,
{
    let mut counts: Vec<(String, usize)> = Vec::new();

    for label in labels.into_iter().flatten() {
        match counts.iter_mut().find(|(seen, _)| *seen == label) {
            Some((_, count)) => *count += 1,
            None => counts.push((label, 1)),
        }
    }

    let mut best: Option<(String, usize)> = None;
    for (label, count) in counts {
        match &best {
            // Strict comparison keeps the first-seen label on ties.
            Some((_, best_count)) if count <= *best_count => {}
            _ => best = Some((label, count)),
        }
    }

    best.map(|(label, _)| label)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(input: &[Option<&str>]) -> Vec<Option<String>> {
        input.iter().map(|l| l.map(|s| s.to_string())).collect()
    }

    #[test]
    fn test_day_key_format() {
        let key = day_key(1_700_000_000_000);
        assert_eq!(key.len(), 10);
        let parts: Vec<&str> = key.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 4);
    }

    #[test]
    fn test_day_key_stable_within_minutes() {
        let base = 1_700_000_000_000;
        assert_eq!(day_key(base), day_key(base + 60_000));
    }

    #[test]
    fn test_day_key_changes_across_days() {
        let base = 1_700_000_000_000;
        assert_ne!(day_key(base), day_key(base + 48 * 3_600_000));
    }

    #[test]
    fn test_majority_label_picks_most_frequent() {
        let result = majority_label(labels(&[
            Some("Paris"),
            Some("Lyon"),
            Some("Paris"),
            None,
            Some("Paris"),
        ]));
        assert_eq!(result.as_deref(), Some("Paris"));
    }

    #[test]
    fn test_majority_label_ignores_missing() {
        assert_eq!(majority_label(labels(&[None, None])), None);
        assert_eq!(majority_label(Vec::new()), None);
    }

    #[test]
    fn test_majority_label_tie_breaks_first_seen() {
        let result = majority_label(labels(&[
            Some("Lyon"),
            Some("Paris"),
            Some("Paris"),
            Some("Lyon"),
        ]));
        assert_eq!(result.as_deref(), Some("Lyon"));
    }

    #[test]
    fn test_majority_label_single_entry() {
        let result = majority_label(labels(&[None, Some("Tokyo"), None]));
        assert_eq!(result.as_deref(), Some("Tokyo"));
    }
}
