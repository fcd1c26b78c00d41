//! Predicates over `grant` CLI output

use predicates::prelude::*;

/// Output contains the queue status line printed by `grant queue status`
///
/// # Example
/// ```rust
/// use grant_test_helpers::assertions::queue_status_is;
/// use predicates::prelude::*;
///
/// let out = "pending: 1  syncing: 0  failed: 0  total: 1\n";
/// assert!(queue_status_is(1, 0, 0, 1).eval(out));
/// ```
pub fn queue_status_is(pending: usize, syncing: usize, failed: usize, total: usize) -> impl Predicate<str> {
    predicate::str::contains(format!(
        "pending: {}  syncing: {}  failed: {}  total: {}",
        pending, syncing, failed, total
    ))
}

/// Output contains none of the given strings
pub fn output_not_contains(values: &[&str]) -> impl Predicate<str> {
    let owned: Vec<String> = values.iter().map(|s| s.to_string()).collect();
    predicate::function(move |s: &str| !owned.iter().any(|v| s.contains(v.as_str())))
}

/// Output contains a queue item id (`<millis>-<9 alphanumerics>`)
pub fn contains_item_id() -> impl Predicate<str> {
    predicate::str::is_match(r"\d{13}-[a-z0-9]{9}").expect("item id pattern is valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_status_is() {
        let out = "pending: 0  syncing: 0  failed: 2  total: 2";
        assert!(queue_status_is(0, 0, 2, 2).eval(out));
        assert!(!queue_status_is(1, 0, 2, 3).eval(out));
    }

    #[test]
    fn test_output_not_contains() {
        assert!(output_not_contains(&["ERROR"]).eval("all good"));
        assert!(!output_not_contains(&["ERROR"]).eval("ERROR: boom"));
    }

    #[test]
    fn test_contains_item_id() {
        assert!(contains_item_id().eval("Queued 1717200000000-abc123xyz"));
        assert!(!contains_item_id().eval("Queued nothing"));
    }
}
