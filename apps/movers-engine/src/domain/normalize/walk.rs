//! Path lookup and bounded breadth-first key search over JSON documents.

use std::collections::VecDeque;

use serde_json::Value;

/// Maximum nodes visited by one breadth-first search.
pub const MAX_VISITED_NODES: usize = 6000;

/// Lowercase keys whose subtrees describe an earlier session. The walk never
/// descends into them, so bare `o`/`v` aliases cannot pick up yesterday's bar.
pub const PRIOR_SESSION_KEYS: &[&str] = &["prevday", "prev_day", "previousday", "previous_day"];

/// Interpret a JSON value as a finite number.
///
/// Accepts numbers and numeric strings (surrounding whitespace, thousands
/// separators and a trailing `%` are tolerated).
#[must_use]
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .trim_end_matches('%')
                .chars()
                .filter(|c| *c != ',')
                .collect();
            if cleaned.is_empty() {
                return None;
            }
            cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        _ => None,
    }
}

/// Follow a dotted path (`"prevDay.c"`) through nested objects.
#[must_use]
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(root, |node, key| node.as_object()?.get(key))
}

/// Breadth-first search for the first numeric value under any alias key.
///
/// Keys compare case-insensitively against `aliases`, which must already
/// be lowercase. Visits at most `budget` nodes and skips the subtrees named
/// in [`PRIOR_SESSION_KEYS`].
#[must_use]
pub fn find_numeric(root: &Value, aliases: &[&str], budget: usize) -> Option<f64> {
    if aliases.is_empty() {
        return None;
    }

    let mut queue = VecDeque::from([root]);
    let mut visited = 0usize;

    while let Some(node) = queue.pop_front() {
        visited += 1;
        if visited > budget {
            return None;
        }
        match node {
            Value::Object(map) => {
                for (key, value) in map {
                    if aliases.contains(&key.to_lowercase().as_str())
                        && let Some(number) = as_number(value)
                    {
                        return Some(number);
                    }
                }
                queue.extend(
                    map.iter()
                        .filter(|(k, v)| {
                            (v.is_object() || v.is_array())
                                && !PRIOR_SESSION_KEYS.contains(&k.to_lowercase().as_str())
                        })
                        .map(|(_, v)| v),
                );
            }
            Value::Array(items) => {
                queue.extend(items.iter().filter(|v| v.is_object() || v.is_array()));
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_and_numeric_strings() {
        assert_eq!(as_number(&json!(1.5)), Some(1.5));
        assert_eq!(as_number(&json!(" 2,500.25 ")), Some(2500.25));
        assert_eq!(as_number(&json!("12.5%")), Some(12.5));
        assert_eq!(as_number(&json!("n/a")), None);
        assert_eq!(as_number(&json!("")), None);
        assert_eq!(as_number(&json!(null)), None);
        assert_eq!(as_number(&json!(true)), None);
    }

    #[test]
    fn dotted_lookup() {
        let doc = json!({"prevDay": {"c": 4.0}});
        assert_eq!(lookup(&doc, "prevDay.c"), Some(&json!(4.0)));
        assert_eq!(lookup(&doc, "prevDay.o"), None);
        assert_eq!(lookup(&doc, "missing.c"), None);
    }

    #[test]
    fn breadth_first_prefers_shallow_match() {
        let doc = json!({
            "deep": {"deeper": {"Volume": 1.0}},
            "shallow": {"VOLUME": 2.0}
        });
        assert_eq!(find_numeric(&doc, &["volume"], MAX_VISITED_NODES), Some(2.0));
    }

    #[test]
    fn non_numeric_matches_are_skipped() {
        let doc = json!({"a": {"float": "unknown"}, "b": [{"float": "1200"}]});
        assert_eq!(find_numeric(&doc, &["float"], MAX_VISITED_NODES), Some(1200.0));
    }

    #[test]
    fn prior_session_subtree_is_not_searched() {
        let doc = json!({"prevDay": {"o": 8.0, "v": 999}, "lastTrade": {"p": 11.0}});
        assert_eq!(find_numeric(&doc, &["open", "o"], MAX_VISITED_NODES), None);
        assert_eq!(find_numeric(&doc, &["p"], MAX_VISITED_NODES), Some(11.0));
    }

    #[test]
    fn search_respects_node_budget() {
        let mut doc = json!({"target": 7.0});
        for _ in 0..10 {
            doc = json!({"wrap": doc});
        }
        assert_eq!(find_numeric(&doc, &["target"], 5), None);
        assert_eq!(find_numeric(&doc, &["target"], MAX_VISITED_NODES), Some(7.0));
    }
}
