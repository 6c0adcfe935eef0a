//! Route-step keyword matching, per the five-tier priority order.

use std::collections::BTreeMap;

/// Matches the route LLM's raw `output` against `branches` in priority
/// order: exact key, key-is-substring, exact value, value-is-substring,
/// `_default`. Returns the matched target (an agent name, or `_end`).
pub fn match_route(output: &str, branches: &BTreeMap<String, String>) -> Option<String> {
    if let Some(target) = branches.get(output) {
        return Some(target.clone());
    }
    for (key, target) in branches {
        if key != "_default" && output.contains(key.as_str()) {
            return Some(target.clone());
        }
    }
    for target in branches.values() {
        if target == output {
            return Some(target.clone());
        }
    }
    for target in branches.values() {
        if output.contains(target.as_str()) {
            return Some(target.clone());
        }
    }
    branches.get("_default").cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branches() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("yes".to_string(), "proceed".to_string()),
            ("no".to_string(), "_end".to_string()),
            ("_default".to_string(), "clarify".to_string()),
        ])
    }

    #[test]
    fn exact_key_wins_first() {
        assert_eq!(match_route("yes", &branches()).as_deref(), Some("proceed"));
    }

    #[test]
    fn key_as_substring_matches_next() {
        assert_eq!(
            match_route("well, yes I think so", &branches()).as_deref(),
            Some("proceed")
        );
    }

    #[test]
    fn exact_value_matches_when_model_echoes_the_target() {
        assert_eq!(match_route("_end", &branches()).as_deref(), Some("_end"));
    }

    #[test]
    fn value_as_substring_matches_before_default() {
        let branches = BTreeMap::from([
            ("_default".to_string(), "clarify".to_string()),
            ("ok".to_string(), "proceed".to_string()),
        ]);
        assert_eq!(
            match_route("the answer is proceed, clearly", &branches).as_deref(),
            Some("proceed")
        );
    }

    #[test]
    fn falls_back_to_default_when_nothing_else_matches() {
        assert_eq!(
            match_route("unrelated babble", &branches()).as_deref(),
            Some("clarify")
        );
    }

    #[test]
    fn returns_none_with_no_default_and_no_match() {
        let branches = BTreeMap::from([("yes".to_string(), "proceed".to_string())]);
        assert_eq!(match_route("nope", &branches), None);
    }
}
