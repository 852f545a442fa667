//! Strategy Selector (L8): maps (task, classification, override) to a
//! strategy name.

use taskstore::{Classification, Complexity, Task};

use super::{STRATEGY_ITERATIVE, STRATEGY_MULTI_AGENT, STRATEGY_SINGLE_SHOT};

/// Known strategy names, for validating a manual override.
pub const KNOWN_STRATEGIES: &[&str] = &[STRATEGY_SINGLE_SHOT, STRATEGY_ITERATIVE, STRATEGY_MULTI_AGENT];

/// `select(task, classification, manual-override?) -> strategy-name`.
///
/// A manual override wins if it names a known strategy; callers are
/// expected to have already recorded `classification.source = override`
/// when that happens (the selector itself is side-effect free).
pub fn select_strategy(task: &Task, classification: &Classification) -> &'static str {
    if let Some(name) = task.override_strategy.as_deref() {
        if let Some(known) = KNOWN_STRATEGIES.iter().find(|k| **k == name) {
            return known;
        }
    }

    match classification.complexity {
        Complexity::Simple => STRATEGY_SINGLE_SHOT,
        Complexity::Medium => STRATEGY_ITERATIVE,
        Complexity::Complex | Complexity::Epic => STRATEGY_MULTI_AGENT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskstore::{ClassificationSource, TaskType};

    fn classification(complexity: Complexity) -> Classification {
        Classification {
            task_type: TaskType::BugFix,
            complexity,
            confidence: 0.9,
            source: ClassificationSource::Heuristic,
        }
    }

    #[test]
    fn maps_complexity_to_strategy() {
        let task = Task::new("u", "t", "d");
        assert_eq!(select_strategy(&task, &classification(Complexity::Simple)), STRATEGY_SINGLE_SHOT);
        assert_eq!(select_strategy(&task, &classification(Complexity::Medium)), STRATEGY_ITERATIVE);
        assert_eq!(select_strategy(&task, &classification(Complexity::Complex)), STRATEGY_MULTI_AGENT);
        assert_eq!(select_strategy(&task, &classification(Complexity::Epic)), STRATEGY_MULTI_AGENT);
    }

    #[test]
    fn manual_override_wins() {
        let mut task = Task::new("u", "t", "d");
        task.override_strategy = Some(STRATEGY_MULTI_AGENT.to_string());
        assert_eq!(select_strategy(&task, &classification(Complexity::Simple)), STRATEGY_MULTI_AGENT);
    }

    #[test]
    fn unknown_override_falls_back_to_complexity() {
        let mut task = Task::new("u", "t", "d");
        task.override_strategy = Some("NotARealStrategy".to_string());
        assert_eq!(select_strategy(&task, &classification(Complexity::Simple)), STRATEGY_SINGLE_SHOT);
    }
}
