use cagent_core::constants::{
    MAX_STAGNATION_INTERVENTIONS, STAGNATION_NO_MUTATION_ITERATIONS,
    STAGNATION_REPEAT_ACTION_ITERATIONS,
};
use cagent_core::Action;

/// Tracks consecutive no-mutation and repeated-action streaks across
/// iterations, injecting a directive message into the model's context
/// when either streak crosses its threshold. Caps total interventions per
/// run so a model that ignores the directive doesn't get nagged forever.
#[derive(Debug, Default)]
pub struct StagnationTracker {
    consecutive_no_mutation: u32,
    consecutive_repeated: u32,
    last_signature: Option<String>,
    interventions_used: u32,
}

impl StagnationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one executed action and return a directive to inject into
    /// the next prompt, if a stagnation threshold was just crossed.
    pub fn observe(&mut self, action: &Action) -> Option<String> {
        if action.is_mutation() {
            self.consecutive_no_mutation = 0;
        } else {
            self.consecutive_no_mutation += 1;
        }

        let signature = action.signature();
        if self.last_signature.as_deref() == Some(signature.as_str()) {
            self.consecutive_repeated += 1;
        } else {
            self.consecutive_repeated = 1;
        }
        self.last_signature = Some(signature);

        if self.interventions_used >= MAX_STAGNATION_INTERVENTIONS {
            return None;
        }

        if self.consecutive_repeated >= STAGNATION_REPEAT_ACTION_ITERATIONS {
            self.consecutive_repeated = 0;
            self.interventions_used += 1;
            return Some(
                "You have repeated the same action several times in a row without new progress. \
                 Try a different action, or call `final` if the goal is already satisfied."
                    .to_string(),
            );
        }

        if self.consecutive_no_mutation >= STAGNATION_NO_MUTATION_ITERATIONS {
            self.consecutive_no_mutation = 0;
            self.interventions_used += 1;
            return Some(
                "Several iterations have passed without any file change. If the goal requires \
                 edits, make one now; if it is genuinely read-only and already satisfied, call \
                 `final`."
                    .to_string(),
            );
        }

        None
    }
}

/// Blocks a `final` action proposed before any file mutation when the goal
/// reads as one that requires edits. A dry run, or a goal that is
/// genuinely read-only, is let through. Returns `Err(reason)` when the
/// final should be rejected and fed back as a directive instead of ending
/// the run.
pub fn check_premature_final(goal: &str, dry_run: bool, file_writes_used: u32) -> Result<(), String> {
    if !dry_run && cagent_core::text::goal_looks_mutation_like(goal) && file_writes_used == 0 {
        return Err(
            "Premature final blocked before any file writes. The goal calls for changes to the \
             workspace, but no file has been written yet. Make the necessary edits before \
             finishing."
                .to_string(),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cagent_core::Action;

    fn read_action(path: &str) -> Action {
        Action::ReadFile {
            path: path.to_string(),
            start_line: None,
            end_line: None,
        }
    }

    #[test]
    fn no_mutation_streak_triggers_directive() {
        let mut tracker = StagnationTracker::new();
        let mut last = None;
        for i in 0..STAGNATION_NO_MUTATION_ITERATIONS {
            last = tracker.observe(&read_action(&format!("f{i}.rs")));
        }
        assert!(last.is_some());
    }

    #[test]
    fn repeated_identical_action_triggers_directive_before_no_mutation_count() {
        let mut tracker = StagnationTracker::new();
        let mut last = None;
        for _ in 0..STAGNATION_REPEAT_ACTION_ITERATIONS {
            last = tracker.observe(&read_action("same.rs"));
        }
        assert!(last.is_some());
    }

    #[test]
    fn mutation_resets_no_mutation_counter() {
        let mut tracker = StagnationTracker::new();
        for i in 0..(STAGNATION_NO_MUTATION_ITERATIONS - 1) {
            tracker.observe(&read_action(&format!("f{i}.rs")));
        }
        let directive = tracker.observe(&Action::WriteFile {
            path: "a.rs".into(),
            content: "x".into(),
        });
        assert!(directive.is_none());
        assert_eq!(tracker.consecutive_no_mutation, 0);
    }

    #[test]
    fn interventions_are_capped() {
        let mut tracker = StagnationTracker::new();
        let mut count = 0;
        for _ in 0..(MAX_STAGNATION_INTERVENTIONS * STAGNATION_REPEAT_ACTION_ITERATIONS + 10) {
            if tracker.observe(&read_action("same.rs")).is_some() {
                count += 1;
            }
        }
        assert_eq!(count, MAX_STAGNATION_INTERVENTIONS);
    }

    #[test]
    fn premature_final_rejected_for_mutation_like_goal_with_no_writes() {
        assert!(check_premature_final("Implement a config loader", false, 0).is_err());
    }

    #[test]
    fn premature_final_accepted_once_a_write_happened() {
        assert!(check_premature_final("Implement a config loader", false, 1).is_ok());
    }

    #[test]
    fn premature_final_accepted_for_read_only_goal() {
        assert!(check_premature_final("What does this module do?", false, 0).is_ok());
    }

    #[test]
    fn premature_final_accepted_in_dry_run() {
        assert!(check_premature_final("Implement a config loader", true, 0).is_ok());
    }
}
