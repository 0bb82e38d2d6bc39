use cagent_core::RunResult;

/// A run satisfies the completion contract when it finished `Completed`
/// with every verification check passing and no self-reported remaining
/// work — the supervisor only stops retrying early for results that meet
/// this bar.
pub fn meets_completion_contract(result: &RunResult) -> bool {
    result.zero_known_issues()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cagent_core::RunStatus;
    use chrono::Utc;

    fn base_result(status: RunStatus) -> RunResult {
        let now = Utc::now();
        RunResult {
            status,
            run_id: "r1".into(),
            resumed_from_run_id: None,
            started_at: now,
            ended_at: now,
            summary: String::new(),
            verification: vec![],
            remaining_work: vec![],
            steps: vec![],
            verification_checks: vec![],
            preflight_checks: vec![],
            files_changed: vec![],
            commands_run: vec![],
            rollback_summary: vec![],
            change_journal: vec![],
            clarification_questions: vec![],
            clarification_answers: Default::default(),
            project_digest: None,
            intelligence_snapshot: None,
            error: None,
        }
    }

    #[test]
    fn completed_with_no_issues_meets_contract() {
        assert!(meets_completion_contract(&base_result(RunStatus::Completed)));
    }

    #[test]
    fn completed_with_remaining_work_does_not_meet_contract() {
        let mut result = base_result(RunStatus::Completed);
        result.remaining_work.push("polish error messages".into());
        assert!(!meets_completion_contract(&result));
    }

    #[test]
    fn non_completed_status_never_meets_contract() {
        assert!(!meets_completion_contract(&base_result(RunStatus::MaxIterations)));
    }
}
