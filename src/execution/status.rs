use serde::{Deserialize, Serialize};

/// Execution status of one node execution record.
///
/// Transitions are monotonic in the partial order
/// `Queued < Running < waiting states < Running < terminal`; a terminal
/// status is never revisited. `Running` is entered exactly once per
/// invocation call (start or resume).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeExecutionStatus {
    Queued,
    Running,
    TaskWaiting,
    ChildWaiting,
    ChildrenWaiting,
    Succeeded,
    Failed,
    Aborted,
}

impl NodeExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeExecutionStatus::Succeeded
                | NodeExecutionStatus::Failed
                | NodeExecutionStatus::Aborted
        )
    }

    pub fn is_waiting(&self) -> bool {
        matches!(
            self,
            NodeExecutionStatus::TaskWaiting
                | NodeExecutionStatus::ChildWaiting
                | NodeExecutionStatus::ChildrenWaiting
        )
    }

    /// Whether moving from `self` to `next` respects the status machine.
    pub fn can_transition_to(&self, next: NodeExecutionStatus) -> bool {
        use NodeExecutionStatus::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (Queued, Running) | (Queued, Aborted) => true,
            (Running, Succeeded) | (Running, Failed) | (Running, Aborted) => true,
            (Running, TaskWaiting) | (Running, ChildWaiting) | (Running, ChildrenWaiting) => true,
            // Resume re-enters Running; a waiting node can also fail or be
            // aborted at its boundary.
            (s, Running) if s.is_waiting() => true,
            (s, Failed) | (s, Aborted) if s.is_waiting() => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeExecutionStatus::Queued => "QUEUED",
            NodeExecutionStatus::Running => "RUNNING",
            NodeExecutionStatus::TaskWaiting => "TASK_WAITING",
            NodeExecutionStatus::ChildWaiting => "CHILD_WAITING",
            NodeExecutionStatus::ChildrenWaiting => "CHILDREN_WAITING",
            NodeExecutionStatus::Succeeded => "SUCCEEDED",
            NodeExecutionStatus::Failed => "FAILED",
            NodeExecutionStatus::Aborted => "ABORTED",
        }
    }
}

impl std::fmt::Display for NodeExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::NodeExecutionStatus::*;

    #[test]
    fn test_terminal_statuses_are_absorbing() {
        for terminal in [Succeeded, Failed, Aborted] {
            for next in [
                Queued,
                Running,
                TaskWaiting,
                ChildWaiting,
                ChildrenWaiting,
                Succeeded,
                Failed,
                Aborted,
            ] {
                assert!(
                    !terminal.can_transition_to(next),
                    "{terminal} -> {next} must be rejected"
                );
            }
        }
    }

    #[test]
    fn test_waiting_reentry_into_running() {
        assert!(TaskWaiting.can_transition_to(Running));
        assert!(ChildWaiting.can_transition_to(Running));
        assert!(ChildrenWaiting.can_transition_to(Running));
    }

    #[test]
    fn test_queued_cannot_skip_running_to_success() {
        assert!(!Queued.can_transition_to(Succeeded));
        assert!(Queued.can_transition_to(Aborted));
        assert!(Queued.can_transition_to(Running));
    }
}
