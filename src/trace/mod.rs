//! Execution trace: the ordered stack of levels describing the path from
//! the run root to the currently executing node.
//!
//! A trace is created once per top-level run and extended by one level per
//! descent into a child. Extension clones the level stack; an ancestor's
//! trace is never mutated by its descendants.

use serde::{Deserialize, Serialize};

use crate::plan::{NodeDefinition, StepCategory};

/// One entry in a [`Trace`]: which plan node is executing, under which
/// per-instance runtime id, and with which declared capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceLevel {
    /// Statically compiled plan-node id.
    pub setup_id: String,
    /// Fresh per-instance runtime id (the node execution record uuid).
    pub runtime_id: String,
    /// Declared capability of the step at this level.
    pub step_type: StepCategory,
}

impl TraceLevel {
    pub fn new(node: &NodeDefinition, runtime_id: impl Into<String>) -> Self {
        Self {
            setup_id: node.id.clone(),
            runtime_id: runtime_id.into(),
            step_type: node.capability,
        }
    }
}

/// Ordered, append-only stack of [`TraceLevel`]s. The last level always
/// identifies the node currently executing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    /// Id of the top-level run this trace belongs to.
    pub run_id: String,
    levels: Vec<TraceLevel>,
}

impl Trace {
    /// Start a new trace for a top-level run, rooted at `level`.
    pub fn root(run_id: impl Into<String>, level: TraceLevel) -> Self {
        Self {
            run_id: run_id.into(),
            levels: vec![level],
        }
    }

    /// Clone this trace with one additional level appended. The receiver is
    /// left untouched.
    pub fn descend(&self, level: TraceLevel) -> Self {
        let mut levels = self.levels.clone();
        levels.push(level);
        Self {
            run_id: self.run_id.clone(),
            levels,
        }
    }

    /// The level of the node currently executing.
    pub fn current(&self) -> &TraceLevel {
        self.levels.last().expect("trace always has at least one level")
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn levels(&self) -> &[TraceLevel] {
        &self.levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::NodeDefinition;

    fn node(id: &str, cap: StepCategory) -> NodeDefinition {
        NodeDefinition::new(id, id, cap)
    }

    #[test]
    fn test_descend_appends_without_mutating_parent() {
        let root = node("root", StepCategory::Children);
        let child = node("child", StepCategory::Sync);

        let parent = Trace::root("run-1", TraceLevel::new(&root, "r-1"));
        let descended = parent.descend(TraceLevel::new(&child, "r-2"));

        assert_eq!(parent.depth(), 1);
        assert_eq!(descended.depth(), 2);
        assert_eq!(parent.current().setup_id, "root");
        assert_eq!(descended.current().setup_id, "child");
        assert_eq!(descended.run_id, "run-1");
        // Prefix is structurally identical to the parent stack.
        assert_eq!(descended.levels()[0], parent.levels()[0]);
    }

    #[test]
    fn test_sibling_descents_are_independent() {
        let root = node("root", StepCategory::Children);
        let a = node("a", StepCategory::Sync);
        let b = node("b", StepCategory::Sync);

        let parent = Trace::root("run-1", TraceLevel::new(&root, "r-1"));
        let ta = parent.descend(TraceLevel::new(&a, "r-a"));
        let tb = parent.descend(TraceLevel::new(&b, "r-b"));

        assert_eq!(ta.current().runtime_id, "r-a");
        assert_eq!(tb.current().runtime_id, "r-b");
        assert_eq!(parent.depth(), 1);
    }
}
