// Supervision policy for human-supervised runs.
use crate::agent_engine::state::Action;
use crate::config::SafetyConfig;

/// Decides which actions wait for operator approval.
///
/// Approval only ever applies to supervised runs, and only to the action names
/// listed in `safety.require_approval_for`. With the default empty list the
/// supervision flag is recorded on the run and has no effect on execution.
#[derive(Debug, Clone, Default)]
pub struct SupervisionPolicy {
    require_approval_for: Vec<String>,
}

impl SupervisionPolicy {
    pub fn from_config(config: &SafetyConfig) -> Self {
        Self {
            require_approval_for: config.require_approval_for.clone(),
        }
    }

    /// Returns true if this action requires human approval before execution.
    pub fn requires_approval(&self, action: &Action, human_supervised: bool) -> bool {
        if !human_supervised || action.is_terminal() {
            return false;
        }
        let name = action.name();
        self.require_approval_for.iter().any(|r| r == name || r == "*")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(names: &[&str]) -> SupervisionPolicy {
        SupervisionPolicy::from_config(&SafetyConfig {
            require_approval_for: names.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn default_policy_never_gates() {
        let p = SupervisionPolicy::default();
        assert!(!p.requires_approval(&Action::LeftClick, true));
        assert!(!p.requires_approval(&Action::Type { text: "x".into() }, true));
    }

    #[test]
    fn listed_actions_gate_only_supervised_runs() {
        let p = policy(&["left_click", "type"]);
        assert!(p.requires_approval(&Action::LeftClick, true));
        assert!(!p.requires_approval(&Action::LeftClick, false));
        assert!(p.requires_approval(&Action::Type { text: "x".into() }, true));
        assert!(!p.requires_approval(&Action::Screenshot, true));
    }

    #[test]
    fn wildcard_gates_everything_but_terminal_signals() {
        let p = policy(&["*"]);
        assert!(p.requires_approval(&Action::CursorPosition, true));
        assert!(!p.requires_approval(&Action::Finish, true));
    }
}
