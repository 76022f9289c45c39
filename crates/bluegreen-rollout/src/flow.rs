//! Typed early exits threaded through the run.

use serde::Serialize;

use bluegreen_core::Environment;

/// Why a run stopped before promotion without failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    DeployDisabled,
    CreationDisabled,
    UpdateDisabled,
    NotWaiting,
}

impl ExitReason {
    pub fn describe(&self) -> &'static str {
        match self {
            ExitReason::DeployDisabled => "deployment is disabled",
            ExitReason::CreationDisabled => "no target environment and creation is disabled",
            ExitReason::UpdateDisabled => "target environment exists and updates are disabled",
            ExitReason::NotWaiting => "not waiting for the deployment to finish",
        }
    }
}

/// Outcome of a stage: keep going with an environment, or stop here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue(Environment),
    EarlyExit {
        reason: ExitReason,
        last_known: Option<Environment>,
    },
}

impl Flow {
    pub fn exit(reason: ExitReason, last_known: Option<Environment>) -> Self {
        Flow::EarlyExit { reason, last_known }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn early_exit_keeps_last_known_environment() {
        let flow = Flow::exit(ExitReason::NotWaiting, None);
        assert_eq!(
            flow,
            Flow::EarlyExit {
                reason: ExitReason::NotWaiting,
                last_known: None
            }
        );
        assert_eq!(
            serde_json::to_string(&ExitReason::CreationDisabled).unwrap(),
            "\"creation_disabled\""
        );
    }
}
