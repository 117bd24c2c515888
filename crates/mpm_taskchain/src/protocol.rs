//! Built-in protocols and custom phase-list validation.

use crate::engine::{ChainError, Phase, PhaseType};
use std::collections::HashSet;

/// Build the phase list for a named protocol.
///
/// `input` seeds the first phase's `input` field so the client sees the
/// task statement where work starts.
pub fn build_protocol(name: &str, input: &str) -> Result<Vec<Phase>, ChainError> {
    let mut phases = match name {
        "linear" => vec![Phase::execute("main", "Main")],
        "develop" => vec![
            Phase::execute("analyze", "Analyze"),
            Phase::gate("plan_gate", "Plan review", "implement", "analyze", 2),
            Phase::looped("implement", "Implement"),
            Phase::gate("verify_gate", "Verification", "finalize", "implement", 3),
            Phase::execute("finalize", "Finalize"),
        ],
        "debug" => vec![
            Phase::execute("reproduce", "Reproduce"),
            Phase::execute("locate", "Locate"),
            Phase::looped("fix", "Fix"),
            Phase::gate("verify_gate", "Verification", "finalize", "fix", 3),
            Phase::execute("finalize", "Finalize"),
        ],
        "refactor" => vec![
            Phase::execute("baseline", "Baseline"),
            Phase::execute("analyze", "Analyze"),
            Phase::looped("refactor", "Refactor"),
            Phase::gate("verify_gate", "Verification", "finalize", "refactor", 3),
            Phase::execute("finalize", "Finalize"),
        ],
        other => {
            return Err(ChainError::InvalidProtocol(format!(
                "unknown protocol '{}' (expected linear, develop, debug, refactor, or custom)",
                other
            )))
        }
    };

    if let Some(first) = phases.first_mut() {
        first.input = input.to_string();
    }
    Ok(phases)
}

/// Validate a caller-supplied custom phase list: non-empty unique ids and
/// gate targets that reference existing phases.
pub fn validate_custom(phases: &[Phase]) -> Result<(), ChainError> {
    if phases.is_empty() {
        return Err(ChainError::InvalidProtocol(
            "custom protocol needs at least one phase".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for phase in phases {
        if phase.id.trim().is_empty() {
            return Err(ChainError::InvalidProtocol(
                "phase with empty id".to_string(),
            ));
        }
        if !seen.insert(phase.id.as_str()) {
            return Err(ChainError::InvalidProtocol(format!(
                "duplicate phase id '{}'",
                phase.id
            )));
        }
    }

    let ids: HashSet<&str> = phases.iter().map(|p| p.id.as_str()).collect();
    for phase in phases {
        if phase.phase_type != PhaseType::Gate {
            continue;
        }
        for target in [&phase.on_pass, &phase.on_fail].into_iter().flatten() {
            if !ids.contains(target.as_str()) {
                return Err(ChainError::InvalidProtocol(format!(
                    "gate '{}' routes to unknown phase '{}'",
                    phase.id, target
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn develop_shape() {
        let phases = build_protocol("develop", "build the thing").unwrap();
        assert_eq!(phases.len(), 5);
        assert_eq!(phases[0].input, "build the thing");
        assert_eq!(phases[1].phase_type, PhaseType::Gate);
        assert_eq!(phases[1].max_retries, 2);
        assert_eq!(phases[1].on_fail.as_deref(), Some("analyze"));
        assert_eq!(phases[3].max_retries, 3);
        assert_eq!(phases[3].on_pass.as_deref(), Some("finalize"));
    }

    #[test]
    fn linear_is_single_execute() {
        let phases = build_protocol("linear", "x").unwrap();
        assert_eq!(phases.len(), 1);
        assert_eq!(phases[0].phase_type, PhaseType::Execute);
    }

    #[test]
    fn unknown_protocol_is_an_error() {
        assert!(build_protocol("waterfall", "").is_err());
    }

    #[test]
    fn custom_validation_catches_bad_gate_target() {
        let phases = vec![
            Phase::execute("a", "A"),
            Phase::gate("g", "G", "a", "missing", 3),
        ];
        let err = validate_custom(&phases).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn custom_validation_catches_duplicate_ids() {
        let phases = vec![Phase::execute("a", "A"), Phase::execute("a", "A2")];
        assert!(validate_custom(&phases).is_err());
    }
}
