//! Pure task-chain state machine. No I/O.
//!
//! Three phase kinds: `execute` (complete with a summary), `gate` (routes
//! on a pass/fail result with capped retry), `loop` (holds dynamically
//! spawned sub-tasks and passes once every sub-task is terminal).
//!
//! Invariant: at most one phase is `active` at any time, and
//! `current_phase` names it (empty string when none). Completing a phase
//! auto-activates the next pending one; completing the last emits `finish`.

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Default retry cap for gate phases.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Phase not found: {0}")]
    PhaseNotFound(String),

    #[error("Phase {id} is {status}, expected pending")]
    PhaseNotPending { id: String, status: PhaseStatus },

    #[error("Phase {id} is {status}, expected active")]
    PhaseNotActive { id: String, status: PhaseStatus },

    #[error("Phase {id} is of type {actual}, operation requires {expected}")]
    WrongPhaseType {
        id: String,
        expected: PhaseType,
        actual: PhaseType,
    },

    #[error("Another phase is already active: {0}")]
    AnotherPhaseActive(String),

    #[error("Sub-task {sub} not found in phase {phase}")]
    SubTaskNotFound { phase: String, sub: String },

    #[error("Sub-task {sub} is {status}, cannot {op}")]
    SubTaskWrongStatus {
        sub: String,
        status: SubTaskStatus,
        op: &'static str,
    },

    #[error("Gate {id} exhausted its retries ({retries}); task chain is failed")]
    GateExhausted { id: String, retries: u32 },

    #[error("Task chain is {0}, no further operations are accepted")]
    ChainNotRunning(ChainStatus),

    #[error("Task chain {0} was already re-initialized once; pause and consult the user before resetting it again")]
    ReinitRefused(String),

    #[error("Task chain not found: {0}")]
    ChainNotFound(String),

    #[error("Invalid protocol: {0}")]
    InvalidProtocol(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseType {
    Execute,
    Gate,
    Loop,
}

impl std::fmt::Display for PhaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Execute => "execute",
            Self::Gate => "gate",
            Self::Loop => "loop",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Pending,
    Active,
    Passed,
    Failed,
    Skipped,
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubTaskStatus {
    Pending,
    Active,
    Passed,
    Failed,
}

impl SubTaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Passed | Self::Failed)
    }
}

impl std::fmt::Display for SubTaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Passed => "passed",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainStatus {
    Running,
    Paused,
    Finished,
    Failed,
}

impl std::fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Finished => "finished",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Caller-supplied result for gates and sub-tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateResult {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTask {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub verify: String,
    pub status: SubTaskStatus,
    #[serde(default)]
    pub summary: String,
}

/// Input shape for spawning sub-tasks.
#[derive(Debug, Clone, Deserialize)]
pub struct SubTaskSpec {
    pub name: String,
    #[serde(default)]
    pub verify: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub phase_type: PhaseType,
    pub status: PhaseStatus,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub on_pass: Option<String>,
    #[serde(default)]
    pub on_fail: Option<String>,
    pub max_retries: u32,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub sub_tasks: Vec<SubTask>,
}

impl Phase {
    pub fn execute(id: &str, name: &str) -> Self {
        Self::new(id, name, PhaseType::Execute)
    }

    pub fn gate(id: &str, name: &str, on_pass: &str, on_fail: &str, max_retries: u32) -> Self {
        let mut p = Self::new(id, name, PhaseType::Gate);
        p.on_pass = Some(on_pass.to_string());
        p.on_fail = Some(on_fail.to_string());
        p.max_retries = max_retries;
        p
    }

    pub fn looped(id: &str, name: &str) -> Self {
        Self::new(id, name, PhaseType::Loop)
    }

    fn new(id: &str, name: &str, phase_type: PhaseType) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            phase_type,
            status: PhaseStatus::Pending,
            input: String::new(),
            summary: String::new(),
            on_pass: None,
            on_fail: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_count: 0,
            sub_tasks: Vec::new(),
        }
    }
}

/// Event kinds of the append-only chain log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Init,
    Start,
    Complete,
    Spawn,
    StartSub,
    CompleteSub,
    Fail,
    Finish,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Spawn => "spawn",
            Self::StartSub => "start_sub",
            Self::CompleteSub => "complete_sub",
            Self::Fail => "fail",
            Self::Finish => "finish",
        }
    }
}

/// What an engine mutation did, in commit order. The store appends these
/// to the event log verbatim.
#[derive(Debug, Clone)]
pub struct EngineEvent {
    pub event_type: EventType,
    pub phase_id: String,
    pub sub_id: String,
    pub payload: serde_json::Value,
}

impl EngineEvent {
    fn new(event_type: EventType, phase_id: &str) -> Self {
        Self {
            event_type,
            phase_id: phase_id.to_string(),
            sub_id: String::new(),
            payload: json!({}),
        }
    }

    fn with_sub(mut self, sub_id: &str) -> Self {
        self.sub_id = sub_id.to_string();
        self
    }

    fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Outcome of `complete_gate`.
#[derive(Debug, Clone, Serialize)]
pub struct GateOutcome {
    pub result: GateResult,
    /// Next phase id to work on (empty when none).
    pub next: String,
    pub retry_count: u32,
    pub max_retries: u32,
    /// True when a fail consumed the last retry; the chain is now failed.
    pub exhausted: bool,
}

/// Outcome of `complete_sub_task`.
#[derive(Debug, Clone, Serialize)]
pub struct CompleteSubOutcome {
    /// Sub-task auto-started after this one completed, if any.
    pub next_sub: Option<String>,
    /// True when the enclosing loop phase passed in this operation.
    pub loop_done: bool,
    /// Phase auto-activated after the loop passed (empty when none).
    pub next_phase: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskChain {
    pub task_id: String,
    pub description: String,
    pub protocol: String,
    pub status: ChainStatus,
    pub phases: Vec<Phase>,
    pub current_phase: String,
    pub reinit_count: u32,
}

impl TaskChain {
    /// Build a chain and activate its first phase.
    pub fn init(
        task_id: &str,
        description: &str,
        protocol: &str,
        phases: Vec<Phase>,
    ) -> Result<(Self, Vec<EngineEvent>), ChainError> {
        if phases.is_empty() {
            return Err(ChainError::InvalidProtocol(
                "protocol produced no phases".to_string(),
            ));
        }

        let mut chain = Self {
            task_id: task_id.to_string(),
            description: description.to_string(),
            protocol: protocol.to_string(),
            status: ChainStatus::Running,
            phases,
            current_phase: String::new(),
            reinit_count: 0,
        };

        let mut events = vec![EngineEvent::new(EventType::Init, "").with_payload(json!({
            "protocol": protocol,
            "description": description,
        }))];

        let first = chain.phases[0].id.clone();
        chain.activate(&first, &mut events)?;

        Ok((chain, events))
    }

    pub fn phase(&self, id: &str) -> Result<&Phase, ChainError> {
        self.phases
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| ChainError::PhaseNotFound(id.to_string()))
    }

    fn phase_mut(&mut self, id: &str) -> Result<&mut Phase, ChainError> {
        self.phases
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| ChainError::PhaseNotFound(id.to_string()))
    }

    fn has_phase(&self, id: &str) -> bool {
        self.phases.iter().any(|p| p.id == id)
    }

    /// True iff no phase is pending or active.
    pub fn is_finished(&self) -> bool {
        !self
            .phases
            .iter()
            .any(|p| matches!(p.status, PhaseStatus::Pending | PhaseStatus::Active))
    }

    pub fn active_phase(&self) -> Option<&Phase> {
        self.phases
            .iter()
            .find(|p| p.status == PhaseStatus::Active)
    }

    fn first_pending(&self) -> Option<String> {
        self.phases
            .iter()
            .find(|p| p.status == PhaseStatus::Pending)
            .map(|p| p.id.clone())
    }

    fn ensure_running(&self) -> Result<(), ChainError> {
        if self.status != ChainStatus::Running {
            return Err(ChainError::ChainNotRunning(self.status));
        }
        Ok(())
    }

    /// pending -> active, tracking `current_phase` and emitting `start`.
    fn activate(&mut self, id: &str, events: &mut Vec<EngineEvent>) -> Result<(), ChainError> {
        if let Some(active) = self.active_phase() {
            return Err(ChainError::AnotherPhaseActive(active.id.clone()));
        }
        let phase = self.phase_mut(id)?;
        if phase.status != PhaseStatus::Pending {
            return Err(ChainError::PhaseNotPending {
                id: id.to_string(),
                status: phase.status,
            });
        }
        phase.status = PhaseStatus::Active;
        self.current_phase = id.to_string();
        events.push(EngineEvent::new(EventType::Start, id));
        Ok(())
    }

    /// Explicit `start` operation.
    pub fn start_phase(&mut self, id: &str) -> Result<Vec<EngineEvent>, ChainError> {
        self.ensure_running()?;
        let mut events = Vec::new();
        self.activate(id, &mut events)?;
        Ok(events)
    }

    /// Accept a completion on `id`: active is fine; pending is fine too
    /// when nothing else is active (the phase is started on the way in).
    fn ensure_active_for_completion(
        &mut self,
        id: &str,
        events: &mut Vec<EngineEvent>,
    ) -> Result<(), ChainError> {
        let status = self.phase(id)?.status;
        match status {
            PhaseStatus::Active => Ok(()),
            PhaseStatus::Pending if self.active_phase().is_none() => self.activate(id, events),
            _ => Err(ChainError::PhaseNotActive {
                id: id.to_string(),
                status,
            }),
        }
    }

    /// Mark `id` passed, then activate the next pending phase (or finish).
    /// Returns the activated phase id, empty when the chain is done.
    fn pass_and_advance(
        &mut self,
        id: &str,
        preferred_next: Option<String>,
        events: &mut Vec<EngineEvent>,
    ) -> Result<String, ChainError> {
        let phase = self.phase_mut(id)?;
        phase.status = PhaseStatus::Passed;
        self.current_phase = String::new();

        let next = preferred_next
            .filter(|n| {
                self.phases
                    .iter()
                    .any(|p| &p.id == n && p.status == PhaseStatus::Pending)
            })
            .or_else(|| self.first_pending());

        match next {
            Some(next_id) => {
                self.activate(&next_id, events)?;
                Ok(next_id)
            }
            None => {
                if self.is_finished() && self.status == ChainStatus::Running {
                    self.status = ChainStatus::Finished;
                    events.push(EngineEvent::new(EventType::Finish, ""));
                }
                Ok(String::new())
            }
        }
    }

    /// Complete an `execute` phase. A `loop` phase with no spawned
    /// sub-tasks is also accepted here (manual completion).
    pub fn complete_execute(
        &mut self,
        id: &str,
        summary: &str,
    ) -> Result<(String, Vec<EngineEvent>), ChainError> {
        self.ensure_running()?;
        let mut events = Vec::new();
        self.ensure_active_for_completion(id, &mut events)?;

        let phase = self.phase(id)?;
        let manual_loop = phase.phase_type == PhaseType::Loop
            && phase.sub_tasks.iter().all(|s| s.status.is_terminal());
        if phase.phase_type != PhaseType::Execute && !manual_loop {
            return Err(ChainError::WrongPhaseType {
                id: id.to_string(),
                expected: PhaseType::Execute,
                actual: phase.phase_type,
            });
        }

        self.phase_mut(id)?.summary = summary.to_string();
        events.push(
            EngineEvent::new(EventType::Complete, id).with_payload(json!({ "summary": summary })),
        );
        let next = self.pass_and_advance(id, None, &mut events)?;
        Ok((next, events))
    }

    /// Complete a `gate` phase with a caller-supplied pass/fail result.
    pub fn complete_gate(
        &mut self,
        id: &str,
        result: GateResult,
        summary: &str,
    ) -> Result<(GateOutcome, Vec<EngineEvent>), ChainError> {
        self.ensure_running()?;
        let mut events = Vec::new();
        self.ensure_active_for_completion(id, &mut events)?;

        let phase = self.phase(id)?;
        if phase.phase_type != PhaseType::Gate {
            return Err(ChainError::WrongPhaseType {
                id: id.to_string(),
                expected: PhaseType::Gate,
                actual: phase.phase_type,
            });
        }
        let on_pass = phase.on_pass.clone();
        let on_fail = phase.on_fail.clone();
        let max_retries = phase.max_retries;

        match result {
            GateResult::Pass => {
                self.phase_mut(id)?.summary = summary.to_string();
                events.push(EngineEvent::new(EventType::Complete, id).with_payload(json!({
                    "result": "pass",
                    "summary": summary,
                })));
                let next = self.pass_and_advance(id, on_pass, &mut events)?;
                let phase = self.phase(id)?;
                Ok((
                    GateOutcome {
                        result: GateResult::Pass,
                        next,
                        retry_count: phase.retry_count,
                        max_retries,
                        exhausted: false,
                    },
                    events,
                ))
            }
            GateResult::Fail => {
                let retry_count = {
                    let phase = self.phase_mut(id)?;
                    phase.retry_count += 1;
                    phase.summary = summary.to_string();
                    phase.retry_count
                };
                events.push(EngineEvent::new(EventType::Complete, id).with_payload(json!({
                    "result": "fail",
                    "summary": summary,
                    "retry_count": retry_count,
                })));

                if retry_count >= max_retries {
                    self.phase_mut(id)?.status = PhaseStatus::Failed;
                    self.status = ChainStatus::Failed;
                    self.current_phase = String::new();
                    events.push(EngineEvent::new(EventType::Fail, id).with_payload(json!({
                        "retry_count": retry_count,
                        "max_retries": max_retries,
                    })));
                    return Ok((
                        GateOutcome {
                            result: GateResult::Fail,
                            next: String::new(),
                            retry_count,
                            max_retries,
                            exhausted: true,
                        },
                        events,
                    ));
                }

                // Reset the gate and the rework target to pending; nothing
                // stays active, the next completion auto-starts the target.
                self.phase_mut(id)?.status = PhaseStatus::Pending;
                self.current_phase = String::new();

                let next = match on_fail {
                    Some(ref target) if self.has_phase(target) => {
                        let t = self.phase_mut(target)?;
                        t.status = PhaseStatus::Pending;
                        t.summary = String::new();
                        target.clone()
                    }
                    _ => String::new(),
                };

                Ok((
                    GateOutcome {
                        result: GateResult::Fail,
                        next,
                        retry_count,
                        max_retries,
                        exhausted: false,
                    },
                    events,
                ))
            }
        }
    }

    /// Append sub-tasks to an active `loop` phase and auto-start the first
    /// pending one.
    pub fn spawn_sub_tasks(
        &mut self,
        id: &str,
        specs: Vec<SubTaskSpec>,
    ) -> Result<(Vec<String>, Vec<EngineEvent>), ChainError> {
        self.ensure_running()?;
        let mut events = Vec::new();
        self.ensure_active_for_completion(id, &mut events)?;

        let phase = self.phase(id)?;
        if phase.phase_type != PhaseType::Loop {
            return Err(ChainError::WrongPhaseType {
                id: id.to_string(),
                expected: PhaseType::Loop,
                actual: phase.phase_type,
            });
        }

        let mut ids = Vec::with_capacity(specs.len());
        {
            let phase = self.phase_mut(id)?;
            let mut seq = phase.sub_tasks.len();
            for spec in specs {
                seq += 1;
                let sub_id = format!("sub_{:03}", seq);
                phase.sub_tasks.push(SubTask {
                    id: sub_id.clone(),
                    name: spec.name,
                    verify: spec.verify,
                    status: SubTaskStatus::Pending,
                    summary: String::new(),
                });
                ids.push(sub_id);
            }
        }
        events.push(
            EngineEvent::new(EventType::Spawn, id)
                .with_payload(json!({ "sub_ids": ids.clone() })),
        );

        self.auto_start_next_sub(id, &mut events)?;
        Ok((ids, events))
    }

    fn auto_start_next_sub(
        &mut self,
        id: &str,
        events: &mut Vec<EngineEvent>,
    ) -> Result<Option<String>, ChainError> {
        let phase = self.phase_mut(id)?;
        if phase.sub_tasks.iter().any(|s| s.status == SubTaskStatus::Active) {
            return Ok(None);
        }
        if let Some(sub) = phase
            .sub_tasks
            .iter_mut()
            .find(|s| s.status == SubTaskStatus::Pending)
        {
            sub.status = SubTaskStatus::Active;
            let sub_id = sub.id.clone();
            events.push(EngineEvent::new(EventType::StartSub, id).with_sub(&sub_id));
            return Ok(Some(sub_id));
        }
        Ok(None)
    }

    /// Explicit sub-task start.
    pub fn start_sub_task(
        &mut self,
        id: &str,
        sub_id: &str,
    ) -> Result<Vec<EngineEvent>, ChainError> {
        self.ensure_running()?;
        let phase = self.phase_mut(id)?;
        let sub = phase
            .sub_tasks
            .iter_mut()
            .find(|s| s.id == sub_id)
            .ok_or_else(|| ChainError::SubTaskNotFound {
                phase: id.to_string(),
                sub: sub_id.to_string(),
            })?;
        if sub.status != SubTaskStatus::Pending {
            return Err(ChainError::SubTaskWrongStatus {
                sub: sub_id.to_string(),
                status: sub.status,
                op: "start",
            });
        }
        sub.status = SubTaskStatus::Active;
        Ok(vec![EngineEvent::new(EventType::StartSub, id).with_sub(sub_id)])
    }

    /// Complete a sub-task. When every sub-task is terminal afterwards,
    /// the loop phase passes and the chain advances in the same operation.
    pub fn complete_sub_task(
        &mut self,
        id: &str,
        sub_id: &str,
        result: GateResult,
        summary: &str,
    ) -> Result<(CompleteSubOutcome, Vec<EngineEvent>), ChainError> {
        self.ensure_running()?;
        let mut events = Vec::new();
        self.ensure_active_for_completion(id, &mut events)?;

        let phase = self.phase(id)?;
        if phase.phase_type != PhaseType::Loop {
            return Err(ChainError::WrongPhaseType {
                id: id.to_string(),
                expected: PhaseType::Loop,
                actual: phase.phase_type,
            });
        }

        {
            let phase = self.phase_mut(id)?;
            let no_sub_active = !phase
                .sub_tasks
                .iter()
                .any(|s| s.status == SubTaskStatus::Active);
            let sub = phase
                .sub_tasks
                .iter_mut()
                .find(|s| s.id == sub_id)
                .ok_or_else(|| ChainError::SubTaskNotFound {
                    phase: id.to_string(),
                    sub: sub_id.to_string(),
                })?;

            match sub.status {
                SubTaskStatus::Active => {}
                SubTaskStatus::Pending if no_sub_active => {
                    sub.status = SubTaskStatus::Active;
                    let started = sub.id.clone();
                    events.push(EngineEvent::new(EventType::StartSub, id).with_sub(&started));
                }
                status => {
                    return Err(ChainError::SubTaskWrongStatus {
                        sub: sub_id.to_string(),
                        status,
                        op: "complete",
                    });
                }
            }

            let sub = phase
                .sub_tasks
                .iter_mut()
                .find(|s| s.id == sub_id)
                .ok_or_else(|| ChainError::SubTaskNotFound {
                    phase: id.to_string(),
                    sub: sub_id.to_string(),
                })?;
            sub.status = match result {
                GateResult::Pass => SubTaskStatus::Passed,
                GateResult::Fail => SubTaskStatus::Failed,
            };
            sub.summary = summary.to_string();
        }
        events.push(
            EngineEvent::new(EventType::CompleteSub, id)
                .with_sub(sub_id)
                .with_payload(json!({ "result": result, "summary": summary })),
        );

        let all_terminal = self
            .phase(id)?
            .sub_tasks
            .iter()
            .all(|s| s.status.is_terminal());

        if all_terminal {
            let next_phase = self.pass_and_advance(id, None, &mut events)?;
            return Ok((
                CompleteSubOutcome {
                    next_sub: None,
                    loop_done: true,
                    next_phase,
                },
                events,
            ));
        }

        let next_sub = self.auto_start_next_sub(id, &mut events)?;
        Ok((
            CompleteSubOutcome {
                next_sub,
                loop_done: false,
                next_phase: String::new(),
            },
            events,
        ))
    }

    /// First pending sub-task of a loop phase, if any.
    pub fn next_pending_sub_task(&self, id: &str) -> Result<Option<&SubTask>, ChainError> {
        Ok(self
            .phase(id)?
            .sub_tasks
            .iter()
            .find(|s| s.status == SubTaskStatus::Pending))
    }

    /// Explicit finish: mark the chain finished, keeping the record.
    pub fn finish(&mut self) -> Vec<EngineEvent> {
        if self.status == ChainStatus::Finished {
            return Vec::new();
        }
        self.status = ChainStatus::Finished;
        self.current_phase = String::new();
        vec![EngineEvent::new(EventType::Finish, "")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_protocol;

    fn develop_chain() -> TaskChain {
        let phases = build_protocol("develop", "").unwrap();
        TaskChain::init("T1", "demo", "develop", phases).unwrap().0
    }

    #[test]
    fn init_activates_first_phase() {
        let chain = develop_chain();
        assert_eq!(chain.current_phase, "analyze");
        assert_eq!(chain.active_phase().unwrap().id, "analyze");
        assert_eq!(chain.status, ChainStatus::Running);
    }

    #[test]
    fn at_most_one_active_phase_throughout() {
        let mut chain = develop_chain();
        chain.complete_execute("analyze", "done").unwrap();
        let actives = chain
            .phases
            .iter()
            .filter(|p| p.status == PhaseStatus::Active)
            .count();
        assert_eq!(actives, 1);
        assert_eq!(chain.current_phase, "plan_gate");
    }

    #[test]
    fn complete_rejects_wrong_type() {
        let mut chain = develop_chain();
        chain.complete_execute("analyze", "done").unwrap();
        let err = chain.complete_execute("plan_gate", "nope").unwrap_err();
        assert!(matches!(err, ChainError::WrongPhaseType { .. }));
    }

    #[test]
    fn gate_fail_resets_gate_and_target_to_pending() {
        let mut chain = develop_chain();
        chain.complete_execute("analyze", "done").unwrap();
        let (outcome, _) = chain
            .complete_gate("plan_gate", GateResult::Fail, "missing detail")
            .unwrap();

        assert_eq!(outcome.next, "analyze");
        assert_eq!(outcome.retry_count, 1);
        assert!(!outcome.exhausted);
        assert_eq!(chain.phase("plan_gate").unwrap().status, PhaseStatus::Pending);
        let target = chain.phase("analyze").unwrap();
        assert_eq!(target.status, PhaseStatus::Pending);
        assert_eq!(target.summary, "");
        assert_eq!(chain.current_phase, "");
    }

    #[test]
    fn gate_retry_then_pass() {
        let mut chain = develop_chain();
        chain.complete_execute("analyze", "v1").unwrap();
        chain
            .complete_gate("plan_gate", GateResult::Fail, "rework")
            .unwrap();

        // Pending analyze auto-starts on the way into this completion.
        chain.complete_execute("analyze", "v2").unwrap();
        let (outcome, _) = chain
            .complete_gate("plan_gate", GateResult::Pass, "ok")
            .unwrap();
        assert_eq!(outcome.next, "implement");
        assert!(!chain.phases.iter().any(|p| p.status == PhaseStatus::Failed));
    }

    #[test]
    fn gate_exhaustion_fails_chain() {
        let mut chain = develop_chain();
        chain.complete_execute("analyze", "v1").unwrap();
        // plan_gate has max_retries = 2
        chain
            .complete_gate("plan_gate", GateResult::Fail, "one")
            .unwrap();
        chain.complete_execute("analyze", "v2").unwrap();
        let (outcome, _) = chain
            .complete_gate("plan_gate", GateResult::Fail, "two")
            .unwrap();

        assert!(outcome.exhausted);
        assert_eq!(chain.status, ChainStatus::Failed);
        assert_eq!(chain.phase("plan_gate").unwrap().status, PhaseStatus::Failed);

        let err = chain.complete_execute("implement", "x").unwrap_err();
        assert!(matches!(err, ChainError::ChainNotRunning(_)));
    }

    #[test]
    fn gate_fail_with_missing_target_returns_empty_next() {
        let phases = vec![
            Phase::execute("a", "A"),
            Phase::gate("g", "G", "b", "ghost", 3),
            Phase::execute("b", "B"),
        ];
        let (mut chain, _) = TaskChain::init("T", "", "custom", phases).unwrap();
        chain.complete_execute("a", "done").unwrap();
        let (outcome, _) = chain.complete_gate("g", GateResult::Fail, "no").unwrap();
        assert_eq!(outcome.next, "");
        assert_eq!(outcome.retry_count, 1);
        assert_eq!(chain.phase("g").unwrap().status, PhaseStatus::Pending);
    }

    #[test]
    fn spawn_requires_active_loop_phase() {
        let mut chain = develop_chain();
        let err = chain
            .spawn_sub_tasks(
                "implement",
                vec![SubTaskSpec {
                    name: "A".to_string(),
                    verify: String::new(),
                }],
            )
            .unwrap_err();
        // analyze is active; implement cannot be auto-started.
        assert!(matches!(err, ChainError::PhaseNotActive { .. }));
    }

    #[test]
    fn loop_passes_when_all_subs_terminal() {
        let mut chain = develop_chain();
        chain.complete_execute("analyze", "done").unwrap();
        chain
            .complete_gate("plan_gate", GateResult::Pass, "ok")
            .unwrap();

        let (ids, events) = chain
            .spawn_sub_tasks(
                "implement",
                vec![
                    SubTaskSpec {
                        name: "A".to_string(),
                        verify: String::new(),
                    },
                    SubTaskSpec {
                        name: "B".to_string(),
                        verify: String::new(),
                    },
                ],
            )
            .unwrap();
        assert_eq!(ids, vec!["sub_001", "sub_002"]);
        // spawn emits spawn + start_sub for the first sub
        assert!(events.iter().any(|e| e.event_type == EventType::StartSub));

        let (out, _) = chain
            .complete_sub_task("implement", "sub_001", GateResult::Pass, "A done")
            .unwrap();
        assert_eq!(out.next_sub.as_deref(), Some("sub_002"));
        assert!(!out.loop_done);

        let (out, _) = chain
            .complete_sub_task("implement", "sub_002", GateResult::Pass, "B done")
            .unwrap();
        assert!(out.loop_done);
        assert_eq!(out.next_phase, "verify_gate");
        assert_eq!(
            chain.phase("implement").unwrap().status,
            PhaseStatus::Passed
        );
    }

    #[test]
    fn loop_with_failed_sub_still_passes_phase() {
        let mut chain = develop_chain();
        chain.complete_execute("analyze", "done").unwrap();
        chain
            .complete_gate("plan_gate", GateResult::Pass, "ok")
            .unwrap();
        chain
            .spawn_sub_tasks(
                "implement",
                vec![SubTaskSpec {
                    name: "A".to_string(),
                    verify: String::new(),
                }],
            )
            .unwrap();
        let (out, _) = chain
            .complete_sub_task("implement", "sub_001", GateResult::Fail, "broken")
            .unwrap();
        assert!(out.loop_done);
        assert_eq!(
            chain.phase("implement").unwrap().status,
            PhaseStatus::Passed
        );
    }

    #[test]
    fn empty_loop_accepts_manual_complete() {
        let mut chain = develop_chain();
        chain.complete_execute("analyze", "done").unwrap();
        chain
            .complete_gate("plan_gate", GateResult::Pass, "ok")
            .unwrap();
        let (next, _) = chain.complete_execute("implement", "nothing to do").unwrap();
        assert_eq!(next, "verify_gate");
        assert_eq!(
            chain.phase("implement").unwrap().status,
            PhaseStatus::Passed
        );
    }

    #[test]
    fn full_develop_run_finishes_with_event_trail() {
        let phases = build_protocol("develop", "").unwrap();
        let (mut chain, mut events) = TaskChain::init("T1", "demo", "develop", phases).unwrap();

        let mut push = |evs: Vec<EngineEvent>| events.extend(evs);

        push(chain.complete_execute("analyze", "3 subs").unwrap().1);
        push(
            chain
                .complete_gate("plan_gate", GateResult::Pass, "ok")
                .unwrap()
                .1,
        );
        push(
            chain
                .spawn_sub_tasks(
                    "implement",
                    vec![
                        SubTaskSpec {
                            name: "A".to_string(),
                            verify: String::new(),
                        },
                        SubTaskSpec {
                            name: "B".to_string(),
                            verify: String::new(),
                        },
                    ],
                )
                .unwrap()
                .1,
        );
        push(
            chain
                .complete_sub_task("implement", "sub_001", GateResult::Pass, "A done")
                .unwrap()
                .1,
        );
        push(
            chain
                .complete_sub_task("implement", "sub_002", GateResult::Pass, "B done")
                .unwrap()
                .1,
        );
        push(
            chain
                .complete_gate("verify_gate", GateResult::Pass, "tests green")
                .unwrap()
                .1,
        );
        push(chain.complete_execute("finalize", "archived").unwrap().1);

        assert!(chain.is_finished());
        assert_eq!(chain.status, ChainStatus::Finished);
        assert!(chain
            .phases
            .iter()
            .all(|p| p.status == PhaseStatus::Passed));

        let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(
            kinds,
            vec![
                "init",
                "start",        // analyze
                "complete",     // analyze
                "start",        // plan_gate
                "complete",     // plan_gate pass
                "start",        // implement
                "spawn",
                "start_sub",    // sub_001
                "complete_sub", // sub_001
                "start_sub",    // sub_002
                "complete_sub", // sub_002
                "start",        // verify_gate
                "complete",     // verify_gate pass
                "start",        // finalize
                "complete",     // finalize
                "finish",
            ]
        );
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut chain = develop_chain();
        chain.complete_execute("analyze", "done").unwrap();
        chain
            .complete_gate("plan_gate", GateResult::Pass, "ok")
            .unwrap();
        chain
            .spawn_sub_tasks(
                "implement",
                vec![SubTaskSpec {
                    name: "A".to_string(),
                    verify: "cargo test".to_string(),
                }],
            )
            .unwrap();

        let json = serde_json::to_string(&chain.phases).unwrap();
        let back: Vec<Phase> = serde_json::from_str(&json).unwrap();
        assert_eq!(chain.phases, back);
    }
}
