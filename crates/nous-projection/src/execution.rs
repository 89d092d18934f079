//! Kernel, task, agent and tool activity counters.

use std::collections::BTreeMap;

use nous_protocol::{DomainEvent, EventEnvelope};
use serde::{Deserialize, Serialize};

use crate::projection::{Projection, decode_event};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeStats {
    pub entered: u64,
    pub completed: u64,
    pub total_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Requested,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolStats {
    pub invoked: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    pub node_executions: BTreeMap<String, NodeStats>,
    pub task_states: BTreeMap<String, TaskStatus>,
    pub total_nodes_entered: u64,
    pub total_nodes_completed: u64,
    pub agents_started: u64,
    pub agents_stopped: u64,
    pub agents_failed: u64,
    pub checkpoints_created: u64,
    pub tool_stats: BTreeMap<String, ToolStats>,
}

impl ExecutionState {
    /// Agent runs started but not yet stopped.
    pub fn agents_running(&self) -> u64 {
        self.agents_started.saturating_sub(self.agents_stopped)
    }
}

/// Tracks node executions, task states, agent runs and tool outcomes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionProjection;

impl Projection for ExecutionProjection {
    type State = ExecutionState;

    fn initial_state(&self) -> ExecutionState {
        ExecutionState::default()
    }

    fn apply(&self, state: &mut ExecutionState, event: &EventEnvelope) {
        let Some(event) = decode_event(event) else {
            return;
        };
        match event {
            DomainEvent::NodeEntered(e) => {
                state.total_nodes_entered += 1;
                state.node_executions.entry(e.node_id).or_default().entered += 1;
            }
            DomainEvent::NodeCompleted(e) => {
                state.total_nodes_completed += 1;
                let stats = state.node_executions.entry(e.node_id).or_default();
                stats.completed += 1;
                stats.total_ms += e.duration_ms;
            }
            DomainEvent::TaskRequested(e) => {
                state.task_states.insert(e.task_id, TaskStatus::Requested);
            }
            DomainEvent::TaskCompleted(e) => {
                let status = if e.error.is_some() {
                    TaskStatus::Failed
                } else {
                    TaskStatus::Completed
                };
                state.task_states.insert(e.task_id, status);
            }
            DomainEvent::AgentStarted(_) => state.agents_started += 1,
            DomainEvent::AgentStopped(e) => {
                state.agents_stopped += 1;
                if e.is_failure() {
                    state.agents_failed += 1;
                }
            }
            DomainEvent::CheckpointCreated(_) => state.checkpoints_created += 1,
            DomainEvent::ToolInvoked(e) => {
                state.tool_stats.entry(e.tool_name).or_default().invoked += 1;
            }
            DomainEvent::ToolCompleted(e) => {
                let stats = state.tool_stats.entry(e.tool_name).or_default();
                stats.completed += 1;
                stats.total_ms += e.duration_ms;
            }
            DomainEvent::ToolFailed(e) => {
                let stats = state.tool_stats.entry(e.tool_name).or_default();
                stats.failed += 1;
                stats.total_ms += e.duration_ms;
            }
            DomainEvent::ToolTimeout(e) => {
                state.tool_stats.entry(e.tool_name).or_default().timed_out += 1;
            }
            _ => {}
        }
    }
}
