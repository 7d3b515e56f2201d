use serde::{Deserialize, Serialize};

use crate::vm::{TaskType, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Start,
    End,
}

/// One row of the task event stream. Start and end events of a task share the
/// same `task_id` and differ in `event_type` and `time`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskEvent {
    #[serde(rename = "index")]
    pub task_id: u64,
    pub event_type: EventType,
    #[serde(rename = "event_time")]
    pub time: f64,
    pub task_type: TaskType,
    pub user_id: UserId,
    pub cpu_request: f64,
    pub average_cpu_usage: f64,
    #[serde(rename = "T_up")]
    pub t_up: f64,
    #[serde(rename = "T_down")]
    pub t_down: f64,
}

/// Historical per-task-type demand: summed compute and throughput
/// requirements, refreshed once per round.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct TypeDemand {
    pub cr: f64,
    pub t_up: f64,
    pub t_down: f64,
}

/// Demand rows indexed by [TaskType::index](crate::vm::TaskType::index).
pub type DemandMatrix = [TypeDemand; 3];

/// Sum the start events of a window into a demand matrix.
pub fn demand_of_events(events: &[TaskEvent]) -> DemandMatrix {
    let mut demand = DemandMatrix::default();
    for event in events.iter().filter(|event| event.event_type == EventType::Start) {
        let row = &mut demand[event.task_type.index()];
        row.cr += event.average_cpu_usage;
        row.t_up += event.t_up;
        row.t_down += event.t_down;
    }
    demand
}
