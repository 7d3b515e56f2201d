use crate::task::TaskEvent;

/// Mutable, globally time-sorted sequence of task events. The retry and
/// end-of-round drain logic move events through `extract`/`insert`; the
/// driver watches `version` to detect mutation and re-slice its window.
#[derive(Clone, Debug, Default)]
pub struct EventStore {
    events: Vec<TaskEvent>,
    version: u64,
}

impl EventStore {
    pub fn new(mut events: Vec<TaskEvent>) -> Self {
        events.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { events, version: 0 }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[TaskEvent] {
        &self.events
    }

    /// Bumped on every mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Both rows of a task, in store order.
    pub fn select(&self, task_id: u64) -> Vec<&TaskEvent> {
        self.events.iter().filter(|event| event.task_id == task_id).collect()
    }

    /// Remove and return the (start, end) pair of a task.
    pub fn extract(&mut self, task_id: u64) -> Option<(TaskEvent, TaskEvent)> {
        let mut start = None;
        let mut end = None;
        self.events.retain(|event| {
            if event.task_id != task_id {
                return true;
            }
            match event.event_type {
                crate::task::EventType::Start => start = Some(event.clone()),
                crate::task::EventType::End => end = Some(event.clone()),
            }
            false
        });
        if start.is_some() || end.is_some() {
            self.version += 1;
        }
        Some((start?, end?))
    }

    /// Insert preserving ascending time order: first position whose time is
    /// not below the new event's time, append if none.
    pub fn insert(&mut self, event: TaskEvent) {
        let idx = self
            .events
            .iter()
            .position(|existing| existing.time >= event.time)
            .unwrap_or(self.events.len());
        self.events.insert(idx, event);
        self.version += 1;
    }

    /// Clone of all events with `from <= time < to`.
    pub fn window(&self, from: f64, to: f64) -> Vec<TaskEvent> {
        self.events
            .iter()
            .filter(|event| from <= event.time && event.time < to)
            .cloned()
            .collect()
    }
}
