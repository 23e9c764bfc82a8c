//! Weekly planning around big rocks and the tasks they schedule.

use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate};
use serde_json::json;
use tracing::debug;

use crate::cache::LocalCache;
use crate::config::SyncConfig;
use crate::model::{require_text, BigRock, NewBigRock, NewTask, Quadrant, Task};
use crate::store::RemoteStore;
use crate::sync::{LoadOutcome, MutationOutcome, SyncedCollection};
use crate::sync_errors::validation_error;
use crate::AppResult;

/// Monday of the week `day` falls in.
pub fn week_start_of(day: NaiveDate) -> NaiveDate {
    day - Duration::days(i64::from(day.weekday().num_days_from_monday()))
}

#[derive(Debug, Clone)]
pub struct PlannerLoad {
    pub big_rocks: LoadOutcome,
    pub tasks: LoadOutcome,
}

#[derive(Clone)]
pub struct WeeklyPlanner {
    big_rocks: SyncedCollection<BigRock>,
    tasks: SyncedCollection<Task>,
}

impl WeeklyPlanner {
    pub fn new(remote: Arc<dyn RemoteStore>, cache: LocalCache, config: Arc<SyncConfig>) -> Self {
        Self {
            big_rocks: SyncedCollection::new(Arc::clone(&remote), cache.clone(), Arc::clone(&config)),
            tasks: SyncedCollection::new(remote, cache, config),
        }
    }

    /// Share an existing task collection, e.g. the one a task list view uses.
    pub fn with_tasks(
        remote: Arc<dyn RemoteStore>,
        cache: LocalCache,
        config: Arc<SyncConfig>,
        tasks: SyncedCollection<Task>,
    ) -> Self {
        Self {
            big_rocks: SyncedCollection::new(remote, cache, config),
            tasks,
        }
    }

    pub fn big_rocks(&self) -> &SyncedCollection<BigRock> {
        &self.big_rocks
    }

    pub fn tasks(&self) -> &SyncedCollection<Task> {
        &self.tasks
    }

    pub async fn load(&self, owner_id: &str) -> PlannerLoad {
        PlannerLoad {
            big_rocks: self.big_rocks.load(owner_id).await,
            tasks: self.tasks.load(owner_id).await,
        }
    }

    /// Add a big rock, first creating its task when `schedule_as_task` is set.
    pub async fn add_big_rock(
        &self,
        mut draft: NewBigRock,
        schedule_as_task: bool,
    ) -> AppResult<MutationOutcome<BigRock>> {
        require_text("title", &draft.title)?;
        if draft.priority < 0 {
            return Err(validation_error("priority", "priority cannot be negative"));
        }
        draft.week_start = week_start_of(draft.week_start);

        let mut task_warnings = Vec::new();
        if schedule_as_task && draft.task_id.is_none() {
            if let Some(owner) = self.big_rocks.owner_id() {
                self.tasks.set_owner_if_unbound(&owner);
            }
            let task = NewTask {
                quadrant: Some(Quadrant::Q2),
                due_date: Some(draft.week_start + Duration::days(6)),
                role_id: draft.role_id.clone(),
                ..NewTask::new(draft.title.clone())
            };
            let outcome = self.tasks.add(task).await?;
            task_warnings = outcome.warnings;
            draft.task_id = outcome.entity.map(|t| t.id);
        }

        if let Some(owner) = self.tasks.owner_id() {
            self.big_rocks.set_owner_if_unbound(&owner);
        }
        let mut outcome = self.big_rocks.add(draft).await?;
        outcome.warnings.extend(task_warnings);
        Ok(outcome)
    }

    /// Delete a big rock; its linked task goes with it.
    pub async fn delete_big_rock(&self, id: &str) -> MutationOutcome<BigRock> {
        let outcome = self.big_rocks.delete(id).await;
        if let Some(task_id) = outcome.entity.as_ref().and_then(|r| r.task_id.as_deref()) {
            if self.tasks.evict(task_id).is_some() {
                debug!(target: "quadrant", event = "linked_task_evicted", id = %task_id);
            }
        }
        outcome
    }

    /// Flip a rock's completion and mirror it onto the linked task.
    pub async fn toggle_big_rock(&self, id: &str) -> AppResult<MutationOutcome<BigRock>> {
        let mut outcome = self.big_rocks.toggle(id, "completed").await?;
        let linked = outcome
            .entity
            .as_ref()
            .and_then(|r| r.task_id.clone().map(|t| (t, r.completed)));
        if let Some((task_id, completed)) = linked {
            if self.tasks.get(&task_id).is_some_and(|t| t.completed != completed) {
                let mirrored = self
                    .tasks
                    .update(&task_id, json!({ "completed": completed }))
                    .await?;
                outcome.warnings.extend(mirrored.warnings);
            }
        }
        Ok(outcome)
    }

    pub fn big_rocks_for_week(&self, week_start: NaiveDate) -> Vec<BigRock> {
        let week_start = week_start_of(week_start);
        let mut rocks: Vec<BigRock> = self
            .big_rocks
            .items()
            .into_iter()
            .filter(|r| r.week_start == week_start)
            .collect();
        rocks.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        rocks
    }
}
