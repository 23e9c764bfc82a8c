//! Ritual tracking: rituals, their daily completions and streak stats.

use std::sync::Arc;

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::cache::LocalCache;
use crate::config::{ConfigError, SyncConfig};
use crate::model::{Entity, NewRitual, NewRitualCompletion, Ritual, RitualCompletion};
use crate::store::RemoteStore;
use crate::streaks::{self, StreakStats};
use crate::sync::{LoadOutcome, MutationOutcome, MutationStatus, SyncedCollection};
use crate::sync_errors::{SyncErrorCode, SyncWarning};
use crate::time::today_in;
use crate::AppResult;

#[derive(Debug, Clone)]
pub struct TrackerLoad {
    pub rituals: LoadOutcome,
    pub completions: LoadOutcome,
}

impl TrackerLoad {
    pub fn warnings(&self) -> Vec<SyncWarning> {
        [&self.rituals, &self.completions]
            .into_iter()
            .filter_map(|o| o.warning.clone())
            .collect()
    }
}

#[derive(Clone)]
pub struct RitualTracker {
    rituals: SyncedCollection<Ritual>,
    completions: SyncedCollection<RitualCompletion>,
    timezone: Tz,
}

impl RitualTracker {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        cache: LocalCache,
        config: Arc<SyncConfig>,
    ) -> Result<Self, ConfigError> {
        let timezone = config.timezone()?;
        Ok(Self::with_timezone(remote, cache, config, timezone))
    }

    pub fn with_timezone(
        remote: Arc<dyn RemoteStore>,
        cache: LocalCache,
        config: Arc<SyncConfig>,
        timezone: Tz,
    ) -> Self {
        Self {
            rituals: SyncedCollection::new(Arc::clone(&remote), cache.clone(), Arc::clone(&config)),
            completions: SyncedCollection::new(remote, cache, config),
            timezone,
        }
    }

    pub fn rituals(&self) -> &SyncedCollection<Ritual> {
        &self.rituals
    }

    pub fn completions(&self) -> &SyncedCollection<RitualCompletion> {
        &self.completions
    }

    pub fn today(&self) -> NaiveDate {
        today_in(self.timezone)
    }

    pub async fn load(&self, owner_id: &str) -> TrackerLoad {
        let rituals = self.rituals.load(owner_id).await;
        let completions = self.completions.load(owner_id).await;
        self.refresh_stats();
        TrackerLoad {
            rituals,
            completions,
        }
    }

    pub async fn add_ritual(&self, draft: NewRitual) -> AppResult<MutationOutcome<Ritual>> {
        if let Some(owner) = draft.owner_id.as_deref() {
            self.completions.set_owner_if_unbound(owner);
        }
        let mut outcome = self.rituals.add(draft).await?;
        if let Some(owner) = self.rituals.owner_id() {
            self.completions.set_owner_if_unbound(&owner);
        }
        if let Some(ritual) = outcome.entity.as_mut() {
            ritual.stats = self.stats(&ritual.id);
        }
        Ok(outcome)
    }

    /// Update a ritual and recompute its stats against the new schedule.
    pub async fn update_ritual<P: Serialize>(
        &self,
        ritual_id: &str,
        patch: P,
    ) -> AppResult<MutationOutcome<Ritual>> {
        let mut outcome = self.rituals.update(ritual_id, patch).await?;
        if let Some(ritual) = outcome.entity.as_mut() {
            ritual.stats = self.stats(&ritual.id);
        }
        Ok(outcome)
    }

    fn completion_for(&self, ritual_id: &str, day: NaiveDate) -> Option<RitualCompletion> {
        self.completions
            .items()
            .into_iter()
            .find(|c| c.ritual_id == ritual_id && c.completed_on == day)
    }

    pub fn is_completed_on(&self, ritual_id: &str, day: NaiveDate) -> bool {
        self.completion_for(ritual_id, day)
            .is_some_and(|c| c.completed)
    }

    /// Mark or unmark a ritual as done on `day`.
    ///
    /// Completing creates the day's record; un-completing deletes it, so a
    /// (ritual, day) pair never has more than one record.
    pub async fn toggle_completion(
        &self,
        ritual_id: &str,
        day: NaiveDate,
    ) -> AppResult<MutationOutcome<RitualCompletion>> {
        if self.rituals.get(ritual_id).is_none() {
            return Ok(MutationOutcome::no_op(
                SyncWarning::new(SyncErrorCode::NotFound, Ritual::TABLE).for_entity(ritual_id),
            ));
        }
        let outcome = match self.completion_for(ritual_id, day) {
            Some(existing) if existing.completed => self.completions.delete(&existing.id).await,
            Some(existing) => {
                self.completions
                    .update(&existing.id, json!({ "completed": true }))
                    .await?
            }
            None => {
                self.completions
                    .add(NewRitualCompletion {
                        ritual_id: ritual_id.to_string(),
                        completed_on: day,
                        completed: true,
                    })
                    .await?
            }
        };
        self.stats(ritual_id);
        Ok(outcome)
    }

    /// Delete a ritual and every completion recorded for it.
    pub async fn delete_ritual(&self, ritual_id: &str) -> MutationOutcome<Ritual> {
        let mut outcome = self.rituals.delete(ritual_id).await;
        if outcome.is_no_op() {
            return outcome;
        }
        let dependents: Vec<RitualCompletion> = self
            .completions
            .items()
            .into_iter()
            .filter(|c| c.ritual_id == ritual_id)
            .collect();
        let mut failed = 0;
        for completion in &dependents {
            let result = self.completions.delete(&completion.id).await;
            if result.status == MutationStatus::PersistFailed {
                failed += 1;
                outcome.warnings.push(
                    SyncWarning::new(SyncErrorCode::CascadeFailed, RitualCompletion::TABLE)
                        .for_entity(completion.id.clone()),
                );
            }
        }
        if failed > 0 {
            warn!(
                target: "quadrant",
                event = "cascade_failed",
                table = RitualCompletion::TABLE,
                parent_id = %ritual_id,
                failed
            );
        } else {
            info!(
                target: "quadrant",
                event = "ritual_deleted",
                id = %ritual_id,
                completions = dependents.len()
            );
        }
        outcome
    }

    fn completion_days(&self, ritual_id: &str) -> Vec<NaiveDate> {
        self.completions
            .items()
            .into_iter()
            .filter(|c| c.ritual_id == ritual_id && c.completed)
            .map(|c| c.completed_on)
            .collect()
    }

    pub fn get_streak(&self, ritual_id: &str) -> u32 {
        streaks::current_streak(&self.completion_days(ritual_id), self.today())
    }

    pub fn get_longest_streak(&self, ritual_id: &str) -> u32 {
        streaks::longest_streak(&self.completion_days(ritual_id))
    }

    pub fn get_completion_rate(&self, ritual_id: &str) -> u8 {
        match self.rituals.get(ritual_id) {
            Some(ritual) => streaks::monthly_completion_rate(
                &self.completion_days(ritual_id),
                &ritual.days_of_week,
                self.today(),
            ),
            None => 0,
        }
    }

    pub fn stats_as_of(&self, ritual_id: &str, today: NaiveDate) -> Option<StreakStats> {
        let ritual = self.rituals.get(ritual_id)?;
        Some(StreakStats::compute(
            &self.completion_days(ritual_id),
            &ritual.days_of_week,
            today,
        ))
    }

    /// Current stats for a ritual, also stored on its derived field.
    pub fn stats(&self, ritual_id: &str) -> Option<StreakStats> {
        let stats = self.stats_as_of(ritual_id, self.today())?;
        self.rituals.refresh_derived(|r| {
            if r.id == ritual_id {
                r.stats = Some(stats);
            }
        });
        Some(stats)
    }

    pub fn refresh_stats(&self) {
        let today = self.today();
        let completions = self.completions.items();
        self.rituals.refresh_derived(|ritual| {
            let days: Vec<NaiveDate> = completions
                .iter()
                .filter(|c| c.ritual_id == ritual.id && c.completed)
                .map(|c| c.completed_on)
                .collect();
            ritual.stats = Some(StreakStats::compute(&days, &ritual.days_of_week, today));
        });
    }
}
