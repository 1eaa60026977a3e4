//! # Reduction Pipeline
//!
//! Drives one run: `Init → ResolvingCandidates → ProcessingTrail(i) → Finalizing`.
//!
//! Every trail yields a [`TrailOutcome`]; nothing that goes wrong while handling a
//! single trail escapes the trail loop. The run statistics are a fold over those
//! outcomes, and the new [`PipelineState`] is produced from them only after the
//! loop has finished. Failures while resolving the notification author, listing
//! categories or trails, or persisting the state abort the run and leave the
//! previous snapshot untouched.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{error, info, warn};

use crate::backend::TrailBackend;
use crate::backup::BackupWriter;
use crate::config::AppConfig;
use crate::error::{ReduxError, Result};
use crate::model::{Category, Trail};
use crate::policy::{ReductionDecision, ReductionPolicy};
use crate::simplify::{GpxSimplifier, TrackSimplifier};
use crate::state::{PipelineState, RunRecord, StateStore};
use crate::tolerance::ToleranceTable;

/// What happened to a single trail during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum TrailOutcome {
    /// Reduced file uploaded
    Accepted {
        original_size: u64,
        simplified_size: u64,
        retained_percent: u64,
    },
    /// Original below the configured size floor
    SkippedTooSmall { size: u64 },
    /// Reduced file not small enough to be worth replacing
    SkippedInsufficientReduction { retained_percent: u64 },
    /// Category unknown or without a configured minimum distance
    SkippedNoTolerance { category: String },
    /// Download, parse, backup or upload failed
    Failed { reason: String },
}

impl TrailOutcome {
    fn failed(e: ReduxError) -> Self {
        TrailOutcome::Failed {
            reason: e.to_string(),
        }
    }
}

/// Aggregate counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub candidates: u64,
    pub files_changed: u64,
    pub bytes_saved: u64,
    pub skipped_too_small: u64,
    pub skipped_insufficient_reduction: u64,
    pub skipped_no_tolerance: u64,
    pub failed: u64,
}

impl RunStats {
    /// Fold one outcome into the counters.
    pub fn record(mut self, outcome: &TrailOutcome) -> Self {
        self.candidates += 1;
        match outcome {
            TrailOutcome::Accepted {
                original_size,
                simplified_size,
                ..
            } => {
                self.files_changed += 1;
                self.bytes_saved += original_size.saturating_sub(*simplified_size);
            }
            TrailOutcome::SkippedTooSmall { .. } => self.skipped_too_small += 1,
            TrailOutcome::SkippedInsufficientReduction { .. } => {
                self.skipped_insufficient_reduction += 1
            }
            TrailOutcome::SkippedNoTolerance { .. } => self.skipped_no_tolerance += 1,
            TrailOutcome::Failed { .. } => self.failed += 1,
        }
        self
    }

    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a TrailOutcome>) -> Self {
        outcomes
            .into_iter()
            .fold(RunStats::default(), |stats, outcome| stats.record(outcome))
    }

    pub fn to_record(&self, run_start: DateTime<Utc>) -> RunRecord {
        RunRecord {
            timestamp: run_start,
            files_changed: self.files_changed,
            bytes_saved: self.bytes_saved,
        }
    }
}

/// Keep trails created or updated at/after the checkpoint, in backend order.
pub fn select_candidates(trails: Vec<Trail>, last_checked: Option<DateTime<Utc>>) -> Vec<Trail> {
    match last_checked {
        None => trails,
        Some(checkpoint) => trails
            .into_iter()
            .filter(|t| t.changed_since(checkpoint))
            .collect(),
    }
}

/// Everything a run needs besides the backend.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub tolerances: ToleranceTable,
    pub policy: ReductionPolicy,
    /// `(author display name, comment text)`; `None` disables notifications
    pub notification: Option<(String, String)>,
    pub backup_dir: PathBuf,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            tolerances: config.min_distance_meters.clone(),
            policy: config.policy(),
            notification: config
                .comments
                .pair()
                .map(|(user, text)| (user.to_string(), text.to_string())),
            backup_dir: config.backup_dir.clone(),
        }
    }
}

/// Per-run context resolved during Init and candidate listing.
struct RunContext<'r> {
    category_names: HashMap<&'r str, &'r str>,
    notification_author: Option<String>,
    backups: BackupWriter,
}

/// One reduction run against a backend.
pub struct Pipeline<'a, B: TrailBackend, S: TrackSimplifier = GpxSimplifier> {
    backend: &'a B,
    simplifier: S,
    settings: PipelineSettings,
}

impl<'a, B: TrailBackend> Pipeline<'a, B, GpxSimplifier> {
    pub fn new(backend: &'a B, settings: PipelineSettings) -> Self {
        Self::with_simplifier(backend, GpxSimplifier, settings)
    }
}

impl<'a, B: TrailBackend, S: TrackSimplifier> Pipeline<'a, B, S> {
    pub fn with_simplifier(backend: &'a B, simplifier: S, settings: PipelineSettings) -> Self {
        Self {
            backend,
            simplifier,
            settings,
        }
    }

    /// Run once over `state`, returning the successor state and the run's stats.
    ///
    /// `run_start` must be captured before anything is listed; it becomes the
    /// next checkpoint.
    pub async fn run(
        &self,
        state: PipelineState,
        run_start: DateTime<Utc>,
    ) -> Result<(PipelineState, RunStats)> {
        let started = Instant::now();

        // Init
        let notification_author = self.resolve_notification_author().await?;

        // ResolvingCandidates
        let categories = self.backend.list_categories().await?;
        let trails = self.backend.list_public_trails().await?;
        let total = trails.len();
        let candidates = select_candidates(trails, state.last_checked);
        info!(
            "[Pipeline] {} of {} public trails changed since {}",
            candidates.len(),
            total,
            state
                .last_checked
                .map_or_else(|| "the beginning".to_string(), |t| t.to_rfc3339())
        );

        let ctx = RunContext {
            category_names: categories
                .iter()
                .map(|c: &Category| (c.id.as_str(), c.name.as_str()))
                .collect(),
            notification_author,
            backups: BackupWriter::new(&self.settings.backup_dir, run_start),
        };

        // ProcessingTrail(i)
        let mut stats = RunStats::default();
        for trail in &candidates {
            let outcome = self.process_trail(trail, &ctx).await;
            log_outcome(trail, &outcome);
            stats = stats.record(&outcome);
        }

        // Finalizing
        let next = state.record_run(stats.to_record(run_start));
        info!(
            "[Pipeline] Run complete in {:.1}s: {} changed, {} bytes saved ({} too small, {} insufficient reduction, {} without tolerance, {} failed)",
            started.elapsed().as_secs_f64(),
            stats.files_changed,
            stats.bytes_saved,
            stats.skipped_too_small,
            stats.skipped_insufficient_reduction,
            stats.skipped_no_tolerance,
            stats.failed
        );
        Ok((next, stats))
    }

    async fn resolve_notification_author(&self) -> Result<Option<String>> {
        let Some((name, _)) = &self.settings.notification else {
            return Ok(None);
        };
        let author = self.backend.find_notification_author(name).await?;
        if author.is_none() {
            warn!(
                "[Pipeline] Notification author '{}' not found, comments disabled for this run",
                name
            );
        }
        Ok(author)
    }

    async fn process_trail(&self, trail: &Trail, ctx: &RunContext<'_>) -> TrailOutcome {
        let category = ctx.category_names.get(trail.category.as_str()).copied();
        info!(
            "[Pipeline] Checking trail '{}' in category '{}' (id: {})",
            trail.name,
            category.unwrap_or("?"),
            trail.id
        );

        match self.reduce(trail, category, ctx).await {
            Ok(outcome) => outcome,
            Err(ReduxError::ToleranceNotConfigured { category }) => {
                TrailOutcome::SkippedNoTolerance { category }
            }
            Err(e) => TrailOutcome::failed(e),
        }
    }

    async fn reduce(
        &self,
        trail: &Trail,
        category: Option<&str>,
        ctx: &RunContext<'_>,
    ) -> Result<TrailOutcome> {
        let tolerance = category
            .and_then(|name| self.settings.tolerances.resolve(name))
            .ok_or_else(|| ReduxError::ToleranceNotConfigured {
                category: category.unwrap_or(trail.category.as_str()).to_string(),
            })?;

        let original = self.backend.download_trail_file(trail).await?;
        let original_size = original.len() as u64;
        if self.settings.policy.is_too_small(original_size) {
            return Ok(TrailOutcome::SkippedTooSmall {
                size: original_size,
            });
        }

        let simplified = self.simplifier.simplify(&original, tolerance)?;
        let simplified_size = simplified.len() as u64;

        let retained_percent = match self.settings.policy.decide(original_size, simplified_size) {
            ReductionDecision::Accept { retained_percent } => retained_percent,
            ReductionDecision::SkipInsufficientReduction { retained_percent } => {
                return Ok(TrailOutcome::SkippedInsufficientReduction { retained_percent });
            }
            ReductionDecision::SkipTooSmall => {
                return Ok(TrailOutcome::SkippedTooSmall {
                    size: original_size,
                });
            }
        };

        ctx.backups.write(trail, &original, &simplified)?;
        self.backend
            .upload_trail_file(trail, simplified, &trail.gpx)
            .await?;

        if let (Some(author), Some((_, text))) =
            (&ctx.notification_author, &self.settings.notification)
        {
            if let Err(e) = self.backend.create_notification(&trail.id, author, text).await {
                warn!(
                    "[Pipeline] File replaced but comment failed for trail '{}' (id: {}): {}",
                    trail.name, trail.id, e
                );
            }
        }

        Ok(TrailOutcome::Accepted {
            original_size,
            simplified_size,
            retained_percent,
        })
    }
}

fn log_outcome(trail: &Trail, outcome: &TrailOutcome) {
    match outcome {
        TrailOutcome::Accepted {
            original_size,
            simplified_size,
            retained_percent,
        } => info!(
            "[Pipeline] Trail '{}' (id: {}) reduced to {}% of original ({}KB -> {}KB)",
            trail.name,
            trail.id,
            retained_percent,
            original_size / 1024,
            simplified_size / 1024
        ),
        TrailOutcome::SkippedTooSmall { size } => info!(
            "[Pipeline] Won't reduce trail '{}' (id: {}): file too small ({}KB)",
            trail.name,
            trail.id,
            size / 1024
        ),
        TrailOutcome::SkippedInsufficientReduction { retained_percent } => info!(
            "[Pipeline] Won't reduce trail '{}' (id: {}): would only shrink to {}% of original",
            trail.name, trail.id, retained_percent
        ),
        TrailOutcome::SkippedNoTolerance { category } => warn!(
            "[Pipeline] No minimum distance configured for category '{}', skipping trail '{}' (id: {})",
            category, trail.name, trail.id
        ),
        TrailOutcome::Failed { reason } => error!(
            "[Pipeline] Trail '{}' (id: {}) not reduced: {}",
            trail.name, trail.id, reason
        ),
    }
}

/// Load the state, run once, and persist the successor.
///
/// The store is only written after the run finished; any fatal error leaves the
/// previous snapshot in place.
pub async fn run_once<B: TrailBackend>(
    backend: &B,
    store: &StateStore,
    settings: PipelineSettings,
) -> Result<RunStats> {
    let run_start = Utc::now();
    let state = store.load()?;
    let (next, stats) = Pipeline::new(backend, settings).run(state, run_start).await?;
    store.persist(&next)?;
    Ok(stats)
}
