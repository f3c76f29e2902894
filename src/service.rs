// 🎯 Streak Tracker - one load → modify → save transaction per operation
//
// Every state-changing operation:
//   1. takes the data-directory lock (fail fast on contention)
//   2. loads the tables it needs
//   3. computes the new state in memory (nothing written yet)
//   4. stages its audit events, saves (backup first), then commits the events
//
// Validation and not-found errors return before step 4, so they never touch
// disk. Reads take the same lock so they never see a half-written pair of
// tables.

use crate::admin::{AdminOverride, RevivePlan};
use crate::audit::{AuditEvent, AuditLog, ENTITY_PLAYER, ENTITY_REFERRAL, ENTITY_SNAPSHOT, ENTITY_TABLE};
use crate::config::TrackerConfig;
use crate::entities::{normalize_username, PlayerStreakRecord, ReferralRecord, ReferralRow};
use crate::error::{TrackerError, TrackerResult};
use crate::reconciler::{ProcessingReport, Reconciliation, StreakReconciler};
use crate::referrals::{ReferralTracker, ReferrerSummary};
use crate::snapshot::SnapshotLoader;
use crate::store::{BackupInfo, ReferralStore, SaveReceipt, StoreLock, StreakStateStore};
use chrono::{Local, NaiveDate};
use serde_json::json;
use std::path::{Path, PathBuf};

pub const DEFAULT_ACTOR: &str = "system";

pub struct StreakTracker {
    config: TrackerConfig,
    streaks: StreakStateStore,
    referrals: ReferralStore,
    audit: AuditLog,
    actor: String,
}

impl StreakTracker {
    pub fn open(config: TrackerConfig) -> TrackerResult<Self> {
        config.validate()?;

        std::fs::create_dir_all(&config.data_dir).map_err(|e| {
            TrackerError::store(format!("create data dir {}", config.data_dir.display()), e)
        })?;

        let audit = AuditLog::open(&config.audit_db)?;
        tracing::debug!(data_dir = %config.data_dir.display(), "streak tracker opened");

        Ok(StreakTracker {
            streaks: StreakStateStore::new(&config.master_file, &config.backup_dir),
            referrals: ReferralStore::new(&config.referrals_file, &config.backup_dir),
            audit,
            config,
            actor: DEFAULT_ACTOR.to_string(),
        })
    }

    /// Name recorded on audit events ("system", an admin's handle, ...).
    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = actor.to_string();
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    fn lock(&self) -> TrackerResult<StoreLock> {
        StoreLock::acquire(&self.config.data_dir)
    }

    fn today() -> NaiveDate {
        Local::now().date_naive()
    }

    // ========================================================================
    // DAILY PROCESSING
    // ========================================================================

    pub fn process(&mut self, daily_file: &Path) -> TrackerResult<ProcessingReport> {
        self.process_on(daily_file, Self::today())
    }

    /// Merge one daily snapshot into the master table and advance referrals.
    ///
    /// Both tables are saved or neither is: when the referrals save fails the
    /// master table is rolled back to its pre-run backup.
    pub fn process_on(&mut self, daily_file: &Path, today: NaiveDate) -> TrackerResult<ProcessingReport> {
        let snapshot = SnapshotLoader::load(daily_file)?;
        tracing::info!(source = %snapshot.source, players = snapshot.len(), "daily run started");

        let _lock = self.lock()?;
        let book = self.streaks.load()?;
        let stored_referrals = self.referrals.load(self.config.milestone)?;

        let reconciler = StreakReconciler::with_threshold(self.config.threshold)
            .with_wheel_milestones(self.config.wheel_milestones.clone());
        let Reconciliation { records, mut report } = reconciler.reconcile(&book, &snapshot, today);

        let mut tracker = ReferralTracker::new(stored_referrals.clone(), self.config.milestone);
        let totals = tracker.updated_totals(&snapshot.hands_by_player());
        report.milestone_events = tracker.process_milestones(&totals);
        let referral_records = tracker.into_records();
        let referrals_changed = referral_records != stored_referrals;

        let events = self.process_events(&report);

        let streaks = &self.streaks;
        let referrals = &self.referrals;
        let receipts = self.audit.with_events(&events, || {
            let master = streaks.save(&records)?;
            let mut receipts = vec![master];

            if referrals_changed {
                match referrals.save(&referral_records) {
                    Ok(receipt) => receipts.push(receipt),
                    Err(e) => {
                        if let Err(rollback) = streaks.table().roll_back(receipts[0].backup.as_deref()) {
                            tracing::error!(error = %rollback, "master roll back failed");
                        }
                        return Err(e);
                    }
                }
            }
            Ok(receipts)
        })?;

        report.backups = receipts.iter().filter_map(|r| r.backup.clone()).collect();
        self.prune();

        tracing::info!(summary = %report.summary(), "daily run finished");
        Ok(report)
    }

    fn process_events(&self, report: &ProcessingReport) -> Vec<AuditEvent> {
        let mut events = Vec::with_capacity(report.transitions.len() + 1);

        events.push(AuditEvent::new(
            "daily_processed",
            ENTITY_SNAPSHOT,
            &report.source,
            json!({
                "processed_on": report.processed_on.to_string(),
                "threshold": report.threshold,
                "players_processed": report.players_processed,
                "players_updated": report.players_updated,
                "new_players": report.new_players,
                "streak_losses": report.streak_losses,
                "wheel_awards": report.wheel_awards.len(),
                "milestone_bonuses": report.milestone_bonuses(),
            }),
            &self.actor,
        ));

        for t in &report.transitions {
            events.push(AuditEvent::new(
                "streak_updated",
                ENTITY_PLAYER,
                &t.username,
                json!({
                    "source": report.source,
                    "hands_played": t.hands_played,
                    "previous_streak": t.previous_streak,
                    "current_streak": t.current_streak,
                    "highest_streak": t.highest_streak,
                    "status": t.status.as_str(),
                    "message": t.message,
                }),
                &self.actor,
            ));
        }

        for m in &report.milestone_events {
            events.push(AuditEvent::new(
                "referral_bonus_earned",
                ENTITY_REFERRAL,
                &m.referred_player,
                json!({
                    "referrer_player": m.referrer_player,
                    "hands_played": m.hands_played,
                    "milestone": m.milestone,
                }),
                &self.actor,
            ));
        }

        events
    }

    // ========================================================================
    // PLAYER QUERIES
    // ========================================================================

    pub fn lookup(&self, username: &str) -> TrackerResult<PlayerStreakRecord> {
        let key = normalize_username(username);
        let _lock = self.lock()?;
        let mut book = self.streaks.load()?;

        book.remove(&key).ok_or(TrackerError::PlayerNotFound(key))
    }

    /// Every player, ordered by username.
    pub fn players(&self) -> TrackerResult<Vec<PlayerStreakRecord>> {
        let _lock = self.lock()?;
        Ok(self.streaks.load()?.into_values().collect())
    }

    /// Longest current streaks first; ties broken by best streak, then name.
    pub fn leaderboard(&self, limit: usize) -> TrackerResult<Vec<PlayerStreakRecord>> {
        let mut players = self.players()?;
        players.sort_by(|a, b| {
            b.current_streak
                .cmp(&a.current_streak)
                .then(b.highest_streak.cmp(&a.highest_streak))
                .then_with(|| a.username.cmp(&b.username))
        });
        players.truncate(limit);
        Ok(players)
    }

    // ========================================================================
    // ADMIN OVERRIDE
    // ========================================================================

    /// Dry run of a revive: validates and reports what would change.
    pub fn plan_revive(&self, username: &str, streak_value: i64) -> TrackerResult<RevivePlan> {
        let _lock = self.lock()?;
        let book = self.streaks.load()?;
        AdminOverride::plan(&book, username, streak_value)
    }

    pub fn revive(&mut self, username: &str, streak_value: i64) -> TrackerResult<PlayerStreakRecord> {
        self.revive_on(username, streak_value, Self::today())
    }

    pub fn revive_on(
        &mut self,
        username: &str,
        streak_value: i64,
        today: NaiveDate,
    ) -> TrackerResult<PlayerStreakRecord> {
        self.revive_checked_on(username, streak_value, true, today)
    }

    /// Revive, refusing to lower an existing streak unless `allow_lower`.
    ///
    /// The check and the write happen under the same lock.
    pub fn revive_checked(
        &mut self,
        username: &str,
        streak_value: i64,
        allow_lower: bool,
    ) -> TrackerResult<PlayerStreakRecord> {
        self.revive_checked_on(username, streak_value, allow_lower, Self::today())
    }

    pub fn revive_checked_on(
        &mut self,
        username: &str,
        streak_value: i64,
        allow_lower: bool,
        today: NaiveDate,
    ) -> TrackerResult<PlayerStreakRecord> {
        let _lock = self.lock()?;
        let mut book = self.streaks.load()?;

        let plan = AdminOverride::plan(&book, username, streak_value)?;
        if plan.lowers_streak() && !allow_lower {
            return Err(TrackerError::StreakWouldDrop {
                username: plan.username,
                current: plan.previous.unwrap_or(0),
                requested: plan.requested,
            });
        }

        let record = AdminOverride::apply(&mut book, &plan, today);

        let event = AuditEvent::new(
            "streak_revived",
            ENTITY_PLAYER,
            &plan.username,
            json!({
                "previous_streak": plan.previous,
                "current_streak": record.current_streak,
                "highest_streak": record.highest_streak,
                "created": plan.creates_player(),
            }),
            &self.actor,
        );

        let streaks = &self.streaks;
        self.audit.with_events(&[event], || streaks.save(&book))?;
        self.prune();

        Ok(record)
    }

    // ========================================================================
    // REFERRALS
    // ========================================================================

    pub fn add_referral(
        &mut self,
        referred_player: &str,
        hands_played: i64,
        referrer_player: &str,
    ) -> TrackerResult<ReferralRecord> {
        let _lock = self.lock()?;
        let mut tracker = ReferralTracker::new(
            self.referrals.load(self.config.milestone)?,
            self.config.milestone,
        );

        let record = tracker
            .add_referral(referred_player, hands_played, referrer_player)?
            .clone();

        let event = AuditEvent::new(
            "referral_added",
            ENTITY_REFERRAL,
            &record.referred_player,
            json!({
                "referrer_player": record.referrer_player,
                "hands_played": record.hands_played,
            }),
            &self.actor,
        );

        let referrals = &self.referrals;
        let records = tracker.into_records();
        self.audit.with_events(&[event], || referrals.save(&records))?;
        self.prune();

        Ok(record)
    }

    pub fn lookup_referrals(&self, referrer_player: &str) -> TrackerResult<ReferrerSummary> {
        let _lock = self.lock()?;
        let tracker = ReferralTracker::new(
            self.referrals.load(self.config.milestone)?,
            self.config.milestone,
        );
        Ok(tracker.lookup_by_referrer(referrer_player))
    }

    pub fn referrals(&self) -> TrackerResult<Vec<ReferralRecord>> {
        let _lock = self.lock()?;
        self.referrals.load(self.config.milestone)
    }

    // ========================================================================
    // BACKUPS & HISTORY
    // ========================================================================

    /// Backups of both tables, newest first.
    pub fn backups(&self) -> TrackerResult<Vec<BackupInfo>> {
        let mut all = self.streaks.table().list_backups()?;
        all.extend(self.referrals.table().list_backups()?);
        all.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.path.cmp(&a.path)));
        Ok(all)
    }

    /// Put a backup back in place. The table is picked from the file name.
    pub fn restore(&mut self, backup: &Path) -> TrackerResult<SaveReceipt> {
        let backup = self.resolve_backup(backup);
        if !backup.exists() {
            return Err(TrackerError::FileNotFound(backup));
        }

        let _lock = self.lock()?;
        let streaks = &self.streaks;
        let referrals = &self.referrals;

        let (table, restore): (String, Box<dyn FnOnce() -> TrackerResult<SaveReceipt> + '_>) =
            if streaks.table().owns_backup(&backup) {
                (
                    streaks.table().stem(),
                    Box::new(|| streaks.table().restore::<PlayerStreakRecord>(&backup)),
                )
            } else if referrals.table().owns_backup(&backup) {
                (
                    referrals.table().stem(),
                    Box::new(|| referrals.table().restore::<ReferralRow>(&backup)),
                )
            } else {
                return Err(TrackerError::InvalidConfig(format!(
                    "{} is not a backup of any streak table",
                    backup.display()
                )));
            };

        let event = AuditEvent::new(
            "table_restored",
            ENTITY_TABLE,
            &table,
            json!({ "backup": backup.display().to_string() }),
            &self.actor,
        );

        let receipt = self.audit.with_events(&[event], restore)?;
        self.prune();
        Ok(receipt)
    }

    /// Bare file names are looked up in the backup directory.
    fn resolve_backup(&self, backup: &Path) -> PathBuf {
        if backup.exists() || backup.components().count() > 1 {
            backup.to_path_buf()
        } else {
            self.config.backup_dir.join(backup)
        }
    }

    /// Audit events touching `username` (streak changes and referrals), newest first.
    pub fn history(&self, username: &str) -> TrackerResult<Vec<AuditEvent>> {
        let key = normalize_username(username);
        let mut events = self.audit.events_for_entity(ENTITY_PLAYER, &key)?;
        events.extend(self.audit.events_for_entity(ENTITY_REFERRAL, &key)?);
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(events)
    }

    pub fn recent_events(&self, limit: usize) -> TrackerResult<Vec<AuditEvent>> {
        self.audit.recent(limit)
    }

    /// Retention runs after the save it follows has succeeded; a failure
    /// here is logged and never fails the operation.
    fn prune(&self) {
        let keep = self.config.backup_retention;
        for table in [self.streaks.table(), self.referrals.table()] {
            if let Err(e) = table.prune_backups(keep) {
                tracing::warn!(table = %table.stem(), error = %e, "backup pruning failed");
            }
        }
    }
}
