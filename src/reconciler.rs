// ⚖️ Streak Reconciler - merge one daily snapshot into the streak book
//
// Per player in the snapshot:
//   unknown player          → NEW, streak = 1 if hands >= threshold else 0
//   hands >= threshold      → INCREASED, streak + 1
//   hands <  threshold      → RESET to 0 if streak was > 0, else UNCHANGED
//
// Players absent from the snapshot are left alone. The reconciler is a pure
// function of (book, snapshot, date): every call advances state, so running the
// same snapshot twice counts two days. Once-per-day is the caller's problem.

use crate::entities::{PlayerStreakRecord, StreakBook, StreakStatus};
use crate::referrals::MilestoneEvent;
use crate::snapshot::DailySnapshot;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::path::PathBuf;

pub const DEFAULT_HANDS_THRESHOLD: u64 = 100;

/// Lost streaks at or above this length are called out in the report.
pub const SIGNIFICANT_STREAK: u32 = 4;

/// Wheel spins are earned at 7, 14, ... 70 days.
pub fn default_wheel_milestones() -> Vec<u32> {
    (1..=10).map(|n| n * 7).collect()
}

// ============================================================================
// TRANSITIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerTransition {
    pub username: String,
    pub hands_played: u64,
    /// None for players seen for the first time
    pub previous_streak: Option<u32>,
    pub current_streak: u32,
    pub highest_streak: u32,
    pub status: StreakStatus,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WheelAward {
    pub username: String,
    pub streak: u32,
    pub wheel_number: u32,
}

impl WheelAward {
    pub fn message(&self) -> String {
        format!(
            "{} hit {} day streak and earned a Wheel {} spin",
            self.username, self.streak, self.wheel_number
        )
    }
}

// ============================================================================
// PROCESSING REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ProcessingReport {
    pub source: String,
    pub processed_on: NaiveDate,
    pub threshold: u64,
    pub players_processed: usize,
    pub players_updated: usize,
    pub new_players: usize,
    pub streak_losses: usize,
    pub transitions: Vec<PlayerTransition>,
    pub wheel_awards: Vec<WheelAward>,
    pub significant_losses: Vec<String>,
    pub milestone_events: Vec<MilestoneEvent>,
    pub backups: Vec<PathBuf>,
    pub generated_at: DateTime<Utc>,
}

impl ProcessingReport {
    pub fn milestone_bonuses(&self) -> usize {
        self.milestone_events.len()
    }

    pub fn transition(&self, username: &str) -> Option<&PlayerTransition> {
        self.transitions.iter().find(|t| t.username == username)
    }

    pub fn summary(&self) -> String {
        format!(
            "{} on {}: {} processed, {} updated, {} new, {} lost streaks, {} wheel spins, {} referral bonuses",
            self.source,
            self.processed_on,
            self.players_processed,
            self.players_updated,
            self.new_players,
            self.streak_losses,
            self.wheel_awards.len(),
            self.milestone_bonuses()
        )
    }
}

/// Output of one reconciliation pass: the new book plus what happened.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub records: StreakBook,
    pub report: ProcessingReport,
}

// ============================================================================
// RECONCILER
// ============================================================================

pub struct StreakReconciler {
    /// Minimum hands for a day to count (default: 100)
    pub threshold: u64,

    /// Streak lengths that earn a wheel spin (default: multiples of 7 up to 70)
    pub wheel_milestones: Vec<u32>,
}

impl StreakReconciler {
    pub fn new() -> Self {
        StreakReconciler {
            threshold: DEFAULT_HANDS_THRESHOLD,
            wheel_milestones: default_wheel_milestones(),
        }
    }

    pub fn with_threshold(threshold: u64) -> Self {
        StreakReconciler {
            threshold,
            ..Self::new()
        }
    }

    pub fn with_wheel_milestones(mut self, milestones: Vec<u32>) -> Self {
        self.wheel_milestones = milestones;
        self
    }

    /// Merge `snapshot` into `current` as of `today`.
    pub fn reconcile(
        &self,
        current: &StreakBook,
        snapshot: &DailySnapshot,
        today: NaiveDate,
    ) -> Reconciliation {
        let mut records = current.clone();
        let mut transitions = Vec::with_capacity(snapshot.len());
        let mut wheel_awards = Vec::new();
        let mut significant_losses = Vec::new();

        for activity in &snapshot.records {
            let hands = activity.hands_played;
            let qualifies = hands >= self.threshold;

            let transition = match records.get_mut(&activity.username) {
                None => {
                    let mut record = PlayerStreakRecord::new(&activity.username);
                    let (streak, message) = if qualifies {
                        (1, "Joined streak system and started a 1 day streak".to_string())
                    } else {
                        (
                            0,
                            format!(
                                "Joined streak system (played {} hands, {} needed)",
                                hands, self.threshold
                            ),
                        )
                    };
                    record.set_streak(streak, StreakStatus::New, message, today);
                    let transition = transition_for(&record, hands, None);
                    records.insert(record.username.clone(), record);
                    transition
                }
                Some(record) => {
                    let previous = record.current_streak;

                    if qualifies {
                        let streak = previous.saturating_add(1);
                        let message = match self.wheel_number(streak) {
                            Some(wheel_number) => {
                                wheel_awards.push(WheelAward {
                                    username: record.username.clone(),
                                    streak,
                                    wheel_number,
                                });
                                format!(
                                    "Hit {} day milestone and earned Wheel {} spin",
                                    streak, wheel_number
                                )
                            }
                            None => format!("Currently on a {} day streak", streak),
                        };
                        record.set_streak(streak, StreakStatus::Increased, message, today);
                    } else if previous > 0 {
                        if previous >= SIGNIFICANT_STREAK {
                            significant_losses.push(format!(
                                "{} lost their {} day streak",
                                record.username, previous
                            ));
                        }
                        let message =
                            format!("Lost {} day streak (played {} hands)", previous, hands);
                        record.set_streak(0, StreakStatus::Reset, message, today);
                    } else {
                        let message = format!("No active streak (played {} hands)", hands);
                        record.set_streak(0, StreakStatus::Unchanged, message, today);
                    }

                    transition_for(record, hands, Some(previous))
                }
            };

            transitions.push(transition);
        }

        let count = |status: StreakStatus| transitions.iter().filter(|t| t.status == status).count();

        let report = ProcessingReport {
            source: snapshot.source.clone(),
            processed_on: today,
            threshold: self.threshold,
            players_processed: transitions.len(),
            players_updated: count(StreakStatus::Increased),
            new_players: count(StreakStatus::New),
            streak_losses: count(StreakStatus::Reset),
            wheel_awards,
            significant_losses,
            milestone_events: Vec::new(),
            backups: Vec::new(),
            generated_at: Utc::now(),
            transitions,
        };

        Reconciliation { records, report }
    }

    /// 1-based wheel number when `streak` lands exactly on a wheel milestone.
    pub fn wheel_number(&self, streak: u32) -> Option<u32> {
        self.wheel_milestones
            .iter()
            .position(|m| *m == streak)
            .map(|i| i as u32 + 1)
    }
}

impl Default for StreakReconciler {
    fn default() -> Self {
        Self::new()
    }
}

fn transition_for(record: &PlayerStreakRecord, hands: u64, previous: Option<u32>) -> PlayerTransition {
    PlayerTransition {
        username: record.username.clone(),
        hands_played: hands,
        previous_streak: previous,
        current_streak: record.current_streak,
        highest_streak: record.highest_streak,
        status: record.last_status,
        message: record.last_update.clone(),
    }
}

// ============================================================================
// TESTS
// ============================================================================
