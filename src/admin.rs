// 🛠️ Admin Override - set a player's streak directly
//
// Trust is checked by whoever calls this; the core never re-derives
// permissions. A revive may create a player that was never in a snapshot.

use crate::entities::{normalize_username, PlayerStreakRecord, StreakBook, StreakStatus};
use crate::error::{TrackerError, TrackerResult};
use chrono::NaiveDate;
use serde::Serialize;

/// Parse a streak value typed by an admin ("7", " 12 ").
pub fn parse_streak_value(raw: &str) -> TrackerResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| TrackerError::InvalidValue(raw.trim().to_string()))
}

/// What a revive would do, computed before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevivePlan {
    pub username: String,
    /// None when the player does not exist yet
    pub previous: Option<u32>,
    pub requested: u32,
}

impl RevivePlan {
    /// True when the revive would shorten an existing streak.
    pub fn lowers_streak(&self) -> bool {
        matches!(self.previous, Some(prev) if self.requested < prev)
    }

    pub fn creates_player(&self) -> bool {
        self.previous.is_none()
    }
}

pub struct AdminOverride;

impl AdminOverride {
    /// Validate a revive request against the current book without mutating it.
    pub fn plan(book: &StreakBook, username: &str, streak_value: i64) -> TrackerResult<RevivePlan> {
        let username = normalize_username(username);
        if username.is_empty() {
            return Err(TrackerError::EmptyField { field: "username" });
        }

        let requested = u32::try_from(streak_value)
            .map_err(|_| TrackerError::InvalidValue(streak_value.to_string()))?;

        Ok(RevivePlan {
            previous: book.get(&username).map(|r| r.current_streak),
            username,
            requested,
        })
    }

    /// Set `username`'s streak to `streak_value` and mark it REVIVED.
    ///
    /// `highest_streak` becomes `max(highest, value)`. Unknown players are
    /// created. Negative values are rejected without touching the book.
    pub fn revive(
        book: &mut StreakBook,
        username: &str,
        streak_value: i64,
        today: NaiveDate,
    ) -> TrackerResult<PlayerStreakRecord> {
        let plan = Self::plan(book, username, streak_value)?;
        Ok(Self::apply(book, &plan, today))
    }

    /// Apply an already validated plan.
    pub fn apply(book: &mut StreakBook, plan: &RevivePlan, today: NaiveDate) -> PlayerStreakRecord {
        let record = book
            .entry(plan.username.clone())
            .or_insert_with(|| PlayerStreakRecord::new(&plan.username));

        record.set_streak(
            plan.requested,
            StreakStatus::Revived,
            format!("{} day streak revived!", plan.requested),
            today,
        );

        tracing::info!(
            username = %plan.username,
            previous = ?plan.previous,
            streak = plan.requested,
            "streak revived"
        );

        record.clone()
    }
}
