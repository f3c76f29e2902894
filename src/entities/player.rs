// 🃏 Player Streak Entity
//
// One row per player in the master streak table. The username is the identity
// (case-normalised); everything else is a value the reconciler or an admin
// override can replace. Records are never deleted.

use chrono::NaiveDate;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// All persisted streak records keyed by normalised username.
pub type StreakBook = BTreeMap<String, PlayerStreakRecord>;

/// Normalise a raw username into its store key.
///
/// Exact matching after trimming and lowercasing; no other identity inference.
pub fn normalize_username(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Parse a whole number cell, also accepting the `120.0` form spreadsheet
/// exports write. Exponents, signs other than `+`, and overflow are rejected.
pub fn parse_whole_number(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<u64>() {
        return Some(n);
    }

    let (whole, frac) = raw.split_once('.')?;
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !frac.bytes().all(|b| b == b'0') {
        return None;
    }
    whole.parse::<u64>().ok()
}

// ============================================================================
// STREAK STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreakStatus {
    /// First appearance in a daily snapshot
    New,

    /// Qualifying day, streak advanced by one
    Increased,

    /// Non-qualifying day that broke an active streak
    Reset,

    /// Non-qualifying day with no active streak to lose
    #[default]
    Unchanged,

    /// Streak set directly by an admin override
    Revived,
}

impl StreakStatus {
    /// Parse a stored label, case-insensitively.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "NEW" => Some(StreakStatus::New),
            "INCREASED" => Some(StreakStatus::Increased),
            "RESET" => Some(StreakStatus::Reset),
            "UNCHANGED" => Some(StreakStatus::Unchanged),
            "REVIVED" => Some(StreakStatus::Revived),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreakStatus::New => "NEW",
            StreakStatus::Increased => "INCREASED",
            StreakStatus::Reset => "RESET",
            StreakStatus::Unchanged => "UNCHANGED",
            StreakStatus::Revived => "REVIVED",
        }
    }
}

// ============================================================================
// PLAYER STREAK RECORD
// ============================================================================

/// Master table row.
///
/// Only `Username` and `Streak` are required when reading, so sheets written
/// before highest-streak tracking existed still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStreakRecord {
    #[serde(rename = "Username")]
    pub username: String,

    #[serde(rename = "Streak", deserialize_with = "streak_cell")]
    pub current_streak: u32,

    #[serde(rename = "HighestStreak", default, deserialize_with = "streak_cell")]
    pub highest_streak: u32,

    #[serde(rename = "LastStatus", default, deserialize_with = "status_cell")]
    pub last_status: StreakStatus,

    /// Human-readable status line shown by lookups
    #[serde(rename = "LastUpdate", default)]
    pub last_update: String,

    #[serde(rename = "UpdateDate", default)]
    pub updated_on: Option<NaiveDate>,
}

impl PlayerStreakRecord {
    pub fn new(username: &str) -> Self {
        PlayerStreakRecord {
            username: normalize_username(username),
            current_streak: 0,
            highest_streak: 0,
            last_status: StreakStatus::New,
            last_update: String::new(),
            updated_on: None,
        }
    }

    /// Set the current streak and record why.
    ///
    /// `highest_streak` only ever moves up.
    pub fn set_streak(&mut self, value: u32, status: StreakStatus, message: String, on: NaiveDate) {
        self.current_streak = value;
        self.highest_streak = self.highest_streak.max(value);
        self.last_status = status;
        self.last_update = message;
        self.updated_on = Some(on);
    }

    /// Repair rows loaded from legacy sheets (no highest-streak column).
    pub fn normalized(mut self) -> Self {
        self.username = normalize_username(&self.username);
        self.highest_streak = self.highest_streak.max(self.current_streak);
        self
    }

    pub fn has_active_streak(&self) -> bool {
        self.current_streak > 0
    }

    /// `highest_streak >= current_streak`; non-negativity is carried by `u32`.
    pub fn is_consistent(&self) -> bool {
        self.highest_streak >= self.current_streak && !self.username.is_empty()
    }
}

// ============================================================================
// CELL DESERIALISERS
// ============================================================================

// blank → 0; `3.0` → 3
fn streak_cell<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let raw = String::deserialize(deserializer)?;
    if raw.trim().is_empty() {
        return Ok(0);
    }
    parse_whole_number(&raw)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| de::Error::custom(format!("invalid streak value '{}'", raw)))
}

// blank → UNCHANGED
fn status_cell<'de, D: Deserializer<'de>>(deserializer: D) -> Result<StreakStatus, D::Error> {
    let raw = String::deserialize(deserializer)?;
    if raw.trim().is_empty() {
        return Ok(StreakStatus::default());
    }
    StreakStatus::from_label(&raw).ok_or_else(|| de::Error::custom(format!("unknown status '{}'", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[test]
    fn test_normalize_username() {
        assert_eq!(normalize_username("  AceHigh "), "acehigh");
        assert_eq!(normalize_username("river_rat"), "river_rat");
    }

    #[test]
    fn test_highest_streak_is_monotonic() {
        let mut record = PlayerStreakRecord::new("Alice");
        record.set_streak(5, StreakStatus::Increased, "Currently on a 5 day streak".into(), day(1));
        assert_eq!(record.highest_streak, 5);

        record.set_streak(0, StreakStatus::Reset, "Lost 5 day streak".into(), day(2));
        assert_eq!(record.current_streak, 0);
        assert_eq!(record.highest_streak, 5);
        assert!(record.is_consistent());
        assert_eq!(record.updated_on, Some(day(2)));
    }

    #[test]
    fn test_legacy_row_is_repaired() {
        let legacy = PlayerStreakRecord {
            username: "Bob".to_string(),
            current_streak: 9,
            highest_streak: 0,
            last_status: StreakStatus::Unchanged,
            last_update: String::new(),
            updated_on: None,
        }
        .normalized();

        assert_eq!(legacy.username, "bob");
        assert_eq!(legacy.highest_streak, 9);
        assert!(legacy.is_consistent());
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(StreakStatus::New.as_str(), "NEW");
        assert_eq!(StreakStatus::default(), StreakStatus::Unchanged);
        assert_eq!(StreakStatus::from_label("revived"), Some(StreakStatus::Revived));
        assert_eq!(StreakStatus::from_label("WON"), None);
    }

    #[test]
    fn test_parse_whole_number() {
        assert_eq!(parse_whole_number("3"), Some(3));
        assert_eq!(parse_whole_number(" 3.00 "), Some(3));
        assert_eq!(parse_whole_number("3.5"), None);
        assert_eq!(parse_whole_number("1e3"), None);
        assert_eq!(parse_whole_number("-1"), None);
        assert_eq!(parse_whole_number("18446744073709551616"), None);
    }

    #[test]
    fn test_spreadsheet_cells_deserialize() {
        let text = "Username,Streak,HighestStreak,LastStatus\nalice,3.0,,\nbob,2,4.0,reset\n";
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(text.as_bytes());
        let rows: Vec<PlayerStreakRecord> = rdr.deserialize().collect::<Result<_, _>>().unwrap();

        assert_eq!(rows[0].current_streak, 3);
        assert_eq!(rows[0].highest_streak, 0);
        assert_eq!(rows[0].last_status, StreakStatus::Unchanged);
        assert_eq!(rows[1].highest_streak, 4);
        assert_eq!(rows[1].last_status, StreakStatus::Reset);
    }

    #[test]
    fn test_overflowing_streak_rejected() {
        let text = "Username,Streak\nalice,4294967296\n";
        let mut rdr = csv::ReaderBuilder::new().from_reader(text.as_bytes());
        let row: Result<PlayerStreakRecord, _> = rdr.deserialize().next().unwrap();
        assert!(row.is_err());
    }
}
