// 📥 Snapshot Loader - one day of raw activity rows → validated records
//
// Input contract (header row required, column order free):
//
// | Column     | Example    | Notes                                        |
// |------------|------------|----------------------------------------------|
// | `Username` | `AceHigh`  | Trimmed + lowercased; blank rows are skipped  |
// | `Hands`    | `120`      | Whole number ≥ 0; blank = 0; `120.0` accepted |

use crate::entities::{normalize_username, parse_whole_number};
use crate::error::{TrackerError, TrackerResult};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::path::Path;

const USERNAME_COLUMN: &str = "Username";
const HANDS_COLUMN: &str = "Hands";

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyActivityRecord {
    pub username: String,
    pub hands_played: u64,
}

/// One batch of daily activity, in file order.
#[derive(Debug, Clone, Serialize)]
pub struct DailySnapshot {
    pub source: String,
    pub records: Vec<DailyActivityRecord>,
}

impl DailySnapshot {
    pub fn new(source: &str, records: Vec<DailyActivityRecord>) -> Self {
        DailySnapshot {
            source: source.to_string(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Hands played per player, for the referral tracker.
    pub fn hands_by_player(&self) -> BTreeMap<String, u64> {
        self.records
            .iter()
            .map(|r| (r.username.clone(), r.hands_played))
            .collect()
    }
}

// ============================================================================
// LOADER
// ============================================================================

pub struct SnapshotLoader;

impl SnapshotLoader {
    /// Load a daily CSV file.
    pub fn load(path: &Path) -> TrackerResult<DailySnapshot> {
        if !path.exists() {
            return Err(TrackerError::FileNotFound(path.to_path_buf()));
        }

        let file = std::fs::File::open(path)
            .map_err(|e| TrackerError::store(format!("open {}", path.display()), e))?;

        let source = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("daily snapshot");

        Self::from_reader(file, source)
    }

    /// Parse CSV text from any reader (used directly by tests).
    pub fn from_reader<R: Read>(reader: R, source: &str) -> TrackerResult<DailySnapshot> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers = rdr.headers().map_err(|e| malformed(source, 1, e.to_string()))?.clone();
        let username_idx = column_index(&headers, USERNAME_COLUMN)
            .ok_or_else(|| malformed(source, 1, format!("missing '{}' column", USERNAME_COLUMN)))?;
        let hands_idx = column_index(&headers, HANDS_COLUMN)
            .ok_or_else(|| malformed(source, 1, format!("missing '{}' column", HANDS_COLUMN)))?;

        let mut records = Vec::new();
        let mut seen = HashSet::new();

        for result in rdr.records() {
            let row = result.map_err(|e| {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                malformed(source, line, e.to_string())
            })?;
            let line = row.position().map(|p| p.line()).unwrap_or(0);

            // rows may carry extra trailing cells, never fewer than the header needs
            if row.len() <= username_idx.max(hands_idx) {
                return Err(malformed(
                    source,
                    line,
                    format!("expected at least {} fields, found {}", username_idx.max(hands_idx) + 1, row.len()),
                ));
            }

            let username = normalize_username(row.get(username_idx).unwrap_or(""));
            if username.is_empty() {
                continue;
            }

            let raw_hands = row.get(hands_idx).unwrap_or("");
            let hands_played = parse_hands(raw_hands).ok_or_else(|| {
                malformed(
                    source,
                    line,
                    format!("invalid hands value '{}' for {}", raw_hands, username),
                )
            })?;

            if !seen.insert(username.clone()) {
                return Err(malformed(
                    source,
                    line,
                    format!("duplicate row for player '{}'", username),
                ));
            }

            records.push(DailyActivityRecord {
                username,
                hands_played,
            });
        }

        if records.is_empty() {
            return Err(TrackerError::EmptySnapshot(source.to_string()));
        }

        tracing::debug!(source, players = records.len(), "loaded daily snapshot");
        Ok(DailySnapshot::new(source, records))
    }
}

/// Coerce a hands cell: blank → 0, whole numbers (optionally `.0`) → value.
pub fn parse_hands(raw: &str) -> Option<u64> {
    if raw.trim().is_empty() {
        return Some(0);
    }
    parse_whole_number(raw)
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.eq_ignore_ascii_case(name))
}

fn malformed(source: &str, line: u64, message: String) -> TrackerError {
    TrackerError::MalformedRow {
        source_name: source.to_string(),
        line,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn load(text: &str) -> TrackerResult<DailySnapshot> {
        SnapshotLoader::from_reader(text.as_bytes(), "daily.csv")
    }

    #[test]
    fn test_load_basic_snapshot() {
        let snapshot = load("Username,Hands\nAceHigh,120\n river_rat ,99\n").unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.records[0].username, "acehigh");
        assert_eq!(snapshot.records[0].hands_played, 120);
        assert_eq!(snapshot.records[1].username, "river_rat");
        assert_eq!(snapshot.records[1].hands_played, 99);
    }

    #[test]
    fn test_blank_hands_is_zero_and_blank_username_skipped() {
        let snapshot = load("Hands,Username\n,Shorty\n50,\n").unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.records[0].hands_played, 0);
    }

    #[test]
    fn test_integral_decimal_accepted() {
        assert_eq!(parse_hands("120.0"), Some(120));
        assert_eq!(parse_hands("12.5"), None);
        assert_eq!(parse_hands("-3"), None);
        assert_eq!(parse_hands("lots"), None);
    }

    #[test]
    fn test_exponent_and_overflow_rejected() {
        assert_eq!(parse_hands("1e3"), None);
        assert_eq!(parse_hands("18446744073709551616"), None);
        assert_eq!(parse_hands("18446744073709551616.0"), None);
        assert_eq!(parse_hands("+5"), Some(5));
        assert_eq!(parse_hands(".0"), None);
        assert_eq!(parse_hands("7."), Some(7));
    }

    #[test]
    fn test_short_row_rejected() {
        let err = load("Username,Hands\nalice,150\nbob\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(matches!(err, TrackerError::MalformedRow { line: 3, .. }));
    }

    #[test]
    fn test_extra_trailing_cells_allowed() {
        let snapshot = load("Username,Hands\nalice,150,vip\n").unwrap();
        assert_eq!(snapshot.records[0].hands_played, 150);
    }

    #[test]
    fn test_malformed_hands_rejected() {
        let err = load("Username,Hands\nalice,100\nbob,many\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        match err {
            TrackerError::MalformedRow { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_column_rejected() {
        let err = load("Player,Hands\nalice,100\n").unwrap_err();
        assert!(matches!(err, TrackerError::MalformedRow { line: 1, .. }));
    }

    #[test]
    fn test_duplicate_player_rejected() {
        let err = load("Username,Hands\nalice,100\nALICE,20\n").unwrap_err();
        assert!(err.to_string().contains("duplicate row"));
    }

    #[test]
    fn test_empty_snapshot_rejected() {
        let err = load("Username,Hands\n").unwrap_err();
        assert!(matches!(err, TrackerError::EmptySnapshot(_)));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = SnapshotLoader::load(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_hands_by_player() {
        let snapshot = load("Username,Hands\nalice,300\nbob,20\n").unwrap();
        let hands = snapshot.hands_by_player();
        assert_eq!(hands.get("alice"), Some(&300));
        assert_eq!(hands.get("bob"), Some(&20));
    }
}
