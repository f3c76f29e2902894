// 🎁 Referral Tracker - one-time bonus when a referred player hits the milestone
//
// Detection is a level check (`total >= milestone`) gated by `bonus_earned`,
// which makes it crossing-based in effect: each record fires at most once.

use crate::entities::{normalize_username, ReferralRecord};
use crate::error::{TrackerError, TrackerResult};
use serde::Serialize;
use std::collections::BTreeMap;

pub const DEFAULT_REFERRAL_MILESTONE: u64 = 250;
pub const BONUS_EARNED_TEXT: &str = "BONUS EARNED";

// ============================================================================
// EVENTS & LOOKUP RESULTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MilestoneEvent {
    pub referred_player: String,
    pub referrer_player: String,
    pub hands_played: u64,
    pub milestone: u64,
}

impl MilestoneEvent {
    pub fn message(&self) -> String {
        format!(
            "🎁 {} hit {} hands milestone! {} should receive a referral bonus!",
            self.referred_player, self.milestone, self.referrer_player
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferralStatus {
    pub referred_player: String,
    pub hands_played: u64,
    pub bonus_earned: bool,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferrerSummary {
    pub referrer_player: String,
    pub referrals: Vec<ReferralStatus>,
    pub bonuses_earned: usize,
}

impl ReferrerSummary {
    pub fn total_referrals(&self) -> usize {
        self.referrals.len()
    }
}

/// `"N hands to bonus"` below the milestone, `"BONUS EARNED"` at or above.
pub fn status_text(record: &ReferralRecord, milestone: u64) -> String {
    if record.reached(milestone) {
        BONUS_EARNED_TEXT.to_string()
    } else {
        format!("{} hands to bonus", record.hands_to_bonus(milestone))
    }
}

/// Parse a hands-played argument typed by an admin ("0", "120").
pub fn parse_hands_arg(raw: &str) -> TrackerResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| TrackerError::InvalidHands(raw.trim().to_string()))
}

// ============================================================================
// REFERRAL TRACKER
// ============================================================================

pub struct ReferralTracker {
    records: Vec<ReferralRecord>,
    milestone: u64,
}

impl ReferralTracker {
    pub fn new(records: Vec<ReferralRecord>, milestone: u64) -> Self {
        ReferralTracker { records, milestone }
    }

    pub fn milestone(&self) -> u64 {
        self.milestone
    }

    pub fn records(&self) -> &[ReferralRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ReferralRecord> {
        self.records
    }

    pub fn find(&self, referred_player: &str) -> Option<&ReferralRecord> {
        let key = normalize_username(referred_player);
        self.records.iter().find(|r| r.referred_player == key)
    }

    /// Register a new referral link.
    ///
    /// Checks run in order: empty names, self-referral, negative hands,
    /// duplicate target. Nothing is mutated on error.
    pub fn add_referral(
        &mut self,
        referred_player: &str,
        hands_played: i64,
        referrer_player: &str,
    ) -> TrackerResult<&ReferralRecord> {
        let referred = normalize_username(referred_player);
        let referrer = normalize_username(referrer_player);

        if referred.is_empty() {
            return Err(TrackerError::EmptyField { field: "referred player" });
        }
        if referrer.is_empty() {
            return Err(TrackerError::EmptyField { field: "referrer player" });
        }
        if referred == referrer {
            return Err(TrackerError::SelfReferral(referred));
        }
        if hands_played < 0 {
            return Err(TrackerError::InvalidHands(hands_played.to_string()));
        }
        if self.find(&referred).is_some() {
            return Err(TrackerError::DuplicateReferral(referred));
        }

        self.records
            .push(ReferralRecord::new(&referred, hands_played as u64, &referrer));
        tracing::info!(referred = %referred, referrer = %referrer, "referral added");

        let last = self.records.len() - 1;
        Ok(&self.records[last])
    }

    /// Latest cumulative totals: stored hands plus today's hands, for every
    /// referred player who appears in the snapshot.
    pub fn updated_totals(&self, daily_hands: &BTreeMap<String, u64>) -> BTreeMap<String, u64> {
        self.records
            .iter()
            .filter_map(|r| {
                daily_hands
                    .get(&r.referred_player)
                    .map(|today| (r.referred_player.clone(), r.hands_played.saturating_add(*today)))
            })
            .collect()
    }

    /// Apply updated totals and flip `bonus_earned` for every record that has
    /// reached the milestone and has not been paid yet.
    ///
    /// Records missing from `totals` are checked against their stored count.
    pub fn process_milestones(&mut self, totals: &BTreeMap<String, u64>) -> Vec<MilestoneEvent> {
        let mut events = Vec::new();

        for record in self.records.iter_mut() {
            if let Some(total) = totals.get(&record.referred_player) {
                record.hands_played = *total;
            }

            if !record.bonus_earned && record.hands_played >= self.milestone {
                record.bonus_earned = true;
                events.push(MilestoneEvent {
                    referred_player: record.referred_player.clone(),
                    referrer_player: record.referrer_player.clone(),
                    hands_played: record.hands_played,
                    milestone: self.milestone,
                });
            }
        }

        if !events.is_empty() {
            tracing::info!(bonuses = events.len(), "referral milestones reached");
        }
        events
    }

    /// Every referral made by `referrer_player` (case-insensitive), in
    /// insertion order. Read-only.
    pub fn lookup_by_referrer(&self, referrer_player: &str) -> ReferrerSummary {
        let key = normalize_username(referrer_player);

        let referrals: Vec<ReferralStatus> = self
            .records
            .iter()
            .filter(|r| r.referrer_player == key)
            .map(|r| ReferralStatus {
                referred_player: r.referred_player.clone(),
                hands_played: r.hands_played,
                bonus_earned: r.bonus_earned,
                status: status_text(r, self.milestone),
            })
            .collect();

        let bonuses_earned = referrals
            .iter()
            .filter(|s| s.status == BONUS_EARNED_TEXT)
            .count();

        ReferrerSummary {
            referrer_player: key,
            referrals,
            bonuses_earned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn tracker() -> ReferralTracker {
        ReferralTracker::new(Vec::new(), DEFAULT_REFERRAL_MILESTONE)
    }

    fn totals(entries: &[(&str, u64)]) -> BTreeMap<String, u64> {
        entries.iter().map(|(n, h)| (n.to_string(), *h)).collect()
    }

    #[test]
    fn test_self_referral_rejected() {
        let mut t = tracker();
        let hands = parse_hands_arg("0").unwrap();
        let err = t.add_referral("p", hands, "p").unwrap_err();
        assert!(matches!(err, TrackerError::SelfReferral(_)));
        assert!(t.records().is_empty());
    }

    #[test]
    fn test_self_referral_is_case_insensitive() {
        let mut t = tracker();
        let err = t.add_referral("Player", 0, " player ").unwrap_err();
        assert!(matches!(err, TrackerError::SelfReferral(_)));
    }

    #[test]
    fn test_duplicate_referral_rejected() {
        let mut t = tracker();
        t.add_referral("p", 5, "q").unwrap();

        let err = t.add_referral("p", 5, "r").unwrap_err();
        assert!(matches!(err, TrackerError::DuplicateReferral(_)));
        assert_eq!(t.records().len(), 1);
        assert_eq!(t.records()[0].referrer_player, "q");
    }

    #[test]
    fn test_negative_and_non_numeric_hands_rejected() {
        let mut t = tracker();
        let err = t.add_referral("p", -1, "q").unwrap_err();
        assert!(matches!(err, TrackerError::InvalidHands(_)));

        let err = parse_hands_arg("lots").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_new_referral_starts_unpaid() {
        let mut t = tracker();
        let record = t.add_referral("Newbie", 40, "Veteran").unwrap();
        assert!(!record.bonus_earned);
        assert_eq!(record.hands_played, 40);
        assert_eq!(record.referred_player, "newbie");
    }

    #[test]
    fn test_bonus_fires_exactly_once() {
        let mut t = tracker();
        t.add_referral("p", 150, "q").unwrap();

        // 150 hands: below milestone
        assert!(t.process_milestones(&totals(&[("p", 150)])).is_empty());

        // update to 260: exactly one event
        let events = t.process_milestones(&totals(&[("p", 260)]));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].referred_player, "p");
        assert_eq!(events[0].referrer_player, "q");
        assert!(t.records()[0].bonus_earned);

        // re-processing at 260 emits nothing
        assert!(t.process_milestones(&totals(&[("p", 260)])).is_empty());
        assert!(t.records()[0].bonus_earned);
    }

    #[test]
    fn test_updated_totals_accumulate_daily_hands() {
        let mut t = tracker();
        t.add_referral("p", 200, "q").unwrap();
        t.add_referral("idle", 10, "q").unwrap();

        let daily = totals(&[("p", 60), ("stranger", 500)]);
        let updated = t.updated_totals(&daily);

        assert_eq!(updated.len(), 1);
        assert_eq!(updated["p"], 260);

        let events = t.process_milestones(&updated);
        assert_eq!(events.len(), 1);
        assert_eq!(t.find("idle").unwrap().hands_played, 10);
    }

    #[test]
    fn test_referral_added_above_milestone_fires_on_next_run() {
        let mut t = tracker();
        t.add_referral("late", 300, "q").unwrap();

        let events = t.process_milestones(&BTreeMap::new());
        assert_eq!(events.len(), 1);
        assert!(t.process_milestones(&BTreeMap::new()).is_empty());
    }

    #[test]
    fn test_lookup_by_referrer() {
        let mut t = tracker();
        t.add_referral("zed", 180, "Amy").unwrap();
        t.add_referral("bob", 300, "amy").unwrap();
        t.add_referral("cat", 0, "other").unwrap();

        let summary = t.lookup_by_referrer("AMY");
        assert_eq!(summary.total_referrals(), 2);
        assert_eq!(summary.referrals[0].referred_player, "zed");
        assert_eq!(summary.referrals[0].status, "70 hands to bonus");
        assert_eq!(summary.referrals[1].status, "BONUS EARNED");
        assert_eq!(summary.bonuses_earned, 1);

        // read-only
        assert!(!t.find("bob").unwrap().bonus_earned);
    }

    #[test]
    fn test_milestone_message() {
        let event = MilestoneEvent {
            referred_player: "newbie".into(),
            referrer_player: "veteran".into(),
            hands_played: 251,
            milestone: 250,
        };
        assert_eq!(
            event.message(),
            "🎁 newbie hit 250 hands milestone! veteran should receive a referral bonus!"
        );
    }
}
