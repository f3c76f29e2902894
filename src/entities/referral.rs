// 🤝 Referral Entity
//
// One row per referred player. `referred_player` is the identity (a player can
// only be referred once); `hands_played` accumulates across daily runs and
// `bonus_earned` flips false → true exactly once.

use super::player::normalize_username;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralRecord {
    pub referred_player: String,
    pub hands_played: u64,
    pub referrer_player: String,
    pub bonus_earned: bool,
}

impl ReferralRecord {
    pub fn new(referred_player: &str, hands_played: u64, referrer_player: &str) -> Self {
        ReferralRecord {
            referred_player: normalize_username(referred_player),
            hands_played,
            referrer_player: normalize_username(referrer_player),
            bonus_earned: false,
        }
    }

    pub fn hands_to_bonus(&self, milestone: u64) -> u64 {
        milestone.saturating_sub(self.hands_played)
    }

    pub fn reached(&self, milestone: u64) -> bool {
        self.bonus_earned || self.hands_played >= milestone
    }
}

// ============================================================================
// PERSISTED ROW
// ============================================================================

/// Referrals table row as it appears on disk.
///
/// `BonusEarned` was not stored by older sheets; when it is missing the flag is
/// derived from the hands count (those bonuses were already announced).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralRow {
    #[serde(rename = "ReferredPlayer")]
    pub referred_player: String,

    #[serde(rename = "HandsPlayed")]
    pub hands_played: u64,

    #[serde(rename = "ReferrerPlayer")]
    pub referrer_player: String,

    #[serde(rename = "BonusEarned", default)]
    pub bonus_earned: Option<bool>,
}

impl ReferralRow {
    pub fn into_record(self, milestone: u64) -> ReferralRecord {
        let bonus_earned = self
            .bonus_earned
            .unwrap_or(self.hands_played >= milestone);

        ReferralRecord {
            referred_player: normalize_username(&self.referred_player),
            hands_played: self.hands_played,
            referrer_player: normalize_username(&self.referrer_player),
            bonus_earned,
        }
    }
}

impl From<&ReferralRecord> for ReferralRow {
    fn from(record: &ReferralRecord) -> Self {
        ReferralRow {
            referred_player: record.referred_player.clone(),
            hands_played: record.hands_played,
            referrer_player: record.referrer_player.clone(),
            bonus_earned: Some(record.bonus_earned),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_row_derives_bonus_flag() {
        let row = ReferralRow {
            referred_player: "Newbie".to_string(),
            hands_played: 300,
            referrer_player: "Veteran".to_string(),
            bonus_earned: None,
        };

        let record = row.into_record(250);
        assert!(record.bonus_earned);
        assert_eq!(record.referred_player, "newbie");
        assert_eq!(record.referrer_player, "veteran");
    }

    #[test]
    fn test_stored_flag_wins_over_derivation() {
        let row = ReferralRow {
            referred_player: "a".to_string(),
            hands_played: 10,
            referrer_player: "b".to_string(),
            bonus_earned: Some(true),
        };
        assert!(row.into_record(250).bonus_earned);
    }

    #[test]
    fn test_hands_to_bonus() {
        let record = ReferralRecord::new("a", 180, "b");
        assert_eq!(record.hands_to_bonus(250), 70);
        assert!(!record.reached(250));
        assert_eq!(ReferralRecord::new("a", 400, "b").hands_to_bonus(250), 0);
    }
}
