// Entity Models
// Player streak records and referral links - the two persisted tables

pub mod player;
pub mod referral;

pub use player::{normalize_username, parse_whole_number, PlayerStreakRecord, StreakBook, StreakStatus};
pub use referral::{ReferralRecord, ReferralRow};
