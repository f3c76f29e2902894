// Poker Streaks - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod error;
pub mod entities;
pub mod snapshot;
pub mod store;
pub mod reconciler;
pub mod referrals;
pub mod admin;
pub mod audit;
pub mod config;
pub mod service;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use error::{ErrorKind, TrackerError, TrackerResult};
pub use entities::{
    normalize_username, PlayerStreakRecord, ReferralRecord, ReferralRow, StreakBook, StreakStatus,
};
pub use snapshot::{DailyActivityRecord, DailySnapshot, SnapshotLoader};
pub use store::{BackupInfo, CsvTable, ReferralStore, SaveReceipt, StoreLock, StreakStateStore};
pub use reconciler::{
    PlayerTransition, ProcessingReport, Reconciliation, StreakReconciler, WheelAward,
    DEFAULT_HANDS_THRESHOLD,
};
pub use referrals::{
    MilestoneEvent, ReferralStatus, ReferralTracker, ReferrerSummary, DEFAULT_REFERRAL_MILESTONE,
};
pub use admin::{AdminOverride, RevivePlan};
pub use audit::{AuditEvent, AuditLog};
pub use config::TrackerConfig;
pub use service::StreakTracker;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
