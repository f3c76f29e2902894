// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::Result;
use clap::{Parser, Subcommand};
use poker_streaks::{
    admin::parse_streak_value, referrals::parse_hands_arg, ProcessingReport, StreakTracker,
    TrackerConfig, TrackerError,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "poker-streaks")]
#[command(about = "Daily play streaks and referral bonuses for poker players", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory holding the streak tables, backups and audit log
    #[arg(long, global = true, env = "STREAKS_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Master streak table (default: <data-dir>/master_streak.csv)
    #[arg(long, global = true)]
    master: Option<PathBuf>,

    /// Hands needed for a day to count toward a streak
    #[arg(long, global = true)]
    threshold: Option<u64>,

    /// Name recorded in the audit log
    #[arg(long, global = true, env = "STREAKS_ACTOR", default_value = "admin")]
    actor: String,

    /// Print results as JSON
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge a daily activity CSV into the master table
    Process {
        /// CSV with Username and Hands columns
        daily_file: PathBuf,
    },

    /// Show a player's current streak
    Lookup { username: String },

    /// Set a player's streak directly (admin)
    Revive {
        username: String,

        /// New streak value (whole number >= 0)
        streak: String,

        /// Allow lowering an existing streak
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Register a referral (admin)
    AddReferral {
        referred_player: String,
        hands_played: String,
        referrer_player: String,
    },

    /// List everyone a player has referred
    Referrals { referrer_player: String },

    /// Longest current streaks
    Leaderboard {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// List table backups, newest first
    Backups,

    /// Restore a table from a backup file (path or file name)
    Restore { backup: PathBuf },

    /// Audit history for a player
    History { username: String },

    /// Interactive leaderboard
    Tui,
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = match err.downcast_ref::<TrackerError>() {
                Some(e) => {
                    eprintln!("❌ {} ({})", e, e.kind().as_str());
                    e.exit_code()
                }
                None => {
                    eprintln!("❌ {:#}", err);
                    1
                }
            };
            ExitCode::from(code)
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<TrackerConfig> {
    let mut config = TrackerConfig::from_env()?;

    if let Some(dir) = &cli.data_dir {
        let (threshold, milestone, retention) =
            (config.threshold, config.milestone, config.backup_retention);
        config = TrackerConfig::in_dir(dir);
        config.threshold = threshold;
        config.milestone = milestone;
        config.backup_retention = retention;
    }
    if let Some(master) = &cli.master {
        config = config.with_master_file(master);
    }
    if let Some(threshold) = cli.threshold {
        config = config.with_threshold(threshold);
    }

    config.validate()?;
    Ok(config)
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let mut tracker = StreakTracker::open(config)?.with_actor(&cli.actor);
    let json = cli.json;

    match cli.cmd {
        Commands::Process { daily_file } => {
            let report = tracker.process(&daily_file)?;
            if json {
                print_json(&report)?;
            } else {
                print_report(&report);
            }
        }

        Commands::Lookup { username } => {
            let record = tracker.lookup(&username)?;
            if json {
                print_json(&record)?;
            } else {
                println!("🃏 {}", record.username);
                println!("   Current streak: {} days", record.current_streak);
                println!("   Highest streak: {} days", record.highest_streak);
                println!("   Last status:    {}", record.last_status.as_str());
                if !record.last_update.is_empty() {
                    println!("   {}", record.last_update);
                }
            }
        }

        Commands::Revive { username, streak, force } => {
            let value = parse_streak_value(&streak)?;
            let record = match tracker.revive_checked(&username, value, force) {
                Err(e @ TrackerError::StreakWouldDrop { .. }) => {
                    eprintln!("⚠️  Re-run with --force to apply anyway.");
                    return Err(e.into());
                }
                other => other?,
            };
            if json {
                print_json(&record)?;
            } else {
                println!("🔥 {}: {}", record.username, record.last_update);
                println!("   Highest streak: {} days", record.highest_streak);
            }
        }

        Commands::AddReferral { referred_player, hands_played, referrer_player } => {
            let hands = parse_hands_arg(&hands_played)?;
            let record = tracker.add_referral(&referred_player, hands, &referrer_player)?;
            if json {
                print_json(&record)?;
            } else {
                println!(
                    "🤝 {} referred by {} ({} hands so far)",
                    record.referred_player, record.referrer_player, record.hands_played
                );
            }
        }

        Commands::Referrals { referrer_player } => {
            let summary = tracker.lookup_referrals(&referrer_player)?;
            if json {
                print_json(&summary)?;
            } else if summary.referrals.is_empty() {
                println!("🤝 {} has not referred anyone yet", summary.referrer_player);
            } else {
                println!(
                    "🤝 {} has referred {} player(s), {} bonus(es) earned",
                    summary.referrer_player,
                    summary.total_referrals(),
                    summary.bonuses_earned
                );
                for r in &summary.referrals {
                    println!("   • {:<20} {:>6} hands  {}", r.referred_player, r.hands_played, r.status);
                }
            }
        }

        Commands::Leaderboard { limit } => {
            let board = tracker.leaderboard(limit)?;
            if json {
                print_json(&board)?;
            } else {
                println!("🏆 Streak Leaderboard");
                println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
                for (rank, p) in board.iter().enumerate() {
                    println!(
                        "{:>3}. {:<20} {:>4} days  (best {})",
                        rank + 1,
                        p.username,
                        p.current_streak,
                        p.highest_streak
                    );
                }
            }
        }

        Commands::Backups => {
            let backups = tracker.backups()?;
            if json {
                print_json(&backups)?;
            } else if backups.is_empty() {
                println!("💾 No backups yet");
            } else {
                for b in &backups {
                    println!("💾 {:<16} {:>8} bytes  {}", b.table, b.size_bytes, b.path.display());
                }
            }
        }

        Commands::Restore { backup } => {
            let receipt = tracker.restore(&backup)?;
            if json {
                print_json(&receipt)?;
            } else {
                println!("♻️  Restored {} ({} rows)", receipt.path.display(), receipt.rows);
                if let Some(previous) = &receipt.backup {
                    println!("   Previous state saved to {}", previous.display());
                }
            }
        }

        Commands::History { username } => {
            let events = tracker.history(&username)?;
            if json {
                print_json(&events)?;
            } else if events.is_empty() {
                println!("📜 No history for {}", username.trim());
            } else {
                for e in &events {
                    println!(
                        "📜 {}  {:<22} by {}  {}",
                        e.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        e.event_type,
                        e.actor,
                        e.data
                    );
                }
            }
        }

        Commands::Tui => run_ui_mode(&tracker)?,
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_report(report: &ProcessingReport) {
    println!("📊 Daily run: {} ({})", report.source, report.processed_on);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ Players processed: {}", report.players_processed);
    println!("✓ Streaks increased: {}", report.players_updated);
    println!("✓ New players:       {}", report.new_players);
    println!("✓ Streaks lost:      {}", report.streak_losses);

    for award in &report.wheel_awards {
        println!("🎡 {}", award.message());
    }
    for loss in &report.significant_losses {
        println!("💔 {}", loss);
    }
    for event in &report.milestone_events {
        println!("{}", event.message());
    }
    for backup in &report.backups {
        println!("💾 Backup: {}", backup.display());
    }
}

#[cfg(feature = "tui")]
fn run_ui_mode(tracker: &StreakTracker) -> Result<()> {
    println!("🖥️  Loading streak leaderboard...\n");

    let players = tracker.leaderboard(usize::MAX)?;
    let referrals = tracker.referrals()?;
    let events = tracker.recent_events(200)?;

    let mut app = ui::App::new(players, referrals, events, tracker.config().milestone);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_tracker: &StreakTracker) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the HTTP API: cargo run --bin streak-server --features server");
    Ok(())
}
