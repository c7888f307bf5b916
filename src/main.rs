use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use colored::*;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use tabled::{settings::Style, Table, Tabled};

use goalrs::calculators::GoalFormula;
use goalrs::calories::CaloriesGoalCalculator;
use goalrs::{
    init_logging, ActivityLevel, AppConfig, CalculationInput, DailyGoals, Gender,
    GoalCalculationOrchestrator, GoalCalculators, GoalOverrides, GoalsError, OverrideKind,
    ProfileSource, SqliteStore, UserProfile,
};

/// GoalRS - Daily Wellness Goals CLI
///
/// Derives daily steps, calories and heart points targets from a user's
/// profile using public health guidelines.
#[derive(Parser)]
#[command(name = "goalrs")]
#[command(author = "GoalRS Contributors")]
#[command(version)]
#[command(about = "Daily wellness goals CLI", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the goal formulas without storing anything
    Estimate {
        #[arg(long)]
        age: u32,

        /// male, female, other, prefer_not_to_say
        #[arg(long)]
        gender: Gender,

        /// Height in centimeters
        #[arg(long)]
        height: Decimal,

        /// Weight in kilograms
        #[arg(long)]
        weight: Decimal,

        /// sedentary, light, moderate, active, very_active
        #[arg(long, default_value = "moderate")]
        activity: ActivityLevel,
    },

    /// Manage stored user profiles
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Calculate and store goals for one or more users
    Goals {
        /// User IDs
        #[arg(required = true)]
        users: Vec<String>,

        /// Ignore cached goals
        #[arg(short, long)]
        force: bool,
    },

    /// Report whether a user's stored goals are valid and current
    Check { user: String },

    /// Show every goal calculation stored for a user
    History { user: String },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Create or update a profile; omitted fields keep their stored value
    Set {
        user: String,

        /// Date of birth (YYYY-MM-DD)
        #[arg(long)]
        birthdate: Option<NaiveDate>,

        #[arg(long)]
        gender: Option<Gender>,

        /// Height in centimeters
        #[arg(long)]
        height: Option<Decimal>,

        /// Weight in kilograms
        #[arg(long)]
        weight: Option<Decimal>,

        #[arg(long)]
        activity: Option<ActivityLevel>,

        #[arg(long)]
        name: Option<String>,
    },

    /// Replace the formulas with fixed goals
    Override {
        user: String,

        #[arg(long)]
        steps: u32,

        #[arg(long)]
        calories: u32,

        #[arg(long)]
        heart_points: u32,

        /// Record as an adjustment of calculated goals rather than manual entry
        #[arg(long)]
        adjusted: bool,
    },

    /// Remove goal overrides
    ClearOverride { user: String },

    /// Print a stored profile
    Show { user: String },
}

#[derive(Tabled)]
struct EstimateRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct GoalsRow {
    #[tabled(rename = "User")]
    user: String,
    #[tabled(rename = "Steps")]
    steps: u32,
    #[tabled(rename = "Calories")]
    calories: u32,
    #[tabled(rename = "Heart Points")]
    heart_points: u32,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Calculated")]
    calculated_at: String,
    #[tabled(rename = "Status")]
    status: String,
}

impl GoalsRow {
    fn new(goals: &DailyGoals, status: impl Into<String>) -> Self {
        Self {
            user: goals.user_id.clone(),
            steps: goals.steps_goal,
            calories: goals.calories_goal,
            heart_points: goals.heart_points_goal,
            source: goals.calculation_source.to_string(),
            calculated_at: goals.calculated_at.format("%Y-%m-%d %H:%M").to_string(),
            status: status.into(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path)?,
        None => AppConfig::load_or_default(),
    };
    config.logging.level = config.logging.level.raised_by(cli.verbose);
    init_logging(&config.logging)?;

    match cli.command {
        Commands::Estimate {
            age,
            gender,
            height,
            weight,
            activity,
        } => estimate(age, gender, height, weight, activity),
        Commands::Profile { action } => manage_profile(&config, action),
        Commands::Goals { users, force } => calculate_goals(&config, &users, force),
        Commands::Check { user } => check_goals(&config, &user),
        Commands::History { user } => show_history(&config, &user),
    }
}

fn open_store(config: &AppConfig) -> Result<Arc<SqliteStore>> {
    let path = &config.storage.database_path;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
    }
    let store = SqliteStore::open(path)
        .with_context(|| format!("Failed to open goal database: {}", path.display()))?;
    Ok(Arc::new(store))
}

fn orchestrator(store: Arc<SqliteStore>) -> GoalCalculationOrchestrator {
    GoalCalculationOrchestrator::new(store.clone(), store)
}

fn estimate(
    age: u32,
    gender: Gender,
    height: Decimal,
    weight: Decimal,
    activity: ActivityLevel,
) -> Result<()> {
    let input = CalculationInput::new(age, gender, height, weight, activity)?;

    let calculators = GoalCalculators::standard();
    let fmt_opt = |value: Option<Decimal>| {
        value.map_or_else(|| "n/a".to_string(), |v| v.round_dp(1).to_string())
    };

    let rows = vec![
        EstimateRow { metric: "Age band".into(), value: format!("{:?}", input.age_band()) },
        EstimateRow { metric: "Activity factor".into(), value: activity.factor().to_string() },
        EstimateRow {
            metric: "BMR (kcal)".into(),
            value: fmt_opt(CaloriesGoalCalculator::bmr(&input)),
        },
        EstimateRow {
            metric: "TDEE (kcal)".into(),
            value: fmt_opt(CaloriesGoalCalculator::total_energy_expenditure(&input)),
        },
        EstimateRow {
            metric: "Steps goal".into(),
            value: calculators.steps.calculate(&input).to_string(),
        },
        EstimateRow {
            metric: "Calories goal".into(),
            value: calculators.calories.calculate(&input).to_string(),
        },
        EstimateRow {
            metric: "Heart points goal".into(),
            value: calculators.heart_points.calculate(&input).to_string(),
        },
    ];

    println!("{}", "Estimated daily goals".cyan().bold());
    println!("{}", Table::new(rows).with(Style::rounded()));
    Ok(())
}

fn manage_profile(config: &AppConfig, action: ProfileAction) -> Result<()> {
    let store = open_store(config)?;

    match action {
        ProfileAction::Set {
            user,
            birthdate,
            gender,
            height,
            weight,
            activity,
            name,
        } => {
            let mut profile = stored_profile(&store, &user)?.unwrap_or_else(|| UserProfile::new(&user));
            profile.birthdate = birthdate.or(profile.birthdate);
            profile.gender = gender.or(profile.gender);
            profile.height_cm = height.or(profile.height_cm);
            profile.weight_kg = weight.or(profile.weight_kg);
            profile.activity_level = activity.or(profile.activity_level);
            profile.display_name = name.or(profile.display_name);
            profile.updated_at = Utc::now();

            store.upsert_profile(&profile)?;
            println!("{} Profile saved for {}", "✓".green(), user.bold());
        }

        ProfileAction::Override {
            user,
            steps,
            calories,
            heart_points,
            adjusted,
        } => {
            let mut profile = stored_profile(&store, &user)?
                .with_context(|| format!("No profile stored for {}", user))?;
            profile.goal_overrides = Some(GoalOverrides {
                kind: if adjusted { OverrideKind::UserAdjusted } else { OverrideKind::Manual },
                steps,
                calories,
                heart_points,
            });
            profile.updated_at = Utc::now();

            store.upsert_profile(&profile)?;
            println!("{} Goal overrides saved for {}", "✓".green(), user.bold());
        }

        ProfileAction::ClearOverride { user } => {
            let mut profile = stored_profile(&store, &user)?
                .with_context(|| format!("No profile stored for {}", user))?;
            profile.goal_overrides = None;
            profile.updated_at = Utc::now();

            store.upsert_profile(&profile)?;
            println!("{} Goal overrides cleared for {}", "✓".green(), user.bold());
        }

        ProfileAction::Show { user } => match stored_profile(&store, &user)? {
            Some(profile) => println!("{}", serde_json::to_string_pretty(&profile)?),
            None => println!("{}", format!("No profile stored for {}", user).yellow()),
        },
    }

    Ok(())
}

fn stored_profile(store: &SqliteStore, user_id: &str) -> Result<Option<UserProfile>> {
    Ok(store.get_profile(user_id)?)
}

fn calculate_goals(config: &AppConfig, users: &[String], force: bool) -> Result<()> {
    let orchestrator = orchestrator(open_store(config)?);

    let results = match config.engine.batch_threads {
        Some(threads) if users.len() > 1 => rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .context("Failed to build batch thread pool")?
            .install(|| orchestrator.calculate_batch(users, force)),
        _ => orchestrator.calculate_batch(users, force),
    };

    let mut rows = Vec::new();
    let mut failures = 0;
    for (user_id, result) in results {
        match result {
            Ok(outcome) => {
                let status = if outcome.was_recalculated { "recalculated" } else { "cached" };
                rows.push(GoalsRow::new(&outcome.goals, status));
            }
            Err(err) => {
                failures += 1;
                eprintln!("{} {}: {}", "✗".red(), user_id.bold(), err.user_message());
                if let GoalsError::StorageFailed { goals, .. } = &err {
                    rows.push(GoalsRow::new(goals, "not saved"));
                }
            }
        }
    }

    if !rows.is_empty() {
        println!("{}", Table::new(rows).with(Style::rounded()));
    }
    if failures > 0 {
        anyhow::bail!("{} of {} goal calculations failed", failures, users.len());
    }
    Ok(())
}

fn check_goals(config: &AppConfig, user: &str) -> Result<()> {
    let orchestrator = orchestrator(open_store(config)?);

    if orchestrator.has_valid_goals(user) {
        println!("{} {} has valid, current goals", "✓".green(), user.bold());
    } else {
        println!(
            "{} {} needs a recalculation (run `goalrs goals {}`)",
            "!".yellow(),
            user.bold(),
            user
        );
    }
    Ok(())
}

fn show_history(config: &AppConfig, user: &str) -> Result<()> {
    let store = open_store(config)?;
    let history = store.goal_history(user)?;

    if history.is_empty() {
        println!("No goals stored for {}", user);
        return Ok(());
    }

    let rows: Vec<GoalsRow> = history
        .iter()
        .enumerate()
        .map(|(i, goals)| GoalsRow::new(goals, if i == 0 { "current" } else { "superseded" }))
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()));
    Ok(())
}
