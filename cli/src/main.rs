//! Concord CLI - run veto negotiation sessions from the command line

mod report;
mod scenario;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use concord::controller::NegotiatorRegistry;
use concord::mechanism::MechanismConfig;
use concord::{run_sessions, Controller, ControllerConfig, MechanismEvent, Session};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::report::Summary;
use crate::scenario::Scenario;

#[derive(Parser)]
#[command(name = "concord")]
#[command(about = "Run single-text veto negotiations between random utility agents")]
#[command(version)]
struct Cli {
    /// Session configuration file (JSON)
    #[arg(short, long, env = "CONCORD_CONFIG")]
    config: Option<PathBuf>,

    /// Seed for scenario generation and sessions
    #[arg(long, env = "CONCORD_SEED")]
    seed: Option<u64>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ScenarioArgs {
    /// Number of negotiators per session
    #[arg(short, long, default_value_t = 3)]
    negotiators: usize,

    /// Number of issues
    #[arg(short, long, default_value_t = 2)]
    issues: usize,

    /// Values per issue
    #[arg(long, default_value_t = 4)]
    values: i64,

    /// Upper bound for random reserved values
    #[arg(long, default_value_t = 0.3)]
    max_reserved: f64,

    /// Tolerance below which two utilities count as equal
    #[arg(long, default_value_t = concord::st::DEFAULT_EPSILON)]
    epsilon: f64,

    /// Maximum number of rounds (overrides the config file)
    #[arg(short, long)]
    steps: Option<usize>,

    /// Session time limit in seconds (overrides the config file)
    #[arg(long)]
    time_limit: Option<f64>,
}

impl ScenarioArgs {
    fn scenario(&self) -> Scenario {
        Scenario {
            n_negotiators: self.negotiators,
            n_issues: self.issues,
            n_values: self.values,
            max_reserved: self.max_reserved,
            epsilon: self.epsilon,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run one session and follow its rounds
    Veto {
        #[command(flatten)]
        scenario: ScenarioArgs,
    },

    /// Run many sessions at once, negotiators owned by one controller
    Concurrent {
        #[command(flatten)]
        scenario: ScenarioArgs,

        /// Number of sessions
        #[arg(long, default_value_t = 8)]
        sessions: usize,

        /// Maximum number of sessions running at the same time
        #[arg(long, env = "CONCORD_MAX_CONCURRENCY")]
        max_concurrency: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "concord=info,concord_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let base = load_config(cli.config.as_deref())?;
    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    match cli.command {
        Commands::Veto { scenario } => {
            let config = session_config(&base, &scenario, cli.seed);
            run_veto(&scenario.scenario(), &config, &mut rng, cli.json).await
        }
        Commands::Concurrent {
            scenario,
            sessions,
            max_concurrency,
        } => {
            let config = session_config(&base, &scenario, cli.seed);
            run_concurrent(
                &scenario.scenario(),
                &config,
                sessions,
                max_concurrency,
                &mut rng,
                cli.json,
            )
            .await
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<MechanismConfig> {
    let Some(path) = path else {
        return Ok(MechanismConfig::new().with_n_steps(100));
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: MechanismConfig = serde_json::from_str(&raw)
        .with_context(|| format!("parsing config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn session_config(
    base: &MechanismConfig,
    args: &ScenarioArgs,
    seed: Option<u64>,
) -> MechanismConfig {
    let mut config = base.clone();
    if let Some(steps) = args.steps {
        config.n_steps = Some(steps);
    }
    if let Some(limit) = args.time_limit {
        config.time_limit = Some(Duration::from_secs_f64(limit));
    }
    if config.seed.is_none() {
        config.seed = seed;
    }
    config
}

async fn run_veto(
    scenario: &Scenario,
    config: &MechanismConfig,
    rng: &mut StdRng,
    json: bool,
) -> Result<()> {
    let mut session = scenario.local_session(config, rng)?;
    let mut events = session.subscribe();

    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                MechanismEvent::RoundCompleted { step, status, .. } => {
                    tracing::debug!(step, status = status.as_str(), "round");
                }
                MechanismEvent::ParticipantFailed {
                    negotiator_id,
                    error,
                    ..
                } => {
                    tracing::warn!(negotiator = %negotiator_id, %error, "negotiator failed");
                }
                MechanismEvent::NegotiationEnded { .. } => break,
                _ => {}
            }
        }
    });

    // the event stream closes once the session is dropped
    let (state, history) = tokio::task::spawn_blocking(move || {
        let state = session.run();
        (state, session.history().to_vec())
    })
    .await
    .context("session task failed")?;
    printer.await.ok();

    if json {
        return report::print_history(&history);
    }
    report::print_state(&state);
    Ok(())
}

async fn run_concurrent(
    scenario: &Scenario,
    config: &MechanismConfig,
    n_sessions: usize,
    max_concurrency: Option<usize>,
    rng: &mut StdRng,
    json: bool,
) -> Result<()> {
    let controller = Controller::new(
        ControllerConfig::new()
            .with_name("cli")
            .with_default_type("binary-comparator"),
        NegotiatorRegistry::with_builtins(),
    );

    let mut sessions: Vec<Box<dyn Session>> = Vec::with_capacity(n_sessions);
    for index in 0..n_sessions {
        let mut config = config.clone();
        config.seed = config.seed.map(|seed| seed.wrapping_add(index as u64));
        sessions.push(Box::new(
            scenario.controlled_session(&controller, index, &config, rng)?,
        ));
    }
    tracing::info!(
        sessions = n_sessions,
        negotiators = controller.len(),
        "starting sessions"
    );

    let results = run_sessions(sessions, max_concurrency).await;
    let mut states = Vec::new();
    let mut failed = 0;
    for result in results {
        match result {
            Ok(state) => states.push(state),
            Err(e) => {
                tracing::error!(error = %e, "session failed");
                failed += 1;
            }
        }
    }

    if !json {
        for state in &states {
            report::print_state(state);
            println!();
        }
    }
    report::print_summary(&Summary::from_states(&states, failed), json)
}
