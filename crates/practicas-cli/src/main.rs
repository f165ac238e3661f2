//! Practicas CLI
//!
//! The `practicas` command exposes the pure parts of the core offline and
//! runs an in-memory end-to-end lifecycle for inspection.
//!
//! ## Commands
//!
//! - `grade`: Compute nota base and nota ponderada for two grades
//! - `weights`: Validate a weight pair
//! - `transitions`: Print the lifecycle transition table
//! - `demo`: Drive one practice from registration to closing in memory

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn, Level};

use practicas_core::ledger::AuditFilter;
use practicas_core::lifecycle::allowed_targets;
use practicas_core::metrics::METRICS;
use practicas_core::notify::{PlainTextRenderer, RenderedMessage, TransportError};
use practicas_core::{
    compute_acta_grades, ActaFilter, ActorContext, CancelHandle, Clock, CoreConfig, NewPractice,
    PracticasCore, Recipient, Role, Stores, SystemClock, Transport, WeightConfig,
};
use practicas_state::{PracticeId, PracticeKind, PracticeState};

#[derive(Parser)]
#[command(name = "practicas")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Internship lifecycle, grading and audit tooling", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (missing file means defaults)
    #[arg(long, global = true, env = "PRACTICAS_CONFIG", default_value = "practicas.toml")]
    config: PathBuf,

    /// Output format for command results
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the acta grades for an informe and an empleador grade
    Grade {
        /// Supervisor (informe) grade, 1.0 to 7.0
        #[arg(long)]
        informe: f64,

        /// Employer grade, 1.0 to 7.0
        #[arg(long)]
        empleador: f64,

        /// Informe weight (defaults to the configured weight)
        #[arg(long, requires = "empleador_weight")]
        informe_weight: Option<u32>,

        /// Empleador weight (defaults to the configured weight)
        #[arg(long, requires = "informe_weight")]
        empleador_weight: Option<u32>,
    },

    /// Weight configuration helpers
    Weights {
        #[command(subcommand)]
        action: WeightsAction,
    },

    /// Print the lifecycle transition table
    Transitions {
        /// Only show edges leaving this state
        #[arg(long)]
        from: Option<PracticeState>,
    },

    /// Run one practice through its whole lifecycle in memory
    Demo {
        /// Make sends to this recipient id fail (repeatable)
        #[arg(long = "fail-recipient")]
        fail_recipients: Vec<String>,

        /// Supervisor grade
        #[arg(long, default_value_t = 6.0)]
        informe: f64,

        /// Employer grade
        #[arg(long, default_value_t = 5.0)]
        empleador: f64,
    },
}

#[derive(Subcommand)]
enum WeightsAction {
    /// Check that a pair is acceptable
    Check { informe: u32, empleador: u32 },

    /// Print the configured default pair
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = CoreConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    if cli.verbose {
        config.log_level = Level::DEBUG.to_string();
    }
    if cli.json {
        config.log_json = true;
    }
    practicas_core::telemetry::init_from_config(&config);

    let result = match cli.command {
        Commands::Grade {
            informe,
            empleador,
            informe_weight,
            empleador_weight,
        } => cmd_grade(
            &config,
            cli.output,
            informe,
            empleador,
            informe_weight.zip(empleador_weight),
        ),
        Commands::Weights { action } => match action {
            WeightsAction::Check { informe, empleador } => {
                cmd_weights_check(cli.output, informe, empleador)
            }
            WeightsAction::Show => cmd_weights_show(&config, cli.output),
        },
        Commands::Transitions { from } => cmd_transitions(cli.output, from),
        Commands::Demo {
            fail_recipients,
            informe,
            empleador,
        } => cmd_demo(config, cli.output, fail_recipients, informe, empleador).await,
    };

    METRICS.flush();
    result
}

fn print<T: Serialize>(format: OutputFormat, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => println!("{}", text()),
    }
    Ok(())
}

fn cmd_grade(
    config: &CoreConfig,
    format: OutputFormat,
    informe: f64,
    empleador: f64,
    weights: Option<(u32, u32)>,
) -> Result<()> {
    let weights = match weights {
        Some((i, e)) => WeightConfig::new(i, e)?,
        None => config.default_weights()?,
    };
    let grades = compute_acta_grades(informe, empleador, &weights)
        .context("Failed to compute acta grades")?;
    print(format, &grades, || {
        format!(
            "nota base:      {:.1}\nnota ponderada: {:.1} ({}% informe / {}% empleador)",
            grades.nota_base,
            grades.nota_ponderada,
            weights.informe_weight(),
            weights.empleador_weight(),
        )
    })
}

fn cmd_weights_check(format: OutputFormat, informe: u32, empleador: u32) -> Result<()> {
    let weights = WeightConfig::new(informe, empleador)?;
    print(format, &weights, || format!("ok: {informe}/{empleador}"))
}

fn cmd_weights_show(config: &CoreConfig, format: OutputFormat) -> Result<()> {
    let weights = config.default_weights()?;
    print(format, &weights, || {
        format!(
            "informe {}% / empleador {}%",
            weights.informe_weight(),
            weights.empleador_weight()
        )
    })
}

#[derive(Serialize)]
struct Edge {
    from: PracticeState,
    to: Vec<PracticeState>,
}

fn cmd_transitions(format: OutputFormat, from: Option<PracticeState>) -> Result<()> {
    let edges: Vec<Edge> = PracticeState::ALL
        .into_iter()
        .filter(|s| from.map_or(true, |f| f == *s))
        .map(|s| Edge {
            from: s,
            to: allowed_targets(s).to_vec(),
        })
        .collect();
    print(format, &edges, || {
        edges
            .iter()
            .map(|e| {
                let targets: Vec<&str> = e.to.iter().map(|t| t.as_str()).collect();
                if targets.is_empty() {
                    format!("{:<30} (terminal)", e.from.as_str())
                } else {
                    format!("{:<30} -> {}", e.from.as_str(), targets.join(", "))
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}

/// Prints messages instead of sending them.
struct ConsoleTransport {
    failing: HashSet<String>,
}

#[async_trait]
impl Transport for ConsoleTransport {
    async fn send(
        &self,
        recipient: &Recipient,
        message: &RenderedMessage,
    ) -> Result<(), TransportError> {
        if self.failing.contains(&recipient.id) {
            warn!(recipient = %recipient.id, "simulated delivery failure");
            return Err(TransportError::Unreachable(
                "simulated delivery failure".to_string(),
            ));
        }
        info!(recipient = %recipient.id, subject = %message.subject, "message delivered");
        Ok(())
    }
}

#[derive(Serialize)]
struct DemoReport {
    practice: practicas_state::PracticeRecord,
    ledger_entries: usize,
    notifications: practicas_core::NotificationStats,
    pending_retries: usize,
    closed_actas: usize,
}

async fn cmd_demo(
    config: CoreConfig,
    format: OutputFormat,
    fail_recipients: Vec<String>,
    informe: f64,
    empleador: f64,
) -> Result<()> {
    let clock = Arc::new(SystemClock);
    let transport = Arc::new(ConsoleTransport {
        failing: fail_recipients.into_iter().collect(),
    });
    let (core, rx) = PracticasCore::build(
        config,
        Stores::in_memory(),
        clock,
        Arc::new(PlainTextRenderer),
        transport,
    )?;
    let (cancel, signal) = CancelHandle::new();
    let worker = core.spawn_worker(rx, signal);

    let started = core.clock.now();
    let coordinator = ActorContext::coordinator("coord-demo");
    let supervisor = ActorContext::new("doc-demo", Role::Docente);
    let employer = ActorContext::new("emp-demo", Role::Empleador);
    let id = PracticeId::from("demo-1");

    let m = &core.machine;
    m.register_practice(NewPractice {
        id: Some(id.clone()),
        kind: PracticeKind::Profesional,
        student_id: "stu-demo".to_string(),
        student_name: "Estudiante Demo".to_string(),
        supervisor_id: None,
        host_site_id: Some("site-demo".to_string()),
        employer_id: Some(employer.actor_id.clone()),
        program_id: "DEMO".to_string(),
        academic_year: 2024,
        semester: 1,
        start_date: NaiveDate::from_ymd_opt(2024, 3, 4).context("invalid start date")?,
        end_date: NaiveDate::from_ymd_opt(2024, 6, 28).context("invalid end date")?,
    })
    .await?;
    m.assign_supervisor(&id, &supervisor.actor_id, &coordinator)
        .await?;
    m.request_transition(&id, PracticeState::PendienteAceptacionDocente, &coordinator)
        .await?;
    m.request_transition(&id, PracticeState::EnCurso, &supervisor)
        .await?;
    m.request_transition(&id, PracticeState::FinalizadaPendienteEval, &supervisor)
        .await?;
    m.submit_evaluation(&id, informe, None, &supervisor)
        .await
        .context("Failed to submit supervisor evaluation")?;
    m.submit_evaluation(&id, empleador, None, &employer)
        .await
        .context("Failed to submit employer evaluation")?;
    m.request_transition(&id, PracticeState::EvaluacionCompleta, &supervisor)
        .await?;
    let closed = m
        .request_transition(&id, PracticeState::Cerrada, &coordinator)
        .await?;
    if let Some(err) = &closed.audit_error {
        warn!(error = %err, "closing transition missing from ledger");
    }

    // four milestones reach seven recipients; wait for all attempts, then stop
    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let attempts = core.ledger.collect(AuditFilter::notifications()).await?;
            if attempts.len() >= 7 || worker.is_finished() {
                return anyhow::Ok(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    match drained {
        Ok(result) => result?,
        Err(_) => warn!("notification worker did not drain in time"),
    }
    cancel.cancel();
    worker.await.context("notification worker panicked")?;

    let report = DemoReport {
        practice: closed.practice,
        ledger_entries: core.ledger.collect(AuditFilter::new()).await?.len(),
        notifications: core
            .dispatcher
            .statistics(started, core.clock.now() + chrono::Duration::seconds(1))
            .await?,
        pending_retries: core.dispatcher.pending_retries().await?.len(),
        closed_actas: core.actas.search(&ActaFilter::default()).await?.len(),
    };
    print(format, &report, || {
        let acta = report.practice.final_acta.as_ref();
        format!(
            "practice {} is {}\nnota base {:.1}, nota ponderada {:.1}\nledger entries: {}\nnotifications: {} sent, {} failed ({:.1}% success)\npending retries: {}",
            report.practice.id,
            report.practice.state,
            acta.map_or(0.0, |a| a.nota_base),
            acta.map_or(0.0, |a| a.nota_ponderada),
            report.ledger_entries,
            report.notifications.sent,
            report.notifications.failed,
            report.notifications.success_rate_pct,
            report.pending_retries,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn grade_weights_must_come_in_pairs() {
        let parsed = Cli::try_parse_from([
            "practicas",
            "grade",
            "--informe",
            "6.0",
            "--empleador",
            "5.0",
            "--informe-weight",
            "70",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn transitions_accepts_wire_state_names() {
        let parsed =
            Cli::try_parse_from(["practicas", "transitions", "--from", "EN_CURSO"]).unwrap();
        match parsed.command {
            Commands::Transitions { from } => assert_eq!(from, Some(PracticeState::EnCurso)),
            _ => panic!("expected transitions"),
        }
    }

    #[test]
    fn weights_check_rejects_bad_sum() {
        assert!(cmd_weights_check(OutputFormat::Text, 70, 40).is_err());
        assert!(cmd_weights_check(OutputFormat::Json, 70, 30).is_ok());
    }

    #[tokio::test]
    async fn demo_runs_end_to_end() {
        cmd_demo(
            CoreConfig::default(),
            OutputFormat::Json,
            vec!["emp-demo".to_string()],
            6.0,
            5.0,
        )
        .await
        .unwrap();
    }
}
