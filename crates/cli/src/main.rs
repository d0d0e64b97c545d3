use clap::{Parser, Subcommand};
use medidx_core::config::{
    bool_from_env_value, fraction_from_env_value, knowledge_file_from_env_value,
    special_case_file_from_env_value, timeout_from_env_value, usize_from_env_value,
};
use medidx_core::constants::{
    DEFAULT_BROAD_PRESENTATION_THRESHOLD, DEFAULT_LOW_CONFIDENCE_THRESHOLD,
    DEFAULT_SIMILARITY_THRESHOLD,
};
use medidx_core::validation::split_symptom_list;
use medidx_core::{
    DiagnosisConfig, DiagnosisError, DiagnosisReport, DiagnosisRequest, DiagnosisResult,
    DiagnosisService, JsonFileSpecialCaseStore, KnowledgeBase, MatchMode, SymptomBreakdown,
    TracingAuditEmitter,
};
use medidx_types::PatientName;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "medidx")]
#[command(about = "MediDx diagnosis assistant CLI")]
struct Cli {
    /// Knowledge file (defaults to MEDIDX_KNOWLEDGE_FILE, then knowledge.yaml)
    #[arg(long, global = true)]
    knowledge: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Diagnose a patient from a symptom list
    Diagnose {
        /// Patient name
        #[arg(long)]
        patient: String,
        /// Symptoms (comma-separated)
        #[arg(long)]
        symptoms: String,
        /// Match mode: all, partial or wide
        #[arg(long, default_value = "all")]
        mode: String,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show disease probabilities for one symptom
    Probabilities {
        /// Symptom name
        symptom: String,
    },
    /// List known symptoms
    Symptoms,
}

/// Resolves the engine configuration from `MEDIDX_*` environment variables.
fn load_config() -> anyhow::Result<DiagnosisConfig> {
    let env = |name: &str| std::env::var(name).ok();
    let cfg = DiagnosisConfig::new(
        usize_from_env_value(
            "MEDIDX_BROAD_THRESHOLD",
            env("MEDIDX_BROAD_THRESHOLD"),
            DEFAULT_BROAD_PRESENTATION_THRESHOLD,
        )?,
        fraction_from_env_value(
            "MEDIDX_LOW_CONFIDENCE",
            env("MEDIDX_LOW_CONFIDENCE"),
            DEFAULT_LOW_CONFIDENCE_THRESHOLD,
        )?,
        fraction_from_env_value(
            "MEDIDX_SIMILARITY",
            env("MEDIDX_SIMILARITY"),
            DEFAULT_SIMILARITY_THRESHOLD,
        )?,
        bool_from_env_value("MEDIDX_ALL_FALLBACK", env("MEDIDX_ALL_FALLBACK"))?,
        timeout_from_env_value("MEDIDX_GRAPH_TIMEOUT_MS", env("MEDIDX_GRAPH_TIMEOUT_MS"))?,
    )?;
    Ok(cfg)
}

fn build_service(knowledge: Option<PathBuf>) -> anyhow::Result<(DiagnosisService, KnowledgeBase)> {
    let path = knowledge
        .unwrap_or_else(|| knowledge_file_from_env_value(std::env::var("MEDIDX_KNOWLEDGE_FILE").ok()));
    let kb = KnowledgeBase::load(&path)
        .map_err(|e| anyhow::anyhow!("failed to load {}: {}", path.display(), e))?;

    let service = DiagnosisService::new(
        Arc::new(load_config()?),
        Arc::new(kb.table.clone()),
        Arc::new(kb.graph.clone()),
        Arc::new(JsonFileSpecialCaseStore::new(special_case_file_from_env_value(
            std::env::var("MEDIDX_SPECIAL_CASE_FILE").ok(),
        ))),
        Arc::new(TracingAuditEmitter),
    );
    Ok((service, kb))
}

fn percent(p: f64) -> String {
    format!("{:.1}%", p * 100.0)
}

fn print_breakdown(breakdown: &[SymptomBreakdown]) {
    for item in breakdown {
        println!("{}:", item.symptom);
        if !item.has_data() {
            println!("  (no data)");
        }
        for entry in &item.entries {
            println!("  {:<24} {:>7}", entry.disease.as_str(), percent(entry.probability));
        }
    }
}

fn print_report(report: &DiagnosisReport) {
    if report.symptoms.is_empty() {
        println!("No symptoms given.");
        return;
    }

    print_breakdown(&report.breakdown);
    println!();

    let mode = report.fallback_mode.unwrap_or(report.mode);
    if let Some(fallback) = report.fallback_mode {
        println!(
            "No disease matches {} symptoms; showing {} matches.",
            report.mode, fallback
        );
    }
    if report.qualifying.is_empty() {
        println!("No disease qualifies under {} matching.", mode);
    } else {
        println!("Qualifying diseases ({}):", mode);
        for (i, c) in report.qualifying.iter().enumerate() {
            println!(
                "  {}. {:<24} {}/{} symptoms  {:>7}  {}",
                i + 1,
                c.disease.as_str(),
                c.connection_count,
                report.symptoms.len(),
                percent(c.aggregated_score),
                c.confidence
            );
        }
    }

    if let Some(best) = &report.best_guess {
        println!(
            "Best guess for {}: {} ({}, {} confidence)",
            report.patient,
            best.disease,
            percent(best.aggregated_score),
            best.confidence
        );
    }
    if !report.unknown_symptoms.is_empty() {
        let names: Vec<&str> = report.unknown_symptoms.iter().map(|s| s.as_str()).collect();
        println!("Unknown symptoms: {}", names.join(", "));
    }

    if let Some(case) = &report.special_case {
        println!();
        println!("Special case: {}", case.reason);
        if let Some(record) = &report.recorded_special_case {
            println!("  recorded as {} (seen {} time(s))", record.key, record.hits);
        }
    }
    if let Some(prior) = &report.prior_special_case {
        println!(
            "Previously seen bundle {} ({} hit(s), last {})",
            prior.key,
            prior.hits,
            prior.last_seen.to_rfc3339()
        );
    }
    for similar in &report.similar_cases {
        println!(
            "Similar case {} ({} shared symptom(s))",
            similar.record.key,
            similar.matched_symptoms.len()
        );
    }

    for warning in &report.warnings {
        eprintln!("Warning: {}", warning);
    }
}

/// Prints a diagnosis outcome; a failed diagnosis becomes the command's error.
fn render_diagnosis(result: DiagnosisResult<DiagnosisReport>, json: bool) -> anyhow::Result<()> {
    match result {
        Ok(report) if json => println!("{}", serde_json::to_string_pretty(&report)?),
        Ok(report) => print_report(&report),
        Err(e @ DiagnosisError::GraphUnavailable(_)) => {
            tracing::error!("{}", e);
            anyhow::bail!("diagnosis temporarily unavailable, please try again");
        }
        Err(e) => return Err(anyhow::Error::new(e).context("failed to diagnose patient")),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("medidx=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Diagnose {
            patient,
            symptoms,
            mode,
            json,
        }) => {
            let patient = PatientName::new(&patient)
                .map_err(|e| anyhow::anyhow!("invalid patient name: {}", e))?;
            let mode: MatchMode = mode.parse()?;
            let (service, _) = build_service(cli.knowledge)?;

            let request = DiagnosisRequest::new(patient, split_symptom_list(&symptoms), mode);
            render_diagnosis(service.diagnose(request), json)?;
        }
        Some(Commands::Probabilities { symptom }) => {
            let (service, _) = build_service(cli.knowledge)?;
            let breakdown = service.probabilities(&symptom);
            if breakdown.is_empty() {
                println!("No symptom given.");
            } else {
                print_breakdown(&breakdown);
            }
        }
        Some(Commands::Symptoms) => {
            let (_, kb) = build_service(cli.knowledge)?;
            let symptoms: Vec<_> = kb.graph.symptoms().collect();
            if symptoms.is_empty() {
                println!("No symptoms found.");
            } else {
                for symptom in symptoms {
                    println!("{}", symptom);
                }
            }
        }
        None => {
            println!("Use 'medidx --help' for commands");
        }
    }

    Ok(())
}
