use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use skillbridge_query::{QueryService, ServeConfig, DEFAULT_JOB_K, DEFAULT_TRAINING_K};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod display;
mod predict;

use display::{job_hit_block, rule, training_hit_block};

#[derive(Debug, Parser)]
#[command(name = "skillbridge")]
#[command(about = "SkillBridge semantic job matcher")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Unify the job sources, embed every table and write the artifacts.
    Build,
    /// Serve the JSON API.
    Serve,
    /// Interactive job and training search.
    Predict,
    /// One-off search from the command line.
    Search {
        query: String,
        /// Search training modules instead of jobs.
        #[arg(long)]
        trainings: bool,
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Match a resume (.pdf or .txt) against the job corpus.
    Resume {
        path: PathBuf,
        #[arg(short, long, default_value_t = DEFAULT_JOB_K)]
        k: usize,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn start_query_service() -> Result<QueryService> {
    let config = ServeConfig::from_env()?;
    match QueryService::start(&config).await {
        Ok(service) => Ok(service),
        Err(err) if err.needs_rebuild() => Err(anyhow::Error::new(err)
            .context("artifacts are not usable; run `skillbridge build` first")),
        Err(err) => Err(err.into()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Predict) {
        Commands::Build => {
            let summary = skillbridge_build::run_build_once_from_env().await?;
            println!(
                "build complete: run_id={} encoder={} jobs={} candidates={} trainings={} report={}",
                summary.run_id,
                summary.encoder_id,
                summary.jobs,
                summary.candidates,
                summary.trainings,
                summary.report_path
            );
            for missing in &summary.missing_inputs {
                println!("  skipped: {missing}");
            }
        }
        Commands::Serve => skillbridge_web::serve_from_env().await?,
        Commands::Predict => {
            let service = start_query_service().await?;
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            predict::run_predict(&service, stdin, &mut std::io::stdout()).await?;
        }
        Commands::Search { query, trainings, k } => {
            let service = start_query_service().await?;
            if trainings {
                let hits = service
                    .search_trainings(&query, k.unwrap_or(DEFAULT_TRAINING_K))
                    .await?;
                for hit in &hits {
                    println!("{}", training_hit_block(hit));
                }
            } else {
                let hits = service
                    .search_jobs(&query, k.unwrap_or(predict::PREDICT_JOB_K))
                    .await?;
                for hit in &hits {
                    println!("{}\n{}", job_hit_block(hit), rule());
                }
            }
        }
        Commands::Resume { path, k } => {
            let service = start_query_service().await?;
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let matched = service.match_resume_file(&file_name, bytes, k).await?;
            println!("Extracted: {}", matched.extracted_text_preview);
            if !matched.extracted_skills.is_empty() {
                println!("Skills:    {}", matched.extracted_skills.join(", "));
            }
            println!("{}", rule());
            for hit in &matched.hits {
                println!("{}\n{}", job_hit_block(hit), rule());
            }
        }
    }

    Ok(())
}
