use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scriptdeploy::bundle::Manifest;
use scriptdeploy::config;
use scriptdeploy::credentials;
use scriptdeploy::reconcile::{self, Action, DeployOutcome, DeploymentStatus};

mod cli;

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::Cli::parse();
    init_tracing(args.json_logs);

    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("❌ Configuration error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match args.command {
        Some(cli::Commands::CheckToken { token_path }) => {
            let path = token_path.unwrap_or(cfg.token_path);
            if credentials::has_valid(&path) {
                println!("✅ {} holds a usable credential", path.display());
                ExitCode::SUCCESS
            } else {
                println!("❌ {} is missing or invalid", path.display());
                ExitCode::FAILURE
            }
        }
        Some(cli::Commands::Manifest) => {
            println!("{}", Manifest::default().to_source());
            ExitCode::SUCCESS
        }
        Some(cli::Commands::Deploy(deploy)) => run_deploy(deploy.apply(cfg), deploy.dry_run).await,
        None => run_deploy(cfg, false).await,
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "scriptdeploy=info".into()),
    );
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}

async fn run_deploy(cfg: config::Config, dry_run: bool) -> ExitCode {
    if cfg.api_key.is_some() {
        tracing::info!("deployment API key loaded from environment");
    } else {
        tracing::warn!("DEPLOYMENT_API_KEY not set; add DEPLOYMENT_API_KEY=your_key_here to .env to send it");
    }

    tracing::info!(
        project = %cfg.project_name,
        root = %cfg.project_root.display(),
        dry_run,
        "starting deployment"
    );

    match reconcile::deploy(&cfg, dry_run).await {
        Ok(outcome) => {
            print_outcome(&outcome);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("\n❌ Deployment failed: {}", e);
            eprintln!("\n🔧 Troubleshooting:\n{}", e.remediation());
            ExitCode::FAILURE
        }
    }
}

fn print_outcome(outcome: &DeployOutcome) {
    println!();
    match outcome.action {
        Action::Created => println!("🎉 Project created ({} files)", outcome.files),
        Action::Updated => println!("🎉 Project updated ({} files)", outcome.files),
        Action::WouldCreate => println!("📝 Dry run: would create a new project with {} files", outcome.files),
        Action::WouldUpdate => println!("📝 Dry run: would overwrite the project with {} files", outcome.files),
    }

    if let Some(project) = &outcome.project {
        println!("📋 Project ID: {}", project.script_id);
        println!("🌐 Project URL: {}", project.url);
    }

    match &outcome.deployment {
        DeploymentStatus::Skipped => {}
        DeploymentStatus::Reused(id) => println!("🔗 Deployment ID: {} (existing)", id),
        DeploymentStatus::Created(id) => println!("🔗 Deployment ID: {} (new)", id),
        DeploymentStatus::Failed(reason) => {
            println!("⚠️  Deployment configuration skipped: {}", reason)
        }
    }
}
