use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use scriptdeploy::config::Config;
use scriptdeploy::remote::LocatePolicy;

/// Push local Apps Script sources to their remote project
#[derive(Parser)]
#[command(name = "scriptdeploy", version, about)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create or update the remote project (default)
    Deploy(DeployArgs),

    /// Check that the credential file exists and is usable
    CheckToken {
        /// Credential file to check
        #[arg(long)]
        token_path: Option<PathBuf>,
    },

    /// Print the generated appsscript.json manifest
    Manifest,
}

#[derive(Args, Default)]
pub struct DeployArgs {
    /// Authenticate, bundle and locate, but change nothing remotely
    #[arg(long)]
    pub dry_run: bool,

    /// Remote project title
    #[arg(long)]
    pub project_name: Option<String>,

    /// Credential file
    #[arg(long)]
    pub token_path: Option<PathBuf>,

    /// Project directory containing src/
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// What to do when the project search fails
    #[arg(long, value_enum)]
    pub locate_policy: Option<LocatePolicy>,

    /// Deploy to this script id instead of searching by title
    #[arg(long)]
    pub script_id: Option<String>,

    /// Configure the executable deployment after creating a project too
    #[arg(long)]
    pub configure_on_create: bool,
}

impl DeployArgs {
    /// Flags win over environment configuration.
    pub fn apply(&self, mut cfg: Config) -> Config {
        if let Some(name) = &self.project_name {
            cfg.project_name = name.clone();
        }
        if let Some(path) = &self.token_path {
            cfg.token_path = path.clone();
        }
        if let Some(root) = &self.root {
            cfg.project_root = root.clone();
        }
        if let Some(policy) = self.locate_policy {
            cfg.locate_policy = policy;
        }
        if let Some(id) = &self.script_id {
            cfg.script_id = Some(id.clone());
        }
        cfg.configure_on_create |= self.configure_on_create;
        cfg
    }
}
