use clap::{Parser, Subcommand};

pub mod commands;

#[derive(Parser)]
#[command(
    name = "vaultkeeper",
    version,
    about = "Encrypted secret vault with scheduled rotation"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the rotation scheduler until interrupted.
    Serve(ServeOpts),
    Secret(SecretOpts),
    Project(ProjectOpts),
    Policy(PolicyOpts),
    /// Rotate a policy's secret now.
    Rotate(RotateOpts),
    Config(ConfigOpts),
    Version,
}

#[derive(clap::Args)]
pub struct ServeOpts {
    #[arg(short, long)]
    pub config: Option<String>,
    /// Override `scheduler.tickIntervalSecs`.
    #[arg(long)]
    pub tick_secs: Option<u64>,
}

#[derive(clap::Args)]
pub struct SecretOpts {
    #[arg(short, long)]
    pub config: Option<String>,
    #[command(subcommand)]
    pub action: SecretAction,
}

#[derive(Subcommand)]
pub enum SecretAction {
    /// Show a secret's attributes (and value with --reveal).
    Get {
        /// project/category/key
        address: String,
        #[arg(long)]
        reveal: bool,
    },
    /// Write a value. Reads stdin when --value is not given.
    Set {
        address: String,
        #[arg(long, env = "VAULTKEEPER_SECRET_VALUE", hide_env_values = true)]
        value: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        /// RFC 3339 timestamp.
        #[arg(long)]
        expires: Option<String>,
        #[arg(long)]
        env_var: Option<String>,
    },
    Delete {
        address: String,
    },
    List {
        project: String,
        #[arg(long)]
        category: Option<String>,
    },
}

#[derive(clap::Args)]
pub struct ProjectOpts {
    #[arg(short, long)]
    pub config: Option<String>,
    #[command(subcommand)]
    pub action: ProjectAction,
}

#[derive(Subcommand)]
pub enum ProjectAction {
    Create { name: String },
    List,
}

#[derive(clap::Args)]
pub struct PolicyOpts {
    #[arg(short, long)]
    pub config: Option<String>,
    #[command(subcommand)]
    pub action: PolicyAction,
}

#[derive(Subcommand)]
pub enum PolicyAction {
    /// Create or update a policy from a JSON, YAML or TOML file.
    Apply {
        file: String,
        /// Update this policy instead of matching by secret.
        #[arg(long)]
        id: Option<String>,
    },
    Get {
        id: String,
    },
    List,
    Delete {
        id: String,
    },
}

#[derive(clap::Args)]
pub struct RotateOpts {
    #[arg(short, long)]
    pub config: Option<String>,
    pub policy_id: String,
}

#[derive(clap::Args)]
pub struct ConfigOpts {
    #[arg(short, long)]
    pub config: Option<String>,
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    Show,
    Validate,
    Init,
}
