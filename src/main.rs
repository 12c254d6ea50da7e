use clap::Parser;
use vaultkeeper::cli::{commands, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(opts) => commands::serve(opts).await?,
        Commands::Secret(opts) => commands::secret(opts).await?,
        Commands::Project(opts) => commands::project(opts).await?,
        Commands::Policy(opts) => commands::policy(opts).await?,
        Commands::Rotate(opts) => commands::rotate(opts).await?,
        Commands::Config(opts) => commands::config(opts)?,
        Commands::Version => {
            println!("vaultkeeper {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
