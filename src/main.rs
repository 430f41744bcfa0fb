use clap::Parser;
use flowboard::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load layered settings
    let settings = cli.settings()?;

    // Initialize logging
    cli.init_logging(&settings)?;

    // Execute command
    cli.execute(&settings).await?;

    Ok(())
}
