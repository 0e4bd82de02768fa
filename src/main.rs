use anyhow::Result;
use clap::Parser;
use tellerline::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tellerline::telemetry::init(cli.log_json);
    cli.run().await
}
