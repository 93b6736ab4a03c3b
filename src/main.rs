use clap::Parser;

use doodle_guesser_lib::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    doodle_guesser_lib::run(cli).await
}
