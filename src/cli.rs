use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "doodle-guesser")]
#[command(about = "Replay a recorded drawing script against a session and report the guesses.")]
pub struct Cli {
    /// Input script (JSON array of pointer/undo/redo/clear events)
    pub script: PathBuf,

    /// Write the final canvas to this PNG file
    pub output: Option<PathBuf>,

    /// Settings file (default: $DOODLE_GUESSER_CONFIG, else the data dir)
    #[arg(long)]
    pub config: Option<PathBuf>,
}
