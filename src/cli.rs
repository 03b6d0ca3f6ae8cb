use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// JSON configuration file
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// Output directory for downloaded reports (overrides the config file)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Number of concurrent downloads (overrides the config file)
    #[arg(short, long)]
    pub parallelism: Option<usize>,

    /// Run a single poll cycle, then log out and exit
    #[arg(long)]
    pub once: bool,

    /// Hide download progress bars
    #[arg(short, long)]
    pub quiet: bool,
}
