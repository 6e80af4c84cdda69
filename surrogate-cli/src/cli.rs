//! CLI definition for the surrogate daemon.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "surrogated", author, version, about = "Distributed compute surrogate daemon")]
pub struct Cli {
    /// Enable debug logging.
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Override the configured number of core workers.
    #[arg(short = 'c', long = "cores")]
    pub cores: Option<usize>,

    /// Run the static surrogate variant. The only variant this daemon
    /// implements; the flag is accepted for command-line compatibility.
    #[arg(short = 's', long = "static")]
    pub static_variant: bool,

    /// Daemon home directory (logs, installed task storage).
    #[arg(long, env = "SURROGATE_HOME")]
    pub home: Option<PathBuf>,

    /// Path to a TOML configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn home_dir(&self) -> PathBuf {
        self.home.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".surrogate")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_flags() {
        let cli = Cli::parse_from(["surrogated", "-d", "-c", "8", "-s"]);
        assert!(cli.debug);
        assert_eq!(cli.cores, Some(8));
        assert!(cli.static_variant);
    }

    #[test]
    fn home_dir_falls_back_when_unset() {
        let cli = Cli::parse_from(["surrogated"]);
        assert!(cli.home_dir().ends_with(".surrogate"));
    }
}
