use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Build-time note shown in `--help`: backup/push need the server driver.
#[cfg(feature = "mysql")]
pub const DRIVER_NOTE: &str = "MySQL/MariaDB driver: enabled";
#[cfg(not(feature = "mysql"))]
pub const DRIVER_NOTE: &str =
    "MySQL/MariaDB driver: NOT built in; `backup` and `push` need `cargo build --features mysql` (`split` works without it)";

/// Dump and restore MySQL/MariaDB databases as plain SQL scripts
#[derive(Parser, Debug)]
#[command(name = "sqlbackup", version, about = "SQL dump/restore CLI", after_help = DRIVER_NOTE)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Dump a database into a SQL file
    Backup {
        /// Config name: reads <config-dir>/<name>.json
        #[arg(long)]
        config: String,
        /// Output file (base name in incremental mode)
        #[arg(long)]
        path: PathBuf,
        /// Incremental mode: timestamped file name, keep N newest dumps
        #[arg(long, value_name = "KEEP", value_parser = clap::value_parser!(u64).range(1..))]
        incremental: Option<u64>,
        /// Rows per INSERT statement
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        batch_size: Option<u64>,
        /// Directory with connection configs (default: ./configs)
        #[arg(long)]
        config_dir: Option<PathBuf>,
    },
    /// Execute a SQL file against a database
    Push {
        #[arg(long)]
        config: String,
        /// SQL file to execute
        #[arg(long)]
        path: PathBuf,
        /// Skip SET SESSION timeouts / max_allowed_packet
        #[arg(long, default_value_t = false)]
        no_session_tuning: bool,
        /// Fail on an unterminated statement at end of file
        #[arg(long, default_value_t = false)]
        strict: bool,
        #[arg(long)]
        config_dir: Option<PathBuf>,
    },
    /// Split a SQL file into statements and print them (no database)
    Split {
        #[arg(long)]
        path: PathBuf,
        #[arg(long, default_value_t = false)]
        strict: bool,
        /// JSON output
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn help_names_driver_state() {
        let help = Cli::command().render_help().to_string();
        assert!(help.contains("MySQL/MariaDB driver"));
        #[cfg(not(feature = "mysql"))]
        assert!(help.contains("--features mysql"));
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
