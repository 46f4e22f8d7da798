use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env};

mod cli;
mod util;
mod cmd_backup;
mod cmd_push;
mod cmd_split;

fn init_logger() {
    // Уровень берём из RUST_LOG, иначе дефолт: info.
    // Пример: RUST_LOG=debug sqlbackup push ...
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Cmd::Backup { config, path, incremental, batch_size, config_dir } =>
            cmd_backup::exec(config, path, incremental, batch_size, config_dir),

        cli::Cmd::Push { config, path, no_session_tuning, strict, config_dir } =>
            cmd_push::exec(config, path, no_session_tuning, strict, config_dir),

        // Dry run: без подключения к серверу
        cli::Cmd::Split { path, strict, json } =>
            cmd_split::exec(path, strict, json),
    }
}
