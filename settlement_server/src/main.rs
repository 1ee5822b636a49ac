use clap::Parser;
use dotenvy::dotenv;
use log::info;
use settlement_server::{
    cli::{display_envs, Arguments, Command},
    config::ServerConfig,
    server::{run_server, run_single_sweep},
};

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let args = Arguments::parse();
    let config = ServerConfig::from_env_or_default();

    let result = match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            info!("🚀️ Starting settlement server on {}", config.database_url);
            run_server(config).await
        },
        Command::Sweep(params) => run_single_sweep(config, params.kind, params.batch).await,
        Command::Env => {
            display_envs(&config);
            Ok(())
        },
    };
    match result {
        Ok(_) => println!("Bye!"),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        },
    }
}
