use clap::Parser;

use hotsheet_gateway::cli::{self, Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    let config_path = args.config.as_deref();

    let result = match args.command.unwrap_or(Command::Start) {
        Command::Start => cli::handle_start(config_path).await,
        Command::Config(ConfigCommand::Show) => cli::handle_config_show(config_path),
        Command::Config(ConfigCommand::Get { key }) => cli::handle_config_get(config_path, &key),
        Command::Status { port, host } => cli::handle_status(config_path, &host, port).await,
        Command::Version => {
            cli::handle_version();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
