use clap::Parser;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_tracing();

    let cli = medlife_cli::cli::Cli::parse();
    match cli.command {
        medlife_cli::cli::Commands::Mcp => match medlife_cli::mcp::run_stdio().await {
            Ok(()) => std::process::ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("Error: {err}");
                std::process::ExitCode::from(1)
            }
        },
        medlife_cli::cli::Commands::ServeHttp { host, port } => {
            match medlife_cli::mcp::run_http(&host, port).await {
                Ok(()) => std::process::ExitCode::SUCCESS,
                Err(err) => {
                    eprintln!("Error: {err}");
                    std::process::ExitCode::from(1)
                }
            }
        }
        _ => match medlife_cli::cli::run(cli).await {
            Ok(output) => {
                println!("{output}");
                std::process::ExitCode::SUCCESS
            }
            Err(err) => {
                if let Some(medlife_err) = err.downcast_ref::<medlife_cli::error::MedlifeError>() {
                    eprintln!("Error: {medlife_err}");
                } else {
                    eprintln!("Error: {err}");
                }
                std::process::ExitCode::from(1)
            }
        },
    }
}
