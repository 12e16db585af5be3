use clap::{Arg, ArgAction, Command};
use parlor_core::{endpoint_from_env, GatewayConfig};
use parlor_upstream::{AgentRuntime, HttpAgentRuntime};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Command::new("parlor-gateway")
        .version(parlor_core::VERSION)
        .about("Identity-scoped gateway for a remote agent runtime")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("config")
                .about("Print the resolved gateway configuration")
                .arg(
                    Arg::new("pretty")
                        .long("pretty")
                        .action(ArgAction::SetTrue)
                        .help("Pretty-print the JSON output"),
                ),
        )
        .subcommand(
            Command::new("check")
                .about("Verify the upstream agent runtime is reachable"),
        );

    let matches = cli.get_matches();

    match matches.subcommand() {
        Some(("config", args)) => {
            let config = GatewayConfig::from_env();
            let json = if args.get_flag("pretty") {
                serde_json::to_string_pretty(&config)?
            } else {
                serde_json::to_string(&config)?
            };
            println!("{json}");
        }
        Some(("check", _)) => {
            let endpoint = endpoint_from_env();
            println!("Checking agent runtime at {}...", endpoint.base_url);

            let runtime = HttpAgentRuntime::new(endpoint)?;
            match runtime.runtime_info().await {
                Ok(info) => {
                    println!("Runtime reachable: {}", info.base_url);
                    if let Some(version) = info.version {
                        println!("Version: {version}");
                    }
                }
                Err(err) => {
                    eprintln!("Runtime unreachable: {err}");
                    std::process::exit(1);
                }
            }
        }
        _ => {}
    }

    Ok(())
}
