use clap::{value_parser, Arg, ArgAction, Command};
use std::path::PathBuf;
use tabula_core::{telemetry::init_tracing, TabulaConfig, UnassignedPolicy};

mod commands;
mod report;

fn cli() -> Command {
    Command::new("tabula")
        .version(tabula_core::VERSION)
        .about("Profile-scoped dataset access and AI report execution")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Path to a TOML config file"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON on stderr"),
        )
        .subcommand(
            Command::new("access")
                .about("Evaluate a profile code against a dataset assignment")
                .arg(
                    Arg::new("user")
                        .long("user")
                        .help("User profile code, omit for an unassigned user"),
                )
                .arg(
                    Arg::new("dataset")
                        .long("dataset")
                        .help("Dataset profile code, omit for an unassigned dataset"),
                )
                .arg(
                    Arg::new("email")
                        .long("email")
                        .default_value("")
                        .help("Requesting user's email"),
                )
                .arg(
                    Arg::new("owner")
                        .long("owner")
                        .default_value("")
                        .help("Dataset owner's email"),
                )
                .arg(
                    Arg::new("policy")
                        .long("policy")
                        .value_parser(value_parser!(UnassignedPolicy))
                        .help("owner-only or visible-to-all; defaults to the configured policy"),
                ),
        )
        .subcommand(
            Command::new("login")
                .about("Resolve a user's profile and start a session")
                .arg(Arg::new("email").long("email").required(true)),
        )
        .subcommand(Command::new("logout").about("End the current session"))
        .subcommand(Command::new("whoami").about("Show the current session"))
        .subcommand(
            Command::new("datasets")
                .about("List datasets visible to the session user")
                .arg(
                    Arg::new("owned")
                        .long("owned")
                        .action(ArgAction::SetTrue)
                        .help("Only datasets the user uploaded"),
                ),
        )
        .subcommand(
            Command::new("report")
                .about("Plan and run a multi-step report")
                .arg(Arg::new("prompt").long("prompt").required(true))
                .arg(
                    Arg::new("dataset")
                        .long("dataset")
                        .required(true)
                        .action(ArgAction::Append)
                        .help("Dataset id, repeatable"),
                )
                .arg(Arg::new("model").long("model"))
                .arg(
                    Arg::new("plan-file")
                        .long("plan-file")
                        .value_parser(value_parser!(PathBuf))
                        .help("Replace the generated plan with this JSON before running"),
                )
                .arg(
                    Arg::new("plan-only")
                        .long("plan-only")
                        .action(ArgAction::SetTrue)
                        .help("Print the plan and exit without executing"),
                ),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json-logs"));

    let config = TabulaConfig::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;

    match matches.subcommand() {
        Some(("access", args)) => commands::access(&config, args),
        Some(("login", args)) => commands::login(&config, args).await,
        Some(("logout", _)) => commands::logout(&config),
        Some(("whoami", _)) => commands::whoami(&config),
        Some(("datasets", args)) => commands::datasets(&config, args).await,
        Some(("report", args)) => report::run(&config, args).await,
        _ => Ok(()),
    }
}
