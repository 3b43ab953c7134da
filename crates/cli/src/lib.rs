pub mod commands;

use cartwise_core::config::{AppConfig, LoadOptions, LogFormat};
use clap::{Parser, Subcommand};
use std::process::ExitCode;

use commands::explain::ExplainRequest;
use commands::simulate::SimulateRequest;

#[derive(Debug, Parser)]
#[command(
    name = "cartwise",
    about = "Cartwise shopping-assistant operator CLI",
    long_about = "Inspect configuration, check readiness, explain rule reasoning and simulate shopping sessions.",
    after_help = "Examples:\n  cartwise doctor --json\n  cartwise explain --rule student-segment\n  cartwise simulate --add coffee-maker:2 --coupon STUDENT2024 --checkout"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, seed data and the session sweeper")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run the starter rules for a seed user and explain each firing")]
    Explain {
        #[arg(long, default_value = "user-student", help = "Seed user to evaluate")]
        user: String,
        #[arg(long = "add", value_name = "PRODUCT[:QTY]", help = "Cart line to include")]
        items: Vec<String>,
        #[arg(long, help = "Only report this rule id")]
        rule: Option<String>,
        #[arg(long, help = "Prove this condition by backward chaining instead")]
        goal: Option<String>,
    },
    #[command(about = "Drive a scripted shopping session over the seed catalog")]
    Simulate {
        #[arg(long, default_value = "user-student", help = "Seed user who shops")]
        user: String,
        #[arg(
            long = "add",
            value_name = "PRODUCT[:QTY]",
            default_value = "coffee-maker:2",
            help = "Product to view and add to the cart"
        )]
        items: Vec<String>,
        #[arg(long, help = "Coupon code to apply before checkout")]
        coupon: Option<String>,
        #[arg(long, help = "Proceed to checkout and place the order")]
        checkout: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Explain { user, items, rule, goal } => {
            commands::explain::run(&ExplainRequest { user_id: user, items, rule_id: rule, goal })
        }
        Command::Simulate { user, items, coupon, checkout } => {
            commands::simulate::run(&SimulateRequest { user_id: user, items, coupon, checkout })
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout stays a clean JSON payload. A config that
/// fails to load falls back to defaults here; the command reports the error.
fn init_logging() {
    use tracing::Level;

    let logging = AppConfig::load(LoadOptions::default())
        .map(|config| config.logging)
        .unwrap_or_else(|_| AppConfig::default().logging);
    let log_level = logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}
