use anyhow::Result;
use clap::{Arg, ArgAction, Command};

use netmeter::commands;

fn cli() -> Command {
    Command::new("netmeter")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Live network speed and daily data usage meter")
        .disable_version_flag(true)
        .arg(
            Arg::new("version")
                .short('v')
                .short_alias('V')
                .long("version")
                .help("Print version information")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("db")
                .long("db")
                .value_name("PATH")
                .help("Database file (defaults to the user data directory)")
                .global(true),
        )
        .subcommand(
            Command::new("run")
                .about("Show live speed and today's usage until Ctrl+C")
                .arg(
                    Arg::new("screen-off")
                        .long("screen-off")
                        .help("Start on the screen-off cadence (10s ticks)")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("duration")
                        .short('d')
                        .long("duration")
                        .value_name("SECONDS")
                        .help("Stop after this many seconds")
                        .value_parser(clap::value_parser!(u64)),
                ),
        )
        .subcommand(
            Command::new("history")
                .about("Show per-day usage with 7 and 30 day totals")
                .arg(
                    Arg::new("days")
                        .long("days")
                        .value_name("N")
                        .help("Number of days to show")
                        .default_value("30")
                        .value_parser(clap::value_parser!(u32).range(1..=366)),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print as JSON")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Show or change settings (use 'netmeter config --help' for subcommands)")
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommand(Command::new("show").about("Show current settings"))
                .subcommand(
                    Command::new("set")
                        .about("Change a setting")
                        .arg(
                            Arg::new("key")
                                .help("show_speed, show_up_down, show_wifi_signal, daily_limit_enabled, daily_limit_mb or unit_in_mb")
                                .required(true)
                                .index(1),
                        )
                        .arg(
                            Arg::new("value")
                                .help("New value (true/false or a number of MB)")
                                .required(true)
                                .index(2),
                        ),
                ),
        )
        .subcommand(
            Command::new("reset")
                .about("Reset today's usage counters")
                .arg(
                    Arg::new("yes")
                        .short('y')
                        .long("yes")
                        .help("Skip the confirmation prompt")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("version").about("Shows version information"))
}

fn main() -> Result<()> {
    netmeter::init_logging();

    let matches = cli().get_matches();

    if matches.get_flag("version") {
        return commands::version();
    }

    match matches.subcommand() {
        Some(("run", sub_matches)) => commands::run::execute(sub_matches)?,
        Some(("history", sub_matches)) => commands::history::execute(sub_matches)?,
        Some(("config", sub_matches)) => commands::config::handle(sub_matches)?,
        Some(("reset", sub_matches)) => commands::reset::execute(sub_matches)?,
        Some(("version", _)) => commands::version()?,
        _ => {
            println!("Welcome to netmeter!");
            println!("Use 'netmeter --help' for more information.");
        }
    }

    Ok(())
}
