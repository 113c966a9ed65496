use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command, ValueHint};
use log::LevelFilter;
use std::path::PathBuf;
use std::str::FromStr;

use mass_composition::composition::BinDirection;
use mass_composition_cli::commands::grade_tonnage::{self, GradeTonnageArgs};
use mass_composition_cli::commands::{demo, network, summary};
use mass_composition_cli::config::NetworkConfig;

fn main() -> Result<()> {
    env_logger::Builder::default()
        .filter_level(LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("MC_LOG", "error,mass_composition=info"))
        .init();

    let network_args = |cmd: Command| {
        cmd.arg(
            Arg::new("config")
                .help("Path to network JSON configuration file")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("data_file")
                .short('d')
                .long("data_file")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Path to the stream data CSV. Overrides the data file in the configuration file.")
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("output_dir")
                .short('o')
                .long("output_dir")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Directory the outputs are written to. Overrides the configuration file.")
                .value_hint(ValueHint::DirPath),
        )
    };

    let matches = Command::new("mass-composition")
        .version(clap::crate_version!())
        .author("Greg Elphick")
        .about("Mass-composition datasets, grade-tonnage tables and flowsheet mass balancing")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("summary")
                .about("Print the weighted summary of a CSV dataset")
                .arg(
                    Arg::new("csv")
                        .help("Path to the dataset")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("name")
                        .short('n')
                        .long("name")
                        .default_value("dataset")
                        .help("Name of the dataset"),
                )
                .arg(
                    Arg::new("index_col")
                        .long("index-col")
                        .help("Column holding the record index. Defaults to 'index' when present."),
                ),
        )
        .subcommand(
            Command::new("grade-tonnage")
                .about("Bin a dataset on a cut-off variable")
                .arg(
                    Arg::new("csv")
                        .help("Path to the dataset")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("cutoff_var")
                        .long("cutoff-var")
                        .required(true)
                        .help("Variable to bin on, e.g. Fe"),
                )
                .arg(
                    Arg::new("bin_width")
                        .long("bin-width")
                        .required(true)
                        .value_parser(clap::value_parser!(f64))
                        .help("Width of each bin"),
                )
                .arg(
                    Arg::new("cumulative")
                        .long("cumulative")
                        .help("Accumulate records across bins")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("direction")
                        .long("direction")
                        .value_parser(["ascending", "descending"])
                        .default_value("descending")
                        .help("Direction of accumulation"),
                )
                .arg(
                    Arg::new("index_col")
                        .long("index-col")
                        .help("Column holding the record index"),
                )
                .arg(
                    Arg::new("output_file")
                        .short('o')
                        .long("output")
                        .help("CSV file for the table. Defaults to stdout.")
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("plot")
                        .long("plot")
                        .help("HTML file for the grade-tonnage figure")
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                ),
        )
        .subcommand(
            Command::new("network")
                .about("Report on or balance a flowsheet network")
                .subcommand_required(true)
                .subcommand(network_args(
                    Command::new("report").about("Write stream summaries and an HTML network report"),
                ))
                .subcommand(network_args(
                    Command::new("balance").about("Reconcile the network and report the balanced streams"),
                )),
        )
        .subcommand(
            Command::new("demo")
                .about("Write the demo datasets and a network configuration")
                .arg(
                    Arg::new("output_dir")
                        .short('o')
                        .long("output_dir")
                        .default_value("mass_composition_demo")
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::DirPath),
                ),
        )
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Written by {author-with-newline}Version {version}\n\n\
             {all-args}{after-help}",
        )
        .get_matches();

    match matches.subcommand() {
        Some(("summary", sub_m)) => handle_summary(sub_m),
        Some(("grade-tonnage", sub_m)) => handle_grade_tonnage(sub_m),
        Some(("network", sub_m)) => handle_network(sub_m),
        Some(("demo", sub_m)) => {
            let out_dir: &PathBuf = sub_m.get_one("output_dir").unwrap();
            for path in demo::run(out_dir)? {
                println!("{}", path.display());
            }
            Ok(())
        }
        _ => unreachable!("Subcommand is required by CLI configuration"),
    }
}

fn handle_summary(matches: &ArgMatches) -> Result<()> {
    let csv: &PathBuf = matches.get_one("csv").unwrap();
    let name: &String = matches.get_one("name").unwrap();
    let index_col = matches.get_one::<String>("index_col").map(|s| s.as_str());
    summary::run(csv, name, index_col)
}

fn handle_grade_tonnage(matches: &ArgMatches) -> Result<()> {
    let direction: &String = matches.get_one("direction").unwrap();
    let args = GradeTonnageArgs {
        csv: matches.get_one::<PathBuf>("csv").unwrap().clone(),
        index_col: matches.get_one::<String>("index_col").cloned(),
        cutoff_var: matches.get_one::<String>("cutoff_var").unwrap().clone(),
        bin_width: *matches.get_one::<f64>("bin_width").unwrap(),
        cumulative: matches.get_flag("cumulative"),
        direction: BinDirection::from_str(direction)?,
        output: matches.get_one::<PathBuf>("output_file").cloned(),
        plot: matches.get_one::<PathBuf>("plot").cloned(),
    };
    grade_tonnage::run(&args)?;
    Ok(())
}

fn handle_network(matches: &ArgMatches) -> Result<()> {
    let (action, sub_m) = matches
        .subcommand()
        .unwrap_or_else(|| unreachable!("Subcommand is required by CLI configuration"));
    let config_path: &PathBuf = sub_m.get_one("config").unwrap();
    log::info!("[mass-composition::network] {} using config: {:?}", action, config_path);

    let config = NetworkConfig::from_arguments(config_path, sub_m)?;
    let outcome = match action {
        "report" => network::run_report(&config),
        "balance" => network::run_balance(&config),
        _ => unreachable!(),
    };
    match outcome {
        Ok(paths) => {
            for path in paths {
                println!("{}", path.display());
            }
            Ok(())
        }
        Err(e) => {
            log::error!("Network {} failed: {:#}", action, e);
            std::process::exit(1)
        }
    }
}
