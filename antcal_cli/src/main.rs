use clap::{Arg, ArgAction, ArgMatches, Command};
use human_bytes::human_bytes;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use libantcal::calibration_data::CalibrationData;
use libantcal::calibration_dump::{dump_calibration, DumpKind, DumpOptions};
use libantcal::config::Config;
use libantcal::data_manager::DataManager;
use libantcal::database::AddMode;
use libantcal::interval::Interval;

fn make_template_config(path: &Path) -> Result<(), std::io::Error> {
    let config = Config::default();
    let yaml_str = serde_yaml::to_string(&config).map_err(std::io::Error::other)?;
    let mut file = File::create(path)?;
    file.write_all(yaml_str.as_bytes())
}

/// Total size of all files below a folder
fn folder_size(path: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(path) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| match entry.metadata() {
            Ok(meta) if meta.is_dir() => folder_size(&entry.path()),
            Ok(meta) => meta.len(),
            Err(_) => 0,
        })
        .sum()
}

fn parse_intervals(matches: &ArgMatches, name: &str) -> Result<Vec<Interval<u32>>, String> {
    matches
        .get_many::<String>(name)
        .map(|values| {
            values
                .map(|v| Interval::<u32>::from_str(v).map_err(|e| format!("Bad --{name} '{v}': {e}")))
                .collect()
        })
        .unwrap_or_else(|| Ok(Vec::new()))
}

fn list_ids(manager: &DataManager, pb_manager: &MultiProgress) {
    let ids = match manager.get_calibration_ids() {
        Ok(ids) => ids,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!(
        "Found {} calibration IDs in {}",
        ids.len(),
        manager.get_calibration_data_folder().to_string_lossy()
    );

    let pb = pb_manager.add(ProgressBar::new(ids.len() as u64));
    if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}") {
        pb.set_style(style);
    }
    let mut lines: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids.iter() {
        pb.set_message(id.clone());
        let count = match manager.get_number_of_calibration_data(id) {
            Ok(n) => n,
            Err(e) => {
                log::warn!("Could not count records of {id}: {e}");
                0
            }
        };
        let size = folder_size(&manager.get_calibration_data_folder().join(id));
        lines.push(format!("{id:<40} {count:>6} ranges {:>12}", human_bytes(size as f64)));
        pb.inc(1);
    }
    pb.finish_and_clear();

    for line in lines.iter() {
        println!("{line}");
    }
}

fn dump(manager: &DataManager, matches: &ArgMatches) {
    let Some(id) = matches.get_one::<String>("calibration") else {
        log::error!("dump requires a calibration ID (-c)");
        return;
    };
    let kind = if matches.get_flag("mc") {
        DumpKind::MC
    } else if matches.get_flag("datadefault") {
        DumpKind::DataDefault
    } else {
        DumpKind::DataRanges
    };
    let options = match (parse_intervals(matches, "ch"), parse_intervals(matches, "params")) {
        (Ok(channels), Ok(params)) => DumpOptions {
            kind,
            channels,
            params,
        },
        (Err(e), _) | (_, Err(e)) => {
            log::error!("{e}");
            return;
        }
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let args: Vec<String> = std::env::args().collect();
    if let Err(e) = writeln!(out, "# Generated with {}", args.join(" ")) {
        log::error!("{e}");
        return;
    }
    if let Err(e) = dump_calibration(manager.database(), id, &options, &mut out) {
        log::error!("{e}");
    }
}

fn add(manager: &mut DataManager, matches: &ArgMatches) {
    let Some(record_path) = matches.get_one::<String>("record") else {
        log::error!("add requires a record file (-r)");
        return;
    };
    let mode = match matches
        .get_one::<String>("mode")
        .map_or(Ok(AddMode::StrictRange), |m| AddMode::from_str(m))
    {
        Ok(mode) => mode,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    let cdata = match std::fs::read_to_string(record_path)
        .map_err(|e| e.to_string())
        .and_then(|s| serde_yaml::from_str::<CalibrationData>(&s).map_err(|e| e.to_string()))
    {
        Ok(c) => c,
        Err(e) => {
            log::error!("Could not read record {record_path}: {e}");
            return;
        }
    };

    log::info!(
        "Adding {} [{}, {}] as {mode:?}...",
        cdata.calibration_id,
        cdata.first_id,
        cdata.last_id
    );
    match manager.add(&cdata, mode) {
        Ok(()) => log::info!("Done."),
        Err(e) => log::error!("Adding failed with error: {e}"),
    }
}

fn main() {
    // Create a cli
    let matches = Command::new("antcal_cli")
        .arg_required_else_help(true)
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .global(true)
                .help("Path to the configuration file"),
        )
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .subcommand(Command::new("ids").about("List the calibration IDs with their number of ranges and size"))
        .subcommand(
            Command::new("dump")
                .about("Dump the values of a calibration ID per channel over time")
                .arg(
                    Arg::new("calibration")
                        .short('c')
                        .long("calibration")
                        .required(true)
                        .help("Calibration ID to dump"),
                )
                .arg(
                    Arg::new("mc")
                        .long("mc")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("datadefault")
                        .help("Dump the MC default instead of the ranges"),
                )
                .arg(
                    Arg::new("datadefault")
                        .long("datadefault")
                        .action(ArgAction::SetTrue)
                        .help("Dump the data default instead of the ranges"),
                )
                .arg(
                    Arg::new("ch")
                        .long("ch")
                        .action(ArgAction::Append)
                        .help("Channels to dump, like 7 or 400-412. Can be given multiple times"),
                )
                .arg(
                    Arg::new("params")
                        .long("params")
                        .action(ArgAction::Append)
                        .help("Values to dump: 0 is the value, 1.. the fit parameters"),
                ),
        )
        .subcommand(
            Command::new("add")
                .about("Add a calibration record from a yaml file")
                .arg(
                    Arg::new("record")
                        .short('r')
                        .long("record")
                        .required(true)
                        .help("Path to the record yaml file"),
                )
                .arg(
                    Arg::new("mode")
                        .short('m')
                        .long("mode")
                        .value_parser(["strict", "rightopen", "default"])
                        .default_value("strict")
                        .help("How the record range is inserted"),
                ),
        )
        .get_matches();

    // Initialize feedback. The dump goes to stdout, so keep the log out of it.
    let mode = match matches.subcommand_name() {
        Some("dump") => simplelog::TerminalMode::Stderr,
        _ => simplelog::TerminalMode::Mixed,
    };
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        mode,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    if let Err(e) = LogWrapper::new(pb_manager.clone(), logger).try_init() {
        eprintln!("Could not create logging/progress: {e}");
        return;
    }

    // Parse the cli
    let Some(config_path) = matches.get_one::<String>("path").map(PathBuf::from) else {
        log::error!("A configuration file is required (-p)");
        return;
    };

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        match make_template_config(&config_path) {
            Ok(()) => log::info!("Done."),
            Err(e) => log::error!("Could not write template config: {e}"),
        }
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Config successfully loaded.");
    log::info!(
        "Calibration data folder: {}",
        config.calibration_data_folder.to_string_lossy()
    );
    log::info!("Caching enabled: {}", config.enable_caching);
    log::info!("Override to default: {}", config.override_to_default);
    if !config.does_data_folder_exist() {
        log::warn!("The calibration data folder does not exist yet");
    }

    let mut manager = DataManager::from_config(&config);

    match matches.subcommand() {
        Some(("ids", _)) => list_ids(&manager, &pb_manager),
        Some(("dump", sub)) => dump(&manager, sub),
        Some(("add", sub)) => add(&mut manager, sub),
        _ => log::error!("Unknown command, see --help"),
    }
}
