use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use rx_o_mat::config::Config;
use rx_o_mat::decoder::Decoder;
use rx_o_mat::observation::{ObservationRequest, Planner};
use rx_o_mat::predict::{next_pass, ElementStore, OrbitModel, Sgp4Model, TleLoader};
use rx_o_mat::shutdown::Shutdown;

#[derive(Parser)]
#[command(name = "rx-o-mat")]
#[command(about = "Satellite pass planning and LRPT decoding")]
struct Cli {
    /// Station configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and the TLE folder
    Validate,
    /// Predict the next usable pass of a satellite
    NextPass {
        #[arg(short, long)]
        satellite: String,
        /// RFC 3339 start time, defaults to now
        #[arg(long)]
        from: Option<DateTime<Utc>>,
    },
    /// Plan an observation of the next pass
    Plan {
        #[arg(short, long)]
        satellite: String,
        /// Start the observation now instead of at the predicted pass
        #[arg(long)]
        immediate: bool,
        /// Write the request here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Decode a raw capture for a planned observation
    Decode {
        #[arg(long)]
        request: PathBuf,
        #[arg(long)]
        iq: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error reading {}: {}", cli.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Validate => validate(&config),
        Commands::NextPass { satellite, from } => {
            show_next_pass(&config, &satellite, from.unwrap_or_else(Utc::now))
        }
        Commands::Plan {
            satellite,
            immediate,
            output,
        } => plan(&config, &satellite, immediate, output.as_deref()),
        Commands::Decode { request, iq } => decode(config, &request, iq).await,
    }
}

fn load_tles(config: &Config) -> Result<TleLoader, ExitCode> {
    let mut loader = TleLoader::new(config.tle.folder.clone());
    match loader.load_all() {
        Ok(()) => Ok(loader),
        Err(e) => {
            eprintln!("Error loading TLEs: {}", e);
            Err(ExitCode::FAILURE)
        }
    }
}

fn validate(config: &Config) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }
    let loader = match load_tles(config) {
        Ok(l) => l,
        Err(code) => return code,
    };

    println!(
        "Configuration of {} is valid ({} satellites, {} TLEs)",
        config.station.display_name(),
        config.satellites.len(),
        loader.len()
    );
    let mut missing = false;
    for satellite in &config.satellites {
        let status = if loader.find(&satellite.id).is_some() {
            "ok"
        } else {
            missing = true;
            "no TLE"
        };
        println!(
            "  {} ({}): {} Hz, {} [{}]",
            satellite.name, satellite.id, satellite.frequency, satellite.source, status
        );
    }
    if missing {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn show_next_pass(config: &Config, satellite: &str, from: DateTime<Utc>) -> ExitCode {
    let station = match config.ground_station() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let loader = match load_tles(config) {
        Ok(l) => l,
        Err(code) => return code,
    };
    let Some(tle) = loader.find(satellite) else {
        eprintln!("No TLE for {}", satellite);
        return ExitCode::FAILURE;
    };

    let pass = Sgp4Model.track(&tle).and_then(|track| {
        next_pass(
            from,
            &track,
            &station,
            config.scheduler.min_elevation,
            config.scheduler.guaranteed_elevation,
        )
    });
    match pass {
        Ok(Some(pass)) => {
            println!(
                "{} ({}) from {}",
                tle.name,
                tle.id,
                config.station.display_name()
            );
            println!(
                "  AOS {}  az {:.1}",
                pass.start.time,
                pass.start.azimuth.to_degrees()
            );
            println!(
                "  LOS {}  az {:.1}",
                pass.end.time,
                pass.end.azimuth.to_degrees()
            );
            println!("  max elevation {:.1}", pass.max_elevation_deg);
            ExitCode::SUCCESS
        }
        Ok(None) => {
            println!("No pass of {} in the next 24 hours", tle.name);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Prediction failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn plan(config: &Config, satellite: &str, immediate: bool, output: Option<&Path>) -> ExitCode {
    let Some(profile) = config.satellite(satellite) else {
        eprintln!("Satellite {} is not configured", satellite);
        return ExitCode::FAILURE;
    };
    let station = match config.ground_station() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let loader = match load_tles(config) {
        Ok(l) => l,
        Err(code) => return code,
    };

    let planner = Planner::new(
        loader,
        Sgp4Model,
        station,
        config.scheduler.min_elevation,
        config.scheduler.guaranteed_elevation,
    );
    let request = match planner.plan(Utc::now(), profile, immediate) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Planning failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let yaml = match serde_yaml::to_string(&request) {
        Ok(y) => y,
        Err(e) => {
            eprintln!("Error serializing request: {}", e);
            return ExitCode::FAILURE;
        }
    };
    match output {
        Some(path) => {
            if let Err(e) = fs::write(path, yaml) {
                eprintln!("Error writing {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
            println!("Observation {} written to {}", request.id, path.display());
        }
        None => print!("{}", yaml),
    }
    ExitCode::SUCCESS
}

async fn decode(config: Config, request_path: &Path, iq: PathBuf) -> ExitCode {
    let request: ObservationRequest = match fs::read_to_string(request_path)
        .map_err(|e| e.to_string())
        .and_then(|yaml| serde_yaml::from_str(&yaml).map_err(|e| e.to_string()))
    {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error reading {}: {}", request_path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let shutdown = Shutdown::new();
    let decoder = Decoder::new(config.decoder_settings(), Sgp4Model, shutdown.clone());
    let mut task = tokio::task::spawn_blocking(move || decoder.decode(&iq, &request));

    let joined = tokio::select! {
        joined = &mut task => joined,
        _ = shutdown.trigger_on(tokio::signal::ctrl_c()) => task.await,
    };
    let result = match joined {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Decode task failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&result) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing result: {}", e);
            return ExitCode::FAILURE;
        }
    }
    if result.error.is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
