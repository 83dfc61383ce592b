use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::Path;

use rawimg::config::{self, CONFIG_FILE};
use rawimg::disk::{self, DiskAction};

#[derive(Parser)]
#[command(name = "rawimg")]
#[command(about = "Build GPT raw disk images and convert them for cloud import", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Disk(DiskAction),

    /// Generate configuration file (.rawimg.toml) in current directory
    Genconfig {
        /// Force overwrite existing configuration file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    // Initialize logger, default info level, display file line number and time
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            let level_style = buf.default_level_style(record.level());
            writeln!(
                buf,
                "[{} {level_style}{}{level_style:#} {}:{}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .init();

    let cli = Cli::parse();

    let app_config = if Path::new(CONFIG_FILE).exists() {
        match config::AppConfig::load_from_file(CONFIG_FILE) {
            Ok(cfg) => {
                let abs_path = std::fs::canonicalize(CONFIG_FILE)
                    .unwrap_or_else(|_| std::path::PathBuf::from(CONFIG_FILE));
                info!("Using configuration file: {}", abs_path.display());
                Some(cfg)
            }
            Err(e) => {
                error!("Failed to load configuration file: {}, using defaults", e);
                None
            }
        }
    } else {
        None
    };

    match cli.command {
        Commands::Disk(action) => {
            if let Err(e) = disk::run(action, app_config.as_ref().and_then(|c| c.build.as_ref())) {
                if let Some(image_err) = e.downcast_ref::<disk::ImageError>() {
                    error!("{:?} phase failed: {e:#}", image_err.phase());
                } else {
                    error!("{e:#}");
                }
                std::process::exit(1);
            }
        }

        Commands::Genconfig { force } => {
            if let Err(e) = config::AppConfig::generate_config_file(CONFIG_FILE, force) {
                error!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
