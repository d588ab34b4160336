use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use storj_dump::config::StorjConfig;
use storj_dump::pipeline::{Options, Outcome};
use storj_dump::project::local::LocalSatellite;
use storj_dump::source::{ByteSource, CommandSource, ReaderSource};
use storj_dump::Pipeline;

mod cli;
mod mariadb;

use cli::{Args, Commands, UploadArgs};
use mariadb::DatabaseConfig;

/// The dump uploaded by the `test` sub-command.
const SAMPLE_DUMP: &str = "DROP TABLE IF EXISTS `HelloStorj`;\n";
const SAMPLE_DATABASE: &str = "testdb";

fn main() -> Result<()> {
    let args = Args::parse();
    initialize_logging(args.debug)?;

    let options = Options {
        debug: args.debug,
        mirror_dir: Some(args.mirror_dir.clone()),
    };

    match &args.command {
        Commands::Parse {
            db_config,
            storj_config,
        } => {
            let db = DatabaseConfig::load(db_config)?;
            let storj = load_storj_config(storj_config)?;
            println!("{:#?}", db);
            println!("{:#?}", storj);

            info!("Reading all the data of database {} from {}", db.database, db.hostname);
            let source = CommandSource::spawn(db.dump_command())
                .with_context(|| format!("Failed to run {}", mariadb::DUMP_PROGRAM))?;
            let bytes = mariadb::drain_dump(source)?;
            info!("Fetched {} bytes of the dump of {}", bytes, db.database);
        }
        Commands::Test {
            storj_config,
            upload,
        } => {
            let storj = load_storj_config(storj_config)?;
            info!("Uploading a sample dump of {}", SAMPLE_DATABASE);
            let source = ReaderSource::new(SAMPLE_DUMP.as_bytes());
            let outcome = upload_dump(upload, options, &storj, source, SAMPLE_DATABASE)?;
            report(&outcome, upload.restrict);
        }
        Commands::Store {
            db_config,
            storj_config,
            upload,
        } => {
            let db = DatabaseConfig::load(db_config)?;
            let storj = load_storj_config(storj_config)?;

            info!("Dumping database {} from {}", db.database, db.hostname);
            let source = CommandSource::spawn(db.dump_command())
                .with_context(|| format!("Failed to run {}", mariadb::DUMP_PROGRAM))?;
            let outcome = upload_dump(upload, options, &storj, source, &db.database)?;
            report(&outcome, upload.restrict);
        }
        Commands::InitNetwork { dir, address } => {
            let satellite = LocalSatellite::init(dir, address)
                .with_context(|| format!("Failed to initialize satellite in {}", dir.display()))?;
            let api_key = satellite
                .register_project()
                .and_then(|key| key.serialize())
                .context("Failed to register a project")?;

            info!("Satellite {} initialized in {}", address, dir.display());
            println!("API key: {}", api_key);
        }
    }

    Ok(())
}

fn initialize_logging(debug: bool) -> Result<()> {
    let log_level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logger")
}

fn load_storj_config(path: &Path) -> Result<StorjConfig> {
    StorjConfig::load(path)
        .with_context(|| format!("Failed to load Storj configuration {}", path.display()))
}

fn upload_dump<B: ByteSource>(
    upload: &UploadArgs,
    options: Options,
    config: &StorjConfig,
    source: B,
    database: &str,
) -> Result<Outcome> {
    let satellite = LocalSatellite::open(&upload.satellite_dir).with_context(|| {
        format!(
            "Failed to open satellite directory {}",
            upload.satellite_dir.display()
        )
    })?;

    Pipeline::new(satellite, options)
        .run(config, source, database, upload.restrict)
        .with_context(|| format!("Failed to upload the dump of {}", database))
}

fn report(outcome: &Outcome, restricted: bool) {
    info!(
        "Uploaded {} bytes to {}/{}",
        outcome.upload.bytes, outcome.upload.bucket, outcome.upload.key
    );
    if let Some(verification) = &outcome.verification {
        info!("Verified {} bytes", verification.bytes);
        if let Some(path) = &verification.mirrored_to {
            info!("Mirrored to {}", path.display());
        }
    }
    if let Some(token) = &outcome.token {
        println!("{}: {}", token_label(restricted), token);
    }
}

fn token_label(restricted: bool) -> &'static str {
    if restricted {
        "Restricted serialized scope"
    } else {
        "Serialized scope"
    }
}
