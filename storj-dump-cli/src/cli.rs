use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments of the storj-dump tool.
///
/// The tool streams a mysqldump export of a MariaDB database into a bucket, guarding the upload
/// with a scope derived from the API key and the passphrase of the Storj configuration, or with
/// the serialized scope that it carries.
#[derive(Parser, Debug)]
#[clap(
    name = "storj-dump",
    version,
    about = "Streams database dumps to Storj with capability-scoped access"
)]
pub struct Args {
    /// Log debug details and download back every upload for verifying it
    #[clap(short, long, global = true)]
    pub debug: bool,

    /// Directory where verified uploads are mirrored in debug mode
    #[clap(long, global = true, default_value = "./debug")]
    pub mirror_dir: PathBuf,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the configuration files and read the whole dump without uploading it
    Parse {
        /// Database configuration file
        #[clap(default_value = "./config/db_property.json")]
        db_config: PathBuf,

        /// Storj configuration file
        #[clap(default_value = "./config/storj_config.json")]
        storj_config: PathBuf,
    },

    /// Upload a sample dump for checking the Storj configuration
    Test {
        /// Storj configuration file
        #[clap(default_value = "./config/storj_config.json")]
        storj_config: PathBuf,

        #[clap(flatten)]
        upload: UploadArgs,
    },

    /// Dump the configured database and upload the dump
    Store {
        /// Database configuration file
        #[clap(default_value = "./config/db_property.json")]
        db_config: PathBuf,

        /// Storj configuration file
        #[clap(default_value = "./config/storj_config.json")]
        storj_config: PathBuf,

        #[clap(flatten)]
        upload: UploadArgs,
    },

    /// Initialize a local satellite directory and register a project in it
    InitNetwork {
        /// Directory of the satellite
        #[clap(default_value = "./satellite")]
        dir: PathBuf,

        /// Address that the satellite serves
        #[clap(short, long, default_value = "127.0.0.1:7777")]
        address: String,
    },
}

/// Options shared by the sub-commands that upload.
#[derive(clap::Args, Debug)]
pub struct UploadArgs {
    /// Directory of the local satellite that stores the uploads
    #[clap(short, long, default_value = "./satellite")]
    pub satellite_dir: PathBuf,

    /// Print a scope restricted with the disallow flags of the Storj configuration
    #[clap(short, long)]
    pub restrict: bool,
}
