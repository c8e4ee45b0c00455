use clap::Parser;
use std::path::PathBuf;

/// CLI arguments for the batch admin server
#[derive(Parser, Debug)]
#[clap(name = "barback")]
#[clap(about = "Admin batch-update server for the cocktail catalog", long_about = None)]
pub struct Args {
    /// Directory holding the catalog and job databases
    #[clap(short, long, value_name = "DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Directory for batch backup snapshots (defaults to <data-dir>/backups)
    #[clap(long, value_name = "DIR")]
    pub backup_dir: Option<PathBuf>,

    /// Port to listen on
    #[clap(short, long, default_value = "3000")]
    pub port: u16,

    /// Host to bind to
    #[clap(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Shared secret admin callers must present in the x-admin-key header
    #[clap(long, value_name = "KEY")]
    pub admin_key: Option<String>,
}
