use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::constants::{
    DEFAULT_BATCH_DELAY_MS, DEFAULT_NPI_API_BASE_URL, DEFAULT_NPI_API_VERSION,
    DEFAULT_TIMEOUT_SECS,
};
use crate::registry::RegistryClient;

#[derive(Parser, Debug)]
#[command(name = "npi-lookup")]
#[command(about = "NPI Registry lookups for single NPIs and spreadsheets of NPIs", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the single and batch lookup HTTP API.
    Serve(ServeArgs),
    /// Look up one NPI and print the normalized record as JSON.
    Lookup(LookupArgs),
    /// Annotate a spreadsheet of NPIs (column A, from row 2) and write an .xlsx.
    Batch(BatchArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct RegistryArgs {
    /// NPI Registry API base URL (documented at https://npiregistry.cms.hhs.gov/api-page).
    #[arg(long, default_value = DEFAULT_NPI_API_BASE_URL)]
    pub api_base_url: String,

    /// NPI Registry API version query parameter.
    #[arg(long, default_value = DEFAULT_NPI_API_VERSION)]
    pub api_version: String,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Pause between successive registry requests in a batch, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_BATCH_DELAY_MS)]
    pub delay_ms: u64,
}

impl RegistryArgs {
    pub fn client(&self) -> anyhow::Result<RegistryClient> {
        RegistryClient::new(
            &self.api_base_url,
            &self.api_version,
            Duration::from_secs(self.timeout_secs.max(1)),
        )
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 8787)]
    pub port: u16,

    /// Largest accepted upload, in MiB.
    #[arg(long, default_value_t = 16)]
    pub max_upload_mb: usize,

    #[command(flatten)]
    pub registry: RegistryArgs,
}

#[derive(clap::Args, Debug, Clone)]
pub struct LookupArgs {
    /// NPI to look up.
    pub npi: String,

    #[command(flatten)]
    pub registry: RegistryArgs,
}

#[derive(clap::Args, Debug, Clone)]
pub struct BatchArgs {
    /// Input spreadsheet (.xlsx, .xls or .csv).
    #[arg(long)]
    pub input: PathBuf,

    /// Output workbook path (.xlsx).
    #[arg(long)]
    pub output: PathBuf,

    #[command(flatten)]
    pub registry: RegistryArgs,
}
