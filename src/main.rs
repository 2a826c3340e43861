mod batch;
mod cli;
mod constants;
mod error;
mod npi;
mod registry;
mod server;
mod sheet;
#[cfg(test)]
mod test_support;

use anyhow::Context;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    match args.cmd {
        cli::Command::Serve(cmd) => server::run(cmd).await.context("serve failed"),
        cli::Command::Lookup(cmd) => lookup_one(cmd).await.context("lookup failed"),
        cli::Command::Batch(cmd) => annotate_file(cmd).await.context("batch failed"),
    }
}

async fn lookup_one(cmd: cli::LookupArgs) -> anyhow::Result<()> {
    let number = cmd.npi.trim();
    anyhow::ensure!(!number.is_empty(), "No NPI provided");

    let registry = cmd.registry.client()?;
    let result = npi::lookup_npi(&registry, number).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn annotate_file(cmd: cli::BatchArgs) -> anyhow::Result<()> {
    let file_name = cmd.input.display().to_string();
    let bytes =
        std::fs::read(&cmd.input).with_context(|| format!("Failed reading {file_name}"))?;
    let book = sheet::Book::from_upload(&file_name, &bytes)?;
    tracing::info!(
        "Read {} rows from sheet {:?} of {}",
        book.target().row_count(),
        book.target_name(),
        file_name
    );

    let registry = cmd.registry.client()?;
    let outcome = batch::run_batch(&registry, book, cmd.registry.delay()).await?;

    let workbook = outcome.book.to_xlsx()?;
    if let Some(parent) = cmd.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed creating {}", parent.display()))?;
    }
    std::fs::write(&cmd.output, workbook)
        .with_context(|| format!("Failed writing {}", cmd.output.display()))?;
    tracing::info!(
        "Wrote {} ({} rows, {} failed)",
        cmd.output.display(),
        outcome.log.len(),
        outcome.failed_count()
    );

    println!("{}", serde_json::to_string_pretty(&outcome.log)?);
    Ok(())
}
