pub mod catalog;
pub mod cli;
pub mod config;
pub mod model;
pub mod sources;
pub mod storage;

use anyhow::Result;

pub use catalog::{Catalog, CatalogError};

/// Library entrypoint; wire CLI startup here.
pub async fn run(cli: cli::Cli) -> Result<()> {
    cli::execute(cli).await
}
