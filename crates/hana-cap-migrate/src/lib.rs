//! # hana-cap-migrate
//!
//! Moves a SAP HANA export bundle into a CAP project.
//!
//! - **Schema**: per-table DDL and metadata become one CDS schema file
//! - **Data**: CSV extracts become one INSERT statement-file per table
//! - **Replay**: statement-files run through `hdbsql` or a native PostgreSQL
//!   client, resumable through the success log
//!
//! ## Example
//!
//! ```rust,no_run
//! use hana_cap_migrate::{client, pipeline, Config, ExecutionOptions, FileSelection, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> hana_cap_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let layout = pipeline::prepare_archive(&config)?;
//!     pipeline::generate_schema(&config, &layout)?;
//!     pipeline::generate_data(&config, &layout)?;
//!
//!     let client = client::connect(&config.client).await?;
//!     let orchestrator = Orchestrator::new(client, ExecutionOptions::from_config(&config));
//!     let summary = orchestrator.run(&FileSelection::All, CancellationToken::new()).await?;
//!     println!("{} files succeeded", summary.files_succeeded);
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod client;
pub mod config;
pub mod data;
pub mod error;
pub mod identifier;
pub mod orchestrator;
pub mod pipeline;
pub mod schema;
pub mod typemap;

// Re-exports for convenient access
pub use archive::ArchiveLayout;
pub use client::{DatabaseClient, OutcomeKind, StatementOutcome};
pub use config::{ClientKind, Config, Overrides};
pub use error::{MigrateError, Result};
pub use orchestrator::{ExecutionOptions, ExecutionSummary, FileSelection, Orchestrator};
pub use schema::{SchemaBuilder, SchemaModel, TableSchema};
pub use typemap::{CdsKind, TypeMapper};
