//! The operation surface of a depot.
//!
//! [`Depot`] ties configuration, providers, checksums and metadata together
//! behind storage and repository ids. Mutating calls go through the
//! [`OperationValidator`] first. The [`Orchestrator`] runs regeneration jobs
//! across many repositories on top of it.
//!
//! ```no_run
//! use depot_engine::{Depot, JobReport, JobScope, Orchestrator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let configuration = depot_config::load(None)?;
//! let orchestrator = Orchestrator::new(Depot::with_defaults(configuration)?);
//! let listener = |job: &str, report: &JobReport| println!("{job}: success={}", report.is_success());
//! orchestrator.run_job("adhoc", &JobScope::default(), &listener).await;
//! # Ok(())
//! # }
//! ```

mod depot;
pub mod error;
mod orchestrator;
mod validator;

pub use crate::depot::Depot;
pub use crate::orchestrator::{JobListener, JobReport, JobScope, Orchestrator, Target, TargetReport};
pub use crate::validator::OperationValidator;
