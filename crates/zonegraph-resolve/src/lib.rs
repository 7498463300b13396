//! # zonegraph-resolve
//!
//! External resolution for zonegraph: the privileged batch backend, the
//! DNS-over-HTTPS fallback, the result cache and the run coordinator that
//! ties them together.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zonegraph_core::{Record, RecordType, ResolverConfig};
//! use zonegraph_resolve::{BatchBackend, ResolutionCoordinator, SystemBatchBackend};
//!
//! # async fn example() -> zonegraph_core::Result<()> {
//! let config = ResolverConfig::default();
//! let records = vec![Record::new("1", RecordType::Cname, "www", "shop.myshopify.com")];
//!
//! let backend: Arc<dyn BatchBackend> = Arc::new(SystemBatchBackend::new(&config)?);
//! let coordinator = ResolutionCoordinator::standard(Some(backend), &config)?;
//! let progress = coordinator.subscribe();
//!
//! let outcome = coordinator.run(&records, "example.com", &config).await?;
//! println!("{:?} {}", *progress.borrow(), outcome.snapshot().is_some());
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod cache;
mod coordinator;
pub mod doh;
mod progress;
mod resolver;
mod run_key;
pub mod system;

pub use batch::{BatchBackend, BatchBackendResolver, BatchRequest, BatchResponse};
pub use cache::{Clock, ManualClock, ResolutionCache, SystemClock};
pub use coordinator::{CoordinatorStatus, ResolutionCoordinator, RunOutcome};
pub use doh::{DohClient, FallbackDohResolver};
pub use progress::ProgressState;
pub use resolver::{ExternalResolver, ResolveRequest, ResolverOutput};
pub use run_key::RunKey;
pub use system::SystemBatchBackend;
