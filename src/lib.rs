//! Carbon footprint engine for agricultural supply-chain lots.
//!
//! Batches are decomposed into agricultural, logistics and packaging
//! emissions (kg CO2e) using an emission factor registry, then rolled up
//! into portfolio totals, intensity and grouped views.

pub mod aggregation;
pub mod config;
pub mod decomposition;
pub mod engine;
pub mod error;
pub mod frame;
pub mod model;
pub mod registry;
pub mod schema;

#[cfg(feature = "python")]
mod python;

pub use aggregation::{GroupKey, PortfolioSummary, Rollup, RollupNode, RollupRow};
pub use config::{EngineConfig, InvalidBatchPolicy, PackagingClass, PackagingPolicy, TransportPolicy};
pub use decomposition::decompose;
pub use engine::{EnrichmentRun, LotEngine, SkippedBatch};
pub use error::LotkitError;
pub use model::{Batch, BatchRecord, EmissionBreakdown, EnrichedBatch, FactorAudit, PackagingSize};
pub use registry::{EmissionFactorRegistry, FactorKind, FactorLookup};
