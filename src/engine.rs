use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregation::{self, GroupKey, PortfolioSummary, Rollup};
use crate::config::{EngineConfig, InvalidBatchPolicy};
use crate::decomposition::decompose;
use crate::error::LotkitError;
use crate::model::{Batch, BatchRecord, EnrichedBatch};
use crate::registry::EmissionFactorRegistry;

/// A record left out of an enrichment run.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedBatch {
    /// Position in the input sequence.
    pub index: usize,
    pub batch_id: String,
    pub reason: String,
}

/// Output of one `enrich` call: an immutable snapshot.
#[derive(Debug, Clone)]
pub struct EnrichmentRun {
    pub run_id: Uuid,
    pub computed_at: DateTime<Utc>,
    pub enriched: Vec<EnrichedBatch>,
    pub skipped: Vec<SkippedBatch>,
}

impl EnrichmentRun {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    pub fn summary(&self) -> PortfolioSummary {
        PortfolioSummary::from_enriched(&self.enriched)
    }
}

/// Applies the decomposition to batch collections.
///
/// The registry is shared read-only; swap the `Arc` between runs to reload.
#[derive(Debug, Clone)]
pub struct LotEngine {
    registry: Arc<EmissionFactorRegistry>,
    config: EngineConfig,
}

impl LotEngine {
    pub fn new(registry: Arc<EmissionFactorRegistry>, config: EngineConfig) -> Self {
        Self { registry, config }
    }

    pub fn from_config(config: EngineConfig) -> Result<Self, LotkitError> {
        let registry = EmissionFactorRegistry::from_config(&config)?;
        Ok(Self::new(Arc::new(registry), config))
    }

    pub fn registry(&self) -> &Arc<EmissionFactorRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Decompose one batch with this engine's registry and config.
    pub fn decompose(&self, batch: &Batch) -> Result<EnrichedBatch, LotkitError> {
        decompose(batch, &self.registry, &self.config)
    }

    /// Decompose every batch. Results keep input order.
    ///
    /// Invalid records (bad quantity or distance, repeated id) are handled
    /// per `InvalidBatchPolicy`: skipped and reported, or the first one in
    /// input order is returned as the error.
    pub fn enrich(&self, batches: &[Batch]) -> Result<EnrichmentRun, LotkitError> {
        let duplicates = duplicate_positions(batches);

        let results: Vec<Result<EnrichedBatch, LotkitError>> = batches
            .par_iter()
            .enumerate()
            .map(|(i, batch)| {
                if duplicates.contains(&i) {
                    return Err(LotkitError::invalid(&batch.id, "duplicate batch id in run"));
                }
                self.decompose(batch)
            })
            .collect();

        let mut enriched = Vec::with_capacity(results.len());
        let mut skipped = Vec::new();
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(e) => enriched.push(e),
                Err(err) => match self.config.invalid_batches {
                    InvalidBatchPolicy::Abort => return Err(err),
                    InvalidBatchPolicy::Skip => {
                        let batch_id = batches[index].id.clone();
                        warn!(index, batch_id = %batch_id, error = %err, "skipping batch");
                        skipped.push(SkippedBatch {
                            index,
                            batch_id,
                            reason: err.to_string(),
                        });
                    }
                },
            }
        }

        let run = EnrichmentRun {
            run_id: Uuid::new_v4(),
            computed_at: Utc::now(),
            enriched,
            skipped,
        };
        info!(
            run_id = %run.run_id,
            enriched = run.enriched.len(),
            skipped = run.skipped.len(),
            "enrichment run complete"
        );
        Ok(run)
    }

    /// Ingest raw records and enrich them in one pass. Records rejected at
    /// ingestion follow the same policy as records rejected by `enrich`,
    /// and keep their input index in the report.
    pub fn enrich_records(&self, records: Vec<BatchRecord>) -> Result<EnrichmentRun, LotkitError> {
        let mut batches = Vec::with_capacity(records.len());
        let mut positions = Vec::with_capacity(records.len());
        let mut rejected = Vec::new();
        let mut seen: HashSet<String> = HashSet::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            let batch_id = record.id.clone();
            let ingested = if seen.insert(batch_id.clone()) {
                Batch::from_record(record, &self.config)
            } else {
                Err(LotkitError::invalid(&batch_id, "duplicate batch id in run"))
            };
            match ingested {
                Ok(batch) => {
                    batches.push(batch);
                    positions.push(index);
                }
                Err(err) => match self.config.invalid_batches {
                    InvalidBatchPolicy::Abort => return Err(err),
                    InvalidBatchPolicy::Skip => {
                        warn!(index, batch_id = %batch_id, error = %err, "skipping record");
                        rejected.push(SkippedBatch {
                            index,
                            batch_id,
                            reason: err.to_string(),
                        });
                    }
                },
            }
        }

        let mut run = self.enrich(&batches)?;
        for skipped in &mut run.skipped {
            skipped.index = positions[skipped.index];
        }
        run.skipped.extend(rejected);
        run.skipped.sort_by_key(|s| s.index);
        Ok(run)
    }

    pub fn total_emissions(&self, enriched: &[EnrichedBatch]) -> f64 {
        aggregation::total_emissions(enriched)
    }

    pub fn intensity(&self, enriched: &[EnrichedBatch]) -> Result<f64, LotkitError> {
        aggregation::intensity(enriched)
    }

    pub fn group_rollup(&self, enriched: &[EnrichedBatch], keys: &[GroupKey]) -> Rollup {
        aggregation::group_rollup(enriched, keys)
    }

    pub fn supplier_count(&self, enriched: &[EnrichedBatch]) -> usize {
        aggregation::supplier_count(enriched)
    }
}

/// Indices of records whose id already appeared earlier in the input.
fn duplicate_positions(batches: &[Batch]) -> HashSet<usize> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(batches.len());
    let mut repeated = HashSet::new();
    for (i, batch) in batches.iter().enumerate() {
        if !seen.insert(batch.id.as_str()) {
            repeated.insert(i);
        }
    }
    repeated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PackagingSize;

    fn batch(id: &str, supplier: &str, quantity_kg: f64) -> Batch {
        Batch {
            id: id.into(),
            supplier_id: supplier.into(),
            product: "Aglio Nazionale".into(),
            quantity_kg,
            distance_km: 200.0,
            transport_mode: "Truck".into(),
            packaging: "Retina 150g".into(),
            packaging_size: PackagingSize::Small,
            channel: "Export".into(),
        }
    }

    fn engine(policy: InvalidBatchPolicy) -> LotEngine {
        let config = EngineConfig {
            invalid_batches: policy,
            ..EngineConfig::default()
        };
        LotEngine::from_config(config).unwrap()
    }

    #[test]
    fn enrich_keeps_input_order() {
        let batches: Vec<Batch> = (0..50)
            .map(|i| batch(&format!("L-{i:03}"), "F1", 100.0 + i as f64))
            .collect();
        let run = engine(InvalidBatchPolicy::Skip).enrich(&batches).unwrap();
        assert!(run.is_complete());
        let ids: Vec<&str> = run.enriched.iter().map(|e| e.batch.id.as_str()).collect();
        let expected: Vec<&str> = batches.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn skip_policy_reports_invalid_records() {
        let batches = vec![
            batch("L-001", "F1", 1000.0),
            batch("L-002", "F1", 0.0),
            batch("L-003", "F2", 500.0),
        ];
        let run = engine(InvalidBatchPolicy::Skip).enrich(&batches).unwrap();
        assert_eq!(run.enriched.len(), 2);
        assert_eq!(run.skipped.len(), 1);
        assert_eq!(run.skipped[0].index, 1);
        assert_eq!(run.skipped[0].batch_id, "L-002");
    }

    #[test]
    fn abort_policy_returns_first_error_in_order() {
        let mut bad_distance = batch("L-003", "F1", 10.0);
        bad_distance.distance_km = -1.0;
        let batches = vec![batch("L-001", "F1", 10.0), batch("L-002", "F1", -4.0), bad_distance];
        let err = engine(InvalidBatchPolicy::Abort).enrich(&batches).unwrap_err();
        assert!(matches!(err, LotkitError::InvalidInput { ref batch_id, .. } if batch_id == "L-002"));
    }

    #[test]
    fn duplicate_ids_are_invalid() {
        let batches = vec![batch("L-001", "F1", 10.0), batch("L-001", "F2", 20.0)];
        let run = engine(InvalidBatchPolicy::Skip).enrich(&batches).unwrap();
        assert_eq!(run.enriched.len(), 1);
        assert_eq!(run.enriched[0].batch.supplier_id, "F1");
        assert_eq!(run.skipped[0].index, 1);
    }

    #[test]
    fn enrich_records_reports_input_positions() {
        let record = |id: &str, quantity_kg: f64| BatchRecord {
            id: id.into(),
            supplier_id: "F1".into(),
            product: "Scalogno UE".into(),
            quantity_kg,
            distance_km: 1200.0,
            transport_mode: None,
            packaging: "Retina 250g".into(),
            channel: "Export".into(),
        };
        let records = vec![
            record("L-001", 0.0),
            record("L-002", 100.0),
            record("L-002", 50.0),
            record("L-004", 10.0),
        ];
        let run = engine(InvalidBatchPolicy::Skip).enrich_records(records).unwrap();
        let ids: Vec<&str> = run.enriched.iter().map(|e| e.batch.id.as_str()).collect();
        assert_eq!(ids, vec!["L-002", "L-004"]);
        let skipped: Vec<usize> = run.skipped.iter().map(|s| s.index).collect();
        assert_eq!(skipped, vec![0, 2]);
        assert_eq!(run.enriched[0].batch.transport_mode, "Truck");
    }

    #[test]
    fn enrich_records_aborts_on_ingestion_error() {
        let record = BatchRecord {
            id: "L-001".into(),
            quantity_kg: -1.0,
            ..BatchRecord::default()
        };
        let err = engine(InvalidBatchPolicy::Abort).enrich_records(vec![record]).unwrap_err();
        assert!(matches!(err, LotkitError::InvalidInput { .. }));
    }

    #[test]
    fn runs_get_distinct_ids() {
        let e = engine(InvalidBatchPolicy::Skip);
        let a = e.enrich(&[]).unwrap();
        let b = e.enrich(&[]).unwrap();
        assert_ne!(a.run_id, b.run_id);
        assert!(a.enriched.is_empty());
    }

    #[test]
    fn engine_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LotEngine>();
        assert_send_sync::<EmissionFactorRegistry>();
    }
}
