use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use polars::prelude::DataFrame;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyModule};
use pyo3_polars::PyDataFrame;
use tracing_subscriber::EnvFilter;

use crate::aggregation::{GroupKey, PortfolioSummary};
use crate::config::EngineConfig;
use crate::engine::{EnrichmentRun, LotEngine};
use crate::error::LotkitError;
use crate::frame;
use crate::registry::EmissionFactorRegistry;
use crate::schema;

#[pyclass]
pub struct FootprintModel {
    base_path: PathBuf,
    engine: LotEngine,
    batches: Option<DataFrame>,
    run: Option<EnrichmentRun>,
}

#[pymethods]
impl FootprintModel {
    #[new]
    #[pyo3(signature = (base_path, config_file=None))]
    fn new(base_path: String, config_file: Option<&str>) -> PyResult<Self> {
        let base_path = PathBuf::from(base_path);
        let config = match config_file {
            Some(name) => EngineConfig::from_json_file(base_path.join(name))?,
            None => EngineConfig::default(),
        };
        Ok(Self {
            base_path,
            engine: LotEngine::from_config(config)?,
            batches: None,
            run: None,
        })
    }

    // ── Data loading ────────────────────────────────────────────────────────

    /// Load any CSV into a Polars DataFrame with all columns as strings.
    /// Optionally rename columns via a map.
    #[pyo3(signature = (filename, rename=None))]
    fn load_csv(
        &self,
        filename: &str,
        rename: Option<HashMap<String, String>>,
    ) -> PyResult<PyDataFrame> {
        let df = frame::read_csv_as_strings(self.base_path.join(filename), rename.as_ref())?;
        Ok(PyDataFrame(df))
    }

    /// Replace the emission factor table with `category,factor` rows.
    ///
    /// The previous registry stays untouched for any run already computed.
    /// Returns the number of loaded categories.
    #[pyo3(signature = (filename=None))]
    fn load_factors(&mut self, filename: Option<&str>) -> PyResult<usize> {
        let fname = filename.unwrap_or("factors.csv");
        let config = self.engine.config().clone();
        let registry = EmissionFactorRegistry::from_csv(self.base_path.join(fname), config.default_factor)?
            .with_transport_default(config.transport_default_factor)?;
        let loaded = registry.len();
        self.engine = LotEngine::new(Arc::new(registry), config);
        Ok(loaded)
    }

    /// Load a batches CSV.
    ///
    /// Required columns:
    ///     batch_id, supplier_id, product, quantity_kg, distance_km, packaging, channel
    /// Optional: transport_mode (derived from distance when missing or empty).
    #[pyo3(signature = (filename=None, rename=None))]
    fn load_batches(
        &mut self,
        filename: Option<&str>,
        rename: Option<HashMap<String, String>>,
    ) -> PyResult<PyDataFrame> {
        let fname = filename.unwrap_or("batches.csv");
        let df = frame::read_csv_as_strings(self.base_path.join(fname), rename.as_ref())?;
        frame::require_columns(&df, &schema::batch::REQUIRED)?;
        self.batches = Some(df.clone());
        self.run = None;
        Ok(PyDataFrame(df))
    }

    // ── Enrichment ──────────────────────────────────────────────────────────

    /// Compute emissions for a batch table (or the loaded batches) and
    /// return the augmented table.
    #[pyo3(signature = (batches=None))]
    fn enrich(&mut self, batches: Option<PyDataFrame>) -> PyResult<PyDataFrame> {
        let records = match &batches {
            Some(df) => frame::batch_records_from_frame(&df.0)?,
            None => {
                let df = self
                    .batches
                    .as_ref()
                    .ok_or_else(|| LotkitError::NotLoaded("batches".into()))?;
                frame::batch_records_from_frame(df)?
            }
        };
        let run = self.engine.enrich_records(records)?;
        let df = frame::enriched_to_frame(&run.enriched)?;
        self.run = Some(run);
        Ok(PyDataFrame(df))
    }

    /// Records left out of the last run as (index, batch_id, reason).
    fn skipped(&self) -> PyResult<Vec<(usize, String, String)>> {
        Ok(self
            .current_run()?
            .skipped
            .iter()
            .map(|s| (s.index, s.batch_id.clone(), s.reason.clone()))
            .collect())
    }

    #[getter]
    fn run_id(&self) -> PyResult<String> {
        Ok(self.current_run()?.run_id.to_string())
    }

    // ── Summaries ───────────────────────────────────────────────────────────

    fn total_emissions(&self) -> PyResult<f64> {
        Ok(self.engine.total_emissions(&self.current_run()?.enriched))
    }

    /// kg CO2e per kg, or None when total quantity is zero.
    fn intensity(&self) -> PyResult<Option<f64>> {
        match self.engine.intensity(&self.current_run()?.enriched) {
            Ok(v) => Ok(Some(v)),
            Err(LotkitError::DivisionUndefined) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn supplier_count(&self) -> PyResult<usize> {
        Ok(self.engine.supplier_count(&self.current_run()?.enriched))
    }

    /// Sum emissions per group. `group_by` takes batch column names,
    /// e.g. ["channel", "product"].
    fn group_rollup(&self, group_by: Vec<String>) -> PyResult<PyDataFrame> {
        let keys = group_by
            .iter()
            .map(|k| k.parse::<GroupKey>())
            .collect::<Result<Vec<_>, _>>()?;
        let df = frame::enriched_to_frame(&self.current_run()?.enriched)?;
        Ok(PyDataFrame(frame::rollup_frame(&df, &keys)?))
    }

    fn summary<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let s = PortfolioSummary::from_enriched(&self.current_run()?.enriched);
        let dict = PyDict::new(py);
        dict.set_item("batch_count", s.batch_count)?;
        dict.set_item("supplier_count", s.supplier_count)?;
        dict.set_item("total_quantity_kg", s.total_quantity_kg)?;
        dict.set_item("agricultural_kg", s.agricultural_kg)?;
        dict.set_item("logistics_kg", s.logistics_kg)?;
        dict.set_item("packaging_kg", s.packaging_kg)?;
        dict.set_item("total_emissions_kg", s.total_emissions_kg)?;
        dict.set_item("total_emissions_tonnes", s.total_emissions_tonnes)?;
        dict.set_item("intensity", s.intensity)?;
        dict.set_item("defaulted_batches", s.defaulted_batches)?;
        Ok(dict)
    }

    // ── Properties ──────────────────────────────────────────────────────────

    #[getter]
    fn batches_df(&self) -> PyResult<Option<PyDataFrame>> {
        Ok(self.batches.clone().map(PyDataFrame))
    }

    #[getter]
    fn enriched_df(&self) -> PyResult<Option<PyDataFrame>> {
        self.run
            .as_ref()
            .map(|run| frame::enriched_to_frame(&run.enriched).map(PyDataFrame))
            .transpose()
            .map_err(PyErr::from)
    }
}

impl FootprintModel {
    fn current_run(&self) -> Result<&EnrichmentRun, LotkitError> {
        self.run
            .as_ref()
            .ok_or_else(|| LotkitError::NotLoaded("enrichment run".into()))
    }
}

/// Export schema constants as Python submodules
fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Batch
    let batch = PyModule::new(m.py(), "batch")?;
    batch.add("BATCH_ID", schema::batch::BATCH_ID)?;
    batch.add("SUPPLIER_ID", schema::batch::SUPPLIER_ID)?;
    batch.add("PRODUCT", schema::batch::PRODUCT)?;
    batch.add("QUANTITY_KG", schema::batch::QUANTITY_KG)?;
    batch.add("DISTANCE_KM", schema::batch::DISTANCE_KM)?;
    batch.add("TRANSPORT_MODE", schema::batch::TRANSPORT_MODE)?;
    batch.add("PACKAGING", schema::batch::PACKAGING)?;
    batch.add("PACKAGING_SIZE", schema::batch::PACKAGING_SIZE)?;
    batch.add("CHANNEL", schema::batch::CHANNEL)?;
    m.add_submodule(&batch)?;

    // Emissions
    let emissions = PyModule::new(m.py(), "emissions")?;
    emissions.add("CO2_AGRI_KG", schema::emissions::CO2_AGRI_KG)?;
    emissions.add("CO2_LOGISTICS_KG", schema::emissions::CO2_LOGISTICS_KG)?;
    emissions.add("CO2_PACKAGING_KG", schema::emissions::CO2_PACKAGING_KG)?;
    emissions.add("TOTAL_CO2E_KG", schema::emissions::TOTAL_CO2E_KG)?;
    m.add_submodule(&emissions)?;

    // Audit flags
    let audit = PyModule::new(m.py(), "audit")?;
    audit.add("AGRI_DEFAULT_FACTOR", schema::audit::AGRI_DEFAULT_FACTOR)?;
    audit.add(
        "LOGISTICS_DEFAULT_FACTOR",
        schema::audit::LOGISTICS_DEFAULT_FACTOR,
    )?;
    audit.add(
        "PACKAGING_DEFAULT_FACTOR",
        schema::audit::PACKAGING_DEFAULT_FACTOR,
    )?;
    m.add_submodule(&audit)?;

    // Factors
    let factors = PyModule::new(m.py(), "factors")?;
    factors.add("CATEGORY", schema::factors::CATEGORY)?;
    factors.add("FACTOR", schema::factors::FACTOR)?;
    m.add_submodule(&factors)?;

    // Rollup
    let rollup = PyModule::new(m.py(), "rollup")?;
    rollup.add("BATCH_COUNT", schema::rollup::BATCH_COUNT)?;
    rollup.add("QUANTITY_KG_SUM", schema::rollup::QUANTITY_KG_SUM)?;
    rollup.add("TOTAL_CO2E_KG_SUM", schema::rollup::TOTAL_CO2E_KG_SUM)?;
    m.add_submodule(&rollup)?;

    Ok(())
}

#[pymodule]
fn carbon_lotkit(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // RUST_LOG controls verbosity; a host that already set a subscriber wins.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    m.add_class::<FootprintModel>()?;
    add_schema_exports(m)?;
    Ok(())
}
