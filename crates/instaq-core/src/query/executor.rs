//! Query executor: compile, fetch, filter.

use tracing::{debug, instrument};

use super::batch::IdentifierBatcher;
use super::evaluator::Evaluator;
use super::tree::CompiledQuery;
use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::dialect::{Dialect, SqlConnection};
use crate::error::Result;
use crate::security::{AccessFilter, AccessOracle};
use instaq_proto::InstanceQuery;

/// Runs instance queries over a borrowed connection.
pub struct QueryExecutor<'a> {
    catalog: &'a Catalog,
    dialect: &'a dyn Dialect,
    config: EngineConfig,
}

impl<'a> QueryExecutor<'a> {
    /// Create an executor with the default configuration.
    pub fn new(catalog: &'a Catalog, dialect: &'a dyn Dialect) -> Self {
        Self {
            catalog,
            dialect,
            config: EngineConfig::default(),
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Batcher sized by the configured or dialect expression limit.
    pub fn batcher(&self) -> IdentifierBatcher {
        IdentifierBatcher::new(
            self.config
                .effective_max_expressions(self.dialect.max_expressions()),
        )
    }

    /// Compile a query without running it.
    pub fn compile(&self, query: &InstanceQuery) -> Result<CompiledQuery> {
        CompiledQuery::compile(self.catalog, query, &self.config.budget)
    }

    /// Evaluate `query` on `conn`, filtered through `oracle`.
    ///
    /// The whole selection tree is compiled before the first statement runs.
    /// Any SQL error aborts the evaluation and discards what was fetched.
    #[instrument(
        skip(self, conn, query, oracle),
        fields(base_type = %query.base_type, roots = query.instances.len())
    )]
    pub fn evaluate(
        &self,
        conn: &dyn SqlConnection,
        query: &InstanceQuery,
        oracle: &dyn AccessOracle,
    ) -> Result<Evaluator<'a>> {
        let mut compiled = self.compile(query)?;
        compiled.execute(self.catalog, conn, &self.batcher(), &self.config.budget)?;
        let view = AccessFilter::new(self.catalog, oracle).apply(&compiled)?;
        debug!(rows = view.len(), dropped = view.dropped(), "evaluated query");
        Ok(Evaluator::new(self.catalog, compiled, view))
    }

    /// Allocate a fresh id for a new instance of `type_name`.
    pub fn new_id(&self, conn: &dyn SqlConnection, type_name: &str) -> Result<i64> {
        let table = self.catalog.main_table(type_name)?;
        self.dialect.new_id(conn, &table)
    }
}
