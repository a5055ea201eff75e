//! Query rewriting, prepared statements and cached execution.
//!
//! [`QueryOptimizer`] sits between the compiler and the engine. It rewrites
//! compiled text into a canonical form, registers one [`PreparedStatement`]
//! per distinct optimized text, and runs statements through result caches:
//!
//! - rows under `query:<table>:<hash>` keyed by statement id and parameters
//! - counts under `count:<table>:<hash>` keyed by COUNT text and parameters
//!
//! Table-scoped namespaces let [`QueryOptimizer::invalidate_table`] drop
//! everything read from one table.

mod plan;
mod rewrite;
mod statements;

pub use plan::{suggest_indexes, QueryPlan, ScanType};
pub use rewrite::optimize;
pub use statements::{statement_id, PreparedStatement};

use statements::StatementTable;

use crate::cache::{key_for, CacheStats, ResultCache};
use crate::clock::{Clock, SystemClock};
use crate::compiler::{CompiledQuery, QueryCompiler};
use crate::config::{OptimizerConfig, SearchConfig};
use crate::engine::{QueryExecutor, Row};
use crate::error::{Result, SearchError};
use crate::filter::{ContentType, FilterModel, FilterNode, FilterValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Snapshot of optimizer state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizerStats {
    pub statements: usize,
    pub results: CacheStats,
    pub counts: CacheStats,
}

/// Prepares, caches and runs compiled queries against an executor.
pub struct QueryOptimizer {
    executor: Arc<dyn QueryExecutor>,
    compiler: QueryCompiler,
    statements: StatementTable,
    results: Arc<ResultCache<Vec<Row>>>,
    counts: Arc<ResultCache<u64>>,
    config: OptimizerConfig,
    clock: Arc<dyn Clock>,
}

impl QueryOptimizer {
    /// Create an optimizer with default configuration and the wall clock.
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self::with_config(executor, &SearchConfig::default(), Arc::new(SystemClock))
    }

    pub fn with_config(
        executor: Arc<dyn QueryExecutor>,
        config: &SearchConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            executor,
            compiler: QueryCompiler::new(),
            statements: StatementTable::default(),
            results: Arc::new(ResultCache::with_config(
                "results",
                config.results_cache.clone(),
                Arc::clone(&clock),
            )),
            counts: Arc::new(ResultCache::with_config(
                "counts",
                config.counts_cache.clone(),
                Arc::clone(&clock),
            )),
            config: config.optimizer.clone(),
            clock,
        }
    }

    /// Use a specific compiler, e.g. one pinned to a reference date.
    pub fn with_compiler(mut self, compiler: QueryCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn compiler(&self) -> &QueryCompiler {
        &self.compiler
    }

    /// Canonical form of query text.
    pub fn optimize(&self, text: &str) -> String {
        optimize(text)
    }

    /// Register the optimized form of `query`, or reuse its statement.
    pub fn prepare(&self, query: &CompiledQuery) -> PreparedStatement {
        let text = optimize(&query.text);
        self.statements
            .prepare(text, query.params.clone(), self.clock.now_millis())
    }

    pub fn statement(&self, id: &str) -> Option<PreparedStatement> {
        self.statements.get(id)
    }

    /// Every registered statement, most used first.
    pub fn statements(&self) -> Vec<PreparedStatement> {
        self.statements.all()
    }

    /// Run a prepared statement through the results cache.
    ///
    /// `params` overrides the parameters stored with the statement.
    pub async fn execute_prepared(
        &self,
        id: &str,
        params: Option<Vec<FilterValue>>,
    ) -> Result<Vec<Row>> {
        let statement = self
            .statements
            .get(id)
            .ok_or_else(|| SearchError::StatementNotFound { id: id.to_string() })?;
        let params = params.unwrap_or_else(|| statement.params.clone());

        let namespace = format!("query:{}", statement.table().unwrap_or("unknown"));
        let key = key_for(&namespace, &(id, &params));

        let executor = Arc::clone(&self.executor);
        let text = statement.text;
        self.results
            .get_or_set(&key, Some(self.config.result_ttl), move || async move {
                debug!("Executing prepared statement {}", id);
                executor.execute(&text, &params).await
            })
            .await
    }

    /// Compile, prepare and execute a flat filter.
    pub async fn search(&self, model: &FilterModel) -> Result<Vec<Row>> {
        let compiled = self.compiler.compile(model)?;
        let statement = self.prepare(&compiled);
        self.execute_prepared(&statement.id, Some(compiled.params))
            .await
    }

    /// Compile, prepare and execute a filter tree.
    pub async fn search_tree(&self, node: &FilterNode) -> Result<Vec<Row>> {
        let compiled = self.compiler.compile_tree_query(node)?;
        let statement = self.prepare(&compiled);
        self.execute_prepared(&statement.id, Some(compiled.params))
            .await
    }

    /// Ask the engine how it would run `query`.
    ///
    /// Engine failures and empty plans yield [`QueryPlan::conservative`].
    pub async fn analyze_plan(&self, query: &CompiledQuery) -> QueryPlan {
        let text = optimize(&query.text);
        match self.executor.explain(&text, &query.params).await {
            Ok(details) if !details.is_empty() => QueryPlan::from_details(details),
            Ok(_) => {
                warn!("Engine returned an empty plan, assuming full scan");
                QueryPlan::conservative()
            }
            Err(e) => {
                warn!("Plan analysis failed, assuming full scan: {}", e);
                QueryPlan::conservative()
            }
        }
    }

    pub fn suggest_indexes(&self, model: &FilterModel) -> Vec<String> {
        suggest_indexes(model)
    }

    /// Drop stale single-use statements.
    pub fn prune_statements(&self) -> usize {
        self.statements
            .prune(self.config.statement_max_age, self.clock.now_millis())
    }

    /// Number of rows `model` matches, through the counts cache.
    pub async fn estimate_count(&self, model: &FilterModel) -> Result<u64> {
        let compiled = self.compiler.compile_count(model)?;
        let text = optimize(&compiled.text);
        let params = compiled.params;

        let namespace = format!("count:{}", model.content_type.table_name());
        let key = key_for(&namespace, &(&text, &params));

        let executor = Arc::clone(&self.executor);
        self.counts
            .get_or_set(&key, Some(self.config.count_ttl), move || async move {
                let rows = executor.execute(&text, &params).await?;
                rows.first()
                    .and_then(|row| row.get("count"))
                    .and_then(Value::as_u64)
                    .ok_or_else(|| SearchError::Execution {
                        message: "count query returned no count".to_string(),
                    })
            })
            .await
    }

    /// Drop cached rows and counts read from one content type's table.
    pub fn invalidate_table(&self, content_type: ContentType) -> usize {
        let table = content_type.table_name();
        let removed = self.results.invalidate_namespace(&format!("query:{}", table))
            + self.counts.invalidate_namespace(&format!("count:{}", table));
        debug!("Invalidated {} cached entries for {}", removed, table);
        removed
    }

    pub fn results_cache(&self) -> &Arc<ResultCache<Vec<Row>>> {
        &self.results
    }

    pub fn counts_cache(&self) -> &Arc<ResultCache<u64>> {
        &self.counts
    }

    /// Start background pruning for both caches.
    pub fn spawn_pruners(&self) -> Vec<JoinHandle<()>> {
        vec![self.results.spawn_pruner(), self.counts.spawn_pruner()]
    }

    pub fn stats(&self) -> OptimizerStats {
        OptimizerStats {
            statements: self.statements.len(),
            results: self.results.stats(),
            counts: self.counts.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::filter::MatchType;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingExecutor {
        executions: AtomicUsize,
        fail_explain: bool,
    }

    #[async_trait]
    impl QueryExecutor for RecordingExecutor {
        async fn execute(&self, sql: &str, params: &[FilterValue]) -> Result<Vec<Row>> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            let mut row = Row::new();
            if sql.starts_with("SELECT COUNT(*)") {
                row.insert("count".into(), json!(42));
            } else {
                row.insert("params".into(), json!(params.len()));
            }
            Ok(vec![row])
        }

        async fn explain(&self, _sql: &str, _params: &[FilterValue]) -> Result<Vec<String>> {
            if self.fail_explain {
                Err(SearchError::Execution {
                    message: "no such table".into(),
                })
            } else {
                Ok(vec!["SEARCH alumni USING INDEX idx_alumni_city (city=?)".into()])
            }
        }
    }

    fn optimizer(executor: Arc<RecordingExecutor>, clock: Arc<ManualClock>) -> QueryOptimizer {
        QueryOptimizer::with_config(executor, &SearchConfig::default(), clock)
    }

    fn boston() -> FilterModel {
        FilterModel::new(ContentType::Alumni).with_text("city", "Boston", MatchType::Equals)
    }

    #[test]
    fn test_equivalent_queries_share_statement() {
        let optimizer = optimizer(Arc::default(), Arc::new(ManualClock::new(0)));
        let first = optimizer.prepare(&CompiledQuery::new(
            "SELECT alumni.* FROM alumni WHERE city = ? AND 1=1",
            vec!["a".into()],
        ));
        assert_eq!(first.use_count, 1);

        let second = optimizer.prepare(&CompiledQuery::new(
            "SELECT alumni.*\n  FROM alumni WHERE 1=1 AND city = ?",
            vec!["b".into()],
        ));
        assert_eq!(second.id, first.id);
        assert_eq!(second.use_count, 2);
        assert_eq!(second.text, "SELECT alumni.* FROM alumni WHERE city = ?");

        let other = optimizer.prepare(&CompiledQuery::new(
            "SELECT alumni.* FROM alumni WHERE (city = ? OR city = ?)",
            vec![],
        ));
        assert_ne!(other.id, first.id);
        assert_eq!(optimizer.statements().len(), 2);
        assert_eq!(optimizer.statements()[0].id, first.id);
    }

    #[tokio::test]
    async fn test_execute_prepared_caches_rows() {
        let executor = Arc::new(RecordingExecutor::default());
        let optimizer = optimizer(Arc::clone(&executor), Arc::new(ManualClock::new(0)));

        let compiled = optimizer.compiler().compile(&boston()).unwrap();
        let statement = optimizer.prepare(&compiled);

        optimizer.execute_prepared(&statement.id, None).await.unwrap();
        optimizer.execute_prepared(&statement.id, None).await.unwrap();
        assert_eq!(executor.executions.load(Ordering::SeqCst), 1);

        optimizer
            .execute_prepared(&statement.id, Some(vec!["Cambridge".into()]))
            .await
            .unwrap();
        assert_eq!(executor.executions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_statement() {
        let optimizer = optimizer(Arc::default(), Arc::new(ManualClock::new(0)));
        let err = optimizer.execute_prepared("stmt_missing", None).await.unwrap_err();
        assert!(matches!(err, SearchError::StatementNotFound { .. }));
    }

    #[tokio::test]
    async fn test_result_ttl_expires() {
        let executor = Arc::new(RecordingExecutor::default());
        let clock = Arc::new(ManualClock::new(0));
        let optimizer = optimizer(Arc::clone(&executor), Arc::clone(&clock));

        optimizer.search(&boston()).await.unwrap();
        clock.advance(Duration::from_secs(301));
        optimizer.search(&boston()).await.unwrap();
        assert_eq!(executor.executions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_estimate_count_and_invalidate() {
        let executor = Arc::new(RecordingExecutor::default());
        let optimizer = optimizer(Arc::clone(&executor), Arc::new(ManualClock::new(0)));

        assert_eq!(optimizer.estimate_count(&boston()).await.unwrap(), 42);
        assert_eq!(optimizer.estimate_count(&boston()).await.unwrap(), 42);
        optimizer.search(&boston()).await.unwrap();
        assert_eq!(executor.executions.load(Ordering::SeqCst), 2);

        let untouched = optimizer.invalidate_table(ContentType::Photos);
        assert_eq!(untouched, 0);
        assert_eq!(optimizer.invalidate_table(ContentType::Alumni), 2);

        optimizer.estimate_count(&boston()).await.unwrap();
        assert_eq!(executor.executions.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_plan_failure_is_conservative() {
        let executor = Arc::new(RecordingExecutor {
            fail_explain: true,
            ..Default::default()
        });
        let optimizer = optimizer(executor, Arc::new(ManualClock::new(0)));
        let compiled = optimizer.compiler().compile(&boston()).unwrap();

        let plan = optimizer.analyze_plan(&compiled).await;
        assert_eq!(plan, QueryPlan::conservative());
    }

    #[tokio::test]
    async fn test_plan_reports_index() {
        let optimizer = optimizer(Arc::default(), Arc::new(ManualClock::new(0)));
        let compiled = optimizer.compiler().compile(&boston()).unwrap();
        let plan = optimizer.analyze_plan(&compiled).await;
        assert_eq!(plan.scan_type, ScanType::Index);
        assert_eq!(plan.cost, 10.0);
    }

    #[test]
    fn test_prune_statements_uses_clock() {
        let clock = Arc::new(ManualClock::new(0));
        let optimizer = optimizer(Arc::default(), Arc::clone(&clock));
        optimizer.prepare(&CompiledQuery::new("SELECT 1 FROM alumni", vec![]));

        clock.advance(Duration::from_secs(3600));
        assert_eq!(optimizer.prune_statements(), 0);
        clock.advance(Duration::from_millis(1));
        assert_eq!(optimizer.prune_statements(), 1);
        assert_eq!(optimizer.stats().statements, 0);
    }
}
