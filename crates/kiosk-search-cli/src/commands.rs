//! Subcommand handlers. Each returns the JSON document to print.

use anyhow::{bail, Context, Result};
use kiosk_search::{
    validate_value, CompiledQuery, ContentType, FilterModel, FilterNode, QueryCompiler,
    QueryExecutor, QueryOptimizer, QueryPlan, SearchConfig, SqliteEntryStore, SqliteExecutor,
    SuggestionRanker, SystemClock,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

const HISTORY_NAMESPACE: &str = "history";
const POPULARITY_NAMESPACE: &str = "popularity";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExplainOutput {
    statement_id: String,
    query: CompiledQuery,
    plan: QueryPlan,
}

pub fn load_config(path: Option<&Path>) -> Result<SearchConfig> {
    match path {
        Some(path) => SearchConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(SearchConfig::default()),
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

/// Load and validate a flat filter.
fn load_filter(path: &Path) -> Result<FilterModel> {
    let payload = read_json(path)?;
    let result = validate_value(&payload);
    for warning in &result.warnings {
        warn!("{}: {}", warning.field, warning.message);
    }
    if !result.is_valid {
        let messages: Vec<String> = result
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        bail!("Invalid filter in {}: {}", path.display(), messages.join("; "));
    }
    Ok(serde_json::from_value(payload)?)
}

fn load_tree(path: &Path) -> Result<FilterNode> {
    let payload = read_json(path)?;
    serde_json::from_value(payload)
        .with_context(|| format!("{} is not a filter tree", path.display()))
}

fn compile_file(compiler: &QueryCompiler, path: &Path, tree: bool) -> Result<CompiledQuery> {
    let query = if tree {
        compiler.compile_tree_query(&load_tree(path)?)?
    } else {
        compiler.compile(&load_filter(path)?)?
    };
    Ok(query)
}

fn open_optimizer(config: &SearchConfig, db: &Path) -> Result<QueryOptimizer> {
    if !db.exists() {
        bail!("Database not found: {}", db.display());
    }
    let executor: Arc<dyn QueryExecutor> = Arc::new(SqliteExecutor::open(db)?);
    Ok(QueryOptimizer::with_config(executor, config, Arc::new(SystemClock)))
}

pub fn validate(filter: &Path) -> Result<Value> {
    let result = validate_value(&read_json(filter)?);
    Ok(serde_json::to_value(result)?)
}

pub fn compile(filter: &Path, tree: bool, optimize: bool) -> Result<Value> {
    let mut query = compile_file(&QueryCompiler::new(), filter, tree)?;
    if optimize {
        query.text = kiosk_search::optimize(&query.text);
    }
    Ok(serde_json::to_value(query)?)
}

pub async fn explain(config: &SearchConfig, filter: &Path, db: &Path, tree: bool) -> Result<Value> {
    let optimizer = open_optimizer(config, db)?;
    let query = compile_file(optimizer.compiler(), filter, tree)?;
    let statement = optimizer.prepare(&query);
    let plan = optimizer.analyze_plan(&query).await;

    Ok(serde_json::to_value(ExplainOutput {
        statement_id: statement.id,
        query: CompiledQuery::new(statement.text, statement.params),
        plan,
    })?)
}

pub async fn search(config: &SearchConfig, filter: &Path, db: &Path, tree: bool) -> Result<Value> {
    let optimizer = open_optimizer(config, db)?;
    let rows = if tree {
        optimizer.search_tree(&load_tree(filter)?).await?
    } else {
        optimizer.search(&load_filter(filter)?).await?
    };
    info!("{} rows", rows.len());
    Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
}

pub fn indexes(filter: &Path) -> Result<Value> {
    let model = load_filter(filter)?;
    Ok(json!(kiosk_search::optimizer::suggest_indexes(&model)))
}

type RankerStores = (SuggestionRanker, SqliteEntryStore, SqliteEntryStore);

fn open_ranker(config: &SearchConfig, db: &Path) -> Result<RankerStores> {
    let history = SqliteEntryStore::open(db, HISTORY_NAMESPACE)?;
    let popularity = history.namespace(POPULARITY_NAMESPACE);
    let ranker = SuggestionRanker::with_config(config.ranker.clone(), Arc::new(SystemClock));
    ranker.load(&history, &popularity)?;
    Ok((ranker, history, popularity))
}

pub fn suggest(
    config: &SearchConfig,
    history_db: &Path,
    input: &str,
    content_type: Option<ContentType>,
) -> Result<Value> {
    let (ranker, _, _) = open_ranker(config, history_db)?;
    Ok(serde_json::to_value(ranker.suggest(input, content_type))?)
}

pub fn record(config: &SearchConfig, history_db: &Path, query: &str, results: u64) -> Result<Value> {
    if query.trim().is_empty() {
        bail!("Query must not be empty");
    }
    let (ranker, history, popularity) = open_ranker(config, history_db)?;
    ranker.record_search(query, results, None);
    ranker.persist(&history, &popularity)?;
    Ok(serde_json::to_value(ranker.history())?)
}
