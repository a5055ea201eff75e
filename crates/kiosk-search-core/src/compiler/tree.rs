//! Compilation of visual-builder filter trees.

use super::query::{CompiledQuery, ALWAYS_TRUE};
use super::QueryCompiler;
use crate::error::{Result, SearchError};
use crate::filter::{ContentType, FilterNode, LogicalOperator};
use tracing::debug;

impl QueryCompiler {
    /// Compile a filter tree into a condition.
    ///
    /// Leaves compile through the flat compiler and contribute only their
    /// condition. Operator and group nodes drop children that reduced to
    /// `1=1` and join the rest in parentheses; groups always use AND. A tree
    /// without any constraining leaf compiles to `1=1`.
    ///
    /// All leaves must share one content type.
    pub fn compile_tree(&self, node: &FilterNode) -> Result<CompiledQuery> {
        let mut content_type = None;
        self.compile_node(node, &mut content_type)
    }

    /// Compile a filter tree into a SELECT against its content type's table.
    ///
    /// A tree without leaves selects from the default content type.
    pub fn compile_tree_query(&self, node: &FilterNode) -> Result<CompiledQuery> {
        let mut content_type = None;
        let condition = self.compile_node(node, &mut content_type)?;
        let table = content_type.unwrap_or_default().table_name();

        Ok(CompiledQuery::new(
            format!("SELECT {}.* FROM {} WHERE {}", table, table, condition.text),
            condition.params,
        ))
    }

    fn compile_node(
        &self,
        node: &FilterNode,
        content_type: &mut Option<ContentType>,
    ) -> Result<CompiledQuery> {
        match node {
            FilterNode::Filter { filter, .. } => {
                match content_type {
                    Some(expected) if *expected != filter.content_type => {
                        return Err(SearchError::IncompatibleContentTypes {
                            expected: expected.to_string(),
                            found: filter.content_type.to_string(),
                        });
                    }
                    Some(_) => {}
                    None => *content_type = Some(filter.content_type),
                }
                Ok(self.parts(filter)?.where_body())
            }
            FilterNode::Operator {
                operator, children, ..
            } => self.compile_children(*operator, children, content_type),
            FilterNode::Group { children, .. } => {
                self.compile_children(LogicalOperator::And, children, content_type)
            }
        }
    }

    fn compile_children(
        &self,
        operator: LogicalOperator,
        children: &[FilterNode],
        content_type: &mut Option<ContentType>,
    ) -> Result<CompiledQuery> {
        let mut parts = Vec::with_capacity(children.len());
        let mut params = Vec::new();

        for child in children {
            let compiled = self.compile_node(child, content_type)?;
            if compiled.is_always_true() {
                continue;
            }
            parts.push(format!("({})", compiled.text));
            params.extend(compiled.params);
        }

        if parts.is_empty() {
            debug!("Filter tree node reduced to {}", ALWAYS_TRUE);
            return Ok(CompiledQuery::always_true());
        }

        Ok(CompiledQuery::new(
            parts.join(&format!(" {} ", operator.as_sql())),
            params,
        ))
    }
}
