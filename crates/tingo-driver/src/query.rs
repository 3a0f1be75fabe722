//! Query builder
//!
//! Compiles query expression trees into native filter documents. The
//! compiled filter mirrors the tree node for node:
//!
//! ```text
//! AND [ EQUAL a 1, OR [ IN b [..], REGEX c "^x" ] ]
//!   => { "$and": [ { "a": { "$eq": 1 } },
//!                  { "$or": [ { "b": { "$in": [..] } }, { "c": { "$regex": "^x" } } ] } ] }
//! ```

use crate::mapping::{Expression, IndexDescriptor, QueryOperator, SortKey};
use bson::{Bson, Document};
use tingo_common::Result;

pub struct QueryBuilder;

impl QueryBuilder {
    /// Compile an expression tree; no tree gives the empty (match-all) filter
    pub fn compile(expression: Option<&Expression>) -> Document {
        match expression {
            Some(expression) => Self::compile_node(expression),
            None => Document::new(),
        }
    }

    /// Compile a tree given in the upstream document form
    ///
    /// Fails with `UnknownOperator` when any node carries an unknown tag.
    pub fn compile_document(node: &Document) -> Result<Document> {
        let expression = Expression::from_document(node)?;
        Ok(Self::compile_node(&expression))
    }

    /// Sort keys as `(field, 1 | -1)` pairs
    pub fn compile_sort(keys: &[SortKey]) -> Vec<(String, i32)> {
        keys.iter()
            .map(|key| (key.field.clone(), key.direction.native_order()))
            .collect()
    }

    /// Index fields as an ordered `{field: 1 | -1}` document
    pub fn compile_index_keys(index: &IndexDescriptor) -> Document {
        let mut keys = Document::new();
        for field in &index.fields {
            keys.insert(field.name.clone(), field.order.native_order());
        }
        keys
    }

    fn compile_node(expression: &Expression) -> Document {
        let mut filter = Document::new();

        match expression {
            Expression::And(children) | Expression::Or(children) => {
                let compiled: Vec<Bson> = children
                    .iter()
                    .map(|child| Bson::Document(Self::compile_node(child)))
                    .collect();
                filter.insert(expression.operator().native_token(), compiled);
            }
            Expression::Not(child) => {
                filter.insert(QueryOperator::Not.native_token(), Self::compile_node(child));
            }
            Expression::Comparison {
                operator,
                field,
                value,
            } => {
                let mut condition = Document::new();
                condition.insert(operator.operator().native_token(), value.clone());
                filter.insert(field.clone(), condition);
            }
        }

        filter
    }
}
