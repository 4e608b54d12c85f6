//! Eager loading of relations.
//!
//! Preloading runs above the [`Storage`] trait: for each requested relation
//! the related rows are fetched with one `IN` query and attached to the
//! decoded parent objects under the relation's name. Dotted paths
//! (`"account.keys"`) recurse into the loaded rows.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;

use serde_json::{Map, Value};

use crate::core::codec::decode_row;
use crate::core::{RelationKind, SelectStatement, Storage, TableSchema};
use crate::error::{QueryError, StorageResult};
use crate::query::{self, SqlValue};
use crate::types::SortOrder;

type Row = Map<String, Value>;

type PreloadFuture<'a> = Pin<Box<dyn Future<Output = StorageResult<()>> + Send + 'a>>;

/// Splits dotted paths into first segment and nested remainders.
fn path_tree<'a, I>(paths: I) -> BTreeMap<String, BTreeSet<String>>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut tree: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for path in paths {
        let mut parts = path.splitn(2, '.');
        let Some(head) = parts.next().filter(|h| !h.is_empty()) else {
            continue;
        };
        let nested = tree.entry(head.to_string()).or_default();
        if let Some(rest) = parts.next().filter(|r| !r.is_empty()) {
            nested.insert(rest.to_string());
        }
    }
    tree
}

fn key_of(value: &Value) -> String {
    value.to_string()
}

/// Loads `paths` for every row and attaches the results in place.
pub(crate) fn preload<'a>(
    storage: &'a dyn Storage,
    schema: &'static TableSchema,
    rows: &'a mut [Row],
    paths: &'a BTreeSet<String>,
) -> PreloadFuture<'a> {
    Box::pin(async move {
        if rows.is_empty() {
            return Ok(());
        }

        for (name, nested) in path_tree(paths) {
            let relation = schema
                .relation(&name)
                .ok_or_else(|| QueryError::UnknownRelation {
                    table: schema.name.to_string(),
                    relation: name.clone(),
                })?;
            let target = (relation.target)();
            let local_key = relation.local_key();
            let remote_key = relation.remote_key();

            let mut keys: BTreeMap<String, SqlValue> = BTreeMap::new();
            for row in rows.iter() {
                if let Some(value) = row.get(local_key).filter(|v| !v.is_null()) {
                    keys.insert(key_of(value), SqlValue::from_json(value));
                }
            }

            let mut related: Vec<Row> = Vec::new();
            if !keys.is_empty() {
                let statement = SelectStatement::new(target)
                    .with_filter(query::eq(remote_key, keys.into_values().collect::<Vec<_>>()))
                    .with_order_by(target.primary_key, SortOrder::Asc, false);
                for record in storage.fetch(&statement).await? {
                    related.push(decode_row(target, &record)?);
                }
                if !nested.is_empty() {
                    preload(storage, target, &mut related, &nested).await?;
                }
            }

            let mut grouped: BTreeMap<String, Vec<Row>> = BTreeMap::new();
            for row in related {
                let key = row.get(remote_key).map(key_of).unwrap_or_default();
                grouped.entry(key).or_default().push(row);
            }

            for row in rows.iter_mut() {
                let matches = row
                    .get(local_key)
                    .filter(|v| !v.is_null())
                    .and_then(|v| grouped.get(&key_of(v)));
                let attached = match relation.kind {
                    RelationKind::HasMany => Value::Array(
                        matches
                            .map(|m| m.iter().cloned().map(Value::Object).collect())
                            .unwrap_or_default(),
                    ),
                    RelationKind::BelongsTo | RelationKind::HasOne => matches
                        .and_then(|m| m.first())
                        .cloned()
                        .map(Value::Object)
                        .unwrap_or(Value::Null),
                };
                row.insert(relation.name.to_string(), attached);
            }

            tracing::debug!(
                table = schema.name,
                relation = relation.name,
                "Preloaded relation"
            );
        }

        Ok(())
    })
}
