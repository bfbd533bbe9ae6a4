use super::Thing;
use super::property::{enumerate_with, load_schemas, unset_with};
use crate::core::{CancelToken, Result, Value};
use crate::formula::{EvaluationContext, Formula};
use crate::result::OperationResult;
use crate::schema::{FieldKind, Schema};
use crate::storage::Stores;
use tracing::{debug, warn};

/// Binds every property, set or not, under all of its names.
async fn bind_properties<'a>(
    thing: &'a Thing,
    schemas: &[Schema],
    stores: &Stores,
    cancel: &CancelToken,
) -> EvaluationContext<'a> {
    let mut context = EvaluationContext::new(thing);
    for unset in unset_with(thing, schemas, cancel) {
        context.bind(&unset.true_name(), Value::Null);
        context.bind(&unset.full_display_name, Value::Null);
        context.bind(&unset.simple_display_name, Value::Null);
    }
    for property in enumerate_with(thing, schemas, stores, cancel).await {
        context.bind(&property.true_name, property.value.clone());
        context.bind(&property.full_display_name, property.value.clone());
        context.bind(&property.simple_display_name, property.value);
    }
    context
}

/// Differences between stored and freshly computed calculated values.
async fn compute_changes(
    thing: &Thing,
    schemas: &[Schema],
    stores: &Stores,
    cancel: &CancelToken,
    result: &mut OperationResult,
) -> Vec<(String, Value)> {
    let context = bind_properties(thing, schemas, stores, cancel).await;
    let mut changes = Vec::new();

    for schema in schemas {
        for field in schema.fields() {
            if cancel.is_cancelled() {
                return changes;
            }
            let FieldKind::Calculated { formula } = &field.kind else {
                continue;
            };
            let Some(source) = formula.as_deref().filter(|f| !f.trim().is_empty()) else {
                result.warn(format!("{}.{} has no formula", schema.escaped_name(), field.name));
                continue;
            };

            let computed = match Formula::parse(source).and_then(|f| f.evaluate(&context)) {
                Ok(value) => value,
                Err(e) => {
                    result.warn(format!(
                        "Skipping {}.{}: {}",
                        schema.escaped_name(),
                        field.name,
                        e
                    ));
                    continue;
                }
            };

            let key = schema.qualified_key(&field.name);
            let current = thing.property(&key).cloned().unwrap_or(Value::Null);
            let unchanged = current == computed && current.type_name() == computed.type_name();
            if !unchanged {
                debug!(key = %key, from = %current, to = %computed, "calculated value changed");
                changes.push((key, computed));
            }
        }
    }

    changes
}

/// Re-evaluates every calculated field and persists the thing once if any
/// value changed. A cancelled run writes nothing.
pub async fn recompute_calculated(
    thing: &mut Thing,
    stores: &Stores,
    cancel: &CancelToken,
) -> Result<OperationResult> {
    let mut result = OperationResult::ok();
    let schemas = load_schemas(thing, stores, cancel).await?;

    let changes = compute_changes(thing, &schemas, stores, cancel, &mut result).await;
    if cancel.is_cancelled() {
        result.error(format!("Recompute of '{}' cancelled", thing.name()));
        return Ok(result);
    }

    if changes.is_empty() {
        return Ok(result);
    }

    let count = changes.len();
    for (key, value) in changes {
        thing.write_property(key, value);
    }
    thing.mark_modified();

    if stores.things.save(thing).await? {
        thing.mark_saved();
        result.info(format!("Recomputed {} value(s) on '{}'", count, thing.name()));
    } else {
        warn!(thing = thing.name(), "store declined to save recomputed values");
        result.error(format!("Could not save '{}'", thing.name()));
    }
    Ok(result)
}
