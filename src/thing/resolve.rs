//! Property set resolution.
//!
//! A user refers to a property by true name, full display name
//! (`Person.[First Name]`) or simple display name (`[First Name]`). Each
//! request resolves to zero candidates (a free-form property), one candidate
//! (existing or a schema-declared phantom) or many (ambiguous, refused).

use super::Thing;
use super::carve::carve;
use super::property::{ThingProperty, enumerate_with, load_schemas};
use crate::config::EngineConfig;
use crate::core::names::{NAME_PROPERTY, PLURAL_WORD, escape, names_match, unescape, validate_property_name};
use crate::core::{CancelToken, Result, Value};
use crate::result::OperationResult;
use crate::schema::{FieldKind, Schema, Unmassageable};
use crate::storage::{NameMatch, Stores};
use futures::StreamExt;
use futures::stream::BoxStream;
use tracing::debug;
use uuid::Uuid;

/// Picks one of several reference targets matching a typed name. Returning
/// `None` declines; the typed text is then stored as-is.
pub trait Chooser: Send + Sync {
    fn choose(&self, prompt: &str, candidates: &[NameMatch]) -> Option<Uuid>;
}

impl<F> Chooser for F
where
    F: Fn(&str, &[NameMatch]) -> Option<Uuid> + Send + Sync,
{
    fn choose(&self, prompt: &str, candidates: &[NameMatch]) -> Option<Uuid> {
        self(prompt, candidates)
    }
}

struct Candidate {
    property: ThingProperty,
    /// Input run through the schema field's massage, for schema-backed candidates.
    massaged: Option<std::result::Result<Value, Unmassageable>>,
}

fn refers_to(name: &str, true_name: &str, full: &str, simple: &str) -> bool {
    if names_match(name, true_name) {
        return true;
    }
    !names_match(name, PLURAL_WORD) && (names_match(name, full) || names_match(name, simple))
}

async fn gather_candidates(
    thing: &Thing,
    name: &str,
    input: &Value,
    schemas: &[Schema],
    stores: &Stores,
    cancel: &CancelToken,
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = enumerate_with(thing, schemas, stores, cancel)
        .await
        .into_iter()
        .filter(|p| {
            refers_to(
                name,
                &p.true_name,
                &p.full_display_name,
                &p.simple_display_name,
            )
        })
        .map(|property| Candidate {
            property,
            massaged: None,
        })
        .collect();

    for schema in schemas {
        for field in schema.fields() {
            let key = schema.qualified_key(&field.name);
            let carved = carve(&key, Some(schema));
            if !refers_to(
                name,
                &key,
                &carved.full_display_name,
                &carved.simple_display_name,
            ) {
                continue;
            }

            let massaged = field.massage(input);
            let valid = match &massaged {
                Ok(value) => field.validate(value, stores).await,
                Err(_) => false,
            };

            if let Some(existing) = candidates
                .iter_mut()
                .find(|c| c.property.true_name == key)
            {
                existing.property.valid = valid;
                existing.massaged = Some(massaged);
                continue;
            }

            let mut phantom = ThingProperty::from_carved(&key, carved, Value::Null);
            phantom.schema_id = Some(schema.id());
            phantom.schema_name = Some(schema.name().to_string());
            phantom.valid = valid;
            phantom.required = field.required;
            phantom.field = Some(field.clone());
            candidates.push(Candidate {
                property: phantom,
                massaged: Some(massaged),
            });
        }
    }

    candidates
}

async fn collect_matches(
    mut matches: BoxStream<'_, NameMatch>,
    cancel: &CancelToken,
) -> Vec<NameMatch> {
    let mut collected = Vec::new();
    while let Some(found) = matches.next().await {
        if cancel.is_cancelled() {
            break;
        }
        collected.push(found);
    }
    collected
}

/// Looks a typed reference up by partial name. Returns the id to store,
/// or `None` to store the typed text as-is.
async fn disambiguate(
    kind: &FieldKind,
    typed: &Value,
    chooser: &dyn Chooser,
    stores: &Stores,
    cancel: &CancelToken,
    result: &mut OperationResult,
) -> Option<Uuid> {
    let text = typed.to_literal();
    let (what, matches) = match kind {
        FieldKind::SchemaRef => (
            "schema",
            collect_matches(stores.schemas.find_by_partial_name(&text), cancel).await,
        ),
        FieldKind::Ref { schema_id } => (
            "thing",
            collect_matches(stores.things.find_by_partial_name(*schema_id, &text), cancel).await,
        ),
        _ => return None,
    };

    match matches.as_slice() {
        [] => {
            result.warn(format!("No {} matches '{}'", what, text));
            None
        }
        [only] => {
            debug!(text = %text, id = %only.id, "reference resolved by name");
            Some(only.id)
        }
        many => {
            let prompt = format!("Several {}s match '{}'. Which one?", what, text);
            match chooser.choose(&prompt, many) {
                Some(id) if many.iter().any(|m| m.id == id) => Some(id),
                Some(id) => {
                    result.warn(format!("Chosen id {} was not one of the offered {}s", id, what));
                    None
                }
                None => {
                    result.warn(format!("No {} chosen for '{}'", what, text));
                    None
                }
            }
        }
    }
}

fn set_name(thing: &mut Thing, value: &Value, result: &mut OperationResult) {
    if value.is_empty() {
        result.error(format!("{} cannot be empty", NAME_PROPERTY));
        return;
    }
    if let Err(e) = thing.set_name(&value.to_literal()) {
        result.error(e.to_string());
    }
}

fn set_free_form(thing: &mut Thing, name: &str, value: &Value, result: &mut OperationResult) {
    if names_match(name, NAME_PROPERTY) {
        set_name(thing, value, result);
        return;
    }

    let key = unescape(name);
    if value.is_empty() {
        if thing.erase_property(&key) {
            thing.mark_modified();
            debug!(key = %key, "free-form property removed");
        }
    } else if thing.write_property(key.clone(), value.clone()) {
        thing.mark_modified();
        debug!(key = %key, "free-form property set");
    }
}

#[allow(clippy::too_many_arguments)]
async fn set_candidate(
    thing: &mut Thing,
    name: &str,
    input: &Value,
    candidate: Candidate,
    chooser: Option<&dyn Chooser>,
    stores: &Stores,
    cancel: &CancelToken,
    result: &mut OperationResult,
) {
    let Candidate { property, massaged } = candidate;
    let (mut value, mut valid) = match massaged {
        Some(Ok(value)) => (value, property.valid),
        Some(Err(unmassageable)) => {
            result.warn(unmassageable.to_string());
            (input.clone(), false)
        }
        None => (input.clone(), property.valid || property.field.is_none()),
    };

    if names_match(name, NAME_PROPERTY) && value.is_empty() {
        result.error(format!("{} cannot be empty", NAME_PROPERTY));
        return;
    }

    if value.is_empty() {
        if thing.erase_property(&property.true_name) {
            thing.mark_modified();
        }
        if property.required {
            result.warn(format!("{} is required", property.full_display_name));
        }
        return;
    }

    if !valid {
        if let (Some(chooser), Some(kind)) = (chooser, property.kind()) {
            if kind.is_reference() {
                if let Some(id) = disambiguate(kind, &value, chooser, stores, cancel, result).await {
                    value = Value::Text(id.to_string());
                    valid = true;
                }
            }
        }
    }

    if cancel.is_cancelled() {
        result.error(format!("Set cancelled before {}", escape(name)));
        return;
    }

    if !valid {
        let expected = property
            .kind()
            .map(|k| k.describe(true))
            .unwrap_or_else(|| "value".to_string());
        result.warn(format!(
            "'{}' is not a valid {} for {}; stored anyway",
            value, expected, property.full_display_name
        ));
    }

    if thing.write_property(property.true_name.clone(), value) {
        thing.mark_modified();
    }
}

/// Applies `(name, value)` pairs to `thing` in order.
///
/// Every name is checked syntactically before anything is touched. An
/// ambiguous name fails only its own pair; later pairs still apply and the
/// overall result reports failure. Nothing is saved.
pub async fn set(
    thing: &mut Thing,
    pairs: &[(String, Value)],
    chooser: Option<&dyn Chooser>,
    stores: &Stores,
    config: &EngineConfig,
    cancel: &CancelToken,
) -> Result<OperationResult> {
    for (name, _) in pairs {
        if let Err(e) = validate_property_name(name, &config.reserved_names) {
            return Ok(OperationResult::failed(e.to_string()));
        }
    }

    let chooser = if config.interactive { chooser } else { None };
    let schemas = load_schemas(thing, stores, cancel).await?;
    let mut result = OperationResult::ok();

    for (name, value) in pairs {
        if cancel.is_cancelled() {
            result.error(format!("Set cancelled before {}", escape(name.trim())));
            break;
        }

        let name = name.trim();
        let mut candidates = gather_candidates(thing, name, value, &schemas, stores, cancel).await;
        if cancel.is_cancelled() {
            result.error(format!("Set cancelled before {}", escape(name)));
            break;
        }

        if candidates.len() > 1 {
            let colliding: Vec<&str> = candidates
                .iter()
                .map(|c| c.property.true_name.as_str())
                .collect();
            result.error(format!(
                "'{}' is ambiguous; it matches {}",
                name,
                colliding.join(", ")
            ));
            continue;
        }

        match candidates.pop() {
            None => set_free_form(thing, name, value, &mut result),
            Some(candidate) => {
                set_candidate(
                    thing,
                    name,
                    value,
                    candidate,
                    chooser,
                    stores,
                    cancel,
                    &mut result,
                )
                .await
            }
        }
    }

    Ok(result)
}
