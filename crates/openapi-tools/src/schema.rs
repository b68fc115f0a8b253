//! Schema resolution.
//!
//! Turns a raw schema node (inline or `$ref`) into a [`Schema`] tree. Resolution is a pure,
//! synchronous walk over the in-memory document:
//!
//! - A `$ref` already on the current recursion path is a cycle: that branch resolves to `None`
//!   and a warning is logged. The path is scoped per branch, so a cycle in one property never
//!   hides the same schema from a sibling property.
//! - Recursion deeper than `max_depth` resolves to `None` with a warning.
//! - A `$ref` that points nowhere is an error for the whole resolution.
//!
//! Property order always follows the document.

use crate::document::ApiDocument;
use crate::error::Result;
use crate::model::{ANY_OF, INLINE, ITEM, MERGED, Schema, SchemaProperty, SchemaType};
use serde_json::{Map, Value};
use tracing::warn;

pub const DEFAULT_MAX_DEPTH: usize = 10;

pub struct SchemaResolver<'a> {
    document: &'a ApiDocument,
    max_depth: usize,
}

impl<'a> SchemaResolver<'a> {
    #[must_use]
    pub fn new(document: &'a ApiDocument) -> Self {
        Self {
            document,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Resolve a schema node from the top.
    ///
    /// # Errors
    ///
    /// Returns an error if a `$ref` in the tree cannot be resolved.
    pub fn resolve(&self, node: &Value) -> Result<Option<Schema>> {
        self.resolve_at(node, 0, &mut Vec::new())
    }

    /// Resolve `node` at `depth`, with `trail` holding the references entered on the way down.
    ///
    /// `trail` is restored before returning, so callers can share one buffer across siblings.
    ///
    /// # Errors
    ///
    /// Returns an error if a `$ref` in the tree cannot be resolved.
    pub fn resolve_at(
        &self,
        node: &Value,
        depth: usize,
        trail: &mut Vec<String>,
    ) -> Result<Option<Schema>> {
        if depth > self.max_depth {
            warn!(
                "Schema nesting exceeds max depth {}; dropping branch",
                self.max_depth
            );
            return Ok(None);
        }

        let Some(reference) = ref_of(node) else {
            return self.resolve_node(INLINE, node, depth, trail);
        };
        if trail.iter().any(|seen| seen == reference) {
            warn!("Circular reference detected: {reference}");
            return Ok(None);
        }

        let target = self.document.lookup(reference)?;
        trail.push(reference.to_string());
        let resolved = if ref_of(target).is_some() {
            self.resolve_at(target, depth + 1, trail)
        } else {
            self.resolve_node(ref_name(reference), target, depth, trail)
        };
        trail.pop();
        resolved
    }

    fn resolve_node(
        &self,
        name: &str,
        node: &Value,
        depth: usize,
        trail: &mut Vec<String>,
    ) -> Result<Option<Schema>> {
        let all_of = composition(node, "allOf");
        if !all_of.is_empty() {
            let (fields, fragments) = self.merge_branches(all_of, depth, trail)?;
            if fields.is_empty() {
                return Ok(None);
            }
            let mut merged = SchemaProperty::new(MERGED, SchemaType::single("object"));
            merged.properties = Some(fields);
            merged.description = description_of(node);
            merged.all_of = Some(fragments);
            return Ok(Some(Schema::new(name, vec![merged])));
        }

        let branches = union_branches(node);
        if !branches.is_empty() {
            let union = self.union_property(ANY_OF, node, branches, depth, trail)?;
            return Ok(Some(Schema::new(name, vec![union])));
        }

        if let Some(properties) = properties_of(node) {
            let fields = self.resolve_properties(node, properties, depth, trail)?;
            return Ok(Some(Schema::new(name, fields)));
        }

        if type_of(node) == Some("array") {
            return self.resolve_root_array(name, node, depth, trail).map(Some);
        }

        Ok(Some(Schema::new(name, Vec::new())))
    }

    /// Resolve every `allOf` branch; returns the merged fields and one fragment per branch.
    fn merge_branches(
        &self,
        branches: &[Value],
        depth: usize,
        trail: &mut Vec<String>,
    ) -> Result<(Vec<SchemaProperty>, Vec<SchemaProperty>)> {
        let mut fields: Vec<SchemaProperty> = Vec::new();
        let mut fragments = Vec::with_capacity(branches.len());

        for branch in branches {
            let Some(resolved) = self.resolve_at(branch, depth + 1, trail)? else {
                continue;
            };
            let target = self.document.target(branch)?;
            let fragment_name = resolved.name.clone();
            let branch_fields = resolved.into_fields();

            // Later branches win on name clashes, keeping the first position.
            for field in &branch_fields {
                match fields.iter_mut().find(|f| f.name == field.name) {
                    Some(existing) => *existing = field.clone(),
                    None => fields.push(field.clone()),
                }
            }

            let mut fragment = SchemaProperty::new(fragment_name, SchemaType::single("object"));
            fragment.description = description_of(branch).or_else(|| description_of(target));
            fragment.properties = non_empty(branch_fields);
            fragments.push(fragment);
        }

        Ok((fields, fragments))
    }

    fn union_property(
        &self,
        name: &str,
        node: &Value,
        branches: &[Value],
        depth: usize,
        trail: &mut Vec<String>,
    ) -> Result<SchemaProperty> {
        let mut types = Vec::new();
        let mut alternatives = Vec::with_capacity(branches.len());

        for branch in branches {
            let target = self.document.target(branch)?;
            let branch_type = type_of(target);
            if let Some(t) = branch_type {
                types.push(t.to_string());
            }
            let Some(resolved) = self.resolve_at(branch, depth + 1, trail)? else {
                continue;
            };
            let mut alternative = SchemaProperty::new(
                resolved.name.clone(),
                SchemaType::single(branch_type.unwrap_or("object")),
            );
            alternative.description = description_of(branch).or_else(|| description_of(target));
            alternative.properties = non_empty(resolved.into_fields());
            alternatives.push(alternative);
        }

        let schema_type = if types.is_empty() {
            SchemaType::single("object")
        } else {
            SchemaType::Union(types)
        };
        let mut union = SchemaProperty::new(name, schema_type);
        union.description = description_of(node);
        if alternatives.iter().any(|a| a.properties.is_some()) {
            union.any_of = Some(alternatives);
        }
        Ok(union)
    }

    fn resolve_properties(
        &self,
        parent: &Value,
        properties: &Map<String, Value>,
        depth: usize,
        trail: &mut Vec<String>,
    ) -> Result<Vec<SchemaProperty>> {
        let required = required_of(parent);
        let mut fields = Vec::with_capacity(properties.len());
        for (name, node) in properties {
            let mut field = self.resolve_property(name, node, depth, trail)?;
            field.required = required.contains(&name.as_str());
            fields.push(field);
        }
        Ok(fields)
    }

    fn resolve_property(
        &self,
        name: &str,
        node: &Value,
        depth: usize,
        trail: &mut Vec<String>,
    ) -> Result<SchemaProperty> {
        let target = self.document.target(node)?;
        let declared = type_of(target).unwrap_or("object");
        let mut field = SchemaProperty::new(name, SchemaType::single(declared));
        field.description = description_of(node).or_else(|| description_of(target));

        match declared {
            "array" => field.items = self.resolve_items(target, depth, trail)?.map(Box::new),
            "object" => self.resolve_object_property(&mut field, node, target, depth, trail)?,
            _ => {}
        }
        Ok(field)
    }

    fn resolve_object_property(
        &self,
        field: &mut SchemaProperty,
        node: &Value,
        target: &Value,
        depth: usize,
        trail: &mut Vec<String>,
    ) -> Result<()> {
        if ref_of(node).is_some() {
            if let Some(nested) = self.resolve_at(node, depth + 1, trail)? {
                absorb(field, nested);
            }
            return Ok(());
        }

        let branches = union_branches(target);
        if !branches.is_empty() {
            let union = self.union_property(&field.name, target, branches, depth, trail)?;
            field.schema_type = union.schema_type;
            field.any_of = union.any_of;
            field.properties = None;
            return Ok(());
        }

        let all_of = composition(target, "allOf");
        if !all_of.is_empty() {
            let (fields, fragments) = self.merge_branches(all_of, depth, trail)?;
            if !fields.is_empty() {
                field.properties = Some(fields);
                field.all_of = Some(fragments);
            }
            return Ok(());
        }

        // Open maps are not flattened.
        if has_open_additional_properties(target) {
            return Ok(());
        }

        if properties_of(target).is_some() {
            if let Some(nested) = self.resolve_at(node, depth + 1, trail)? {
                field.properties = non_empty(nested.into_fields());
            }
        }
        Ok(())
    }

    /// Resolve the `items` of an array node into a single item property.
    fn resolve_items(
        &self,
        array: &Value,
        depth: usize,
        trail: &mut Vec<String>,
    ) -> Result<Option<SchemaProperty>> {
        let Some(items) = array.get("items") else {
            return Ok(None);
        };
        let target = self.document.target(items)?;
        let declared = type_of(target).unwrap_or("object");
        let mut item = SchemaProperty::new(
            ref_of(items).map_or(ITEM, ref_name),
            SchemaType::single(declared),
        );
        item.description = description_of(items).or_else(|| description_of(target));

        match declared {
            "object" => {
                if let Some(nested) = self.resolve_at(items, depth + 1, trail)? {
                    absorb(&mut item, nested);
                }
            }
            "array" => item.items = self.resolve_items(target, depth + 1, trail)?.map(Box::new),
            _ => {}
        }
        Ok(Some(item))
    }

    fn resolve_root_array(
        &self,
        name: &str,
        node: &Value,
        depth: usize,
        trail: &mut Vec<String>,
    ) -> Result<Schema> {
        let Some(items) = node.get("items") else {
            return Ok(Schema::new(name, Vec::new()));
        };
        let Some(resolved) = self.resolve_at(items, depth + 1, trail)? else {
            return Ok(Schema::new(name, Vec::new()));
        };

        let target = self.document.target(items)?;
        let mut item = SchemaProperty::new(
            ITEM,
            SchemaType::single(type_of(target).unwrap_or("object")),
        );
        item.description = description_of(items).or_else(|| description_of(target));
        if item.schema_type.is("array") {
            item.items = self.resolve_items(target, depth + 1, trail)?.map(Box::new);
        } else {
            absorb(&mut item, resolved);
        }

        let mut inline = SchemaProperty::new(INLINE, SchemaType::single("array"));
        inline.description = description_of(node);
        inline.items = Some(Box::new(item));
        Ok(Schema::new(name, vec![inline]))
    }
}

/// Copy a nested resolution onto the property that referenced it.
fn absorb(field: &mut SchemaProperty, nested: Schema) {
    use crate::model::SchemaShape;

    match nested.shape() {
        SchemaShape::Union(union) => {
            field.schema_type = union.schema_type.clone();
            field.any_of = union.any_of.clone();
            field.properties = None;
        }
        SchemaShape::Merged(merged) => {
            field.properties = merged.properties.clone();
            field.all_of = merged.all_of.clone();
        }
        SchemaShape::Array(_) | SchemaShape::Fields(_) => {
            field.properties = non_empty(nested.properties);
        }
    }
}

fn non_empty(fields: Vec<SchemaProperty>) -> Option<Vec<SchemaProperty>> {
    (!fields.is_empty()).then_some(fields)
}

fn ref_of(node: &Value) -> Option<&str> {
    node.get("$ref").and_then(Value::as_str)
}

/// Last path segment of a reference: `#/components/schemas/Pet` -> `Pet`.
fn ref_name(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference)
}

/// Declared type; for a type list, the first entry that is not `null`.
pub(crate) fn type_of(node: &Value) -> Option<&str> {
    match node.get("type")? {
        Value::String(s) => Some(s.as_str()),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null"),
        _ => None,
    }
}

pub(crate) fn description_of(node: &Value) -> Option<String> {
    node.get("description")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn properties_of(node: &Value) -> Option<&Map<String, Value>> {
    node.get("properties")
        .and_then(Value::as_object)
        .filter(|p| !p.is_empty())
}

fn composition<'v>(node: &'v Value, key: &str) -> &'v [Value] {
    node.get(key)
        .and_then(Value::as_array)
        .map_or(&[], Vec::as_slice)
}

fn union_branches(node: &Value) -> &[Value] {
    let any_of = composition(node, "anyOf");
    if any_of.is_empty() {
        composition(node, "oneOf")
    } else {
        any_of
    }
}

fn required_of(node: &Value) -> Vec<&str> {
    node.get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn has_open_additional_properties(node: &Value) -> bool {
    match node.get("additionalProperties") {
        Some(Value::Bool(open)) => *open,
        Some(Value::Object(_)) => true,
        _ => false,
    }
}
