//! Tabular projection of search results.
//!
//! A [`ProjectionSpec`] maps output column names to path expressions. The
//! [`RowProjector`] evaluates every path against every resource of a
//! [`QueryBundle`] and produces one [`Row`] per resource:
//!
//! - exactly one match: the value itself
//! - no match: `null`
//! - several matches: a JSON array holding all of them, in order
//!
//! Column order always follows the projection's insertion order.

use std::collections::HashMap;
use std::sync::LazyLock;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bundle::QueryBundle;
use crate::error::{QueryError, Result};
use crate::path::PathEvaluator;

/// Column name -> path expression, in output order.
pub type ProjectionSpec = IndexMap<String, String>;

/// One projected resource: column name -> value, in column order.
pub type Row = IndexMap<String, Value>;

/// An ordered table of projected rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedTable {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ProjectedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of a single column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        if !self.columns.iter().any(|c| c == name) {
            return None;
        }
        Some(
            self.rows
                .iter()
                .map(|row| row.get(name).unwrap_or(&Value::Null))
                .collect(),
        )
    }

    /// Rows as positional values aligned with [`columns`](Self::columns).
    pub fn records(&self) -> impl Iterator<Item = Vec<&Value>> {
        self.rows.iter().map(|row| {
            self.columns
                .iter()
                .map(|c| row.get(c).unwrap_or(&Value::Null))
                .collect()
        })
    }
}

/// Flattens bundles into rows through a [`PathEvaluator`].
#[derive(Debug, Clone, Default)]
pub struct RowProjector<E> {
    evaluator: E,
}

impl<E: PathEvaluator> RowProjector<E> {
    pub fn new(evaluator: E) -> Self {
        Self { evaluator }
    }

    /// Project every resource of `bundle`.
    ///
    /// Without a spec, the default columns for the first resource's
    /// `resourceType` are used.
    ///
    /// # Errors
    ///
    /// - [`QueryError::NoDefaultProjection`] if no spec was given and the
    ///   bundle is empty or its resource type has no default columns.
    /// - Any error raised by the path evaluator.
    pub async fn project(
        &self,
        bundle: &QueryBundle,
        spec: Option<&ProjectionSpec>,
    ) -> Result<ProjectedTable> {
        let spec = match spec {
            Some(spec) => spec,
            None => resolve_default(bundle)?,
        };

        tracing::debug!(
            resources = bundle.size(),
            columns = spec.len(),
            "Projecting bundle into rows"
        );

        let mut rows = Vec::with_capacity(bundle.size());
        for resource in bundle {
            rows.push(self.project_resource(resource, spec).await?);
        }

        Ok(ProjectedTable {
            columns: spec.keys().cloned().collect(),
            rows,
        })
    }

    /// Project a single resource.
    pub async fn project_resource(&self, resource: &Value, spec: &ProjectionSpec) -> Result<Row> {
        let mut row = Row::with_capacity(spec.len());
        for (column, path) in spec {
            let matches = self.evaluator.evaluate(path, resource).await?;
            row.insert(column.clone(), collapse(matches));
        }
        Ok(row)
    }
}

fn collapse(mut matches: Vec<Value>) -> Value {
    match matches.len() {
        0 => Value::Null,
        1 => matches.pop().unwrap_or(Value::Null),
        _ => Value::Array(matches),
    }
}

fn resolve_default(bundle: &QueryBundle) -> Result<&'static ProjectionSpec> {
    let Some(first) = bundle.iter().next() else {
        tracing::warn!("Attempted to project empty bundle without columns");
        return Err(QueryError::no_default_projection(None));
    };

    let resource_type = first
        .get("resourceType")
        .and_then(Value::as_str)
        .unwrap_or_default();

    default_projection(resource_type).ok_or_else(|| {
        tracing::warn!(resource_type, "No default columns found");
        QueryError::no_default_projection(Some(resource_type))
    })
}

/// Default columns for a resource type, if any.
pub fn default_projection(resource_type: &str) -> Option<&'static ProjectionSpec> {
    DEFAULT_PROJECTIONS.get(resource_type)
}

/// Resource types with default columns, sorted by name.
pub fn default_projection_types() -> Vec<&'static str> {
    let mut types: Vec<&'static str> = DEFAULT_PROJECTIONS.keys().copied().collect();
    types.sort_unstable();
    types
}

fn spec(columns: &[(&str, &str)]) -> ProjectionSpec {
    columns
        .iter()
        .map(|(name, path)| (name.to_string(), path.to_string()))
        .collect()
}

static DEFAULT_PROJECTIONS: LazyLock<HashMap<&'static str, ProjectionSpec>> = LazyLock::new(|| {
    HashMap::from([
        (
            "Patient",
            spec(&[
                ("resourceType", "resourceType"),
                ("id", "id"),
                ("firstname", "name[0].given[0]"),
                ("lastname", "name[0].family"),
                ("gender", "gender"),
                ("birthdate", "birthDate"),
                ("street", "address[0].line[0]"),
                ("city", "address[0].city"),
                ("state", "address[0].state"),
            ]),
        ),
        (
            "Condition",
            spec(&[
                ("resourceType", "resourceType"),
                ("id", "id"),
                ("category", "category[0].coding[0].display"),
                ("display", "code.coding[0].display"),
                ("code", "code.coding[0].code"),
                ("system", "code.coding[0].system"),
                ("subject", "subject.reference"),
                ("encounter", "encounter.reference"),
                ("date", "recordedDate"),
            ]),
        ),
        (
            "Observation",
            spec(&[
                ("resourceType", "resourceType"),
                ("id", "id"),
                ("category", "category[0].coding[0].display"),
                ("display", "code.coding[0].display"),
                ("code", "code.coding[0].display"),
                ("system", "code.coding[0].system"),
                ("value", "valueQuantity.value"),
                ("unit", "valueQuantity.unit"),
                ("subject", "subject.reference"),
                ("encounter", "encounter.reference"),
                ("date", "effectiveDateTime"),
            ]),
        ),
        (
            "DiagnosticReport",
            spec(&[
                ("resourceType", "resourceType"),
                ("id", "id"),
                ("title", "presentedForm[0].title"),
                ("url", "presentedForm[0].attachment.url"),
                ("contentType", "presentedForm[0].contentType"),
                ("category", "category[0].coding[0].display"),
                ("subject", "subject.reference"),
                ("encounter", "encounter.reference"),
                ("date", "effectiveDateTime"),
            ]),
        ),
        (
            "Medication",
            spec(&[
                ("resourceType", "resourceType"),
                ("id", "id"),
                ("display", "code.coding[0].display"),
                ("code", "code.coding[0].code"),
                ("system", "code.coding[0].system"),
                ("manufacturer", "manufacturer.display"),
            ]),
        ),
        (
            "MedicationRequest",
            spec(&[
                ("resourceType", "resourceType"),
                ("id", "id"),
                ("medication", "medicationReference.reference"),
                ("status", "status"),
                ("subject", "subject.reference"),
            ]),
        ),
        (
            "MedicationAdministration",
            spec(&[
                ("resourceType", "resourceType"),
                ("id", "id"),
                ("medication", "medicationReference.reference"),
                ("status", "status"),
                ("subject", "subject.reference"),
                ("effectiveDateTime", "effectiveDateTime"),
                ("dosageText", "dosage.text"),
            ]),
        ),
        (
            "MedicationStatement",
            spec(&[
                ("resourceType", "resourceType"),
                ("id", "id"),
                ("medication", "medicationReference.reference"),
                ("status", "status"),
                ("subject", "subject.reference"),
                ("dateAsserted", "dateAsserted"),
                ("dosageText", "dosage[0].text"),
            ]),
        ),
        (
            "Location",
            spec(&[
                ("resourceType", "resourceType"),
                ("id", "id"),
                ("description", "description"),
                ("status", "status"),
                ("partOf", "partOf.reference"),
            ]),
        ),
    ])
});
