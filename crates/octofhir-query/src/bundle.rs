//! Search result bundles.
//!
//! [`QueryBundle`] wraps the `Bundle` returned by a FHIR search and keeps
//! absorbing later pages as the executor follows `next` links. All accessors
//! work on the ordered resource sequence taken from `entry[*].resource`;
//! entries without a resource are ignored.

use std::fmt;

use serde_json::{Map, Value};

use crate::error::{QueryError, Result};
use crate::path::FhirPathEvaluator;
use crate::projection::{ProjectedTable, ProjectionSpec, RowProjector};

/// Link relations a search bundle can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkRelation {
    Next,
    Previous,
    SelfLink,
}

impl LinkRelation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Next => "next",
            Self::Previous => "previous",
            Self::SelfLink => "self",
        }
    }
}

impl fmt::Display for LinkRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One or more accumulated pages of a FHIR search response.
#[derive(Debug, Clone)]
pub struct QueryBundle {
    data: Value,
}

impl QueryBundle {
    /// Wrap a server response.
    ///
    /// Anything other than a JSON object is treated as an empty bundle.
    pub fn new(data: Value) -> Self {
        let data = match data {
            Value::Object(_) => data,
            _ => Value::Object(Map::new()),
        };
        tracing::debug!(entries = entry_count(&data), "Initialized query bundle");
        Self { data }
    }

    /// The raw bundle JSON, including every accumulated entry.
    pub fn as_value(&self) -> &Value {
        &self.data
    }

    pub fn into_value(self) -> Value {
        self.data
    }

    /// Resources in entry order.
    pub fn resources(&self) -> Vec<&Value> {
        self.iter().collect()
    }

    /// Iterate over resources in entry order.
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        entries(&self.data).filter_map(|entry| entry.get("resource"))
    }

    /// The lone resource of a bundle expected to hold at most one result.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::MultipleResources`] when more than one resource
    /// is present.
    pub fn resource(&self) -> Result<Option<&Value>> {
        let size = self.size();
        match size {
            0 => Ok(None),
            1 => Ok(self.iter().next()),
            _ => {
                tracing::warn!(size, "Bundle contains more than one resource, expected 1");
                Err(QueryError::MultipleResources(size))
            }
        }
    }

    /// Number of resources currently held.
    pub fn size(&self) -> usize {
        self.iter().count()
    }

    pub fn len(&self) -> usize {
        self.size()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Resource at `index` in entry order.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.iter().nth(index)
    }

    pub fn contains(&self, resource: &Value) -> bool {
        self.iter().any(|r| r == resource)
    }

    /// Server-reported match count; may exceed [`size`](Self::size) when paginated.
    pub fn total(&self) -> Option<u64> {
        self.data.get("total").and_then(Value::as_u64)
    }

    /// URL of the first link with the given relation.
    pub fn link(&self, relation: LinkRelation) -> Option<&str> {
        self.data
            .get("link")?
            .as_array()?
            .iter()
            .find(|link| link.get("relation").and_then(Value::as_str) == Some(relation.as_str()))?
            .get("url")?
            .as_str()
    }

    pub fn next_link(&self) -> Option<&str> {
        self.link(LinkRelation::Next)
    }

    pub fn previous_link(&self) -> Option<&str> {
        self.link(LinkRelation::Previous)
    }

    pub fn self_link(&self) -> Option<&str> {
        self.link(LinkRelation::SelfLink)
    }

    /// Append another page's entries after the ones already held.
    ///
    /// Links and `total` stay as they were on the first page. Returns the
    /// number of entries appended.
    pub fn accumulate(&mut self, other: Value) -> usize {
        let new_entries = match other {
            Value::Object(mut map) => match map.remove("entry") {
                Some(Value::Array(entries)) => entries,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };

        let added = new_entries.len();
        tracing::debug!(added, "Adding entries to bundle");
        if added == 0 {
            return 0;
        }

        let Value::Object(map) = &mut self.data else {
            return 0;
        };
        match map.get_mut("entry") {
            Some(Value::Array(existing)) => existing.extend(new_entries),
            _ => {
                map.insert("entry".to_string(), Value::Array(new_entries));
            }
        }
        added
    }

    /// Replace the link table with the one from the most recently fetched page.
    pub(crate) fn set_links(&mut self, page: &Value) {
        let Value::Object(map) = &mut self.data else {
            return;
        };
        match page.get("link") {
            Some(links) => {
                map.insert("link".to_string(), links.clone());
            }
            None => {
                map.remove("link");
            }
        }
    }

    /// `resourceType` of every resource, in order.
    pub fn collect_resource_types(&self) -> Vec<&str> {
        self.iter()
            .filter_map(|r| r.get("resourceType").and_then(Value::as_str))
            .collect()
    }

    pub fn collect_resources_by_type(&self, resource_type: &str) -> Vec<&Value> {
        self.iter()
            .filter(|r| r.get("resourceType").and_then(Value::as_str) == Some(resource_type))
            .collect()
    }

    /// Ids of every resource that has one, in order.
    pub fn collect_ids(&self) -> Vec<&str> {
        self.iter()
            .filter_map(|r| r.get("id").and_then(Value::as_str))
            .collect()
    }

    /// Project the resources into a table, evaluating columns as FHIRPath.
    ///
    /// When `spec` is `None` the default columns for the first resource's
    /// type are used.
    pub async fn to_table(&self, spec: Option<&ProjectionSpec>) -> Result<ProjectedTable> {
        let evaluator = FhirPathEvaluator::shared().await?;
        RowProjector::new(evaluator).project(self, spec).await
    }
}

fn entries(data: &Value) -> impl Iterator<Item = &Value> {
    data.get("entry")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn entry_count(data: &Value) -> usize {
    data.get("entry")
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

impl From<Value> for QueryBundle {
    fn from(data: Value) -> Self {
        Self::new(data)
    }
}

impl PartialEq for QueryBundle {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl<'a> IntoIterator for &'a QueryBundle {
    type Item = &'a Value;
    type IntoIter = std::vec::IntoIter<&'a Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources().into_iter()
    }
}

impl fmt::Display for QueryBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.total() {
            Some(total) => write!(f, "QueryBundle(total={}, size={})", total, self.size()),
            None => write!(f, "QueryBundle(total=None, size={})", self.size()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patient_bundle() -> Value {
        json!({
            "resourceType": "Bundle",
            "type": "searchset",
            "total": 2,
            "entry": [
                {"resource": {
                    "resourceType": "Patient",
                    "id": "patient-1",
                    "name": [{"given": ["John"], "family": "Doe"}],
                    "birthDate": "1970-01-01"
                }},
                {"resource": {
                    "resourceType": "Patient",
                    "id": "patient-2",
                    "name": [{"given": ["Jane"], "family": "Smith"}],
                    "birthDate": "1980-02-02"
                }}
            ]
        })
    }

    fn mixed_bundle() -> Value {
        json!({
            "resourceType": "Bundle",
            "type": "searchset",
            "entry": [
                {"resource": {"resourceType": "Patient", "id": "patient-1"}},
                {"resource": {
                    "resourceType": "Observation",
                    "id": "obs-1",
                    "subject": {"reference": "Patient/patient-1"}
                }}
            ]
        })
    }

    fn page(ids: &[&str]) -> Value {
        let entries: Vec<Value> = ids
            .iter()
            .map(|id| json!({"resource": {"resourceType": "Patient", "id": id}}))
            .collect();
        json!({"resourceType": "Bundle", "entry": entries})
    }

    #[test]
    fn test_init_with_bundle() {
        let bundle = QueryBundle::new(patient_bundle());
        assert_eq!(bundle.size(), 2);
        assert_eq!(bundle.len(), 2);
        assert!(!bundle.is_empty());
    }

    #[test]
    fn test_empty_bundle() {
        let bundle = QueryBundle::new(json!({"resourceType": "Bundle", "entry": []}));
        assert!(bundle.is_empty());
        assert_eq!(bundle.size(), 0);
        assert!(bundle.resources().is_empty());

        let bundle = QueryBundle::new(json!({"resourceType": "Bundle"}));
        assert_eq!(bundle.size(), 0);
    }

    #[test]
    fn test_single_resource_accessor() {
        let empty = QueryBundle::new(page(&[]));
        assert_eq!(empty.resource().unwrap(), None);

        let one = QueryBundle::new(page(&["test"]));
        assert_eq!(
            one.resource().unwrap(),
            Some(&json!({"resourceType": "Patient", "id": "test"}))
        );

        let two = QueryBundle::new(page(&["a", "b"]));
        assert!(matches!(two.resource(), Err(QueryError::MultipleResources(2))));
    }

    #[test]
    fn test_collect_resource_types() {
        let bundle = QueryBundle::new(mixed_bundle());
        assert_eq!(bundle.collect_resource_types(), vec!["Patient", "Observation"]);
    }

    #[test]
    fn test_collect_resources_by_type() {
        let bundle = QueryBundle::new(mixed_bundle());
        let patients = bundle.collect_resources_by_type("Patient");
        assert_eq!(patients.len(), 1);
        assert_eq!(patients[0]["id"], "patient-1");
        assert!(bundle.collect_resources_by_type("Condition").is_empty());
    }

    #[test]
    fn test_collect_ids_preserves_order() {
        let bundle = QueryBundle::new(patient_bundle());
        assert_eq!(bundle.collect_ids(), vec!["patient-1", "patient-2"]);
    }

    #[test]
    fn test_entries_without_resource_are_ignored() {
        let bundle = QueryBundle::new(json!({
            "resourceType": "Bundle",
            "entry": [
                {"fullUrl": "urn:uuid:1"},
                {"resource": {"resourceType": "Patient", "id": "1"}}
            ]
        }));
        assert_eq!(bundle.size(), 1);
        assert_eq!(bundle.collect_ids(), vec!["1"]);
    }

    #[test]
    fn test_iteration_and_indexing() {
        let bundle = QueryBundle::new(patient_bundle());
        let resources: Vec<&Value> = (&bundle).into_iter().collect();
        assert_eq!(resources.len(), 2);
        assert!(resources.iter().all(|r| r["resourceType"] == "Patient"));

        assert_eq!(bundle.get(0).unwrap()["id"], "patient-1");
        assert!(bundle.get(2).is_none());

        let first = bundle.get(0).unwrap().clone();
        assert!(bundle.contains(&first));
        assert!(!bundle.contains(&json!({"resourceType": "Patient", "id": "other"})));
    }

    #[test]
    fn test_bundle_properties() {
        let bundle = QueryBundle::new(json!({
            "resourceType": "Bundle",
            "type": "searchset",
            "total": 100,
            "link": [
                {"relation": "self", "url": "http://example.com/self"},
                {"relation": "next", "url": "http://example.com/next"},
                {"relation": "next", "url": "http://example.com/ignored"},
                {"relation": "previous", "url": "http://example.com/prev"}
            ],
            "entry": [{"resource": {"resourceType": "Patient", "id": "1"}}]
        }));

        assert_eq!(bundle.total(), Some(100));
        assert_eq!(bundle.next_link(), Some("http://example.com/next"));
        assert_eq!(bundle.previous_link(), Some("http://example.com/prev"));
        assert_eq!(bundle.self_link(), Some("http://example.com/self"));
    }

    #[test]
    fn test_missing_links() {
        let bundle = QueryBundle::new(page(&["1"]));
        assert_eq!(bundle.total(), None);
        assert_eq!(bundle.next_link(), None);
        assert_eq!(bundle.previous_link(), None);
    }

    #[test]
    fn test_display() {
        let bundle = QueryBundle::new(patient_bundle());
        assert_eq!(bundle.to_string(), "QueryBundle(total=2, size=2)");

        let bundle = QueryBundle::new(page(&["1"]));
        assert_eq!(bundle.to_string(), "QueryBundle(total=None, size=1)");
    }

    #[test]
    fn test_accumulate() {
        let mut bundle = QueryBundle::new(page(&["1"]));
        assert_eq!(bundle.size(), 1);

        assert_eq!(bundle.accumulate(page(&["2"])), 1);
        assert_eq!(bundle.size(), 2);
        assert_eq!(bundle.collect_ids(), vec!["1", "2"]);
    }

    #[test]
    fn test_accumulate_without_entries_is_noop() {
        let mut bundle = QueryBundle::new(page(&["1"]));
        assert_eq!(bundle.accumulate(json!({"resourceType": "Bundle"})), 0);
        assert_eq!(bundle.accumulate(json!({"resourceType": "Bundle", "entry": []})), 0);
        assert_eq!(bundle.collect_ids(), vec!["1"]);
    }

    #[test]
    fn test_accumulate_into_bundle_without_entry() {
        let mut bundle = QueryBundle::new(json!({"resourceType": "Bundle", "total": 0}));
        bundle.accumulate(page(&["a", "b"]));
        assert_eq!(bundle.collect_ids(), vec!["a", "b"]);
    }

    #[test]
    fn test_accumulate_matches_concatenation() {
        let pages = [page(&["1", "2"]), page(&["3"]), page(&["4", "5"])];

        let mut sequential = QueryBundle::new(pages[0].clone());
        sequential.accumulate(pages[1].clone());
        sequential.accumulate(pages[2].clone());

        let all_entries: Vec<Value> = pages
            .iter()
            .flat_map(|p| p["entry"].as_array().unwrap().clone())
            .collect();
        let merged = QueryBundle::new(json!({"resourceType": "Bundle", "entry": all_entries}));

        assert_eq!(sequential, merged);
        assert_eq!(sequential.collect_ids(), vec!["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn test_equality_ignores_envelope() {
        let a = QueryBundle::new(json!({
            "resourceType": "Bundle",
            "total": 10,
            "entry": [{"resource": {"resourceType": "Patient", "id": "1"}}]
        }));
        let b = QueryBundle::new(page(&["1"]));
        assert_eq!(a, b);
        assert_ne!(a, QueryBundle::new(page(&["2"])));
    }

    #[test]
    fn test_set_links_tracks_latest_page() {
        let mut bundle = QueryBundle::new(json!({
            "resourceType": "Bundle",
            "link": [{"relation": "next", "url": "http://example.com/page2"}]
        }));
        bundle.set_links(&json!({
            "link": [{"relation": "next", "url": "http://example.com/page3"}]
        }));
        assert_eq!(bundle.next_link(), Some("http://example.com/page3"));

        bundle.set_links(&json!({"resourceType": "Bundle"}));
        assert_eq!(bundle.next_link(), None);
    }
}
