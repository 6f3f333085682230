//! FHIR Reference helpers for query results.
//!
//! Search results link to each other through `Reference` elements
//! (`{"reference": "Patient/123"}`). These helpers pull the target type and
//! id out of such references so rows can be joined client-side.
//!
//! Accepted formats:
//! - Relative: `Patient/123`
//! - Versioned: `Patient/123/_history/1`
//! - Absolute URL: `http://example.org/fhir/Patient/123`
//!
//! Contained (`#id`) and URN (`urn:uuid:...`) references do not name a server
//! resource and are rejected.

use std::fmt;

use serde_json::Value;

/// A parsed FHIR reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceReference {
    /// The resource type (e.g., "Patient", "Observation")
    pub resource_type: String,
    /// The resource ID
    pub id: String,
    /// Optional version ID from `_history` suffix
    pub version: Option<String>,
}

impl ResourceReference {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            version: None,
        }
    }

    /// Returns the reference as a relative string (Type/id).
    pub fn to_relative(&self) -> String {
        format!("{}/{}", self.resource_type, self.id)
    }
}

impl fmt::Display for ResourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}/{}/_history/{}", self.resource_type, self.id, v),
            None => write!(f, "{}", self.to_relative()),
        }
    }
}

/// Parse a reference string into its components.
///
/// Absolute URLs are reduced to their trailing `Type/id` segments, whatever
/// server they point at.
pub fn parse_reference(reference: &str) -> Option<ResourceReference> {
    let reference = reference.trim();
    if reference.is_empty() || reference.starts_with('#') || reference.starts_with("urn:") {
        return None;
    }

    let path = match reference.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, p)| p).unwrap_or(""),
        None => reference,
    };
    let path = path.split(['?', '#']).next().unwrap_or("");
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();

    let (type_idx, version) = match parts.len() {
        n if n >= 4 && parts[n - 2] == "_history" => (n - 4, Some(parts[n - 1].to_string())),
        n if n >= 2 => (n - 2, None),
        _ => return None,
    };

    let resource_type = parts[type_idx];
    let id = parts[type_idx + 1];
    if !crate::resource_type::is_valid_resource_type_name(resource_type) {
        return None;
    }

    Some(ResourceReference {
        resource_type: resource_type.to_string(),
        id: id.to_string(),
        version,
    })
}

/// Extract the target id from a Reference element (`{"reference": "Patient/123"}`).
///
/// Falls back to the last path segment when the reference is not in
/// `Type/id` form, so `{"reference": "123"}` still yields `"123"`.
pub fn reference_id(reference: &Value) -> Option<&str> {
    let raw = reference.get("reference")?.as_str()?.trim();
    if raw.is_empty() || raw.starts_with('#') || raw.starts_with("urn:") {
        return None;
    }

    let path = raw.split(['?', '#']).next().unwrap_or(raw);
    let mut segments = path.rsplit('/').filter(|s| !s.is_empty());
    let last = segments.next()?;

    // Type/id/_history/version -> id
    match segments.next() {
        Some("_history") => segments.next(),
        _ => Some(last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_relative_reference() {
        let r = parse_reference("Patient/123").unwrap();
        assert_eq!(r, ResourceReference::new("Patient", "123"));
        assert_eq!(r.to_string(), "Patient/123");
    }

    #[test]
    fn test_versioned_reference() {
        let r = parse_reference("Observation/obs-1/_history/3").unwrap();
        assert_eq!(r.resource_type, "Observation");
        assert_eq!(r.id, "obs-1");
        assert_eq!(r.version.as_deref(), Some("3"));
        assert_eq!(r.to_string(), "Observation/obs-1/_history/3");
    }

    #[test]
    fn test_absolute_reference() {
        let r = parse_reference("https://fhir.example.org/r4/Encounter/456").unwrap();
        assert_eq!(r.resource_type, "Encounter");
        assert_eq!(r.id, "456");
        assert_eq!(r.version, None);
    }

    #[test]
    fn test_unresolvable_references() {
        assert!(parse_reference("").is_none());
        assert!(parse_reference("#contained").is_none());
        assert!(parse_reference("urn:uuid:2b5a1e5c-7a7c-4d4e-9f0e-0a8d2d3c1b11").is_none());
        assert!(parse_reference("123").is_none());
        assert!(parse_reference("patient/123").is_none());
    }

    #[test]
    fn test_reference_id() {
        assert_eq!(reference_id(&json!({"reference": "Patient/123"})), Some("123"));
        assert_eq!(
            reference_id(&json!({"reference": "http://x.org/fhir/Patient/abc"})),
            Some("abc")
        );
        assert_eq!(
            reference_id(&json!({"reference": "Patient/123/_history/2"})),
            Some("123")
        );
        assert_eq!(reference_id(&json!({"reference": "123"})), Some("123"));
        assert_eq!(reference_id(&json!({"display": "John"})), None);
        assert_eq!(reference_id(&json!({"reference": "#c1"})), None);
    }
}
