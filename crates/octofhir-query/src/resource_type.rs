use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::QueryError;

/// FHIR resource types a query can target
///
/// Serialized as the bare type name; deserialization goes through [`FromStr`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResourceType {
    Patient,
    Practitioner,
    Organization,
    Encounter,
    Observation,
    Condition,
    DiagnosticReport,
    Medication,
    MedicationRequest,
    MedicationAdministration,
    MedicationStatement,
    Procedure,
    Specimen,
    DocumentReference,
    Location,
    Immunization,
    AllergyIntolerance,
    Bundle,
    CapabilityStatement,
    OperationOutcome,
    Custom(String),
}

impl ResourceType {
    /// The resource type name as it appears in URLs and `resourceType` fields
    pub fn as_str(&self) -> &str {
        match self {
            ResourceType::Patient => "Patient",
            ResourceType::Practitioner => "Practitioner",
            ResourceType::Organization => "Organization",
            ResourceType::Encounter => "Encounter",
            ResourceType::Observation => "Observation",
            ResourceType::Condition => "Condition",
            ResourceType::DiagnosticReport => "DiagnosticReport",
            ResourceType::Medication => "Medication",
            ResourceType::MedicationRequest => "MedicationRequest",
            ResourceType::MedicationAdministration => "MedicationAdministration",
            ResourceType::MedicationStatement => "MedicationStatement",
            ResourceType::Procedure => "Procedure",
            ResourceType::Specimen => "Specimen",
            ResourceType::DocumentReference => "DocumentReference",
            ResourceType::Location => "Location",
            ResourceType::Immunization => "Immunization",
            ResourceType::AllergyIntolerance => "AllergyIntolerance",
            ResourceType::Bundle => "Bundle",
            ResourceType::CapabilityStatement => "CapabilityStatement",
            ResourceType::OperationOutcome => "OperationOutcome",
            ResourceType::Custom(name) => name,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Patient" => Ok(ResourceType::Patient),
            "Practitioner" => Ok(ResourceType::Practitioner),
            "Organization" => Ok(ResourceType::Organization),
            "Encounter" => Ok(ResourceType::Encounter),
            "Observation" => Ok(ResourceType::Observation),
            "Condition" => Ok(ResourceType::Condition),
            "DiagnosticReport" => Ok(ResourceType::DiagnosticReport),
            "Medication" => Ok(ResourceType::Medication),
            "MedicationRequest" => Ok(ResourceType::MedicationRequest),
            "MedicationAdministration" => Ok(ResourceType::MedicationAdministration),
            "MedicationStatement" => Ok(ResourceType::MedicationStatement),
            "Procedure" => Ok(ResourceType::Procedure),
            "Specimen" => Ok(ResourceType::Specimen),
            "DocumentReference" => Ok(ResourceType::DocumentReference),
            "Location" => Ok(ResourceType::Location),
            "Immunization" => Ok(ResourceType::Immunization),
            "AllergyIntolerance" => Ok(ResourceType::AllergyIntolerance),
            "Bundle" => Ok(ResourceType::Bundle),
            "CapabilityStatement" => Ok(ResourceType::CapabilityStatement),
            "OperationOutcome" => Ok(ResourceType::OperationOutcome),
            name => {
                if is_valid_resource_type_name(name) {
                    Ok(ResourceType::Custom(name.to_string()))
                } else {
                    Err(QueryError::invalid_resource_type(name))
                }
            }
        }
    }
}

impl TryFrom<&str> for ResourceType {
    type Error = QueryError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<String> for ResourceType {
    type Error = QueryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceType> for String {
    fn from(resource_type: ResourceType) -> Self {
        match resource_type {
            ResourceType::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

/// FHIR resource type names start with an uppercase letter and contain only letters
pub fn is_valid_resource_type_name(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && name.chars().all(|c| c.is_ascii_alphabetic())
}
