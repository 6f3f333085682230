//! FHIRPath evaluation of column expressions.
//!
//! The projector only needs a [`PathEvaluator`]: something that turns an
//! expression and a resource into an ordered collection of matches. The
//! default [`FhirPathEvaluator`] runs expressions through `octofhir-fhirpath`,
//! so column definitions can use the full language:
//!
//! - Navigation and indexing: `name[0].given[0]`, `code.coding.display`
//! - Filtering: `name.where(use = 'official').family`
//! - Unions: `name.family | name.given`
//! - Functions: `telecom.first().value`, `name.count()`

use std::sync::Arc;

use async_trait::async_trait;
use octofhir_fhirpath::{Collection, EvaluationContext, FhirPathEngine};
use serde_json::{Value, json};
use tokio::sync::OnceCell;

use crate::error::{QueryError, Result};

/// Evaluates a path expression against a single resource.
#[async_trait]
pub trait PathEvaluator: Send + Sync {
    /// Returns every value the path matches, in document order.
    async fn evaluate(&self, path: &str, resource: &Value) -> Result<Vec<Value>>;
}

static SHARED_ENGINE: OnceCell<Arc<FhirPathEngine>> = OnceCell::const_new();

/// [`PathEvaluator`] backed by a [`FhirPathEngine`].
///
/// Cloning is cheap; clones share the engine.
#[derive(Clone)]
pub struct FhirPathEvaluator {
    engine: Arc<FhirPathEngine>,
}

impl FhirPathEvaluator {
    /// Build an evaluator with its own engine and no FHIR model.
    pub async fn new() -> Result<Self> {
        Ok(Self {
            engine: Arc::new(create_engine().await?),
        })
    }

    /// Evaluator over a process-wide engine, created on first use.
    pub async fn shared() -> Result<Self> {
        let engine = SHARED_ENGINE
            .get_or_try_init(|| async { create_engine().await.map(Arc::new) })
            .await?;
        Ok(Self::with_engine(engine.clone()))
    }

    /// Wrap an engine configured elsewhere, e.g. with a schema-aware model provider.
    pub fn with_engine(engine: Arc<FhirPathEngine>) -> Self {
        Self { engine }
    }

    /// Check that `path` is a well-formed expression.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidPath`] when the engine rejects it.
    pub async fn validate(&self, path: &str) -> Result<()> {
        self.evaluate(path, &json!({"resourceType": "Resource"}))
            .await
            .map(|_| ())
    }
}

impl std::fmt::Debug for FhirPathEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FhirPathEvaluator").finish_non_exhaustive()
    }
}

#[async_trait]
impl PathEvaluator for FhirPathEvaluator {
    async fn evaluate(&self, path: &str, resource: &Value) -> Result<Vec<Value>> {
        let expression = path.trim();
        if expression.is_empty() {
            return Err(QueryError::invalid_path(path, "expression is empty"));
        }

        let provider = self.engine.get_model_provider();
        let collection = Collection::from_json_resource(resource.clone(), Some(provider.clone()))
            .await
            .map_err(|e| {
                QueryError::invalid_path(path, format!("failed to create FHIRPath context: {e}"))
            })?;
        let context = EvaluationContext::new(collection, provider, None, None, None);

        let result = self
            .engine
            .evaluate(expression, &context)
            .await
            .map_err(|e| {
                tracing::debug!(path, error = %e, "FHIRPath evaluation failed");
                QueryError::invalid_path(path, e.to_string())
            })?;

        Ok(result
            .value
            .iter()
            .map(|v| v.to_json_value())
            .filter(|v| !v.is_null())
            .collect())
    }
}

async fn create_engine() -> Result<FhirPathEngine> {
    let model_provider = Arc::new(octofhir_fhir_model::EmptyModelProvider);
    let registry = Arc::new(octofhir_fhirpath::create_function_registry());
    FhirPathEngine::new(registry, model_provider)
        .await
        .map_err(|e| QueryError::configuration(format!("failed to create FHIRPath engine: {e}")))
}
