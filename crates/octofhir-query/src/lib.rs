//! FHIR search client with bundle pagination and tabular projection.
//!
//! ```no_run
//! use octofhir_query::{ClientConfig, FhirQueryClient, SearchRequest};
//!
//! # async fn run() -> octofhir_query::Result<()> {
//! let client = FhirQueryClient::new(ClientConfig::new("https://hapi.fhir.org/baseR4"))?;
//! let bundle = client
//!     .search("Patient", &SearchRequest::new().param("name", "Smith").pages(3))
//!     .await?;
//!
//! let table = bundle.to_table(None).await?;
//! println!("{} patients", table.len());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod bundle;
pub mod client;
pub mod config;
pub mod error;
pub mod output;
pub mod path;
pub mod projection;
pub mod query;
pub mod reference;
pub mod resource_type;
pub mod transport;

pub use auth::{AuthHeaderBuilder, AuthMethod, Credentials, basic_header, bearer_header};
pub use bundle::{LinkRelation, QueryBundle};
pub use client::FhirQueryClient;
pub use config::ClientConfig;
pub use error::{ErrorCategory, QueryError, Result};
pub use output::{CsvWriter, JsonArrayWriter, NdjsonWriter, OutputFormat, OutputWriter, get_writer};
pub use path::{FhirPathEvaluator, PathEvaluator};
pub use projection::{
    ProjectedTable, ProjectionSpec, Row, RowProjector, default_projection, default_projection_types,
};
pub use query::{QueryExecutor, SearchRequest};
pub use reference::{ResourceReference, parse_reference, reference_id};
pub use resource_type::ResourceType;
pub use transport::{Headers, HttpMethod, HttpRequest, HttpResponse, ReqwestTransport, Transport};
