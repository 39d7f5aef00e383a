//! hl7-minato core — HL7 v2 ingestion re-expressed as FHIR.
//!
//! Pure, synchronous, stateless: raw message text plus mapping and
//! validation specifications in, a validation verdict and a transaction
//! Bundle out. No sockets, no credentials, no persistence — those live
//! in the surrounding crates.

pub mod address;
pub mod bundle;
pub mod error;
pub mod mapper;
pub mod message;
pub mod operation_outcome;
pub mod spec;
pub mod transform;
pub mod validator;

pub use address::{FieldAddress, resolve};
pub use bundle::{Bundle, BundleEntry, BundleRequest, assemble};
pub use error::{MinatoError, Result};
pub use mapper::{Clock, FixedClock, MappedResources, SystemClock, map};
pub use message::{Message, Segment, Separators};
pub use operation_outcome::{
    IssueSeverity, IssueType, OperationOutcome, OperationOutcomeIssue,
};
pub use spec::{MappingSpec, ObxScan, Rule, ValidationSpec};
pub use transform::Transform;
pub use validator::{Defect, ValidationReport, validate};
