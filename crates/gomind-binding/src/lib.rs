//! The four-layer Parameter Binding Engine (§4.5) and the Error Analyzer
//! (§4.7).

pub mod error_analyzer;
pub mod layer1;
pub mod layer2;
pub mod layer4;

pub use error_analyzer::{ErrorAnalysis, ErrorAnalyzer, ErrorAnalyzerError};
pub use layer1::{auto_wire, AutoWireOutcome};
pub use layer2::{resolve_missing, MicroResolutionError};
pub use layer4::{reresolve, SemanticRetryConfig, SemanticRetryError};
