//! Factor validation and post-deliberation integrity checks.

pub mod factors;
pub mod integrity;

pub use factors::{FactorValidation, FactorValidator, ValidationConfig};
pub use integrity::{CheckKind, IntegrityCheck, IntegrityReport};
