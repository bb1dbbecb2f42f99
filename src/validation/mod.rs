//! Preflight account validation
//!
//! Checks existence, ownership and declared dependencies of the accounts a
//! transaction touches, before anything is sent for simulation.

pub mod account_validator;
pub mod types;

pub use account_validator::{is_well_known_program, AccountValidator};
pub use types::{
    AccountDependency, AccountValidationStatus, DependencyType, FetchStrategy, ValidationConfig,
    ValidationError, ValidationErrorKind, ValidationResult, ValidationWarning,
};
