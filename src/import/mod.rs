mod associations;
mod coordinator;
mod normalize;
pub mod request;
pub mod result;
mod synchronize;
pub mod validation;

pub use coordinator::{EngineLimits, Importer};
pub use request::{ImportOptions, ImportRequest, Rows, Synchronize, model_refs};
pub use result::{ChildImport, FailedRecord, ImportResult};
pub use validation::ValidationRule;
