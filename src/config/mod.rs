pub mod applicator;
pub mod loader;
pub mod schema;

pub use applicator::{
    apply_operations, target_files, ApplicationError, ApplyOptions, OperationResult,
};
pub use loader::{discover, load_from_path, load_from_str, ConfigError, OPERATIONS_DIR};
pub use schema::{
    Metadata, OperationConfig, OperationDefinition, PropertySpec, ValidationError,
    ValidationIssue,
};
