pub mod cache;
pub mod cast;
pub mod config;
pub mod denormalize;
pub mod normalize;
pub mod project;
pub mod table;
pub mod transform;

pub use cache::{Clock, ManualClock, ReferenceCache, SystemClock, DEFAULT_TTL_SECS};
pub use cast::{apply_cast, resolve, try_cast, CastError};
pub use config::{CastMode, CastSpec, ConfigError, FieldRule, MappingConfig, Rules};
pub use denormalize::{denormalize, ChildRelation, DenormalizeError};
pub use normalize::{canonical_accounts, CanonicalNormalizer, ReferenceSeed, ReferenceTable};
pub use project::project;
pub use table::{Table, TableError};
pub use transform::{transform, transform_all, Record, TransformError};
