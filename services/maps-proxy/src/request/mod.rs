mod descriptor;
mod error;
mod normalizer;

pub use descriptor::{AuthOverride, HttpMethod, NormalizedRequest, RequestDescriptor};
pub use error::ValidationError;
pub use normalizer::{build_query_string, Normalizer};
