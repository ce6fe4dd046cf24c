pub mod extract;
pub mod pagination;

pub use extract::{IdPath, Payload, QueryParams};
pub use pagination::PaginationParams;
