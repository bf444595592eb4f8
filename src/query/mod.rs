// Statement classification, parameter binding and result shaping
pub mod params;
pub mod result;
pub mod statement;

pub use params::{JsonParam, ParamError, bind_params};
pub use result::{FieldInfo, QueryResult};
pub use statement::QueryType;
