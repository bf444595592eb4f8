// Conversions between PostgreSQL values and JSON
pub mod value_converter;

pub use value_converter::ValueConverter;
