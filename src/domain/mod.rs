//! Query descriptions, the statement builder, and the error taxonomy.

pub mod error;
pub mod query;
