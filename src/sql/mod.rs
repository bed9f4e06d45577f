// ABOUTME: SQL building blocks shared by both compilers
// ABOUTME: Alias allocation, quoting, and the token-substituting query builder

pub mod alias;
pub mod builder;
pub mod quote;

pub use alias::TableAliases;
pub use builder::{CompiledQuery, QueryBuilder};
pub use quote::{column_ref, quote_ident, quote_literal, table_as};
