//! Command executor configurations

pub mod mssql;

pub use mssql::{create_mssql_command_executor, MSSQL_HOST_COMMANDS};
