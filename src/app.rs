//! Command-line surface: verb parsing, the handlers behind each verb, and
//! the support glue shared between them.

pub mod cli;
pub mod command_handlers;
pub mod command_support;
