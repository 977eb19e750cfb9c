//! Command layer
//!
//! One struct per verb over the hybrid client and workflow engine. The
//! shared logic lives in `support` as plain functions taking typed
//! arguments; commands compose them rather than inheriting them.

pub mod create;
pub mod get;
pub mod init;
pub mod set_body;
pub mod support;
pub mod todo;
pub mod workflow;

pub use create::{CreateCommand, CreateReport};
pub use get::{GetCommand, GetReport};
pub use init::{InitCommand, InitReport};
pub use set_body::{SetBodyCommand, SetBodyReport};
pub use todo::{CheckTodoCommand, CheckTodoReport, CreateTodoCommand, CreateTodoReport};
pub use workflow::{WorkflowCommand, WorkflowVerb};
