//! Free-text resolvers: deadline strings and assignee strings into
//! structured values. Pure functions over pre-fetched inputs so they can be
//! table-tested without a database or a clock.

pub mod assignee;
pub mod deadline;

pub use assignee::{resolve_assignee, Assignment, DirectoryUser, UserDirectory};
pub use deadline::parse_deadline;
