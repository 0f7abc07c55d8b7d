//! Reading problem instances.

mod instance;

pub use instance::{parse_line, read_instances, read_instances_from, Instance};
