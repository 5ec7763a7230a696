// (C) Copyright 2020 Hewlett Packard Enterprise Development LP

pub mod format;
pub mod record;
pub mod strftime;
mod types;

pub use self::format::{build_plan, compile, directives};
pub use self::record::extract;
pub use self::types::{Directive, Plan, Record};
