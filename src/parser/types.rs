// (C) Copyright 2020 Hewlett Packard Enterprise Development LP

use std::collections::HashMap;

use regex::Regex;

/// A single field-selecting token parsed out of a line format string
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
  /// A fixed directive with a static matching fragment, e.g. `%h` or `%>s`
  Field(String),

  /// The embedded time directive `%{...}t`, carrying its strftime
  /// sub-format
  Time(String)
}

/// A compiled line format.
///
/// Capture group `i` of the matcher corresponds to `directives[i]`; a line
/// the matcher rejects yields no fields rather than an error. `time_format`
/// holds the sub-format of the embedded time directive when the format
/// contained one.
#[derive(Debug, Clone)]
pub struct Plan {
  pub directives: Vec<Directive>,
  pub matcher: Regex,
  pub time_format: Option<String>
}

/// Canonical field name to value mapping extracted from one log line
pub type Record = HashMap<String, String>;
