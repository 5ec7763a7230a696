// (C) Copyright 2020 Hewlett Packard Enterprise Development LP

use std::collections::HashMap;

use regex::Regex;
use snafu::{ResultExt, Snafu};

use super::strftime;
use super::types::{Directive, Plan};

#[cfg(test)] use spectral::prelude::*;

#[derive(Debug, Snafu)]
pub enum Error {
  #[snafu(display("unknown log format directive: {}", directive))]
  UnknownDirective {
    directive: String
  },

  #[snafu(display("invalid time sub-format: {}", source))]
  BadTimeFormat {
    source: strftime::Error
  },

  #[snafu(display("could not compile format matcher: {}", source))]
  BadMatcher {
    source: regex::Error
  }
}

lazy_static! {
  /// splits a line format into its component directives
  static ref DIRECTIVE: Regex = Regex::new(
    r"(%U%q)|(%>s)|(%[a-zA-Z])|(%\{.*?\}[a-zA-Z])"
  ).unwrap();

  /// recognizes the embedded time directive and captures its sub-format
  static ref TIME_DIRECTIVE: Regex = Regex::new(r"^%\{(.*)\}t$").unwrap();

  /// fixed matching fragments for field directives
  static ref FIELD_PATTERNS: HashMap<&'static str, &'static str> = hashmap!{
    "%h" => r"([\d.]+)",
    "%l" => r"(\S+)",
    "%u" => r"(\S+)",
    "%t" => r"\[([\w:/]+\s[+\-]\d{4})\]",
    "%r" => r#""(.+?)""#,
    "%>s" => r"(\d{3})",
    "%b" => r"(\S+)",
    "%{Referer}i" => r#""(.*?)""#,
    "%{User-Agent}i" => r#""(.*?)""#,
    "%D" => r"(\d+)",
    "%T" => r"(\d+)",
    "%U%q" => r"(\S+)",
    "%m" => r"(\S+)",
    "%H" => r"(\S+)"
  };

  /// canonical output keys for field directives
  static ref FIELD_NAMES: HashMap<&'static str, &'static str> = hashmap!{
    "%h" => "host",
    "%l" => "ident",
    "%u" => "user",
    "%t" => "time",
    "%r" => "req",
    "%>s" => "status",
    "%b" => "size",
    "%{Referer}i" => "referer",
    "%{User-Agent}i" => "ua",
    "%D" => "reqtime_microsec",
    "%T" => "reqtime",
    "%U%q" => "uri",
    "%m" => "method",
    "%H" => "protocol"
  };
}

/// Resolves a field directive to its canonical output key, if it has one
pub fn field_name(directive: &str) -> Option<&'static str> {
  FIELD_NAMES.get(directive).copied()
}

/// Splits a line format string into its directives, in order of appearance.
/// Text between directives is treated as separator noise and discarded.
pub fn directives(format: &str) -> Vec<Directive> {
  DIRECTIVE.find_iter(format).map(|token| {
    let text = token.as_str();

    match TIME_DIRECTIVE.captures(text) {
      Some(caps) => Directive::Time(caps[1].to_string()),
      None => Directive::Field(text.to_string())
    }
  }).collect()
}

/// Compiles an ordered directive list into a Plan.
///
/// Each directive contributes exactly one capture group, joined by single
/// spaces; the time directive routes through the strftime tables and its
/// sub-format is recorded on the plan. A directive absent from the field
/// table fails compilation, before any input is read.
pub fn build_plan(directives: Vec<Directive>) -> Result<Plan, Error> {
  let mut pattern = String::new();
  let mut time_format = None;

  for directive in &directives {
    let fragment = match directive {
      Directive::Time(sub) => {
        time_format = Some(sub.clone());
        strftime::time_pattern(sub).context(BadTimeFormat)?
      },
      Directive::Field(text) => match FIELD_PATTERNS.get(text.as_str()) {
        Some(fragment) => (*fragment).to_string(),
        None => return Err(Error::UnknownDirective {
          directive: text.clone()
        })
      }
    };

    if !pattern.is_empty() {
      pattern.push(' ');
    }

    pattern.push_str(&fragment);
  }

  let matcher = Regex::new(&pattern).context(BadMatcher)?;

  Ok(Plan { directives, matcher, time_format })
}

/// Compiles a line format string straight to a Plan
pub fn compile(format: &str) -> Result<Plan, Error> {
  build_plan(directives(format))
}

#[cfg(test)]
mod tests {
  use super::*;

  const COMBINED_FORMAT: &str = "%h %l %u %t \"%r\" %>s %b %D %T";

  #[test]
  fn test_directives_combined() {
    let parsed = directives(COMBINED_FORMAT);

    assert_that!(parsed).has_length(9);
    assert_eq!(parsed[0], Directive::Field("%h".to_string()));
    assert_eq!(parsed[3], Directive::Field("%t".to_string()));
    assert_eq!(parsed[5], Directive::Field("%>s".to_string()));
    assert_eq!(parsed[8], Directive::Field("%T".to_string()));
  }

  #[test]
  fn test_directives_embedded_time() {
    let parsed = directives("%h %{%a %p %c}t");

    assert_eq!(parsed, vec![
      Directive::Field("%h".to_string()),
      Directive::Time("%a %p %c".to_string())
    ]);
  }

  #[test]
  fn test_directives_uri_and_header() {
    let parsed = directives("%m %U%q %{Referer}i");

    assert_eq!(parsed, vec![
      Directive::Field("%m".to_string()),
      Directive::Field("%U%q".to_string()),
      Directive::Field("%{Referer}i".to_string())
    ]);
  }

  #[test]
  fn test_plan_matcher_source() {
    let plan = compile(COMBINED_FORMAT).unwrap();

    assert_eq!(
      plan.matcher.as_str(),
      r#"([\d.]+) (\S+) (\S+) \[([\w:/]+\s[+\-]\d{4})\] "(.+?)" (\d{3}) (\S+) (\d+) (\d+)"#
    );
    assert_eq!(plan.time_format, None);
  }

  #[test]
  fn test_plan_matcher_embedded_time() {
    let plan = compile("%h %{%a %p %c}t").unwrap();

    assert_eq!(
      plan.matcher.as_str(),
      r"([\d.]+) (\S{3} \S{2} \S{3}\s\S{3}\s\d{2}\s\d{2}:\d{2}:\d{2}\s\S{3})"
    );
    assert_eq!(plan.time_format, Some("%a %p %c".to_string()));
  }

  #[test]
  fn test_plan_group_alignment() {
    // one capture group per directive, even with an embedded time format
    for format in &[COMBINED_FORMAT, "%h %{%d/%b/%Y}t %>s", "%m %U%q"] {
      let plan = compile(format).unwrap();

      assert_eq!(plan.matcher.captures_len(), plan.directives.len() + 1);
    }
  }

  #[test]
  fn test_plan_matches_combined_line() {
    let plan = compile(COMBINED_FORMAT).unwrap();
    let line = "127.0.0.1 - - [30/Aug/2013:14:44:00 +0900] \"GET / HTTP/1.1\" 304 0 500 0";

    let caps = plan.matcher.captures(line).unwrap();
    let fields: Vec<&str> = (1..caps.len())
      .map(|index| caps.get(index).unwrap().as_str())
      .collect();

    assert_eq!(fields, vec![
      "127.0.0.1",
      "-",
      "-",
      "30/Aug/2013:14:44:00 +0900",
      "GET / HTTP/1.1",
      "304",
      "0",
      "500",
      "0"
    ]);
  }

  #[test]
  fn test_plan_matches_embedded_time_line() {
    let plan = compile("%h %{%d/%b/%Y}t %>s").unwrap();

    let caps = plan.matcher.captures("10.0.0.5 30/Aug/2013 200").unwrap();

    assert_eq!(caps.get(1).unwrap().as_str(), "10.0.0.5");
    assert_eq!(caps.get(2).unwrap().as_str(), "30/Aug/2013");
    assert_eq!(caps.get(3).unwrap().as_str(), "200");
  }

  #[test]
  fn test_plan_unknown_directive() {
    assert_that!(compile("%h %Z")).is_err();
  }

  #[test]
  fn test_plan_unknown_header_directive() {
    assert_that!(compile("%h %{Host}i")).is_err();
  }

  #[test]
  fn test_plan_unsupported_time_directive() {
    assert_that!(compile("%h %{%q}t")).is_err();
  }

  #[test]
  fn test_plan_empty_format() {
    let plan = compile("").unwrap();

    assert!(plan.directives.is_empty());
    assert!(plan.matcher.is_match(""));
    assert_eq!(plan.matcher.captures_len(), 1);
  }
}
