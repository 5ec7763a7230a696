// (C) Copyright 2020 Hewlett Packard Enterprise Development LP

use snafu::{ResultExt, Snafu};

use super::format;
use super::strftime;
use super::types::{Directive, Plan, Record};

#[cfg(test)] use spectral::prelude::*;

#[derive(Debug, Snafu)]
pub enum Error {
  #[snafu(display("could not convert time field: {}", source))]
  TimeConversion {
    source: strftime::Error
  }
}

/// Applies a compiled Plan to one raw line.
///
/// A line the matcher rejects yields a record carrying only the hostname
/// key; callers decide whether that is worth shipping. The time field is
/// rewritten into the output date pattern, and a time value that cannot be
/// transcoded fails this line alone. Directives without a canonical name
/// are dropped from the output.
pub fn extract(
  plan: &Plan, line: &str, host: &str, date_pattern: &str
) -> Result<Record, Error> {
  let mut record = Record::new();

  if let Some(caps) = plan.matcher.captures(line) {
    for (index, directive) in plan.directives.iter().enumerate() {
      let value = match caps.get(index + 1) {
        Some(group) => group.as_str(),
        None => continue
      };

      match directive {
        Directive::Time(sub) => {
          let time = strftime::transcode(value, sub, date_pattern)
            .context(TimeConversion)?;

          record.insert("time".to_string(), time);
        },
        Directive::Field(text) => match format::field_name(text) {
          Some("time") => {
            // the plain %t directive always carries the default format
            let time = strftime::transcode(value, "", date_pattern)
              .context(TimeConversion)?;

            record.insert("time".to_string(), time);
          },
          Some(name) => {
            record.insert(name.to_string(), value.to_string());
          },
          None => ()
        }
      }
    }
  }

  record.insert("hostname".to_string(), host.to_string());

  Ok(record)
}
