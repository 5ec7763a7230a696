// (C) Copyright 2020 Hewlett Packard Enterprise Development LP

use std::collections::HashMap;

use chrono::prelude::*;
use regex;
use snafu::{ResultExt, Snafu};

#[cfg(test)] use spectral::prelude::*;

/// The strftime format Apache uses for `%t` when no explicit sub-format is
/// given, already in chrono syntax
pub const DEFAULT_TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

#[derive(Debug, Snafu)]
pub enum Error {
  #[snafu(display("unsupported strftime directive: %{}", directive))]
  UnsupportedDirective {
    directive: char
  },

  #[snafu(display(
    "time value {:?} does not conform to format {:?}: {}",
    value, format, source
  ))]
  TimeParse {
    value: String,
    format: String,
    source: chrono::format::ParseError
  }
}

lazy_static! {
  /// Fragments recognizing the text produced by one strftime directive.
  ///
  /// Fragments carry no capture groups of their own so callers control
  /// grouping; the table is closed and anything absent is unsupported.
  static ref DIRECTIVE_PATTERNS: HashMap<char, &'static str> = hashmap!{
    'a' => r"\S{3}",
    'A' => r"\S+?",
    'b' => r"\S{3}",
    'B' => r"\S+?",
    'c' => r"\S{3}\s\S{3}\s\d{2}\s\d{2}:\d{2}:\d{2}\s\S{3}",
    'C' => r"\d{2}",
    'd' => r"\d{2}",
    'D' => r"\d{2}/\d{2}/\d{2}",
    'e' => r"\d{2}",
    'F' => r"\d{4}-\d{2}-\d{2}",
    'G' => r"\d{4}",
    'g' => r"\d{2}",
    'h' => r"\S{3}",
    'H' => r"\d{2}",
    'I' => r"\d{2}",
    'j' => r"\d{3}",
    'k' => r"\S+?",
    'l' => r"\S+?",
    'm' => r"\d{2}",
    'M' => r"\d{2}",
    'p' => r"\S{2}",
    'P' => r"\S{2}",
    'r' => r"\d{2}:\d{2}:\d{2}\s\S{2}",
    'R' => r"\d{2}:\d{2}",
    's' => r"\d+?",
    'S' => r"\d{2}",
    'T' => r"\d{2}:\d{2}:\d{2}",
    'u' => r"\d{1}",
    'U' => r"\d{2}",
    'V' => r"\d{2}",
    'w' => r"\d{1}",
    'x' => r"\d{2}/\d{2}/\d{2}",
    'X' => r"\d{2}:\d{2}:\d{2}",
    'y' => r"\d{2}",
    'Y' => r"\d{4}",
    'z' => r"\S\d+?",
    'Z' => r"\S{3}"
  };

  /// chrono replacement tokens for strftime directives
  ///
  /// chrono's format syntax is itself strftime-shaped, so most entries map
  /// to themselves; the table still drives translation so that unknown
  /// directives can be rejected or demoted to literals in one place.
  static ref DIRECTIVE_TOKENS: HashMap<char, &'static str> = hashmap!{
    'a' => "%a", 'A' => "%A", 'b' => "%b", 'B' => "%B", 'c' => "%c",
    'C' => "%C", 'd' => "%d", 'D' => "%D", 'e' => "%e", 'F' => "%F",
    'G' => "%G", 'g' => "%g", 'h' => "%h", 'H' => "%H", 'I' => "%I",
    'j' => "%j", 'k' => "%k", 'l' => "%l", 'm' => "%m", 'M' => "%M",
    'n' => "%n", 'p' => "%p", 'P' => "%P", 'r' => "%r", 'R' => "%R",
    's' => "%s", 'S' => "%S", 't' => "%t", 'T' => "%T", 'u' => "%u",
    'U' => "%U", 'V' => "%V", 'w' => "%w", 'x' => "%x", 'X' => "%X",
    'y' => "%y", 'Y' => "%Y", 'z' => "%z", 'Z' => "%Z", '%' => "%%"
  };
}

/// Returns the regex fragment recognizing one strftime directive's output
pub fn fragment_for(directive: char) -> Result<&'static str, Error> {
  match DIRECTIVE_PATTERNS.get(&directive) {
    Some(fragment) => Ok(*fragment),
    None => Err(Error::UnsupportedDirective { directive })
  }
}

/// Builds a regex matching an entire timestamp written in the given strftime
/// format.
///
/// The whole timestamp is wrapped in exactly one capture group, regardless
/// of how many directives the sub-format contains, so the pattern stays
/// aligned with its single position in a line format.
pub fn time_pattern(strf: &str) -> Result<String, Error> {
  let chars: Vec<char> = strf.chars().collect();
  let mut pattern = String::from("(");
  let mut i = 0;

  while i < chars.len() {
    if chars[i] == '%' && i + 1 < chars.len() {
      pattern.push_str(fragment_for(chars[i + 1])?);
      i += 2;
    } else {
      pattern.push_str(&regex::escape(&chars[i].to_string()));
      i += 1;
    }
  }

  pattern.push(')');
  Ok(pattern)
}

fn push_literal(out: &mut String, c: char) {
  // chrono reads a bare % as the start of a directive, so literal text
  // must escape it
  if c == '%' {
    out.push_str("%%");
  } else {
    out.push(c);
  }
}

/// Rewrites a strftime format string into a chrono format string.
///
/// Directives pass through the token table, `%O`/`%E` modifier prefixes
/// collapse to their base directive, and unknown directives are demoted to
/// escaped literal text rather than being handed to chrono as tokens.
pub fn to_chrono_format(strf: &str) -> String {
  let chars: Vec<char> = strf.chars().collect();
  let mut out = String::new();
  let mut i = 0;

  while i < chars.len() {
    if chars[i] != '%' {
      push_literal(&mut out, chars[i]);
      i += 1;
      continue;
    }

    // a directive: modifier prefixes have no chrono equivalent and only
    // qualify the directive that follows them
    let mut j = i + 1;
    while j < chars.len() && (chars[j] == 'O' || chars[j] == 'E') {
      j += 1;
    }

    match chars.get(j) {
      Some(directive) => {
        match DIRECTIVE_TOKENS.get(directive) {
          Some(token) => out.push_str(token),
          None => {
            push_literal(&mut out, '%');
            push_literal(&mut out, *directive);
          }
        }

        i = j + 1;
      },
      None => {
        // the string ended inside a directive; everything consumed so far
        // becomes literal text
        for k in i..j {
          push_literal(&mut out, chars[k]);
        }

        i = j;
      }
    }
  }

  out
}

fn pattern_token(letter: char, count: usize) -> Option<&'static str> {
  match (letter, count) {
    ('y', 2) => Some("%y"),
    ('y', _) => Some("%Y"),
    ('M', c) if c >= 4 => Some("%B"),
    ('M', 3) => Some("%b"),
    ('M', 2) => Some("%m"),
    ('M', 1) => Some("%-m"),
    ('d', 1) => Some("%-d"),
    ('d', _) => Some("%d"),
    ('D', _) => Some("%j"),
    ('E', c) if c >= 4 => Some("%A"),
    ('E', _) => Some("%a"),
    ('H', 1) => Some("%-H"),
    ('H', _) => Some("%H"),
    ('h', 1) => Some("%-I"),
    ('h', _) => Some("%I"),
    ('m', 1) => Some("%-M"),
    ('m', _) => Some("%M"),
    ('s', 1) => Some("%-S"),
    ('s', _) => Some("%S"),
    ('S', _) => Some("%3f"),
    ('a', _) => Some("%p"),
    ('w', _) => Some("%U"),
    ('z', _) => Some("%Z"),
    ('Z', _) => Some("%z"),
    _ => None
  }
}

/// Rewrites an output date pattern into a chrono format string.
///
/// The pattern mini-language treats runs of the same letter as a directive
/// and text between single quotes as literal (with `''` as an escaped
/// quote). Literal runs and directive runs use different escaping on the
/// chrono side, so the scan tracks which of the two it is inside and never
/// concatenates them unescaped; a literal run left open at the end of the
/// pattern is closed there. Unknown letter runs are emitted as literals.
pub fn pattern_to_chrono(pattern: &str) -> String {
  let chars: Vec<char> = pattern.chars().collect();
  let mut out = String::new();
  let mut i = 0;

  while i < chars.len() {
    let c = chars[i];

    if c == '\'' && chars.get(i + 1) == Some(&'\'') {
      // a doubled quote outside a run is an escaped literal quote
      push_literal(&mut out, '\'');
      i += 2;
    } else if c == '\'' {
      // quoted literal run
      i += 1;

      while i < chars.len() {
        if chars[i] == '\'' {
          if chars.get(i + 1) == Some(&'\'') {
            push_literal(&mut out, '\'');
            i += 2;
          } else {
            i += 1;
            break;
          }
        } else {
          push_literal(&mut out, chars[i]);
          i += 1;
        }
      }
    } else if c.is_ascii_alphabetic() {
      let mut count = 1;
      while i + count < chars.len() && chars[i + count] == c {
        count += 1;
      }

      match pattern_token(c, count) {
        Some(token) => out.push_str(token),
        None => for _ in 0..count {
          push_literal(&mut out, c);
        }
      }

      i += count;
    } else {
      push_literal(&mut out, c);
      i += 1;
    }
  }

  out
}

/// Parses a timestamp under the given strftime format and re-renders it
/// with the output date pattern.
///
/// An empty source format falls back to the Apache access log default. A
/// value with no UTC offset parses as a naive timestamp and is assumed to
/// be UTC, a bare date is taken at midnight, and a value that does not
/// conform to the format at all fails with `TimeParse`.
pub fn transcode(
  value: &str, strf_format: &str, output_pattern: &str
) -> Result<String, Error> {
  let source = if strf_format.is_empty() {
    DEFAULT_TIME_FORMAT.to_string()
  } else {
    to_chrono_format(strf_format)
  };

  let output = pattern_to_chrono(output_pattern);

  if let Ok(datetime) = DateTime::parse_from_str(value, &source) {
    return Ok(datetime.format(&output).to_string());
  }

  if let Ok(naive) = NaiveDateTime::parse_from_str(value, &source) {
    return Ok(Utc.from_utc_datetime(&naive).format(&output).to_string());
  }

  let date = NaiveDate::parse_from_str(value, &source)
    .context(TimeParse {
      value: value.to_string(),
      format: source.clone()
    })?;

  // midnight always exists, so the unwrap can't fire
  let naive = date.and_hms_opt(0, 0, 0).unwrap();

  Ok(Utc.from_utc_datetime(&naive).format(&output).to_string())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_fragment_known() {
    assert_that!(fragment_for('Y')).is_ok_containing(r"\d{4}");
  }

  #[test]
  fn test_fragment_unknown() {
    assert_that!(fragment_for('q')).is_err();
  }

  #[test]
  fn test_time_pattern_composite() {
    let pattern = time_pattern("%a %p %c").unwrap();

    assert_eq!(
      pattern,
      r"(\S{3} \S{2} \S{3}\s\S{3}\s\d{2}\s\d{2}:\d{2}:\d{2}\s\S{3})"
    );
  }

  #[test]
  fn test_time_pattern_escapes_literals() {
    // a dot between directives must not match arbitrary characters
    assert_eq!(time_pattern("%H.%M").unwrap(), r"(\d{2}\.\d{2})");
  }

  #[test]
  fn test_time_pattern_unsupported() {
    assert_that!(time_pattern("%d %q")).is_err();
  }

  #[test]
  fn test_to_chrono_passthrough() {
    assert_eq!(
      to_chrono_format("%d/%b/%Y:%H:%M:%S %z"),
      "%d/%b/%Y:%H:%M:%S %z"
    );
  }

  #[test]
  fn test_to_chrono_modifier_collapses() {
    assert_eq!(to_chrono_format("%Od"), "%d");
    assert_eq!(to_chrono_format("%EY"), "%Y");
  }

  #[test]
  fn test_to_chrono_unknown_directive() {
    // unknown directives become escaped literal text
    assert_eq!(to_chrono_format("%q"), "%%q");
  }

  #[test]
  fn test_to_chrono_trailing_percent() {
    assert_eq!(to_chrono_format("%H%"), "%H%%");
  }

  #[test]
  fn test_pattern_to_chrono_full() {
    assert_eq!(
      pattern_to_chrono("yyyy-MM-dd'T'HH:mm:ssZ"),
      "%Y-%m-%dT%H:%M:%S%z"
    );
  }

  #[test]
  fn test_pattern_to_chrono_names() {
    assert_eq!(
      pattern_to_chrono("EEE, dd MMM yyyy HH:mm:ss z"),
      "%a, %d %b %Y %H:%M:%S %Z"
    );
  }

  #[test]
  fn test_pattern_to_chrono_escaped_quote() {
    assert_eq!(pattern_to_chrono("hh''mm"), "%I'%M");
  }

  #[test]
  fn test_pattern_to_chrono_unterminated_literal() {
    // the open literal run is closed by the end of the pattern
    assert_eq!(pattern_to_chrono("HH'Z"), "%HZ");
  }

  #[test]
  fn test_pattern_to_chrono_unknown_letter() {
    assert_eq!(pattern_to_chrono("yyyy QQ"), "%Y QQ");
  }

  #[test]
  fn test_transcode_default_format() {
    let result = transcode(
      "08/Jan/2014:15:32:30 +0900",
      "",
      "yyyy-MM-dd'T'HH:mm:ssZ"
    );

    assert_that!(result).is_ok_containing("2014-01-08T15:32:30+0900".to_string());
  }

  #[test]
  fn test_transcode_explicit_format() {
    let result = transcode(
      "2014-01-08 15:32:30",
      "%F %T",
      "dd/MMM/yyyy HH:mm:ss"
    );

    // no offset in the source format, so the value is taken as utc
    assert_that!(result).is_ok_containing("08/Jan/2014 15:32:30".to_string());
  }

  #[test]
  fn test_transcode_impossible_date() {
    let result = transcode(
      "31/Feb/2014:00:00:00 +0900",
      "",
      "yyyy-MM-dd'T'HH:mm:ssZ"
    );

    assert_that!(result).is_err();
  }

  #[test]
  fn test_transcode_mismatched_value() {
    let result = transcode("not a time", "", "yyyy-MM-dd");

    assert_that!(result).is_err();
  }
}
