// (C) Copyright 2020 Hewlett Packard Enterprise Development LP

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::str::FromStr;
use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;
use serde::de::{self, Visitor, Deserializer};
use shellexpand;
use simple_error::SimpleError;
use structopt::StructOpt;

use crate::reader;

#[derive(Debug)]
pub enum ReaderType {
  Auto,
  Tail,
  Watch,
  Null
}

fn get_auto_reader(config: Arc<Config>) -> reader::Reader {
  if config.producer.tail_path.is_some() {
    return reader::read_tail;
  }

  if config.producer.target_dir.is_some() {
    return reader::read_watch;
  }

  reader::read_null
}

impl ReaderType {
  pub fn get_reader(&self, config: Arc<Config>) -> reader::Reader {
    match *self {
      ReaderType::Auto => get_auto_reader(config),
      ReaderType::Tail => reader::read_tail,
      ReaderType::Watch => reader::read_watch,
      ReaderType::Null => reader::read_null
    }
  }
}

impl FromStr for ReaderType {
  type Err = Box<dyn Error>;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "auto" => Ok(ReaderType::Auto),
      "tail" => Ok(ReaderType::Tail),
      "watch" => Ok(ReaderType::Watch),
      "null" => Ok(ReaderType::Null),
      _ => bail!(format!("invalid reader type: {}", s))
    }
  }
}

struct FilePatternFromStr;

impl<'de> Visitor<'de> for FilePatternFromStr {
  type Value = Regex;

  fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.write_str("a string containing a valid regular expression")
  }

  fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
  where
    E: de::Error
  {
    // the pattern matches whole file names, so anchor it
    match Regex::new(&format!("^(?:{})$", s)) {
      Ok(r) => Ok(r),
      Err(e) => Err(de::Error::custom(format!(
        "could not compile file pattern: {:?}", e
      )))
    }
  }
}

fn de_file_pattern<'de, D>(deserializer: D) -> Result<Regex, D::Error>
where
  D: Deserializer<'de>
{
  deserializer.deserialize_str(FilePatternFromStr)
}

fn default_tail_command() -> String {
  "tail -F".to_string()
}

fn default_file_pattern() -> Regex {
  // the unwrap can't fire, the pattern is fixed
  Regex::new("^(?:access_[0-9][0-9][0-9][0-9][0-9].*)$").unwrap()
}

fn default_retry_num() -> usize {
  3
}

fn default_max_send_size() -> usize {
  100
}

fn default_send_timeout() -> u64 {
  30
}

/// Producer settings loaded from the YAML config file
#[derive(Debug, Deserialize)]
pub struct ProducerConfig {
  /// Command run against `tail.path` by the tail reader
  #[serde(rename = "tail.command", default = "default_tail_command")]
  pub tail_command: String,

  /// Single log file to follow with the tail command
  #[serde(rename = "tail.path", default)]
  pub tail_path: Option<String>,

  /// Directory holding a rotating family of log files, followed by the
  /// watch reader
  #[serde(rename = "tail.target.dir", default)]
  pub target_dir: Option<String>,

  /// Pattern selecting which file names in the target directory belong to
  /// the followed family; matched against the whole name
  #[serde(
    rename = "tail.file.pattern",
    default = "default_file_pattern",
    deserialize_with = "de_file_pattern"
  )]
  pub file_pattern: Regex,

  /// Times a refused read of the followed file is attempted before the
  /// stream is abandoned
  #[serde(rename = "tail.retry.num", default = "default_retry_num")]
  pub retry_num: usize,

  /// Kafka topic records are published under
  #[serde(rename = "kafka.topic")]
  pub topic: String,

  /// Comma-separated Kafka bootstrap brokers
  #[serde(rename = "kafka.broker.list")]
  pub brokers: String,

  /// Apache LogFormat string describing each input line
  #[serde(rename = "apachelog.format")]
  pub log_format: String,

  /// Date pattern for the `time` field of produced records
  #[serde(rename = "jsondate.format")]
  pub date_format: String,

  /// Records accumulated before a batch is handed to the sink
  #[serde(rename = "max.send.size", default = "default_max_send_size")]
  pub max_send_size: usize,

  /// Seconds allowed for each batch delivery
  #[serde(rename = "send.timeout.secs", default = "default_send_timeout")]
  pub send_timeout_secs: u64,

  /// Remaining options; `kafka.*` entries pass through to the producer
  #[serde(flatten)]
  pub kafka_options: HashMap<String, serde_yaml::Value>
}

impl FromStr for ProducerConfig {
  type Err = SimpleError;

  fn from_str(path: &str) -> Result<Self, Self::Err> {
    let expanded_path = shellexpand::full(path).map_err(SimpleError::from)?;
    let file = File::open(&expanded_path.to_string()).map_err(SimpleError::from)?;
    let reader = BufReader::new(file);

    match serde_yaml::from_reader(reader) {
      Ok(config) => Ok(config),
      Err(e) => Err(SimpleError::new(
        format!("error loading config {}: {:?}", path, e)
      ))
    }
  }
}

#[derive(Debug, StructOpt)]
#[structopt(name = "kafkatail", rename_all = "kebab-case")]
pub struct Config {
  /// Path to the producer YAML config file
  ///
  /// Recognized keys: tail.command, tail.path, tail.target.dir,
  /// tail.file.pattern, tail.retry.num, kafka.topic, kafka.broker.list,
  /// apachelog.format, jsondate.format, max.send.size, send.timeout.secs.
  /// Other kafka.* keys pass through to librdkafka unchanged.
  #[structopt(long = "config", short = "c", env = "KT_CONFIG")]
  pub producer: ProducerConfig,

  /// Reader to use, one of: auto, tail, watch
  ///
  /// If auto, the reader is selected from the configured source: tail.path
  /// selects the tail reader and tail.target.dir selects the watch reader.
  #[structopt(long, short = "i", default_value = "auto", env = "KT_READER")]
  pub reader: ReaderType,

  /// Hostname recorded on produced records, resolved from the system if
  /// unset
  #[structopt(long, env = "KT_HOSTNAME")]
  pub hostname: Option<String>
}

#[cfg(test)]
mod tests {
  use super::*;

  use std::io::Write;

  use tempfile::NamedTempFile;

  fn load(yaml: &str) -> ProducerConfig {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    file.path().to_str().unwrap().parse().unwrap()
  }

  #[test]
  fn test_minimal_config() {
    let config = load(
      "tail.target.dir: /var/log/httpd\n\
      kafka.topic: apache\n\
      kafka.broker.list: broker1:9092,broker2:9092\n\
      apachelog.format: '%h %l %u %t \"%r\" %>s %b'\n\
      jsondate.format: yyyy-MM-dd'T'HH:mm:ssZ\n"
    );

    assert_eq!(config.tail_command, "tail -F");
    assert_eq!(config.target_dir, Some("/var/log/httpd".to_string()));
    assert_eq!(config.topic, "apache");
    assert_eq!(config.brokers, "broker1:9092,broker2:9092");
    assert_eq!(config.max_send_size, 100);
    assert_eq!(config.retry_num, 3);

    assert!(config.file_pattern.is_match("access_00123.log"));
    assert!(!config.file_pattern.is_match("error.log"));
    assert!(!config.file_pattern.is_match("old_access_00123.log"));
  }

  #[test]
  fn test_kafka_options_pass_through() {
    let config = load(
      "tail.path: /var/log/httpd/access_log\n\
      kafka.topic: apache\n\
      kafka.broker.list: localhost:9092\n\
      kafka.compression.codec: snappy\n\
      kafka.serializer.class: kafka.serializer.StringEncoder\n\
      apachelog.format: '%h'\n\
      jsondate.format: yyyy-MM-dd\n"
    );

    assert_eq!(
      config.kafka_options.get("kafka.compression.codec"),
      Some(&serde_yaml::Value::String("snappy".to_string()))
    );
  }

  #[test]
  fn test_custom_file_pattern() {
    let config = load(
      "tail.target.dir: /logs\n\
      tail.file.pattern: 'www[0-9]+\\.log'\n\
      kafka.topic: apache\n\
      kafka.broker.list: localhost:9092\n\
      apachelog.format: '%h'\n\
      jsondate.format: yyyy-MM-dd\n"
    );

    assert!(config.file_pattern.is_match("www42.log"));
    assert!(!config.file_pattern.is_match("www42.log.gz"));
  }

  #[test]
  fn test_missing_required_key() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"kafka.topic: apache\n").unwrap();

    let result = file.path().to_str().unwrap().parse::<ProducerConfig>();
    assert!(result.is_err());
  }

  #[test]
  fn test_missing_config_file() {
    let result = "/nonexistent/producer.yaml".parse::<ProducerConfig>();
    assert!(result.is_err());
  }
}
