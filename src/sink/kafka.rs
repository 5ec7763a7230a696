// (C) Copyright 2020 Hewlett Packard Enterprise Development LP

use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::producer::{BaseProducer, BaseRecord, Producer};
use simple_error::{SimpleError, SimpleResult};

use crate::config::ProducerConfig;
use super::types::{KeyedMessage, Sink};

/// Kafka-backed Sink delivering each batch through a librdkafka producer
pub struct KafkaSink {
  producer: BaseProducer,
  timeout: Duration
}

impl KafkaSink {
  /// Builds the producer from `kafka.broker.list` plus whatever other
  /// `kafka.*` options the config carries, passed through to librdkafka
  /// untouched.
  pub fn new(config: &ProducerConfig) -> SimpleResult<KafkaSink> {
    let mut client = ClientConfig::new();
    client.set("bootstrap.servers", &config.brokers);

    for (key, value) in &config.kafka_options {
      let option = match key.strip_prefix("kafka.") {
        Some(option) => option,
        None => continue
      };

      // serializer.class is a JVM-ism; payloads here are already strings
      if option == "serializer.class" {
        continue;
      }

      match option_value(value) {
        Some(value) => {
          debug!("setting librdkafka option {}={}", option, value);
          client.set(option, &value);
        },
        None => warn!("ignoring non-scalar kafka option: {}", key)
      }
    }

    let producer: BaseProducer = client.create().map_err(SimpleError::from)?;

    Ok(KafkaSink {
      producer,
      timeout: Duration::from_secs(config.send_timeout_secs)
    })
  }
}

fn option_value(value: &serde_yaml::Value) -> Option<String> {
  match value {
    serde_yaml::Value::String(s) => Some(s.clone()),
    serde_yaml::Value::Number(n) => Some(n.to_string()),
    serde_yaml::Value::Bool(b) => Some(b.to_string()),
    _ => None
  }
}

impl Sink for KafkaSink {
  fn send(&self, batch: Vec<KeyedMessage>) -> SimpleResult<()> {
    if batch.is_empty() {
      return Ok(());
    }

    for message in &batch {
      let record = BaseRecord::to(&message.topic)
        .key(&message.key)
        .payload(&message.payload);

      if let Err((e, _)) = self.producer.send(record) {
        return Err(SimpleError::from(e));
      }

      // give librdkafka a chance to fire delivery callbacks as we go
      self.producer.poll(Duration::from_millis(0));
    }

    // the batch is done only once the local queue has drained; a slow
    // broker therefore throttles the whole stream
    self.producer.flush(self.timeout).map_err(SimpleError::from)
  }
}
