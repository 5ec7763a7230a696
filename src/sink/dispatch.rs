// (C) Copyright 2020 Hewlett Packard Enterprise Development LP

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};

use simple_error::{SimpleError, SimpleResult};

use crate::config::Config;
use crate::parser::{self, Plan};
use crate::reader::TailEvent;
use super::types::{KeyedMessage, Sink};

/// Drives the line-to-record-to-batch pipeline for one followed stream.
///
/// Lines arrive from a reader, convert to keyed JSON messages, and leave in
/// batches of at most `max.send.size` records; end of input flushes
/// whatever remains. A line that fails conversion is logged and dropped
/// without touching the batch; a batch the sink rejects is logged and
/// abandoned rather than re-buffered, so a broken sink cannot grow memory
/// without bound.
pub fn dispatch(
  config: Arc<Config>,
  plan: Arc<Plan>,
  sink: Box<dyn Sink>,
  host: String,
  rx: Receiver<TailEvent>
) -> JoinHandle<()> {
  thread::Builder::new().name("dispatch".to_string()).spawn(move || {
    let producer = &config.producer;
    let mut batch: Vec<KeyedMessage> = Vec::new();

    for event in rx {
      match event {
        TailEvent::Line(line) => {
          match convert(&plan, &line, &host, &config) {
            Ok(message) => batch.push(message),
            Err(e) => {
              warn!("log convert failed, disposing line {:?}: {}", line, e);
              continue;
            }
          }

          if batch.len() >= producer.max_send_size {
            flush(&*sink, &mut batch);
          }
        },
        TailEvent::Eof => break
      }
    }

    flush(&*sink, &mut batch);
  }).unwrap()
}

/// Converts one raw line into a message keyed by the producing host
fn convert(
  plan: &Plan, line: &str, host: &str, config: &Config
) -> SimpleResult<KeyedMessage> {
  let producer = &config.producer;

  let record = parser::extract(plan, line, host, &producer.date_format)
    .map_err(SimpleError::from)?;

  let payload = serde_json::to_string(&record).map_err(SimpleError::from)?;

  Ok(KeyedMessage {
    topic: producer.topic.clone(),
    key: host.to_string(),
    payload
  })
}

fn flush(sink: &dyn Sink, batch: &mut Vec<KeyedMessage>) {
  if batch.is_empty() {
    return;
  }

  let size = batch.len();

  if let Err(e) = sink.send(batch.split_off(0)) {
    // the batch is lost; move on to the next one
    error!("failed to send batch of {}: {}", size, e);
  }
}
