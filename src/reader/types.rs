// (C) Copyright 2020 Hewlett Packard Enterprise Development LP

use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};
use std::thread::JoinHandle;

use simple_error::SimpleError;

use crate::config::Config;

/// A single event produced by a reader following a log stream
#[derive(Debug, Clone, PartialEq)]
pub enum TailEvent {
  /// One newly appended log line
  Line(String),

  /// The stream has ended and no further lines will be produced
  Eof
}

pub type Reader = fn(
  config: Arc<Config>, tx: Sender<TailEvent>,
  exit_req_rx: Receiver<()>, exit_resp_tx: Sender<()>
) -> JoinHandle<Result<(), SimpleError>>;
