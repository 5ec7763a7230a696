// (C) Copyright 2020 Hewlett Packard Enterprise Development LP

use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};

use simple_error::SimpleResult;

use crate::config::Config;
use super::types::TailEvent;

/// A simple reader to report an error if source autodetection fails
pub fn read_null(
  _config: Arc<Config>,
  tx: Sender<TailEvent>,
  _exit_req_rx: Receiver<()>,
  _exit_resp_tx: Sender<()>
) -> JoinHandle<SimpleResult<()>> {
  thread::Builder::new().name("read_null".to_string()).spawn(move || {
    error!(
      "no log source was detected automatically, set tail.path or \
      tail.target.dir in the config file or select a reader with -i"
    );

    tx.send(TailEvent::Eof).ok();

    Ok(())
  }).unwrap()
}
