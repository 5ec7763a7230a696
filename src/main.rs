// (C) Copyright 2020 Hewlett Packard Enterprise Development LP

extern crate chrono;
#[macro_use] extern crate lazy_static;
extern crate libc;
#[macro_use] extern crate maplit;
extern crate notify;
extern crate rdkafka;
extern crate regex;
extern crate shellexpand;
#[macro_use] extern crate simple_error;
extern crate snafu;
extern crate structopt;
extern crate subprocess;
#[macro_use] extern crate tracing;

use std::process;
use std::sync::Arc;
use std::sync::mpsc::channel;
use std::time::Duration;

use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

mod config;
mod parser;
mod reader;
mod sink;
mod util;

use config::Config;
use sink::KafkaSink;

fn main() {
  let config = Arc::new(Config::from_args());

  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
    )
    .init();

  // a bad format string must stop the producer before any following begins
  let plan = match parser::compile(&config.producer.log_format) {
    Ok(plan) => Arc::new(plan),
    Err(e) => {
      eprintln!("error: invalid apachelog.format: {}", e);
      process::exit(1);
    }
  };

  let sink = match KafkaSink::new(&config.producer) {
    Ok(sink) => Box::new(sink),
    Err(e) => {
      eprintln!("error: could not initialize the kafka producer: {}", e);
      process::exit(1);
    }
  };

  let reader_impl = config.reader.get_reader(Arc::clone(&config));

  if reader_impl == reader::read_null {
    eprintln!(
      "{}\n\n{}",
      "error: no log source is configured, set tail.path or tail.target.dir",
      "For more information, see --help"
    );

    process::exit(1);
  }

  let host = match &config.hostname {
    Some(host) => host.clone(),
    None => util::hostname()
  };

  info!("producer starting as {}", host);

  let (entry_tx, entry_rx) = channel();
  let dispatcher = sink::dispatch(
    Arc::clone(&config),
    plan,
    sink,
    host,
    entry_rx
  );

  let (exit_req_tx, exit_req_rx) = channel();
  let (exit_resp_tx, exit_resp_rx) = channel();

  reader_impl(
    Arc::clone(&config),
    entry_tx,
    exit_req_rx, exit_resp_tx
  );

  dispatcher.join().expect("dispatcher thread did not exit cleanly");

  // attempt to tell the reader to quit (it may be blocked in a read)
  exit_req_tx.send(()).ok();

  // and wait at most 1s for an exit confirmation
  exit_resp_rx.recv_timeout(Duration::from_millis(1000)).ok();
}
