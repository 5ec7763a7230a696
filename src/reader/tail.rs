// (C) Copyright 2020 Hewlett Packard Enterprise Development LP

use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use simple_error::SimpleResult;
use subprocess::{Popen, PopenConfig, Redirection};

use crate::config::Config;
use super::types::TailEvent;

/// Delay before an exited tail command is started again
const RESPAWN_DELAY: Duration = Duration::from_millis(1000);

/// Follows a log by running an external tail command and forwarding its
/// standard output line by line.
///
/// `tail -F` normally never exits; if the command does die (e.g. the log
/// was removed out from under it) it is respawned after a short delay, so
/// the stream survives anything short of an explicit exit request.
pub fn read_tail(
  config: Arc<Config>,
  tx: Sender<TailEvent>,
  exit_req_rx: Receiver<()>,
  exit_resp_tx: Sender<()>
) -> JoinHandle<SimpleResult<()>> {
  thread::Builder::new().name("read_tail".to_string()).spawn(move || {
    let producer = &config.producer;

    let path = match &producer.tail_path {
      Some(path) => path.clone(),
      None => {
        tx.send(TailEvent::Eof).ok();
        bail!("tail.path is required by the tail reader");
      }
    };

    let mut argv: Vec<String> = producer.tail_command
      .split_whitespace()
      .map(String::from)
      .collect();
    argv.push(path);

    'respawn: loop {
      if exit_req_rx.try_recv().is_ok() {
        break;
      }

      let mut child = match Popen::create(&argv, PopenConfig {
        stdout: Redirection::Pipe,
        stderr: Redirection::None,

        ..Default::default()
      }) {
        Ok(child) => child,
        Err(e) => {
          error!("failed to spawn {:?}: {}", argv, e);
          thread::sleep(RESPAWN_DELAY);
          continue;
        }
      };

      info!("following via {:?}", argv);

      let stdout = match child.stdout.take() {
        Some(stdout) => stdout,
        None => {
          child.terminate().ok();
          child.wait().ok();
          bail!("tail command has no stdout pipe");
        }
      };

      for line in BufReader::new(stdout).lines() {
        let line = match line {
          Ok(line) => line,
          Err(_) => break
        };

        if tx.send(TailEvent::Line(line)).is_err() {
          // assume the receiver has quit and stop
          child.terminate().ok();
          child.wait().ok();
          break 'respawn;
        }

        if exit_req_rx.try_recv().is_ok() {
          child.terminate().ok();
          child.wait().ok();
          break 'respawn;
        }
      }

      // the command exited on its own; reap it and start over
      child.wait().ok();
      warn!("tail command exited, respawning: {:?}", argv);

      thread::sleep(RESPAWN_DELAY);
    }

    tx.send(TailEvent::Eof).ok();
    exit_resp_tx.send(()).ok();

    Ok(())
  }).unwrap()
}
