// (C) Copyright 2020 Hewlett Packard Enterprise Development LP

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use notify::{EventKind, RecursiveMode, Watcher};
use regex::Regex;
use simple_error::{SimpleError, SimpleResult};

use crate::config::Config;
use super::types::TailEvent;

/// Delay between attempts to read a file that refused the last read
const RETRY_DELAY: Duration = Duration::from_millis(200);

/// Delay before an aborted follow is started over
const RESTART_DELAY: Duration = Duration::from_secs(5);

/// Tracking state for one followed log directory
struct FollowState {
  /// The file currently being read
  current: PathBuf,

  /// Byte offset up to which `current` has been consumed
  offset: u64,

  /// Matching file names as of the last directory listing, sorted
  known: Vec<String>,

  /// Names observed to have appeared after `current`, oldest first; the
  /// hand-off switches to the front entry only
  pending: Vec<String>,

  /// Trailing bytes with no line terminator yet, held for the next read
  partial: Vec<u8>
}

/// Follows the newest matching file in a directory, handing off to newer
/// files as the log rotates.
///
/// Only content appended after startup is delivered; pre-existing content
/// is skipped. A stream that aborts (e.g. the file kept refusing reads) is
/// started over from scratch after a delay, so lines written in between are
/// lost but the producer keeps running.
pub fn read_watch(
  config: Arc<Config>,
  tx: Sender<TailEvent>,
  exit_req_rx: Receiver<()>,
  exit_resp_tx: Sender<()>
) -> JoinHandle<SimpleResult<()>> {
  thread::Builder::new().name("read_watch".to_string()).spawn(move || {
    let dir = match &config.producer.target_dir {
      Some(dir) => PathBuf::from(dir),
      None => {
        tx.send(TailEvent::Eof).ok();
        bail!("tail.target.dir is required by the watch reader");
      }
    };

    loop {
      match follow(&config, &dir, &tx, &exit_req_rx) {
        Ok(()) => break,
        Err(e) => {
          warn!("follow of {:?} aborted, restarting: {}", dir, e);
          thread::sleep(RESTART_DELAY);

          if exit_req_rx.try_recv().is_ok() {
            break;
          }
        }
      }
    }

    tx.send(TailEvent::Eof).ok();
    exit_resp_tx.send(()).ok();

    Ok(())
  }).unwrap()
}

/// Runs one watch session over the directory, returning Ok on a clean stop
/// (exit request, receiver gone, or watch handle invalidated) and Err when
/// the stream aborted and should be started over.
fn follow(
  config: &Config, dir: &Path,
  tx: &Sender<TailEvent>, exit_req_rx: &Receiver<()>
) -> SimpleResult<()> {
  let producer = &config.producer;

  // register the watch before the initial scan so nothing written in
  // between is missed
  let (event_tx, event_rx) = channel();
  let mut watcher = notify::recommended_watcher(event_tx)
    .map_err(SimpleError::from)?;
  watcher.watch(dir, RecursiveMode::NonRecursive)
    .map_err(SimpleError::from)?;

  let known = list_target_files(dir, &producer.file_pattern)?;
  let current = match known.last() {
    Some(name) => dir.join(name),
    None => bail!(
      "no files matching {} in {:?}", producer.file_pattern.as_str(), dir
    )
  };

  // start at the current end: only subsequent appends are followed
  let offset = fs::metadata(&current).map_err(SimpleError::from)?.len();

  let mut state = FollowState {
    current,
    offset,
    known,
    pending: Vec::new(),
    partial: Vec::new()
  };

  info!("watching {:?} from offset {}", state.current, state.offset);

  loop {
    let event = match event_rx.recv() {
      Ok(Ok(event)) => event,
      Ok(Err(e)) => {
        warn!("watch error on {:?}: {}", dir, e);
        continue;
      },
      // the watch handle was invalidated
      Err(_) => return Ok(())
    };

    if exit_req_rx.try_recv().is_ok() {
      return Ok(());
    }

    match event.kind {
      EventKind::Modify(_) | EventKind::Create(_) => (),
      _ => continue
    }

    let chunk = read_appended(&mut state, producer.retry_num)?;

    // re-list after every event; a changed listing queues the newest name
    // as the rotation successor, but only a name newer than the current
    // file counts (deleting old rotated files also changes the listing)
    let listed = list_target_files(dir, &producer.file_pattern)?;
    if listed != state.known {
      let current_name = state.current.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

      if let Some(newest) = listed.last() {
        if *newest > current_name && !state.pending.contains(newest) {
          state.pending.push(newest.clone());
        }
      }

      state.known = listed;
    }

    if !chunk.is_empty() {
      if !deliver(&mut state, &chunk, tx) {
        return Ok(());
      }
    } else if !state.pending.is_empty() {
      // the current file has stopped growing and a successor exists:
      // complete the hand-off, starting the new file from the top
      let next = state.pending.remove(0);

      if !flush_partial(&mut state, tx) {
        return Ok(());
      }

      info!("rotating from {:?} to {:?}", state.current, next);

      state.current = dir.join(&next);
      state.offset = 0;
    }
  }
}

/// Reads everything appended to the current file since the last offset,
/// retrying a bounded number of times before giving up on the stream
fn read_appended(state: &mut FollowState, retries: usize) -> SimpleResult<Vec<u8>> {
  let mut attempt = 0;

  loop {
    match read_from_offset(&state.current, state.offset) {
      Ok((bytes, next_offset)) => {
        state.offset = next_offset;
        return Ok(bytes);
      },
      Err(e) => {
        attempt += 1;

        if attempt >= retries {
          bail!(
            "giving up on {:?} after {} read attempts: {}",
            state.current, attempt, e
          );
        }

        thread::sleep(RETRY_DELAY);
      }
    }
  }
}

fn read_from_offset(path: &Path, offset: u64) -> io::Result<(Vec<u8>, u64)> {
  let mut file = File::open(path)?;
  let len = file.metadata()?.len();

  if offset >= len {
    // nothing new; a file that shrank resets to its new end
    return Ok((Vec::new(), len));
  }

  file.seek(SeekFrom::Start(offset))?;

  let mut bytes = Vec::new();
  file.read_to_end(&mut bytes)?;

  let new_offset = offset + bytes.len() as u64;
  Ok((bytes, new_offset))
}

/// Splits freshly read bytes into lines and sends them on, holding back a
/// trailing fragment with no terminator until the rest of it arrives.
/// Returns false if the receiver has quit.
fn deliver(state: &mut FollowState, chunk: &[u8], tx: &Sender<TailEvent>) -> bool {
  let mut buffer = std::mem::replace(&mut state.partial, Vec::new());
  buffer.extend_from_slice(chunk);

  let mut lines = Vec::new();
  let mut rest: &[u8] = &buffer;

  while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
    let mut line = &rest[..pos];
    if line.ends_with(b"\r") {
      line = &line[..line.len() - 1];
    }

    lines.push(String::from_utf8_lossy(line).to_string());
    rest = &rest[pos + 1..];
  }

  state.partial = rest.to_vec();

  for line in lines {
    if tx.send(TailEvent::Line(line)).is_err() {
      return false;
    }
  }

  true
}

/// Sends any held partial line before the current file is abandoned
fn flush_partial(state: &mut FollowState, tx: &Sender<TailEvent>) -> bool {
  if state.partial.is_empty() {
    return true;
  }

  let line = String::from_utf8_lossy(&state.partial).to_string();
  state.partial.clear();

  tx.send(TailEvent::Line(line)).is_ok()
}

/// Lists file names in the directory fully matching the configured pattern,
/// sorted ascending so the last entry is the newest by rotation order
fn list_target_files(dir: &Path, pattern: &Regex) -> SimpleResult<Vec<String>> {
  let mut names = Vec::new();

  for entry in fs::read_dir(dir).map_err(SimpleError::from)? {
    let entry = entry.map_err(SimpleError::from)?;
    let name = entry.file_name().to_string_lossy().to_string();

    if pattern.is_match(&name) {
      names.push(name);
    }
  }

  names.sort();
  Ok(names)
}
