// (C) Copyright 2020 Hewlett Packard Enterprise Development LP

use simple_error::SimpleResult;

/// A message ready for delivery, keyed for partition assignment
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedMessage {
  pub topic: String,
  pub key: String,
  pub payload: String
}

/// An external delivery capability for batches of keyed messages.
///
/// Implementations are handed whole batches and deliver them synchronously;
/// an error covers the batch as a unit, and whatever retrying is
/// appropriate happens behind this interface, not in front of it.
pub trait Sink: Send {
  fn send(&self, batch: Vec<KeyedMessage>) -> SimpleResult<()>;
}
