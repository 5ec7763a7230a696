// (C) Copyright 2020 Hewlett Packard Enterprise Development LP

pub mod dispatch;
pub mod kafka;
pub mod types;

pub use self::dispatch::dispatch;
pub use self::kafka::KafkaSink;
pub use self::types::{KeyedMessage, Sink};
