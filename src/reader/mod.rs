// (C) Copyright 2020 Hewlett Packard Enterprise Development LP

pub mod null;
pub mod tail;
pub mod types;
pub mod watch;

pub use self::null::read_null;
pub use self::tail::read_tail;
pub use self::types::{Reader, TailEvent};
pub use self::watch::read_watch;
