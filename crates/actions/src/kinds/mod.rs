//! One module per action kind: its schemas and its `run`.

pub mod email;
pub mod http;
pub mod log;
pub mod move_pub;
pub mod pdf;
pub mod push_to_v6;
