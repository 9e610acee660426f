//! cinder-protocol: the length-prefixed wire protocol.
//!
//! Requests are a u32-length-prefixed list of length-prefixed
//! arguments; replies are a u32-length-prefixed tagged value (nil,
//! error, string, integer, double, or array). All integers are
//! little-endian. One request body may not exceed
//! [`MAX_MSG_SIZE`](types::MAX_MSG_SIZE) bytes.
//!
//! # quick start
//!
//! ```
//! use bytes::{Bytes, BytesMut};
//! use cinder_protocol::{parse_request, write_request, Command};
//!
//! let mut buf = BytesMut::new();
//! write_request(&mut buf, &[Bytes::from("get"), Bytes::from("key")]);
//!
//! let (args, consumed) = parse_request(&buf).unwrap().unwrap();
//! assert_eq!(consumed, buf.len());
//! let cmd = Command::from_args(&args).unwrap();
//! assert_eq!(cmd, Command::Get { key: Bytes::from("key") });
//! ```

pub mod command;
pub mod error;
pub mod parse;
pub mod serialize;
pub mod types;

pub use command::{Command, CommandError};
pub use error::ProtocolError;
pub use parse::{parse_reply, parse_request};
pub use serialize::{write_request, write_response};
pub use types::{Reply, ERR_ARG, ERR_TYPE, ERR_UNKNOWN, MAX_MSG_SIZE};
