//! Self-describing, named-field binary message container.
//!
//! A [`Message`] is a mutable collection of typed, possibly-repeated values
//! addressed by name. All names and payloads live in one growable byte arena;
//! a hash-indexed field directory locates them. The container flattens to and
//! from a stable wire layout so it can be handed across process or thread
//! boundaries, and every unflattened buffer is re-validated before any
//! accessor will touch it.
//!
//! # Layers
//!
//! - [`arena`] — the single growable byte buffer behind every field.
//! - [`fields`] — field records plus the hash-bucket directory.
//! - [`header`] — the fixed-size wire header.
//! - [`message`] — the public typed accessor layer and specifier stack.
//! - [`wire`] — flatten/unflatten and the untrusted-input validator.
//!
//! # Example
//!
//! ```
//! use flatmsg::Message;
//!
//! let mut msg = Message::with_what(u32::from_be_bytes(*b"DEMO"));
//! msg.add_int32("answer", 42).unwrap();
//! msg.add_string("greeting", "hello").unwrap();
//!
//! let bytes = msg.flatten_to_vec();
//! let mut copy = Message::new();
//! copy.unflatten(&bytes).unwrap();
//! assert_eq!(copy.find_int32("answer").unwrap(), 42);
//! assert_eq!(copy.find_string("greeting").unwrap(), "hello");
//! ```
//!
//! # Concurrency
//!
//! A `Message` is a plain value type with no internal synchronization.
//! Share across threads by deep copy ([`Clone`]) or an external lock.

pub mod arena;
pub mod constants;
pub mod error;
pub mod fields;
pub mod header;
pub mod message;
pub mod types;
pub mod wire;

pub use error::Error;
pub use message::Message;
pub use wire::ForeignFormat;
