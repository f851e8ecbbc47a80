//! # Teleshell Protocol Library
//!
//! Transport-level knowledge shared by the Teleshell daemon: how operator
//! messages are interpreted, how long output is cut into messages, and how the
//! chat service's Bot API is spoken on the wire.
//!
//! ## Overview
//!
//! - **Command Grammar**: `/cmd`, `/shell`, `/exit`, `/help`, with everything
//!   else treated as raw shell input
//! - **Pagination**: line-preserving split of output into bounded messages
//! - **Wire Types**: serde models for updates, users, chats and requests
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{paginate, Command, MAX_MESSAGE_SIZE};
//!
//! assert_eq!(Command::parse("/shell"), Some(Command::StartSession));
//! assert_eq!(Command::parse("ls -la"), None);
//!
//! let output = "line\n".repeat(2000);
//! let pages = paginate(&output, MAX_MESSAGE_SIZE);
//! assert!(pages.iter().all(|p| p.len() <= MAX_MESSAGE_SIZE));
//! assert_eq!(pages.concat(), output);
//! ```
//!
//! ## Modules
//!
//! - [`command`]: Bot command grammar
//! - [`paginate`]: Output pagination
//! - [`messages`]: Bot API wire types
//! - [`error`]: Error types

pub mod command;
pub mod error;
pub mod messages;
pub mod paginate;

pub use command::{split_bot_command, Command};
pub use error::{ProtocolError, Result};
pub use messages::{ApiResponse, Chat, ChatId, GetUpdates, Message, SendMessage, Update, User};
pub use paginate::{needs_pagination, paginate, MAX_MESSAGE_SIZE};
