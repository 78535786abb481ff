//! Receiver side of the session server
//!
//! [`Multiplexer`] owns every connection and drives them from one loop;
//! [`dispatch`] applies a decoded request to its [`Session`]; collaborators
//! are reached through the [`HandlerRegistry`]. [`SessionServer`] ties the
//! pieces to the advertiser behind a start / process / stop lifecycle.

pub mod dispatcher;
pub mod handlers;
pub mod multiplexer;
pub mod server;
pub mod session;
pub mod session_table;
pub mod volume;

#[cfg(test)]
mod dispatcher_tests;

pub use dispatcher::{Notification, Outcome, dispatch};
pub use handlers::{
    AudioPort, AudioSink, HandlerRegistry, MultiroomSink, PlaybackControl, VolumeListener,
};
pub use multiplexer::{ClientInfo, CloseReason, Multiplexer, MultiplexerConfig};
pub use server::SessionServer;
pub use session::{Session, SessionError, SessionState};
pub use session_table::{SessionTable, SlotId};
pub use volume::{VolumeUpdate, db_to_linear, linear_to_db, parse_volume_parameter};
