//! Deciding which agent sessions should respond to what.

pub mod mention;
pub mod parser;
pub mod scanner;

pub use parser::{ParseContext, Roster, RosterEntry, parse_event};
pub use scanner::{FeedSnapshot, collect, sweep_triggers};
