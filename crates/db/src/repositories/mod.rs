//! Database repositories.

#![allow(missing_docs)]

pub mod poll;
pub mod poll_option;
pub mod user;
pub mod vote;

pub use poll::PollRepository;
pub use poll_option::PollOptionRepository;
pub use user::UserRepository;
pub use vote::VoteRepository;
