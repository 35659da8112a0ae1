//! Business logic services.

#![allow(missing_docs)]

pub mod event_publisher;
pub mod export;
pub mod poll;
pub mod results;
pub mod user;
pub mod vote;

pub use event_publisher::{EventPublisher, EventPublisherService, NoOpEventPublisher, OptionTally};
pub use export::{CsvExport, ExportService};
pub use poll::{CreatePollInput, PollService, PollWithOptions};
pub use results::{DEFAULT_VOTERS_LIMIT, OptionResult, PollResults, RecentVoter, ResultsService};
pub use user::{CreateUserInput, UpdateUserInput, UserService};
pub use vote::{Selection, VoteReceipt, VoteService, VoteStatus, VoterIdentity};
