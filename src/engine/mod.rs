pub mod poll;
pub mod vote;

pub use poll::PollEngine;
pub use vote::VoteEngine;
