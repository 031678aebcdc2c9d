//! Domain Layer
//!
//! Persisted records, business services for vouching / loans / repayments,
//! quadratic loan voting, and the gamification engine.

pub mod gamification;
pub mod governance;
pub mod loans;
pub mod types;
pub mod vouching;

pub use governance::{QuadraticVoting, TallyResult, VoteBallot, VoteChoice};
pub use types::*;
