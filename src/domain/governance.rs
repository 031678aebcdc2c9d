//! Quadratic Loan Voting
//!
//! Vote power grows with the square root of tokens spent, so large holders
//! get diminishing returns and small voices still count.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    For,
    Against,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteBallot {
    pub voter_id: Uuid,
    pub tokens_spent: u32,
    pub choice: VoteChoice,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TallyResult {
    pub for_power: f64,
    pub against_power: f64,
    pub total_power: f64,
    pub approval_percentage: f64,
    pub total_voters: usize,
    pub quorum_met: bool,
    pub approved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteImpact {
    pub current_approval: f64,
    pub new_approval: f64,
    pub your_vote_power: f64,
    pub impact: f64,
    pub would_approve: bool,
}

pub struct QuadraticVoting {
    quorum_percentage: f64,
}

/// At least this many distinct voters before a tally can bind.
const QUORUM_VOTERS: usize = 3;

impl QuadraticVoting {
    pub fn new(quorum_percentage: f64) -> Self {
        Self { quorum_percentage }
    }

    /// Power of a single vote: sqrt of tokens spent.
    pub fn vote_power(tokens_spent: u32) -> f64 {
        f64::from(tokens_spent).sqrt()
    }

    pub fn tally(&self, votes: &[VoteBallot]) -> TallyResult {
        let mut for_power = 0.0;
        let mut against_power = 0.0;
        for vote in votes {
            let power = Self::vote_power(vote.tokens_spent);
            match vote.choice {
                VoteChoice::For => for_power += power,
                VoteChoice::Against => against_power += power,
            }
        }

        let total_power = for_power + against_power;
        let approval_percentage = if total_power > 0.0 {
            for_power / total_power * 100.0
        } else {
            0.0
        };
        let quorum_met = votes.len() >= QUORUM_VOTERS;

        TallyResult {
            for_power,
            against_power,
            total_power,
            approval_percentage,
            total_voters: votes.len(),
            quorum_met,
            // Ties at the threshold resolve in favor of approval.
            approved: quorum_met && approval_percentage >= self.quorum_percentage,
        }
    }

    /// Recompute the tally with a hypothetical vote appended so a member can
    /// see what their vote would do before spending tokens.
    pub fn simulate(
        &self,
        current_votes: &[VoteBallot],
        new_tokens: u32,
        choice: VoteChoice,
    ) -> VoteImpact {
        let current = self.tally(current_votes);

        let mut simulated = current_votes.to_vec();
        simulated.push(VoteBallot {
            voter_id: Uuid::nil(),
            tokens_spent: new_tokens,
            choice,
        });
        let next = self.tally(&simulated);

        VoteImpact {
            current_approval: current.approval_percentage,
            new_approval: next.approval_percentage,
            your_vote_power: Self::vote_power(new_tokens),
            impact: next.approval_percentage - current.approval_percentage,
            would_approve: next.approved,
        }
    }
}

impl Default for QuadraticVoting {
    fn default() -> Self {
        Self::new(50.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ballot(tokens: u32, choice: VoteChoice) -> VoteBallot {
        VoteBallot {
            voter_id: Uuid::new_v4(),
            tokens_spent: tokens,
            choice,
        }
    }

    #[test]
    fn test_literal_tally() {
        // (for,100) (for,1) (against,400) (against,9):
        // for = 10 + 1 = 11, against = 20 + 3 = 23, approval ~= 32.4%.
        let votes = vec![
            ballot(100, VoteChoice::For),
            ballot(1, VoteChoice::For),
            ballot(400, VoteChoice::Against),
            ballot(9, VoteChoice::Against),
        ];
        let result = QuadraticVoting::default().tally(&votes);
        assert_eq!(result.for_power, 11.0);
        assert_eq!(result.against_power, 23.0);
        assert!((result.approval_percentage - 32.352941).abs() < 1e-4);
        assert!(result.quorum_met);
        assert!(!result.approved);
    }

    #[test]
    fn test_order_independence() {
        let mut votes = vec![
            ballot(49, VoteChoice::For),
            ballot(16, VoteChoice::Against),
            ballot(25, VoteChoice::For),
            ballot(4, VoteChoice::Against),
        ];
        let voting = QuadraticVoting::default();
        let forward = voting.tally(&votes);
        votes.reverse();
        let reversed = voting.tally(&votes);
        assert_eq!(forward, reversed);
    }

    #[test]
    fn test_zero_token_vote_changes_nothing_but_quorum() {
        let voting = QuadraticVoting::default();
        let votes = vec![
            ballot(100, VoteChoice::For),
            ballot(25, VoteChoice::Against),
        ];
        let before = voting.tally(&votes);

        let mut with_zero = votes.clone();
        with_zero.push(ballot(0, VoteChoice::Against));
        let after = voting.tally(&with_zero);

        assert_eq!(before.approval_percentage, after.approval_percentage);
        assert!(!before.quorum_met);
        assert!(after.quorum_met);
    }

    #[test]
    fn test_quorum_requires_three_voters() {
        let voting = QuadraticVoting::default();
        let two = voting.tally(&[ballot(100, VoteChoice::For), ballot(1, VoteChoice::For)]);
        assert!(!two.quorum_met);
        assert!(!two.approved);

        let three = voting.tally(&[
            ballot(100, VoteChoice::For),
            ballot(1, VoteChoice::For),
            ballot(1, VoteChoice::For),
        ]);
        assert!(three.quorum_met);
        assert!(three.approved);
    }

    #[test]
    fn test_exact_threshold_approves() {
        let voting = QuadraticVoting::new(50.0);
        // Equal power on both sides: approval is exactly 50%.
        let result = voting.tally(&[
            ballot(100, VoteChoice::For),
            ballot(100, VoteChoice::Against),
            ballot(0, VoteChoice::Against),
        ]);
        assert_eq!(result.approval_percentage, 50.0);
        assert!(result.approved);
    }

    #[test]
    fn test_simulator_impact_sign_matches_vote() {
        let voting = QuadraticVoting::default();
        let votes = vec![
            ballot(100, VoteChoice::For),
            ballot(100, VoteChoice::Against),
            ballot(9, VoteChoice::For),
        ];
        let for_impact = voting.simulate(&votes, 49, VoteChoice::For);
        assert!(for_impact.impact > 0.0);
        assert_eq!(for_impact.your_vote_power, 7.0);

        let against_impact = voting.simulate(&votes, 49, VoteChoice::Against);
        assert!(against_impact.impact < 0.0);
    }
}
