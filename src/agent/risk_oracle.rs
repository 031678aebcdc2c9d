//! Risk Oracle Agent
//!
//! Six-factor credit scoring. Every factor is mapped into [0, 1] where
//! higher means safer; the weighted blend categorizes the borrower and
//! produces a signable oracle payload for on-chain or off-chain consumers.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::agent::{Agent, AgentAction, AgentContext, AgentId, AgentResult, OracleSigner, ReasoningTrace};
use crate::error::EngineError;

/// Factor weights; they sum to 1.
const WEIGHTS: [(Factor, f64); 6] = [
    (Factor::TrustScore, 0.25),
    (Factor::RepaymentHistory, 0.25),
    (Factor::IncomeStability, 0.15),
    (Factor::VouchStrength, 0.15),
    (Factor::CircleHealth, 0.10),
    (Factor::LoanToIncome, 0.10),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Factor {
    TrustScore,
    RepaymentHistory,
    IncomeStability,
    VouchStrength,
    CircleHealth,
    LoanToIncome,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RiskFactors {
    pub trust_score: f64,
    pub repayment_history: f64,
    pub income_stability: f64,
    pub vouch_strength: f64,
    pub circle_health: f64,
    pub loan_to_income: f64,
}

impl RiskFactors {
    fn get(&self, factor: Factor) -> f64 {
        match factor {
            Factor::TrustScore => self.trust_score,
            Factor::RepaymentHistory => self.repayment_history,
            Factor::IncomeStability => self.income_stability,
            Factor::VouchStrength => self.vouch_strength,
            Factor::CircleHealth => self.circle_health,
            Factor::LoanToIncome => self.loan_to_income,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskRecommendation {
    pub action: &'static str,
    pub reason: &'static str,
    pub max_loan: i64,
    pub interest_tier: u8,
    pub interest_rate: f64,
}

pub struct RiskOracleAgent {
    signer: OracleSigner,
}

impl RiskOracleAgent {
    pub fn new(signer: OracleSigner) -> Self {
        Self { signer }
    }

    fn assess(&self, context: &AgentContext, trace: &mut ReasoningTrace) -> Result<(Value, Vec<AgentAction>), EngineError> {
        trace.observe_with(
            format!(
                "Collecting risk factors: trust_score={}, loans={}, vouches={}, diary_entries={}",
                context.trust_score,
                context.loans.len(),
                context.vouches.len(),
                context.financial_diary.len()
            ),
            0.95,
        );

        let factors = compute_factors(context, trace);
        let risk_score = weighted_score(&factors);

        trace.analyze_with(
            format!(
                "Risk factors: trust={:.2}, repayment={:.2}, income={:.2}, vouch={:.2}, circle={:.2}, lti={:.2}",
                factors.trust_score,
                factors.repayment_history,
                factors.income_stability,
                factors.vouch_strength,
                factors.circle_health,
                factors.loan_to_income
            ),
            0.88,
        );

        let category = categorize(risk_score);
        trace.hypothesize_with(
            format!("Risk category: {category} (weighted score: {risk_score:.3})"),
            0.90,
        );

        let recommendation = recommend(category, context);
        trace.act_with(
            format!(
                "Recommendation: {} - max ₹{}",
                recommendation.action, recommendation.max_loan
            ),
            0.87,
        );

        let timestamp = Utc::now().to_rfc3339();
        let scaled_score = (risk_score * 10000.0) as i64;
        let signature = self.signer.sign(
            scaled_score,
            category,
            recommendation.max_loan,
            &timestamp,
        );
        let oracle_data = json!({
            "risk_score": scaled_score,
            "category": category,
            "max_recommended_loan": recommendation.max_loan,
            "interest_tier": recommendation.interest_tier,
            "timestamp": timestamp,
            "factors": {
                "trust_score": (factors.trust_score * 100.0) as i64,
                "repayment_history": (factors.repayment_history * 100.0) as i64,
                "income_stability": (factors.income_stability * 100.0) as i64,
                "vouch_strength": (factors.vouch_strength * 100.0) as i64,
                "circle_health": (factors.circle_health * 100.0) as i64,
                "loan_to_income": (factors.loan_to_income * 100.0) as i64,
            },
            "signature": signature.signature,
            "signed": signature.signed,
        });

        trace.conclude_with(
            format!(
                "Assessment complete. Score: {risk_score:.3}, Category: {category}, Max loan: ₹{}",
                recommendation.max_loan
            ),
            0.92,
        );

        let result = json!({
            "risk_score": risk_score,
            "risk_category": category,
            "factors": factors,
            "recommendation": recommendation,
            "oracle_data": oracle_data,
        });
        let actions = vec![AgentAction {
            kind: "update_blockchain_oracle".into(),
            data: oracle_data,
        }];
        Ok((result, actions))
    }
}

#[async_trait]
impl Agent for RiskOracleAgent {
    fn id(&self) -> AgentId {
        AgentId::RiskOracle
    }

    async fn run(&self, context: &AgentContext) -> AgentResult {
        let user = context.user_id.simple().to_string();
        let mut trace = ReasoningTrace::new(
            self.id().as_str(),
            format!("Risk assessment for user {}...", &user[..8]),
        );
        match self.assess(context, &mut trace) {
            Ok((result, actions)) => {
                AgentResult::ok(self.id(), result, trace).with_actions(actions)
            }
            Err(err) => {
                trace.reflect_with(format!("Risk assessment failed: {err}"), 0.2);
                AgentResult::failed(self.id(), err, trace)
            }
        }
    }
}

fn compute_factors(context: &AgentContext, trace: &mut ReasoningTrace) -> RiskFactors {
    // 1. Trust score, 0-100 mapped to 0-1.
    let trust_score = (context.trust_score as f64 / 100.0).min(1.0);
    trace.analyze_with(
        format!("Trust factor: {trust_score:.2} (from {}/100)", context.trust_score),
        0.95,
    );

    // 2. Repayment history: completions positive, defaults heavily negative.
    let completed = context.completed_loans().count();
    let defaulted = context.defaulted_loans().count();
    let active = context.active_loans().count();
    let historical = completed + defaulted;
    let repayment_history = if historical > 0 {
        let base = completed as f64 / historical as f64;
        let bonus = (completed as f64 * 0.05).min(0.2);
        let penalty = defaulted as f64 * 0.15;
        (base + bonus - penalty).clamp(0.0, 1.0)
    } else {
        // Neutral for first-time borrowers.
        0.5
    };
    trace.analyze_with(
        format!(
            "Repayment factor: {repayment_history:.2} ({completed} completed, {defaulted} defaulted, {active} active)"
        ),
        0.92,
    );

    // 3. Income stability from the coefficient of variation over the last
    //    30 days of diary income.
    let income_entries = context.income_entries().count();
    let income_stability = if income_entries >= 4 {
        let recent = context.recent_income(30);
        if recent.len() >= 2 {
            let mean = recent.iter().sum::<f64>() / recent.len() as f64;
            if mean > 0.0 {
                let variance =
                    recent.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / recent.len() as f64;
                let cv = variance.sqrt() / mean;
                (1.0 - cv * 0.7).clamp(0.3, 1.0)
            } else {
                0.3
            }
        } else {
            0.4
        }
    } else {
        0.3
    };
    trace.analyze_with(
        format!("Income stability: {income_stability:.2} (analyzed {income_entries} income entries)"),
        0.80,
    );

    // 4. Vouch strength: count, level quality, stake size.
    let active_vouches: Vec<_> = context.active_vouches().collect();
    let total_staked: f64 = active_vouches.iter().map(|v| v.saathi_staked).sum();
    let vouch_strength = if active_vouches.is_empty() {
        0.15
    } else {
        let avg_level = active_vouches
            .iter()
            .map(|v| f64::from(v.vouch_level.weight()))
            .sum::<f64>()
            / active_vouches.len() as f64;
        let count_factor = (active_vouches.len() as f64 / 5.0).min(1.0) * 0.3;
        let level_factor = (avg_level / 3.0) * 0.35;
        let stake_factor = (total_staked / 500.0).min(1.0) * 0.35;
        (count_factor + level_factor + stake_factor).min(1.0)
    };
    trace.analyze_with(
        format!(
            "Vouch strength: {vouch_strength:.2} ({} active vouches, ₹{total_staked:.0} staked)",
            active_vouches.len()
        ),
        0.88,
    );

    // 5. Circle health from membership size, with a multi-circle bonus.
    let circle_health = if context.circles.is_empty() {
        0.2
    } else {
        let avg = context
            .circles
            .iter()
            .map(|c| (f64::from(c.member_count) / 10.0).min(1.0))
            .sum::<f64>()
            / context.circles.len() as f64;
        let bonus = ((context.circles.len() as f64 - 1.0) * 0.1).min(0.2);
        (avg * 0.8 + bonus + 0.2).min(1.0)
    };
    trace.analyze_with(
        format!("Circle health: {circle_health:.2} ({} circles)", context.circles.len()),
        0.82,
    );

    // 6. Loan-to-income: weekly instalments scaled to a month vs diary income.
    let monthly_income: f64 = context.recent_income(30).iter().sum();
    let current_emi = context.current_monthly_emi();
    let loan_to_income = if monthly_income > 0.0 {
        let ratio = current_emi / monthly_income;
        (1.0 - ratio * 1.6).clamp(0.2, 1.0)
    } else if current_emi > 0.0 {
        0.3
    } else {
        0.5
    };
    trace.analyze_with(
        format!(
            "Loan-to-Income: {loan_to_income:.2} (monthly income ₹{monthly_income:.0}, EMI burden ₹{current_emi:.0})"
        ),
        0.78,
    );

    RiskFactors {
        trust_score,
        repayment_history,
        income_stability,
        vouch_strength,
        circle_health,
        loan_to_income,
    }
}

fn weighted_score(factors: &RiskFactors) -> f64 {
    let mut score = 0.0;
    let mut total_weight = 0.0;
    for (factor, weight) in WEIGHTS {
        score += factors.get(factor) * weight;
        total_weight += weight;
    }
    (score / total_weight).clamp(0.0, 1.0)
}

fn categorize(score: f64) -> &'static str {
    if score >= 0.8 {
        "LOW_RISK"
    } else if score >= 0.6 {
        "MODERATE_RISK"
    } else if score >= 0.4 {
        "ELEVATED_RISK"
    } else {
        "HIGH_RISK"
    }
}

fn recommend(category: &str, context: &AgentContext) -> RiskRecommendation {
    let mut rec = match category {
        "LOW_RISK" => RiskRecommendation {
            action: "APPROVE",
            reason: "Excellent repayment history and strong trust network",
            max_loan: 50_000,
            interest_tier: 1,
            interest_rate: 8.0,
        },
        "MODERATE_RISK" => RiskRecommendation {
            action: "APPROVE_WITH_CONDITIONS",
            reason: "Good profile, recommend starting with smaller amount",
            max_loan: 25_000,
            interest_tier: 2,
            interest_rate: 10.0,
        },
        "ELEVATED_RISK" => RiskRecommendation {
            action: "APPROVE_LIMITED",
            reason: "Limited history, recommend building trust first",
            max_loan: 10_000,
            interest_tier: 3,
            interest_rate: 12.0,
        },
        _ => RiskRecommendation {
            action: "NEEDS_MORE_VOUCHES",
            reason: "Insufficient trust network, get more community support",
            max_loan: 5_000,
            interest_tier: 4,
            interest_rate: 15.0,
        },
    };

    // Existing debt scales the ceiling down, floored at 30%.
    let outstanding: f64 = context.active_loans().map(|l| l.amount).sum();
    if outstanding > 0.0 {
        let reduction = (1.0 - outstanding / 50_000.0).max(0.3);
        rec.max_loan = (rec.max_loan as f64 * reduction) as i64;
    }
    rec
}
