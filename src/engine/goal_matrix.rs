//! Independent-Poisson scoreline model ("GoalMatrix").
//!
//! Given expected goals for each side, builds the joint scoreline grid, the
//! over/under split at a goal line, 1X2 outcome probabilities and the most
//! likely scorelines. When no explicit rates exist they are derived from the
//! unified over/under and match-result prices.

use crate::config::GoalMatrixConfig;
use serde::Serialize;

pub const MIN_LAMBDA: f64 = 0.01;
pub const MAX_LAMBDA: f64 = 15.0;
/// Largest per-side goal count the scoreline grid is built for.
pub const MAX_GOAL_CAP: u32 = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scoreline {
    pub home: u32,
    pub away: u32,
    pub probability: f64,
}

impl Scoreline {
    pub fn label(&self) -> String {
        format!("{}-{}", self.home, self.away)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbabilityResult {
    pub lambda_home: f64,
    pub lambda_away: f64,
    pub over_line: f64,
    pub p_over: f64,
    pub p_under: f64,
    pub p_home: f64,
    pub p_draw: f64,
    pub p_away: f64,
    /// `grid[h][a]` = P(home scores h, away scores a), `0..=goal_cap` per side.
    pub grid: Vec<Vec<f64>>,
    pub top_scores: Vec<Scoreline>,
    /// Coarse total-goals band: "0-2", "2-3" or "3-4+".
    pub likely_goals: &'static str,
}

impl ProbabilityResult {
    pub fn grid_mass(&self) -> f64 {
        self.grid.iter().flatten().sum()
    }
}

/// Clamp a rate into `[MIN_LAMBDA, MAX_LAMBDA]`; non-finite input takes the floor.
pub fn clamp_lambda(lambda: f64) -> f64 {
    if !lambda.is_finite() {
        return MIN_LAMBDA;
    }
    lambda.clamp(MIN_LAMBDA, MAX_LAMBDA)
}

/// P(X = k) for k in `0..=max_k`, by the recurrence p(k) = p(k-1) * lambda / k.
pub fn poisson_pmf(lambda: f64, max_k: u32) -> Vec<f64> {
    let mut out = Vec::with_capacity(max_k as usize + 1);
    let mut p = (-lambda).exp();
    out.push(p);
    for k in 1..=max_k {
        p *= lambda / k as f64;
        out.push(p);
    }
    out
}

/// P(X <= k). Negative k has probability 0. Far past the mean the tail is
/// below f64 resolution, so the sum stops there and the result saturates at 1.
pub fn poisson_cdf(lambda: f64, k: i64) -> f64 {
    if k < 0 {
        return 0.0;
    }
    let tail_bound = lambda + 40.0 * lambda.sqrt() + 40.0;
    if k as f64 > tail_bound {
        return 1.0;
    }
    let mut p = (-lambda).exp();
    let mut sum = p;
    for i in 1..=k {
        p *= lambda / i as f64;
        sum += p;
    }
    sum.min(1.0)
}

fn likely_goals_band(mu: f64) -> &'static str {
    if mu < 2.0 {
        "0-2"
    } else if mu < 2.8 {
        "2-3"
    } else {
        "3-4+"
    }
}

pub fn compute_probabilities(
    lambda_home: f64,
    lambda_away: f64,
    over_line: f64,
    config: &GoalMatrixConfig,
) -> ProbabilityResult {
    let lh = clamp_lambda(lambda_home);
    let la = clamp_lambda(lambda_away);
    let over_line = if over_line.is_finite() { over_line } else { config.over_line };
    let cap = config.goal_cap.min(MAX_GOAL_CAP);

    let pmf_h = poisson_pmf(lh, cap);
    let pmf_a = poisson_pmf(la, cap);
    let grid: Vec<Vec<f64>> = pmf_h
        .iter()
        .map(|ph| pmf_a.iter().map(|pa| ph * pa).collect())
        .collect();

    // The sum of two independent Poissons is Poisson(lh + la), so the total
    // goals CDF is exact regardless of the grid cap.
    let under_cap = (over_line - 0.5).floor() as i64;
    let p_under = poisson_cdf(lh + la, under_cap);
    let p_over = 1.0 - p_under;

    let (mut p_home, mut p_draw, mut p_away) = (0.0, 0.0, 0.0);
    let mut scores = Vec::with_capacity(grid.len() * grid.len());
    for (h, row) in grid.iter().enumerate() {
        for (a, &p) in row.iter().enumerate() {
            match h.cmp(&a) {
                std::cmp::Ordering::Greater => p_home += p,
                std::cmp::Ordering::Equal => p_draw += p,
                std::cmp::Ordering::Less => p_away += p,
            }
            scores.push(Scoreline { home: h as u32, away: a as u32, probability: p });
        }
    }
    let outcome_sum = p_home + p_draw + p_away;
    if outcome_sum > 0.0 {
        p_home /= outcome_sum;
        p_draw /= outcome_sum;
        p_away /= outcome_sum;
    }

    scores.sort_by(|x, y| {
        y.probability
            .total_cmp(&x.probability)
            .then_with(|| (x.home + x.away).cmp(&(y.home + y.away)))
            .then_with(|| y.home.cmp(&x.home))
    });
    scores.truncate(config.top_k.max(1));

    ProbabilityResult {
        lambda_home: lh,
        lambda_away: la,
        over_line,
        p_over,
        p_under,
        p_home,
        p_draw,
        p_away,
        grid,
        top_scores: scores,
        likely_goals: likely_goals_band(lh + la),
    }
}

/// Expected goals per side from unified prices.
///
/// `mu = mu_intercept + mu_slope / over_price` (fallback price when the over
/// is unpriced), split by the normalized implied win probabilities of the home
/// and away prices. A missing side counts as probability 0; with both missing
/// the split is even.
pub fn derive_lambdas(
    price_home: Option<f64>,
    price_away: Option<f64>,
    over_price: Option<f64>,
    config: &GoalMatrixConfig,
) -> (f64, f64) {
    let valid = |p: Option<f64>| p.filter(|p| p.is_finite() && *p > 1.0);
    let over = valid(over_price).unwrap_or(config.fallback_over_price);
    let mu = config.mu_intercept + config.mu_slope / over;

    let p1 = valid(price_home).map_or(0.0, |p| 1.0 / p);
    let p2 = valid(price_away).map_or(0.0, |p| 1.0 / p);
    let home_share = if p1 + p2 > 0.0 { p1 / (p1 + p2) } else { 0.5 };

    let lh = mu * home_share;
    (clamp_lambda(lh), clamp_lambda(mu - lh))
}
