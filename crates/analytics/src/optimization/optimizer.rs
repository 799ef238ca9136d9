//! Mean-variance portfolio optimization.
//!
//! Every objective is expressed as a convex quadratic program over the weights (plus
//! auxiliary turnover variables when a turnover bound is set) and handed to the QP
//! solver. Max Sharpe is not convex in the weights; it is solved through the homogenized
//! change of variables `y = κ·w` (Cornuejols–Tütüncü), which turns the ratio into a
//! variance minimization over `y` with `(μ - r_f)ᵀy = 1`.

use std::collections::BTreeMap;

use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::config::AnalyticsConfig;
use crate::constants::WEIGHT_SUM_TOLERANCE;
use crate::errors::{Error, Result};

use super::constraints::{Constraints, ResolvedConstraints};
use super::optimization_model::{
    AssetUniverse, OptimizationObjective, OptimizedPortfolio, SolverDiagnostics,
};
use super::qp_solver::{QpProblem, QpSolution, QpSolver, SolverSettings};

/// Weight of the variance term that breaks ties between return-maximizing portfolios.
const MAX_RETURN_VARIANCE_WEIGHT: f64 = 1e-6;
/// Bound violations up to this size are solver noise and are projected away.
const BOUND_SNAP_TOLERANCE: f64 = 1e-5;
const MAX_PROJECTION_STEPS: usize = 200;
const TARGET_RETURN_SLACK: f64 = 1e-6;
const TARGET_VOLATILITY_SLACK: f64 = 1e-9;
const MAX_BISECTION_STEPS: usize = 60;
const BISECTION_TOLERANCE: f64 = 1e-10;
const MIN_KAPPA: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct MeanVarianceOptimizer {
    risk_free_rate: f64,
    frontier_points: usize,
    solver: QpSolver,
}

/// Weights from one or more QP solves, before statistics are attached.
#[derive(Debug, Clone)]
pub(super) struct SolvedWeights {
    pub weights: Vec<f64>,
    pub diagnostics: SolverDiagnostics,
}

impl MeanVarianceOptimizer {
    pub fn new(config: &AnalyticsConfig) -> Self {
        Self {
            risk_free_rate: config.risk_free_rate,
            frontier_points: config.frontier_points,
            solver: QpSolver::new(config.solver.clone()),
        }
    }

    pub fn with_risk_free_rate(mut self, risk_free_rate: f64) -> Self {
        self.risk_free_rate = risk_free_rate;
        self
    }

    pub fn with_solver_settings(mut self, settings: SolverSettings) -> Self {
        self.solver = QpSolver::new(settings);
        self
    }

    pub fn risk_free_rate(&self) -> f64 {
        self.risk_free_rate
    }

    pub fn frontier_points(&self) -> usize {
        self.frontier_points
    }

    pub fn optimize(
        &self,
        universe: &AssetUniverse,
        constraints: &Constraints,
        objective: &OptimizationObjective,
    ) -> Result<OptimizedPortfolio> {
        let resolved = constraints.resolve(universe.symbols())?;
        let solved = self.solve_objective(universe, &resolved, objective)?;
        Ok(self.build_portfolio(universe, objective.clone(), solved))
    }

    pub(super) fn solve_objective(
        &self,
        universe: &AssetUniverse,
        resolved: &ResolvedConstraints,
        objective: &OptimizationObjective,
    ) -> Result<SolvedWeights> {
        debug!(
            "Optimizing {} assets for {:?}",
            universe.len(),
            objective
        );
        match objective {
            OptimizationObjective::MinVolatility => self.min_volatility(universe, resolved),
            OptimizationObjective::MaxSharpe => self.max_sharpe(universe, resolved),
            OptimizationObjective::TargetReturn { target } => {
                check_finite("target", *target)?;
                let max = self.max_return(universe, resolved)?;
                let max_return = expected_return(universe, &max.weights);
                if *target > max_return + TARGET_RETURN_SLACK {
                    return Err(Error::infeasible(format!(
                        "target return {:.6} exceeds the highest attainable return {:.6}",
                        target, max_return
                    )));
                }
                self.target_return(universe, resolved, target.min(max_return))
            }
            OptimizationObjective::TargetVolatility { target } => {
                self.target_volatility(universe, resolved, *target)
            }
            OptimizationObjective::MaxQuadraticUtility { risk_aversion } => {
                if !(risk_aversion.is_finite() && *risk_aversion > 0.0) {
                    return Err(Error::invalid_parameter(
                        "riskAversion",
                        format!("must be positive, got {}", risk_aversion),
                    ));
                }
                let p = universe.covariance() * (2.0 * risk_aversion);
                let q = -universe.expected_returns();
                self.solve_weights(&weight_problem(resolved, p, q, None), resolved)
            }
        }
    }

    pub(super) fn min_volatility(
        &self,
        universe: &AssetUniverse,
        resolved: &ResolvedConstraints,
    ) -> Result<SolvedWeights> {
        let n = universe.len();
        let p = universe.covariance() * 2.0;
        self.solve_weights(&weight_problem(resolved, p, DVector::zeros(n), None), resolved)
    }

    pub(super) fn max_return(
        &self,
        universe: &AssetUniverse,
        resolved: &ResolvedConstraints,
    ) -> Result<SolvedWeights> {
        let p = universe.covariance() * (2.0 * MAX_RETURN_VARIANCE_WEIGHT);
        let q = -universe.expected_returns();
        self.solve_weights(&weight_problem(resolved, p, q, None), resolved)
    }

    /// Minimum variance with `μᵀw >= target`.
    pub(super) fn target_return(
        &self,
        universe: &AssetUniverse,
        resolved: &ResolvedConstraints,
        target: f64,
    ) -> Result<SolvedWeights> {
        let n = universe.len();
        let p = universe.covariance() * 2.0;
        let problem = weight_problem(
            resolved,
            p,
            DVector::zeros(n),
            Some((universe.expected_returns(), target)),
        );
        self.solve_weights(&problem, resolved)
    }

    /// Highest return with volatility at most `target`, found by bisection on the
    /// target-return frontier, whose volatility increases with the required return.
    fn target_volatility(
        &self,
        universe: &AssetUniverse,
        resolved: &ResolvedConstraints,
        target: f64,
    ) -> Result<SolvedWeights> {
        if !(target.is_finite() && target >= 0.0) {
            return Err(Error::invalid_parameter(
                "target",
                format!("volatility target must be non-negative, got {}", target),
            ));
        }
        let mut solves = 0;
        let min_vol = self.min_volatility(universe, resolved)?;
        solves += min_vol.diagnostics.solves;
        let floor = volatility(universe, &min_vol.weights);
        if target < floor - TARGET_VOLATILITY_SLACK {
            return Err(Error::infeasible(format!(
                "target volatility {:.6} is below the minimum attainable {:.6}",
                target, floor
            )));
        }

        let max = self.max_return(universe, resolved)?;
        solves += max.diagnostics.solves;
        let mut low = expected_return(universe, &min_vol.weights);
        let mut high = expected_return(universe, &max.weights).max(low);

        let top = self.target_return(universe, resolved, high)?;
        solves += top.diagnostics.solves;
        if volatility(universe, &top.weights) <= target {
            return Ok(with_solves(top, solves));
        }

        let mut best = min_vol;
        for _ in 0..MAX_BISECTION_STEPS {
            if high - low <= BISECTION_TOLERANCE {
                break;
            }
            let mid = 0.5 * (low + high);
            let candidate = self.target_return(universe, resolved, mid)?;
            solves += candidate.diagnostics.solves;
            if volatility(universe, &candidate.weights) <= target {
                low = mid;
                best = candidate;
            } else {
                high = mid;
            }
        }
        debug!(
            "Target volatility {:.6} reached at return {:.6} after {} solves",
            target, low, solves
        );
        Ok(with_solves(best, solves))
    }

    /// Maximizes `(μ - r_f)ᵀw / σ(w)` over the feasible set.
    pub(super) fn max_sharpe(
        &self,
        universe: &AssetUniverse,
        resolved: &ResolvedConstraints,
    ) -> Result<SolvedWeights> {
        let max = self.max_return(universe, resolved)?;
        let max_return = expected_return(universe, &max.weights);
        if max_return <= self.risk_free_rate {
            return Err(Error::infeasible(format!(
                "no feasible portfolio returns more than the risk-free rate {:.4} (best {:.6})",
                self.risk_free_rate, max_return
            )));
        }

        let n = universe.len();
        let excess: Vec<f64> = universe
            .expected_returns()
            .iter()
            .map(|m| m - self.risk_free_rate)
            .collect();
        let problem = sharpe_problem(universe, resolved, &excess);

        let w0 = vec![1.0 / n as f64; n];
        let excess_at_start: f64 = w0.iter().zip(&excess).map(|(w, e)| w * e).sum();
        let kappa0 = if excess_at_start > 0.0 {
            1.0 / excess_at_start
        } else {
            1.0
        };
        let mut start = DVector::zeros(problem.n_variables());
        for i in 0..n {
            start[i] = w0[i] * kappa0;
        }
        start[n] = kappa0;
        if let Some(turnover) = &resolved.turnover {
            for i in 0..n {
                start[n + 1 + i] = (w0[i] - turnover.reference[i]).abs() * kappa0;
            }
        }

        let solution = self.run(&problem, Some(&start))?;
        let kappa = solution.x[n];
        if kappa <= MIN_KAPPA {
            return Err(Error::NumericalNonConvergence(format!(
                "max Sharpe scaling variable collapsed to {:.3e}",
                kappa
            )));
        }
        let weights: Vec<f64> = (0..n).map(|i| solution.x[i] / kappa).collect();
        let weights = finalize_weights(weights, resolved)?;
        Ok(SolvedWeights {
            weights,
            diagnostics: diagnostics(&solution, max.diagnostics.solves + 1),
        })
    }

    fn solve_weights(
        &self,
        problem: &QpProblem,
        resolved: &ResolvedConstraints,
    ) -> Result<SolvedWeights> {
        let start = weight_start(problem.n_variables(), resolved);
        let solution = self.run(problem, Some(&start))?;
        let weights = solution.x.rows(0, resolved.n_assets()).iter().copied().collect();
        let weights = finalize_weights(weights, resolved)?;
        Ok(SolvedWeights {
            weights,
            diagnostics: diagnostics(&solution, 1),
        })
    }

    fn run(&self, problem: &QpProblem, start: Option<&DVector<f64>>) -> Result<QpSolution> {
        self.solver.solve(problem, start).map_err(Error::from)
    }

    pub(super) fn build_portfolio(
        &self,
        universe: &AssetUniverse,
        objective: OptimizationObjective,
        solved: SolvedWeights,
    ) -> OptimizedPortfolio {
        let stats = PortfolioStatistics::compute(universe, &solved.weights, self.risk_free_rate);
        OptimizedPortfolio {
            objective,
            weights: weight_map(universe, &solved.weights),
            expected_return: stats.expected_return,
            volatility: stats.volatility,
            sharpe_ratio: stats.sharpe_ratio,
            risk_free_rate: self.risk_free_rate,
            risk_contributions: weight_map(universe, &stats.risk_contributions),
            diagnostics: solved.diagnostics,
        }
    }
}

/// Expected return, volatility, Sharpe ratio and variance shares of a weight vector.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioStatistics {
    pub expected_return: f64,
    pub volatility: f64,
    /// Exactly zero when volatility is zero.
    pub sharpe_ratio: f64,
    pub risk_contributions: Vec<f64>,
}

impl PortfolioStatistics {
    pub fn compute(universe: &AssetUniverse, weights: &[f64], risk_free_rate: f64) -> Self {
        let w = DVector::from_column_slice(weights);
        let marginal = universe.covariance() * &w;
        let variance = w.dot(&marginal).max(0.0);
        let vol = variance.sqrt();
        let ret = universe.expected_returns().dot(&w);
        let risk_contributions = if variance > 0.0 {
            (0..w.len()).map(|i| w[i] * marginal[i] / variance).collect()
        } else {
            vec![0.0; w.len()]
        };
        Self {
            expected_return: ret,
            volatility: vol,
            sharpe_ratio: if vol > 0.0 {
                (ret - risk_free_rate) / vol
            } else {
                0.0
            },
            risk_contributions,
        }
    }
}

pub(super) fn expected_return(universe: &AssetUniverse, weights: &[f64]) -> f64 {
    universe
        .expected_returns()
        .iter()
        .zip(weights)
        .map(|(m, w)| m * w)
        .sum()
}

pub(super) fn volatility(universe: &AssetUniverse, weights: &[f64]) -> f64 {
    let w = DVector::from_column_slice(weights);
    w.dot(&(universe.covariance() * &w)).max(0.0).sqrt()
}

pub(super) fn weight_map(universe: &AssetUniverse, values: &[f64]) -> BTreeMap<String, f64> {
    universe
        .symbols()
        .iter()
        .cloned()
        .zip(values.iter().copied())
        .collect()
}

fn with_solves(mut solved: SolvedWeights, solves: usize) -> SolvedWeights {
    solved.diagnostics.solves = solves;
    solved
}

fn diagnostics(solution: &QpSolution, solves: usize) -> SolverDiagnostics {
    SolverDiagnostics {
        iterations: solution.iterations,
        primal_residual: solution.primal_residual,
        dual_residual: solution.dual_residual,
        kkt_residual: solution.kkt_residual,
        polished: solution.polished,
        solves,
    }
}

fn check_finite(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::invalid_parameter(name, format!("{} is not finite", value)))
    }
}

/// Projects solver noise back onto `Σw = 1, lower <= w <= upper`.
///
/// Every weight is shifted by the same amount and clipped to its bounds, so the budget
/// residual is spread over the weights that are not pinned at a bound.
fn finalize_weights(weights: Vec<f64>, resolved: &ResolvedConstraints) -> Result<Vec<f64>> {
    for (i, w) in weights.iter().enumerate() {
        let (lo, hi) = (resolved.lower[i], resolved.upper[i]);
        if !w.is_finite() || *w < lo - BOUND_SNAP_TOLERANCE || *w > hi + BOUND_SNAP_TOLERANCE {
            return Err(Error::NumericalNonConvergence(format!(
                "weight {} of asset {} violates bounds [{}, {}]",
                w, i, lo, hi
            )));
        }
    }
    let drift: f64 = weights.iter().sum::<f64>() - 1.0;
    if drift.abs() > BOUND_SNAP_TOLERANCE * weights.len() as f64 {
        return Err(Error::NumericalNonConvergence(format!(
            "weights sum to {:.9} after solving",
            1.0 + drift
        )));
    }

    let shifted = |tau: f64| -> Vec<f64> {
        weights
            .iter()
            .enumerate()
            .map(|(i, w)| (w - tau).clamp(resolved.lower[i], resolved.upper[i]))
            .collect()
    };
    // The clipped sum decreases in the shift; bracket it between all-upper and all-lower.
    let mut low = weights
        .iter()
        .enumerate()
        .map(|(i, w)| w - resolved.upper[i])
        .fold(f64::INFINITY, f64::min);
    let mut high = weights
        .iter()
        .enumerate()
        .map(|(i, w)| w - resolved.lower[i])
        .fold(f64::NEG_INFINITY, f64::max);
    let mut tau = 0.0_f64.clamp(low, high);
    for _ in 0..MAX_PROJECTION_STEPS {
        let sum: f64 = shifted(tau).iter().sum();
        if sum == 1.0 || high - low <= f64::EPSILON {
            break;
        }
        if sum > 1.0 {
            low = tau;
        } else {
            high = tau;
        }
        tau = 0.5 * (low + high);
    }

    let projected = shifted(tau);
    let sum: f64 = projected.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(Error::NumericalNonConvergence(format!(
            "weights sum to {:.9} after projection",
            sum
        )));
    }
    Ok(projected)
}

/// Equal weights, with turnover variables set to the matching distance from the reference.
fn weight_start(n_variables: usize, resolved: &ResolvedConstraints) -> DVector<f64> {
    let n = resolved.n_assets();
    let equal = 1.0 / n as f64;
    let mut start = DVector::zeros(n_variables);
    for i in 0..n {
        start[i] = equal;
    }
    if let Some(turnover) = &resolved.turnover {
        for i in 0..n {
            start[n + i] = (equal - turnover.reference[i]).abs();
        }
    }
    start
}

/// Sparse rows collected before the constraint matrix is assembled.
struct RowBuilder {
    n_variables: usize,
    rows: Vec<(Vec<(usize, f64)>, f64, f64)>,
}

impl RowBuilder {
    fn new(n_variables: usize) -> Self {
        Self {
            n_variables,
            rows: Vec::new(),
        }
    }

    fn push(&mut self, coefficients: Vec<(usize, f64)>, lower: f64, upper: f64) {
        self.rows.push((coefficients, lower, upper));
    }

    fn build(self, p: DMatrix<f64>, q: DVector<f64>) -> QpProblem {
        let m = self.rows.len();
        let mut a = DMatrix::zeros(m, self.n_variables);
        let mut l = DVector::zeros(m);
        let mut u = DVector::zeros(m);
        for (r, (coefficients, lower, upper)) in self.rows.into_iter().enumerate() {
            for (c, v) in coefficients {
                a[(r, c)] += v;
            }
            l[r] = lower;
            u[r] = upper;
        }
        QpProblem { p, q, a, l, u }
    }
}

/// Problem over `[w, t]`: weights plus one turnover variable per asset when a turnover
/// bound is present (`t_i >= |w_i - ref_i|`, `Σt <= max`).
fn weight_problem(
    resolved: &ResolvedConstraints,
    p_weights: DMatrix<f64>,
    q_weights: DVector<f64>,
    min_return: Option<(&DVector<f64>, f64)>,
) -> QpProblem {
    let n = resolved.n_assets();
    let n_variables = if resolved.turnover.is_some() { 2 * n } else { n };
    let mut rows = RowBuilder::new(n_variables);

    rows.push((0..n).map(|i| (i, 1.0)).collect(), 1.0, 1.0);
    for i in 0..n {
        rows.push(vec![(i, 1.0)], resolved.lower[i], resolved.upper[i]);
    }
    for sector in &resolved.sectors {
        rows.push(
            sector.members.iter().map(|&i| (i, 1.0)).collect(),
            sector.min,
            sector.max,
        );
    }
    if let Some(turnover) = &resolved.turnover {
        for i in 0..n {
            rows.push(vec![(n + i, 1.0), (i, -1.0)], -turnover.reference[i], f64::INFINITY);
            rows.push(vec![(n + i, 1.0), (i, 1.0)], turnover.reference[i], f64::INFINITY);
        }
        rows.push(
            (n..2 * n).map(|j| (j, 1.0)).collect(),
            f64::NEG_INFINITY,
            turnover.max_turnover,
        );
    }
    if let Some((mu, target)) = min_return {
        rows.push(
            mu.iter().enumerate().map(|(i, &m)| (i, m)).collect(),
            target,
            f64::INFINITY,
        );
    }

    let mut p = DMatrix::zeros(n_variables, n_variables);
    p.view_mut((0, 0), (n, n)).copy_from(&p_weights);
    let mut q = DVector::zeros(n_variables);
    q.rows_mut(0, n).copy_from(&q_weights);
    rows.build(p, q)
}

/// Homogenized max-Sharpe problem over `[y, κ, t]` with `w = y / κ`.
fn sharpe_problem(
    universe: &AssetUniverse,
    resolved: &ResolvedConstraints,
    excess: &[f64],
) -> QpProblem {
    let n = resolved.n_assets();
    let kappa = n;
    let n_variables = if resolved.turnover.is_some() { 2 * n + 1 } else { n + 1 };
    let mut rows = RowBuilder::new(n_variables);

    let mut budget: Vec<(usize, f64)> = (0..n).map(|i| (i, 1.0)).collect();
    budget.push((kappa, -1.0));
    rows.push(budget, 0.0, 0.0);
    rows.push(
        excess.iter().enumerate().map(|(i, &e)| (i, e)).collect(),
        1.0,
        1.0,
    );
    for i in 0..n {
        rows.push(
            vec![(i, 1.0), (kappa, -resolved.lower[i])],
            0.0,
            f64::INFINITY,
        );
        rows.push(
            vec![(i, 1.0), (kappa, -resolved.upper[i])],
            f64::NEG_INFINITY,
            0.0,
        );
    }
    rows.push(vec![(kappa, 1.0)], 0.0, f64::INFINITY);
    for sector in &resolved.sectors {
        let mut lower: Vec<(usize, f64)> = sector.members.iter().map(|&i| (i, 1.0)).collect();
        let mut upper = lower.clone();
        lower.push((kappa, -sector.min));
        upper.push((kappa, -sector.max));
        rows.push(lower, 0.0, f64::INFINITY);
        rows.push(upper, f64::NEG_INFINITY, 0.0);
    }
    if let Some(turnover) = &resolved.turnover {
        let t = n + 1;
        for i in 0..n {
            let reference = turnover.reference[i];
            rows.push(
                vec![(t + i, 1.0), (i, -1.0), (kappa, reference)],
                0.0,
                f64::INFINITY,
            );
            rows.push(
                vec![(t + i, 1.0), (i, 1.0), (kappa, -reference)],
                0.0,
                f64::INFINITY,
            );
        }
        let mut total: Vec<(usize, f64)> = (t..t + n).map(|j| (j, 1.0)).collect();
        total.push((kappa, -turnover.max_turnover));
        rows.push(total, f64::NEG_INFINITY, 0.0);
    }

    let mut p = DMatrix::zeros(n_variables, n_variables);
    p.view_mut((0, 0), (n, n))
        .copy_from(&(universe.covariance() * 2.0));
    rows.build(p, DVector::zeros(n_variables))
}
