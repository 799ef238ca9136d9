//! Convex quadratic programming by operator splitting.
//!
//! Solves
//!
//! ```text
//! minimize    ½ xᵀPx + qᵀx
//! subject to  l <= Ax <= u
//! ```
//!
//! with the alternating direction method of multipliers (ADMM): each iteration solves one
//! linear system with the fixed matrix `P + σI + Aᵀ diag(ρ) A` (factored once by
//! Cholesky, refactored only when ρ adapts) and projects onto the box `[l, u]`.
//!
//! The iterations run on a Ruiz-equilibrated copy of the problem; covariance entries are
//! orders of magnitude smaller than the unit budget rows, and unscaled ADMM crawls on
//! that mismatch. Residuals are always measured on the unscaled problem.
//!
//! Termination:
//! - primal residual `‖Ax - z‖∞ <= eps_abs + eps_rel · max(‖Ax‖∞, ‖z‖∞)`
//! - dual residual `‖Px + q + Aᵀy‖∞ <= eps_abs + eps_rel · max(‖Px‖∞, ‖Aᵀy‖∞, ‖q‖∞)`
//! - or a primal infeasibility certificate from the dual iterate increments.
//!
//! A converged iterate is polished: the active constraints are guessed from the dual
//! signs, the equality-constrained KKT system is solved directly with a small
//! regularization and iterative refinement, and the result replaces the ADMM iterate
//! when it is feasible, sign-consistent and no worse. Flat directions of the objective
//! receive no component from the regularized solve, so symmetric problems started from a
//! symmetric point keep their symmetric solution.
//!
//! An iterate that hits the iteration cap is still returned when polishing recovers it
//! or its KKT residual is within `kkt_tolerance`.

use log::{debug, warn};
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result, SolverError};

const RHO_MIN: f64 = 1e-6;
const RHO_MAX: f64 = 1e6;
const RHO_EQUALITY_SCALE: f64 = 1e3;
const POLISH_REGULARIZATION: f64 = 1e-9;
const DIVISION_GUARD: f64 = 1e-30;
const SCALING_MIN: f64 = 1e-4;
const SCALING_MAX: f64 = 1e4;
/// Active-set guesses from primal proximity use this multiple of the primal residual.
const PROXIMITY_FACTOR: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SolverSettings {
    pub max_iterations: usize,
    pub eps_abs: f64,
    pub eps_rel: f64,
    pub eps_infeasible: f64,
    /// Initial ADMM step size
    pub rho: f64,
    /// Proximal regularization of the x-update
    pub sigma: f64,
    /// Over-relaxation parameter in (0, 2)
    pub alpha: f64,
    /// Iterations between step-size adaptations; 0 disables adaptation
    pub adaptive_rho_interval: usize,
    pub polish: bool,
    pub polish_refinement_steps: usize,
    /// Ruiz equilibration passes; 0 solves the problem as given
    pub scaling_iterations: usize,
    /// Largest scaled KKT residual accepted for a returned solution
    pub kkt_tolerance: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 20_000,
            eps_abs: 1e-7,
            eps_rel: 1e-7,
            eps_infeasible: 1e-6,
            rho: 0.1,
            sigma: 1e-6,
            alpha: 1.6,
            adaptive_rho_interval: 25,
            polish: true,
            polish_refinement_steps: 3,
            scaling_iterations: 10,
            kkt_tolerance: 1e-5,
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::invalid_parameter(
                "solver.maxIterations",
                "must be greater than zero",
            ));
        }
        let positive = [
            ("solver.epsAbs", self.eps_abs),
            ("solver.epsRel", self.eps_rel),
            ("solver.epsInfeasible", self.eps_infeasible),
            ("solver.rho", self.rho),
            ("solver.sigma", self.sigma),
            ("solver.kktTolerance", self.kkt_tolerance),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::invalid_parameter(
                    name,
                    format!("must be positive, got {}", value),
                ));
            }
        }
        if !(self.alpha > 0.0 && self.alpha < 2.0) {
            return Err(Error::invalid_parameter(
                "solver.alpha",
                format!("must be in (0, 2), got {}", self.alpha),
            ));
        }
        Ok(())
    }
}

/// `min ½xᵀPx + qᵀx  s.t.  l <= Ax <= u`. Infinite bounds are allowed.
#[derive(Debug, Clone)]
pub struct QpProblem {
    pub p: DMatrix<f64>,
    pub q: DVector<f64>,
    pub a: DMatrix<f64>,
    pub l: DVector<f64>,
    pub u: DVector<f64>,
}

impl QpProblem {
    pub fn n_variables(&self) -> usize {
        self.q.len()
    }

    pub fn n_constraints(&self) -> usize {
        self.l.len()
    }

    pub fn objective(&self, x: &DVector<f64>) -> f64 {
        0.5 * x.dot(&(&self.p * x)) + self.q.dot(x)
    }

    fn is_equality(&self, i: usize) -> bool {
        self.l[i].is_finite() && self.u[i].is_finite() && (self.u[i] - self.l[i]).abs() < 1e-12
    }

    fn project(&self, v: &DVector<f64>) -> DVector<f64> {
        DVector::from_fn(v.len(), |i, _| v[i].max(self.l[i]).min(self.u[i]))
    }

    fn check_dimensions(&self) -> std::result::Result<(), SolverError> {
        let n = self.n_variables();
        let m = self.n_constraints();
        if self.p.nrows() != n
            || self.p.ncols() != n
            || self.a.ncols() != n
            || self.a.nrows() != m
            || self.u.len() != m
        {
            return Err(SolverError::Factorization(format!(
                "inconsistent problem dimensions (n = {}, m = {})",
                n, m
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct QpSolution {
    pub x: DVector<f64>,
    /// Multipliers: negative at an active lower bound, positive at an active upper bound
    pub y: DVector<f64>,
    pub objective: f64,
    pub iterations: usize,
    pub primal_residual: f64,
    pub dual_residual: f64,
    pub kkt_residual: f64,
    pub polished: bool,
}

#[derive(Debug, Clone)]
pub struct QpSolver {
    settings: SolverSettings,
}

struct Residuals {
    primal: f64,
    dual: f64,
    eps_primal: f64,
    eps_dual: f64,
}

impl QpSolver {
    pub fn new(settings: SolverSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    pub fn solve(
        &self,
        problem: &QpProblem,
        warm_start: Option<&DVector<f64>>,
    ) -> std::result::Result<QpSolution, SolverError> {
        problem.check_dimensions()?;
        let settings = &self.settings;
        let n = problem.n_variables();
        let m = problem.n_constraints();
        let a_t = problem.a.transpose();

        let (scaling, scaled) = Scaling::equilibrate(problem, settings.scaling_iterations);
        let scaled_a_t = scaled.a.transpose();

        let mut rho_scale = settings.rho;
        let mut rho = self.rho_vector(&scaled, rho_scale);
        let mut factor = factorize(&scaled, &scaled_a_t, &rho, settings.sigma)?;

        // Iterates of the scaled problem
        let mut xs = match warm_start {
            Some(x0) if x0.len() == n => x0.component_div(&scaling.d),
            _ => DVector::zeros(n),
        };
        let mut zs = scaled.project(&(&scaled.a * &xs));
        let mut ys = DVector::<f64>::zeros(m);

        let mut converged = false;
        let mut iterations = 0;
        let (mut x, mut z, mut y) = scaling.unscale(&xs, &zs, &ys);
        let mut residuals = self.residuals(problem, &a_t, &x, &z, &y);

        for iter in 1..=settings.max_iterations {
            iterations = iter;

            let rhs =
                &xs * settings.sigma - &scaled.q + &scaled_a_t * (rho.component_mul(&zs) - &ys);
            let x_tilde = factor.solve(&rhs);
            let z_tilde = &scaled.a * &x_tilde;

            let x_next = &x_tilde * settings.alpha + &xs * (1.0 - settings.alpha);
            let z_relaxed = &z_tilde * settings.alpha + &zs * (1.0 - settings.alpha);
            let z_next = scaled.project(&(&z_relaxed + ys.component_div(&rho)));
            let y_next = &ys + rho.component_mul(&(&z_relaxed - &z_next));
            let delta_y = scaling.unscale_dual(&(&y_next - &ys));

            xs = x_next;
            zs = z_next;
            ys = y_next;
            (x, z, y) = scaling.unscale(&xs, &zs, &ys);

            residuals = self.residuals(problem, &a_t, &x, &z, &y);
            if residuals.primal <= residuals.eps_primal && residuals.dual <= residuals.eps_dual {
                converged = true;
                break;
            }

            if self.certifies_infeasibility(problem, &a_t, &delta_y) {
                debug!("QP primal infeasibility certificate after {} iterations", iter);
                return Err(SolverError::PrimalInfeasible { iterations: iter });
            }

            if settings.adaptive_rho_interval > 0 && iter % settings.adaptive_rho_interval == 0 {
                let proposed = self.adapted_rho(&scaled, &scaled_a_t, &xs, &zs, &ys, rho_scale);
                if proposed > 5.0 * rho_scale || proposed < rho_scale / 5.0 {
                    rho_scale = proposed;
                    rho = self.rho_vector(&scaled, rho_scale);
                    factor = factorize(&scaled, &scaled_a_t, &rho, settings.sigma)?;
                }
            }
        }

        debug!(
            "ADMM {} after {} iterations (primal {:.3e}, dual {:.3e}, rho {:.3e})",
            if converged { "converged" } else { "stopped" },
            iterations,
            residuals.primal,
            residuals.dual,
            rho_scale
        );

        let mut polished = false;
        if settings.polish {
            let guesses = self.active_set_guesses(problem, &scaled, &z, &zs, &y, &ys, &residuals);
            let attempt = guesses
                .iter()
                .find_map(|active| self.polish(problem, &a_t, &x, active, &residuals));
            match attempt {
                Some((xp, yp)) => {
                    x = xp;
                    y = yp;
                    polished = true;
                }
                None if converged => {
                    warn!("QP polish rejected; keeping the ADMM iterate");
                }
                None => {}
            }
        }

        let kkt_residual = kkt_residual(problem, &a_t, &x, &y);
        if kkt_residual > settings.kkt_tolerance {
            if !converged && !polished {
                return Err(SolverError::MaxIterations {
                    iterations,
                    primal_residual: residuals.primal,
                    dual_residual: residuals.dual,
                });
            }
            return Err(SolverError::KktViolation {
                residual: kkt_residual,
                tolerance: settings.kkt_tolerance,
            });
        }
        if !converged && !polished {
            warn!(
                "ADMM stopped at {} iterations; accepting the iterate with KKT residual {:.3e}",
                iterations, kkt_residual
            );
        }

        let ax = &problem.a * &x;
        let primal_residual = (&ax - problem.project(&ax)).amax();
        let dual_residual = (&problem.p * &x + &problem.q + &a_t * &y).amax();
        Ok(QpSolution {
            objective: problem.objective(&x),
            x,
            y,
            iterations,
            primal_residual,
            dual_residual,
            kkt_residual,
            polished,
        })
    }

    fn rho_vector(&self, problem: &QpProblem, rho: f64) -> DVector<f64> {
        DVector::from_fn(problem.n_constraints(), |i, _| {
            if problem.l[i].is_infinite() && problem.u[i].is_infinite() {
                RHO_MIN
            } else if problem.is_equality(i) {
                (rho * RHO_EQUALITY_SCALE).min(RHO_MAX)
            } else {
                rho
            }
        })
    }

    fn residuals(
        &self,
        problem: &QpProblem,
        a_t: &DMatrix<f64>,
        x: &DVector<f64>,
        z: &DVector<f64>,
        y: &DVector<f64>,
    ) -> Residuals {
        let ax = &problem.a * x;
        let px = &problem.p * x;
        let aty = a_t * y;
        let primal = if ax.is_empty() { 0.0 } else { (&ax - z).amax() };
        let dual = (&px + &problem.q + &aty).amax();
        let s = &self.settings;
        Residuals {
            primal,
            dual,
            eps_primal: s.eps_abs + s.eps_rel * inf_norm(&ax).max(inf_norm(z)),
            eps_dual: s.eps_abs
                + s.eps_rel * inf_norm(&px).max(inf_norm(&aty)).max(inf_norm(&problem.q)),
        }
    }

    /// `δy` with `Aᵀδy ≈ 0` and `uᵀmax(δy, 0) + lᵀmin(δy, 0) < 0` proves `l <= Ax <= u`
    /// has no solution.
    fn certifies_infeasibility(
        &self,
        problem: &QpProblem,
        a_t: &DMatrix<f64>,
        delta_y: &DVector<f64>,
    ) -> bool {
        let norm = inf_norm(delta_y);
        if norm < 1e-12 {
            return false;
        }
        let eps = self.settings.eps_infeasible;
        let direction = delta_y / norm;
        if inf_norm(&(a_t * &direction)) > eps * 1e-3 {
            return false;
        }
        let mut support = 0.0;
        for i in 0..direction.len() {
            let d = direction[i];
            if d > 1e-9 {
                if problem.u[i].is_infinite() {
                    return false;
                }
                support += problem.u[i] * d;
            } else if d < -1e-9 {
                if problem.l[i].is_infinite() {
                    return false;
                }
                support += problem.l[i] * d;
            }
        }
        support < -eps
    }

    /// Step size balancing the relative residuals of the scaled problem.
    fn adapted_rho(
        &self,
        scaled: &QpProblem,
        scaled_a_t: &DMatrix<f64>,
        x: &DVector<f64>,
        z: &DVector<f64>,
        y: &DVector<f64>,
        rho: f64,
    ) -> f64 {
        let residuals = self.residuals(scaled, scaled_a_t, x, z, y);
        let ax = &scaled.a * x;
        let px = &scaled.p * x;
        let aty = scaled_a_t * y;
        let primal_scale = inf_norm(&ax).max(inf_norm(z)).max(DIVISION_GUARD);
        let dual_scale = inf_norm(&px)
            .max(inf_norm(&aty))
            .max(inf_norm(&scaled.q))
            .max(DIVISION_GUARD);
        let ratio = (residuals.primal / primal_scale).max(DIVISION_GUARD)
            / (residuals.dual / dual_scale).max(DIVISION_GUARD);
        (rho * ratio.sqrt())
            .clamp(rho / 100.0, rho * 100.0)
            .clamp(RHO_MIN, RHO_MAX)
    }

    /// Candidate active sets for polishing: the dual-sign rule on the scaled iterate, then
    /// the constraints the unscaled iterate sits on.
    #[allow(clippy::too_many_arguments)]
    fn active_set_guesses(
        &self,
        problem: &QpProblem,
        scaled: &QpProblem,
        z: &DVector<f64>,
        zs: &DVector<f64>,
        y: &DVector<f64>,
        ys: &DVector<f64>,
        residuals: &Residuals,
    ) -> Vec<Vec<(usize, Active)>> {
        let m = problem.n_constraints();
        let by_dual: Vec<(usize, Active)> = (0..m)
            .filter_map(|i| {
                if problem.is_equality(i) {
                    Some((i, Active::Equality))
                } else if zs[i] - scaled.l[i] < -ys[i] {
                    Some((i, Active::Lower))
                } else if scaled.u[i] - zs[i] < ys[i] {
                    Some((i, Active::Upper))
                } else {
                    None
                }
            })
            .collect();

        let gap = PROXIMITY_FACTOR * residuals.primal.max(self.settings.eps_abs);
        let by_proximity: Vec<(usize, Active)> = (0..m)
            .filter_map(|i| {
                if problem.is_equality(i) {
                    Some((i, Active::Equality))
                } else if z[i] - problem.l[i] <= gap && y[i] <= 0.0 {
                    Some((i, Active::Lower))
                } else if problem.u[i] - z[i] <= gap && y[i] >= 0.0 {
                    Some((i, Active::Upper))
                } else {
                    None
                }
            })
            .collect();

        if by_proximity == by_dual {
            vec![by_dual]
        } else {
            vec![by_dual, by_proximity]
        }
    }

    /// Direct solve of the equality-constrained KKT system on one active set.
    fn polish(
        &self,
        problem: &QpProblem,
        a_t: &DMatrix<f64>,
        x_admm: &DVector<f64>,
        active: &[(usize, Active)],
        residuals: &Residuals,
    ) -> Option<(DVector<f64>, DVector<f64>)> {
        let n = problem.n_variables();
        let m = problem.n_constraints();
        let k = active.len();
        let target = |row: usize, kind: Active| match kind {
            Active::Equality | Active::Lower => problem.l[row],
            Active::Upper => problem.u[row],
        };

        let build = |delta: f64| {
            let mut kkt = DMatrix::<f64>::zeros(n + k, n + k);
            kkt.view_mut((0, 0), (n, n)).copy_from(&problem.p);
            for d in 0..n {
                kkt[(d, d)] += delta;
            }
            for (r, (row, _)) in active.iter().enumerate() {
                for c in 0..n {
                    let v = problem.a[(*row, c)];
                    kkt[(n + r, c)] = v;
                    kkt[(c, n + r)] = v;
                }
                kkt[(n + r, n + r)] = -delta;
            }
            kkt
        };
        let regularized = build(POLISH_REGULARIZATION);
        let exact = build(0.0);
        let mut rhs = DVector::<f64>::zeros(n + k);
        for d in 0..n {
            rhs[d] = -problem.q[d];
        }
        for (r, (row, kind)) in active.iter().enumerate() {
            rhs[n + r] = target(*row, *kind);
        }

        let lu = regularized.lu();
        let mut solution = lu.solve(&rhs)?;
        for _ in 0..self.settings.polish_refinement_steps {
            let residual = &rhs - &exact * &solution;
            let correction = lu.solve(&residual)?;
            solution += correction;
        }

        let x = solution.rows(0, n).into_owned();
        let mut y_full = DVector::<f64>::zeros(m);
        for (r, (row, _)) in active.iter().enumerate() {
            y_full[*row] = solution[n + r];
        }
        if x.iter().chain(y_full.iter()).any(|v| !v.is_finite()) {
            return None;
        }

        let tol = residuals.eps_primal.max(self.settings.eps_abs);
        let ax = &problem.a * &x;
        let infeasibility = (&ax - problem.project(&ax)).amax();
        if infeasibility > tol {
            debug!("Polish rejected: infeasibility {:.3e}", infeasibility);
            return None;
        }
        let sign_tol = residuals.eps_dual.max(self.settings.eps_abs);
        for (row, kind) in active {
            let v = y_full[*row];
            let wrong_sign = match kind {
                Active::Lower => v > sign_tol,
                Active::Upper => v < -sign_tol,
                Active::Equality => false,
            };
            if wrong_sign {
                debug!("Polish rejected: multiplier of row {} has the wrong sign", row);
                return None;
            }
        }
        let stationarity = (&problem.p * &x + &problem.q + a_t * &y_full).amax();
        if stationarity > sign_tol {
            debug!("Polish rejected: stationarity {:.3e}", stationarity);
            return None;
        }
        let f_polished = problem.objective(&x);
        let f_admm = problem.objective(x_admm);
        if f_polished > f_admm + tol * f_admm.abs().max(1.0) {
            debug!(
                "Polish rejected: objective {:.6e} above ADMM {:.6e}",
                f_polished, f_admm
            );
            return None;
        }
        Some((x, y_full))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Active {
    Equality,
    Lower,
    Upper,
}

/// Diagonal scaling `P̄ = c·DPD`, `q̄ = c·Dq`, `Ā = EAD`, `[l̄, ū] = E[l, u]`.
struct Scaling {
    d: DVector<f64>,
    e: DVector<f64>,
    c: f64,
}

impl Scaling {
    /// Modified Ruiz equilibration of `[P Aᵀ; A 0]`, each pass followed by cost scaling.
    fn equilibrate(problem: &QpProblem, passes: usize) -> (Self, QpProblem) {
        let n = problem.n_variables();
        let m = problem.n_constraints();
        let mut d = DVector::from_element(n, 1.0);
        let mut e = DVector::from_element(m, 1.0);
        let mut c = 1.0;
        let mut scaled = problem.clone();

        for _ in 0..passes {
            let delta_d = DVector::from_fn(n, |j, _| {
                let norm = column_norm(&scaled.p, j).max(column_norm(&scaled.a, j));
                1.0 / limit_scaling(norm).sqrt()
            });
            let delta_e =
                DVector::from_fn(m, |i, _| 1.0 / limit_scaling(row_norm(&scaled.a, i)).sqrt());

            for j in 0..n {
                for k in 0..n {
                    scaled.p[(j, k)] *= delta_d[j] * delta_d[k];
                }
            }
            scaled.q.component_mul_assign(&delta_d);
            for i in 0..m {
                for j in 0..n {
                    scaled.a[(i, j)] *= delta_e[i] * delta_d[j];
                }
            }
            scaled.l.component_mul_assign(&delta_e);
            scaled.u.component_mul_assign(&delta_e);
            d.component_mul_assign(&delta_d);
            e.component_mul_assign(&delta_e);

            let mean_p_norm = if n == 0 {
                0.0
            } else {
                (0..n).map(|j| column_norm(&scaled.p, j)).sum::<f64>() / n as f64
            };
            let gamma = 1.0 / limit_scaling(mean_p_norm.max(inf_norm(&scaled.q)));
            scaled.p *= gamma;
            scaled.q *= gamma;
            c *= gamma;
        }
        (Self { d, e, c }, scaled)
    }

    fn unscale(
        &self,
        x: &DVector<f64>,
        z: &DVector<f64>,
        y: &DVector<f64>,
    ) -> (DVector<f64>, DVector<f64>, DVector<f64>) {
        (
            x.component_mul(&self.d),
            z.component_div(&self.e),
            self.unscale_dual(y),
        )
    }

    fn unscale_dual(&self, y: &DVector<f64>) -> DVector<f64> {
        y.component_mul(&self.e) / self.c
    }
}

/// Norms too small to carry scale information leave the row or column alone.
fn limit_scaling(norm: f64) -> f64 {
    if norm < SCALING_MIN {
        1.0
    } else {
        norm.min(SCALING_MAX)
    }
}

fn column_norm(matrix: &DMatrix<f64>, j: usize) -> f64 {
    if matrix.nrows() == 0 {
        0.0
    } else {
        matrix.column(j).amax()
    }
}

fn row_norm(matrix: &DMatrix<f64>, i: usize) -> f64 {
    if matrix.ncols() == 0 {
        0.0
    } else {
        matrix.row(i).amax()
    }
}

fn factorize(
    problem: &QpProblem,
    a_t: &DMatrix<f64>,
    rho: &DVector<f64>,
    sigma: f64,
) -> std::result::Result<Cholesky<f64, Dyn>, SolverError> {
    let n = problem.n_variables();
    let mut scaled_a = problem.a.clone();
    for i in 0..scaled_a.nrows() {
        scaled_a.row_mut(i).scale_mut(rho[i]);
    }
    let mut kkt = &problem.p + DMatrix::<f64>::identity(n, n) * sigma + a_t * scaled_a;
    let symmetric = (&kkt + kkt.transpose()) * 0.5;
    kkt = symmetric;
    kkt.cholesky().ok_or_else(|| {
        SolverError::Factorization("reduced KKT matrix is not positive definite".to_string())
    })
}

/// Largest of the scaled primal violation, stationarity and complementarity residuals.
pub fn kkt_residual(
    problem: &QpProblem,
    a_t: &DMatrix<f64>,
    x: &DVector<f64>,
    y: &DVector<f64>,
) -> f64 {
    let ax = &problem.a * x;
    let px = &problem.p * x;
    let aty = a_t * y;

    let primal = if ax.is_empty() {
        0.0
    } else {
        (&ax - problem.project(&ax)).amax() / (1.0 + inf_norm(&ax))
    };
    let dual = (&px + &problem.q + &aty).amax()
        / (1.0 + inf_norm(&px).max(inf_norm(&problem.q)).max(inf_norm(&aty)));

    let mut complementarity: f64 = 0.0;
    for i in 0..y.len() {
        let yi = y[i];
        let violation = if yi > 0.0 {
            if problem.u[i].is_finite() {
                yi * (problem.u[i] - ax[i]).abs()
            } else {
                yi
            }
        } else if yi < 0.0 {
            if problem.l[i].is_finite() {
                -yi * (ax[i] - problem.l[i]).abs()
            } else {
                -yi
            }
        } else {
            0.0
        };
        complementarity = complementarity.max(violation);
    }
    let complementarity = complementarity / (1.0 + inf_norm(y));

    primal.max(dual).max(complementarity)
}

fn inf_norm(v: &DVector<f64>) -> f64 {
    if v.is_empty() {
        0.0
    } else {
        v.amax()
    }
}
