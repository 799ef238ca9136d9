//! Error types for the analytics engine.
//!
//! Every failure is recoverable by the caller: the variants carry enough context
//! (statistic, asset, constraint) to adjust the inputs and retry. Nothing is retried
//! internally since all computations are deterministic.

use thiserror::Error;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the analytics engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Fewer observations than the requested statistic or window needs.
    #[error("Insufficient data for {statistic}: need at least {required} observations, got {actual}")]
    InsufficientData {
        statistic: String,
        required: usize,
        actual: usize,
    },

    /// The constraint set admits no feasible weight vector.
    #[error("Infeasible constraints: {0}")]
    InfeasibleConstraints(String),

    /// Singular or near-singular covariance estimate.
    #[error("Ill-conditioned covariance matrix: {0}")]
    IllConditionedCovariance(String),

    /// A parameter is outside its valid range.
    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },

    /// The solver did not reach the requested precision within its budget.
    #[error("Numerical solver did not converge: {0}")]
    NumericalNonConvergence(String),

    /// Failure reported by an external data collaborator.
    #[error("Repository error: {0}")]
    Repository(String),

    /// Configuration could not be parsed.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Creates an InsufficientData error.
    pub fn insufficient_data(statistic: impl Into<String>, required: usize, actual: usize) -> Self {
        Self::InsufficientData {
            statistic: statistic.into(),
            required,
            actual,
        }
    }

    /// Creates an InvalidParameter error.
    pub fn invalid_parameter(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates an InfeasibleConstraints error.
    pub fn infeasible(message: impl Into<String>) -> Self {
        Self::InfeasibleConstraints(message.into())
    }

    /// Creates an IllConditionedCovariance error.
    pub fn ill_conditioned(message: impl Into<String>) -> Self {
        Self::IllConditionedCovariance(message.into())
    }
}

/// Errors raised by the quadratic-program solver.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("problem is primal infeasible (certificate found after {iterations} iterations)")]
    PrimalInfeasible { iterations: usize },

    #[error("reached {iterations} iterations (primal residual {primal_residual:.3e}, dual residual {dual_residual:.3e})")]
    MaxIterations {
        iterations: usize,
        primal_residual: f64,
        dual_residual: f64,
    },

    #[error("failed to factorize the linear system: {0}")]
    Factorization(String),

    #[error("KKT residual {residual:.3e} exceeds tolerance {tolerance:.3e}")]
    KktViolation { residual: f64, tolerance: f64 },
}

impl From<SolverError> for Error {
    fn from(err: SolverError) -> Self {
        match err {
            SolverError::PrimalInfeasible { .. } => Error::InfeasibleConstraints(err.to_string()),
            SolverError::Factorization(_) => Error::IllConditionedCovariance(err.to_string()),
            SolverError::MaxIterations { .. } | SolverError::KktViolation { .. } => {
                Error::NumericalNonConvergence(err.to_string())
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<Error> for String {
    fn from(err: Error) -> Self {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::insufficient_data("sharpe ratio", 2, 1);
        assert_eq!(
            err.to_string(),
            "Insufficient data for sharpe ratio: need at least 2 observations, got 1"
        );

        let err = Error::invalid_parameter("confidence", "must be in (0, 1)");
        assert_eq!(
            err.to_string(),
            "Invalid parameter 'confidence': must be in (0, 1)"
        );
    }

    #[test]
    fn test_solver_error_mapping() {
        let err: Error = SolverError::PrimalInfeasible { iterations: 40 }.into();
        assert!(matches!(err, Error::InfeasibleConstraints(_)));

        let err: Error = SolverError::MaxIterations {
            iterations: 10,
            primal_residual: 1.0,
            dual_residual: 1.0,
        }
        .into();
        assert!(matches!(err, Error::NumericalNonConvergence(_)));

        let err: Error = SolverError::Factorization("not positive definite".to_string()).into();
        assert!(matches!(err, Error::IllConditionedCovariance(_)));
    }
}
