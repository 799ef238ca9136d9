/// Trading periods per year for daily data
pub const TRADING_DAYS_PER_YEAR: u32 = 252;

/// Default annual risk-free rate
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.02;

/// Default rolling window (one trading year)
pub const DEFAULT_ROLLING_WINDOW: usize = 252;

/// Drawdown below which a period is flagged as underwater
pub const DEFAULT_DRAWDOWN_THRESHOLD: f64 = -0.05;

/// Minimum observations for any point-in-time statistic
pub const MIN_OBSERVATIONS: usize = 2;

/// Below this many observations historical VaR still runs but logs a warning
pub const SMALL_SAMPLE_WARNING: usize = 30;

/// Default Monte Carlo draws
pub const DEFAULT_SIMULATIONS: usize = 10_000;

/// Simulations per independently seeded Monte Carlo chunk
pub const SIMULATION_CHUNK_SIZE: usize = 2_048;

/// Default number of efficient frontier points
pub const DEFAULT_FRONTIER_POINTS: usize = 100;

/// Weights returned by the optimizer must sum to one within this tolerance
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Caller-supplied target allocations must sum to one within this tolerance
pub const TARGET_WEIGHT_SUM_TOLERANCE: f64 = 1e-4;

/// Correlation magnitude treated as perfect when estimating covariance
pub const PERFECT_CORRELATION: f64 = 1.0 - 1e-10;

/// Smallest admissible eigenvalue ratio for an estimated covariance matrix
pub const MIN_EIGENVALUE_RATIO: f64 = 1e-12;

/// Decimal precision for money amounts in trade recommendations
pub const DECIMAL_PRECISION: u32 = 6;
