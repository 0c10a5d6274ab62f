use faer::prelude::SpSolver;
use reloc_3d::transforms::Isometry3;

use crate::{
    error::GicpError,
    ops::{compute_error, find_correspondences, linearize, CloudView, LinearSystem},
    preprocess::PreprocessedCloud,
};

/// Parameters of the generalized ICP solver.
#[derive(Debug, Clone)]
pub struct GicpParams {
    /// Number of worker threads used for correspondence search and linearization.
    pub num_threads: usize,
    /// Correspondences with a larger squared distance are rejected.
    pub max_dist_sq: f64,
    /// Maximum number of outer (linearization) iterations.
    pub max_iterations: usize,
    /// Maximum number of damping attempts per outer iteration.
    pub max_inner_iterations: usize,
    /// Initial Levenberg-Marquardt damping.
    pub init_lambda: f64,
    /// Damping is multiplied or divided by this factor.
    pub lambda_factor: f64,
    /// Rotation step below which the solve has converged, in radians.
    pub rotation_eps: f64,
    /// Translation step below which the solve has converged, in meters.
    pub translation_eps: f64,
}

impl Default for GicpParams {
    fn default() -> Self {
        Self {
            num_threads: 4,
            max_dist_sq: 1.0,
            max_iterations: 20,
            max_inner_iterations: 10,
            init_lambda: 1e-3,
            lambda_factor: 10.0,
            rotation_eps: 0.1_f64.to_radians(),
            translation_eps: 1e-3,
        }
    }
}

/// Outcome of one registration.
#[derive(Debug, Clone, PartialEq)]
pub struct GicpResult {
    /// Whether the last accepted step was below the convergence thresholds.
    pub converged: bool,
    /// Transform mapping source points into the target frame.
    pub t_target_source: Isometry3,
    /// Number of outer iterations performed.
    pub num_iterations: usize,
    /// Number of correspondences at the last linearization.
    pub num_inliers: usize,
    /// Final cost, the sum of `0.5 r^T M r` over the inliers.
    pub error: f64,
}

/// Generalized ICP (plane-to-plane) registration.
///
/// Owns a worker pool of `num_threads` threads.
pub struct GicpRegistration {
    params: GicpParams,
    pool: rayon::ThreadPool,
}

impl GicpRegistration {
    /// Create a new registration with the given parameters.
    pub fn new(params: GicpParams) -> Result<Self, GicpError> {
        if params.num_threads == 0 {
            return Err(GicpError::InvalidNumThreads(params.num_threads));
        }
        if params.max_iterations == 0 {
            return Err(GicpError::InvalidMaxIterations(params.max_iterations));
        }
        if !(params.max_dist_sq.is_finite() && params.max_dist_sq > 0.0) {
            return Err(GicpError::InvalidMaxDistSq(params.max_dist_sq));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(params.num_threads)
            .thread_name(|i| format!("reloc-gicp-{i}"))
            .build()?;

        Ok(Self { params, pool })
    }

    /// The solver parameters.
    pub fn params(&self) -> &GicpParams {
        &self.params
    }

    /// Estimate the transform that maps `source` onto `target`.
    ///
    /// # Arguments
    ///
    /// * `target` - The reference cloud and its tree.
    /// * `source` - The cloud to align.
    /// * `initial_guess` - Starting estimate of `T_target_source`.
    ///
    /// # Returns
    ///
    /// The registration result. Failing to converge is reported through
    /// [`GicpResult::converged`], never as an error.
    pub fn align(
        &self,
        target: &PreprocessedCloud,
        source: &PreprocessedCloud,
        initial_guess: &Isometry3,
    ) -> Result<GicpResult, GicpError> {
        let (Some(target_covs), Some(source_covs)) = (
            target.cloud().covariances(),
            source.cloud().covariances(),
        ) else {
            return Err(GicpError::MissingCovariances);
        };
        let target_view = CloudView {
            points: target.cloud().points(),
            covariances: target_covs,
        };
        let source_view = CloudView {
            points: source.cloud().points(),
            covariances: source_covs,
        };

        Ok(self
            .pool
            .install(|| self.optimize(target, &target_view, &source_view, initial_guess)))
    }

    fn optimize(
        &self,
        target: &PreprocessedCloud,
        target_view: &CloudView,
        source_view: &CloudView,
        initial_guess: &Isometry3,
    ) -> GicpResult {
        let params = &self.params;
        let mut result = GicpResult {
            converged: false,
            t_target_source: *initial_guess,
            num_iterations: 0,
            num_inliers: 0,
            error: 0.0,
        };
        let mut lambda = params.init_lambda;

        for i in 0..params.max_iterations {
            let correspondences = find_correspondences(
                source_view.points,
                target.tree(),
                &result.t_target_source,
                params.max_dist_sq,
            );
            let system = linearize(
                target_view,
                source_view,
                &correspondences,
                &result.t_target_source,
            );

            result.num_iterations = i + 1;
            result.num_inliers = system.num_inliers;
            result.error = system.error;

            if system.num_inliers == 0 {
                log::debug!("No correspondences at iteration {}", i);
                result.converged = false;
                break;
            }

            let mut success = false;
            for _ in 0..params.max_inner_iterations {
                let Some(delta) = solve_damped(&system, lambda) else {
                    lambda *= params.lambda_factor;
                    continue;
                };

                let candidate = result.t_target_source * Isometry3::exp(&delta);
                let error = compute_error(target_view, source_view, &correspondences, &candidate);

                if error <= system.error {
                    result.converged = is_converged(&delta, params);
                    result.t_target_source = candidate;
                    result.error = error;
                    lambda /= params.lambda_factor;
                    success = true;
                    break;
                }
                lambda *= params.lambda_factor;
            }

            log::debug!(
                "iter={} inliers={} error={:.6} lambda={:.3e} converged={}",
                i,
                system.num_inliers,
                result.error,
                lambda,
                result.converged
            );

            if !success || result.converged {
                break;
            }
        }

        result
    }
}

/// Solve `(H + lambda I) delta = -g`, `None` if the system is not positive definite.
fn solve_damped(system: &LinearSystem, lambda: f64) -> Option<[f64; 6]> {
    let h = faer::Mat::<f64>::from_fn(6, 6, |i, j| {
        system.h[i][j] + if i == j { lambda } else { 0.0 }
    });
    let rhs = faer::Mat::<f64>::from_fn(6, 1, |i, _| -system.g[i]);

    let cholesky = h.cholesky(faer::Side::Lower).ok()?;
    let solution = cholesky.solve(&rhs);

    let delta: [f64; 6] = std::array::from_fn(|i| solution.read(i, 0));
    delta.iter().all(|v| v.is_finite()).then_some(delta)
}

fn is_converged(delta: &[f64; 6], params: &GicpParams) -> bool {
    let rotation = (delta[0] * delta[0] + delta[1] * delta[1] + delta[2] * delta[2]).sqrt();
    let translation = (delta[3] * delta[3] + delta[4] * delta[4] + delta[5] * delta[5]).sqrt();
    rotation < params.rotation_eps && translation < params.translation_eps
}
