//! Gaussian hidden Markov model with full covariance matrices.
//!
//! Fixed three-dimensional feature space (daily return, short and long
//! rolling volatility). Fitting is Baum-Welch with scaled forward/backward
//! passes; initial means come from seeded k-means++ so repeated fits on the
//! same data are identical.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

/// Dimension of a feature vector.
pub const N_FEATURES: usize = 3;

/// One observation row.
pub type FeatureVector = [f64; N_FEATURES];

/// Covariance matrix of one state.
pub type Matrix = [[f64; N_FEATURES]; N_FEATURES];

const EPS: f64 = 1e-300;
const KMEANS_ITERS: usize = 50;
const LN_2PI: f64 = 1.837_877_066_409_345_3;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HmmError {
    #[error("Need at least {needed} observations, got {actual}")]
    TooFewObservations { needed: usize, actual: usize },

    #[error("Non-finite value in observation {0}")]
    NonFiniteObservation(usize),

    #[error("Covariance of state {0} is not positive definite")]
    SingularCovariance(usize),

    #[error("Log-likelihood became non-finite at iteration {0}")]
    NonFiniteLikelihood(usize),
}

/// Fitting parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HmmConfig {
    pub n_states: usize,
    /// Maximum Baum-Welch iterations.
    pub n_iter: usize,
    /// Stop once the log-likelihood gain falls below this.
    pub tolerance: f64,
    /// Added to every covariance diagonal.
    pub min_covar: f64,
    pub seed: u64,
}

impl Default for HmmConfig {
    fn default() -> Self {
        Self {
            n_states: 4,
            n_iter: 100,
            tolerance: 1e-2,
            min_covar: 1e-3,
            seed: 42,
        }
    }
}

/// Lower Cholesky factor of a covariance matrix.
#[derive(Debug, Clone)]
struct Cholesky {
    lower: Matrix,
    log_det: f64,
}

impl Cholesky {
    fn decompose(m: &Matrix) -> Option<Self> {
        let mut lower = [[0.0; N_FEATURES]; N_FEATURES];
        for i in 0..N_FEATURES {
            for j in 0..=i {
                let mut sum = m[i][j];
                for k in 0..j {
                    sum -= lower[i][k] * lower[j][k];
                }
                if i == j {
                    if sum <= 0.0 || !sum.is_finite() {
                        return None;
                    }
                    lower[i][i] = sum.sqrt();
                } else {
                    lower[i][j] = sum / lower[j][j];
                }
            }
        }
        let log_det = 2.0 * (0..N_FEATURES).map(|i| lower[i][i].ln()).sum::<f64>();
        Some(Self { lower, log_det })
    }

    /// Log density of `x` under N(mean, L Lᵀ).
    fn log_pdf(&self, x: &FeatureVector, mean: &FeatureVector) -> f64 {
        // Forward substitution: L y = x - mean.
        let mut y = [0.0; N_FEATURES];
        for i in 0..N_FEATURES {
            let mut sum = x[i] - mean[i];
            for k in 0..i {
                sum -= self.lower[i][k] * y[k];
            }
            y[i] = sum / self.lower[i][i];
        }
        let mahalanobis: f64 = y.iter().map(|v| v * v).sum();
        -0.5 * (N_FEATURES as f64 * LN_2PI + self.log_det + mahalanobis)
    }
}

/// Expectation-step output.
struct Expectation {
    log_likelihood: f64,
    gamma: Vec<Vec<f64>>,
    xi_sum: Vec<Vec<f64>>,
}

/// Fitted Gaussian HMM.
#[derive(Debug, Clone)]
pub struct GaussianHmm {
    config: HmmConfig,
    start_prob: Vec<f64>,
    transitions: Vec<Vec<f64>>,
    means: Vec<FeatureVector>,
    covars: Vec<Matrix>,
    factors: Vec<Cholesky>,
    log_likelihood: f64,
    iterations: usize,
    converged: bool,
}

impl GaussianHmm {
    /// Fit a fresh model to `observations`.
    pub fn fit(observations: &[FeatureVector], config: &HmmConfig) -> Result<Self, HmmError> {
        let k = config.n_states.max(1);
        if observations.len() < k.max(2) {
            return Err(HmmError::TooFewObservations {
                needed: k.max(2),
                actual: observations.len(),
            });
        }
        if let Some(t) = observations
            .iter()
            .position(|row| row.iter().any(|v| !v.is_finite()))
        {
            return Err(HmmError::NonFiniteObservation(t));
        }

        let mut model = Self::initialize(observations, config, k)?;
        let mut previous = f64::NEG_INFINITY;

        for iter in 0..config.n_iter.max(1) {
            let pass = model.expectation(observations, iter)?;
            model.maximize(observations, &pass)?;
            model.iterations = iter + 1;

            let gain = pass.log_likelihood - previous;
            trace!(
                iter,
                log_likelihood = pass.log_likelihood,
                gain,
                "HMM: Baum-Welch iteration"
            );
            if gain.abs() < config.tolerance {
                model.converged = true;
                break;
            }
            previous = pass.log_likelihood;
        }

        model.log_likelihood = model.score(observations)?;

        debug!(
            states = k,
            observations = observations.len(),
            iterations = model.iterations,
            converged = model.converged,
            log_likelihood = model.log_likelihood,
            "HMM: fit complete"
        );

        Ok(model)
    }

    pub fn n_states(&self) -> usize {
        self.start_prob.len()
    }

    pub fn start_prob(&self) -> &[f64] {
        &self.start_prob
    }

    pub fn transitions(&self) -> &[Vec<f64>] {
        &self.transitions
    }

    pub fn means(&self) -> &[FeatureVector] {
        &self.means
    }

    pub fn covariances(&self) -> &[Matrix] {
        &self.covars
    }

    /// Log-likelihood of the training data under the final parameters.
    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    /// `log N(x | μ_s, Σ_s)`.
    pub fn log_emission(&self, x: &FeatureVector, state: usize) -> f64 {
        self.factors[state].log_pdf(x, &self.means[state])
    }

    /// Log-likelihood of an arbitrary sequence.
    pub fn score(&self, observations: &[FeatureVector]) -> Result<f64, HmmError> {
        if observations.is_empty() {
            return Err(HmmError::TooFewObservations {
                needed: 1,
                actual: 0,
            });
        }
        let (emissions, offsets) = self.scaled_emissions(observations);
        let (_, scales) = self.forward(&emissions);
        let ll = log_likelihood_from(&scales, &offsets);
        if ll.is_finite() {
            Ok(ll)
        } else {
            Err(HmmError::NonFiniteLikelihood(self.iterations))
        }
    }

    /// Most likely state sequence (Viterbi, log space).
    pub fn decode(&self, observations: &[FeatureVector]) -> Vec<usize> {
        let t_len = observations.len();
        let k = self.n_states();
        if t_len == 0 {
            return Vec::new();
        }

        let log_a: Vec<Vec<f64>> = self
            .transitions
            .iter()
            .map(|row| row.iter().map(|p| p.ln()).collect())
            .collect();

        let mut delta: Vec<f64> = (0..k)
            .map(|s| self.start_prob[s].ln() + self.log_emission(&observations[0], s))
            .collect();
        let mut back = vec![vec![0usize; k]; t_len];

        for t in 1..t_len {
            let mut next = vec![f64::NEG_INFINITY; k];
            for j in 0..k {
                let (best_i, best) = (0..k)
                    .map(|i| (i, delta[i] + log_a[i][j]))
                    .fold((0, f64::NEG_INFINITY), |acc, cur| {
                        if cur.1 > acc.1 {
                            cur
                        } else {
                            acc
                        }
                    });
                back[t][j] = best_i;
                next[j] = best + self.log_emission(&observations[t], j);
            }
            delta = next;
        }

        let mut state = argmax(&delta);
        let mut path = vec![0usize; t_len];
        path[t_len - 1] = state;
        for t in (1..t_len).rev() {
            state = back[t][state];
            path[t - 1] = state;
        }
        path
    }

    fn initialize(
        observations: &[FeatureVector],
        config: &HmmConfig,
        k: usize,
    ) -> Result<Self, HmmError> {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let means = kmeans_plus_plus(observations, k, &mut rng);

        let global_mean = weighted_mean(observations, None);
        let mut base_cov = weighted_covariance(observations, None, &global_mean);
        add_diagonal(&mut base_cov, config.min_covar);

        let covars = vec![base_cov; k];
        let factors = covars
            .iter()
            .enumerate()
            .map(|(s, c)| Cholesky::decompose(c).ok_or(HmmError::SingularCovariance(s)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            config: config.clone(),
            start_prob: vec![1.0 / k as f64; k],
            transitions: vec![vec![1.0 / k as f64; k]; k],
            means,
            covars,
            factors,
            log_likelihood: f64::NEG_INFINITY,
            iterations: 0,
            converged: false,
        })
    }

    /// Emission likelihoods rescaled per row by their max, plus the log offsets.
    fn scaled_emissions(&self, observations: &[FeatureVector]) -> (Vec<Vec<f64>>, Vec<f64>) {
        let k = self.n_states();
        let mut emissions = Vec::with_capacity(observations.len());
        let mut offsets = Vec::with_capacity(observations.len());

        for x in observations {
            let logs: Vec<f64> = (0..k).map(|s| self.log_emission(x, s)).collect();
            let max = logs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            emissions.push(logs.iter().map(|l| (l - max).exp()).collect());
            offsets.push(max);
        }

        (emissions, offsets)
    }

    fn forward(&self, emissions: &[Vec<f64>]) -> (Vec<Vec<f64>>, Vec<f64>) {
        let k = self.n_states();
        let t_len = emissions.len();
        let mut alpha = vec![vec![0.0; k]; t_len];
        let mut scales = vec![1.0; t_len];

        for t in 0..t_len {
            for j in 0..k {
                let prior = if t == 0 {
                    self.start_prob[j]
                } else {
                    (0..k)
                        .map(|i| alpha[t - 1][i] * self.transitions[i][j])
                        .sum()
                };
                alpha[t][j] = prior * emissions[t][j];
            }
            let scale = alpha[t].iter().sum::<f64>().max(EPS);
            scales[t] = scale;
            for v in alpha[t].iter_mut() {
                *v /= scale;
            }
        }

        (alpha, scales)
    }

    fn backward(&self, emissions: &[Vec<f64>], scales: &[f64]) -> Vec<Vec<f64>> {
        let k = self.n_states();
        let t_len = emissions.len();
        let mut beta = vec![vec![1.0; k]; t_len];

        for t in (0..t_len.saturating_sub(1)).rev() {
            for i in 0..k {
                let sum: f64 = (0..k)
                    .map(|j| self.transitions[i][j] * emissions[t + 1][j] * beta[t + 1][j])
                    .sum();
                beta[t][i] = sum / scales[t + 1];
            }
        }

        beta
    }

    fn expectation(
        &self,
        observations: &[FeatureVector],
        iter: usize,
    ) -> Result<Expectation, HmmError> {
        let k = self.n_states();
        let (emissions, offsets) = self.scaled_emissions(observations);
        let (alpha, scales) = self.forward(&emissions);
        let beta = self.backward(&emissions, &scales);

        let log_likelihood = log_likelihood_from(&scales, &offsets);
        if !log_likelihood.is_finite() {
            return Err(HmmError::NonFiniteLikelihood(iter));
        }

        let gamma: Vec<Vec<f64>> = alpha
            .iter()
            .zip(&beta)
            .map(|(a, b)| {
                let mut row: Vec<f64> = a.iter().zip(b).map(|(x, y)| x * y).collect();
                normalize(&mut row);
                row
            })
            .collect();

        let mut xi_sum = vec![vec![0.0; k]; k];
        for t in 0..observations.len().saturating_sub(1) {
            for i in 0..k {
                for j in 0..k {
                    xi_sum[i][j] += alpha[t][i]
                        * self.transitions[i][j]
                        * emissions[t + 1][j]
                        * beta[t + 1][j]
                        / scales[t + 1];
                }
            }
        }

        Ok(Expectation {
            log_likelihood,
            gamma,
            xi_sum,
        })
    }

    fn maximize(
        &mut self,
        observations: &[FeatureVector],
        pass: &Expectation,
    ) -> Result<(), HmmError> {
        let k = self.n_states();

        self.start_prob = pass.gamma[0].clone();
        normalize(&mut self.start_prob);

        for i in 0..k {
            let row_sum: f64 = pass.xi_sum[i].iter().sum();
            if row_sum > EPS {
                self.transitions[i] = pass.xi_sum[i].iter().map(|v| v / row_sum).collect();
            }
        }

        for s in 0..k {
            let weights: Vec<f64> = pass.gamma.iter().map(|g| g[s]).collect();
            let total: f64 = weights.iter().sum();
            if total <= EPS {
                continue;
            }
            let mean = weighted_mean(observations, Some(&weights));
            let mut cov = weighted_covariance(observations, Some(&weights), &mean);
            add_diagonal(&mut cov, self.config.min_covar);

            let factor = Cholesky::decompose(&cov).ok_or(HmmError::SingularCovariance(s))?;
            self.means[s] = mean;
            self.covars[s] = cov;
            self.factors[s] = factor;
        }

        Ok(())
    }
}

fn log_likelihood_from(scales: &[f64], offsets: &[f64]) -> f64 {
    scales.iter().map(|c| c.ln()).sum::<f64>() + offsets.iter().sum::<f64>()
}

fn normalize(values: &mut [f64]) {
    let sum: f64 = values.iter().sum();
    if sum > EPS && sum.is_finite() {
        for v in values.iter_mut() {
            *v /= sum;
        }
    } else {
        let uniform = 1.0 / values.len().max(1) as f64;
        values.iter_mut().for_each(|v| *v = uniform);
    }
}

fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |acc, (i, v)| {
            if *v > acc.1 {
                (i, *v)
            } else {
                acc
            }
        })
        .0
}

fn squared_distance(a: &FeatureVector, b: &FeatureVector) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

fn weighted_mean(observations: &[FeatureVector], weights: Option<&[f64]>) -> FeatureVector {
    let mut mean = [0.0; N_FEATURES];
    let mut total = 0.0;
    for (t, x) in observations.iter().enumerate() {
        let w = weights.map_or(1.0, |w| w[t]);
        total += w;
        for f in 0..N_FEATURES {
            mean[f] += w * x[f];
        }
    }
    if total > 0.0 {
        mean.iter_mut().for_each(|m| *m /= total);
    }
    mean
}

fn weighted_covariance(
    observations: &[FeatureVector],
    weights: Option<&[f64]>,
    mean: &FeatureVector,
) -> Matrix {
    let mut cov = [[0.0; N_FEATURES]; N_FEATURES];
    let mut total = 0.0;
    for (t, x) in observations.iter().enumerate() {
        let w = weights.map_or(1.0, |w| w[t]);
        total += w;
        for i in 0..N_FEATURES {
            for j in 0..N_FEATURES {
                cov[i][j] += w * (x[i] - mean[i]) * (x[j] - mean[j]);
            }
        }
    }
    if total > 0.0 {
        for row in cov.iter_mut() {
            row.iter_mut().for_each(|v| *v /= total);
        }
    }
    cov
}

fn add_diagonal(m: &mut Matrix, value: f64) {
    for (i, row) in m.iter_mut().enumerate() {
        row[i] += value;
    }
}

/// Seeded k-means++ centres refined with Lloyd iterations.
fn kmeans_plus_plus(
    observations: &[FeatureVector],
    k: usize,
    rng: &mut StdRng,
) -> Vec<FeatureVector> {
    let n = observations.len();
    let mut centers: Vec<FeatureVector> = Vec::with_capacity(k);
    centers.push(observations[rng.gen_range(0..n)]);

    while centers.len() < k {
        let distances: Vec<f64> = observations
            .iter()
            .map(|x| {
                centers
                    .iter()
                    .map(|c| squared_distance(x, c))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let total: f64 = distances.iter().sum();

        let next = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut chosen = n - 1;
            for (i, d) in distances.iter().enumerate() {
                if target < *d {
                    chosen = i;
                    break;
                }
                target -= d;
            }
            chosen
        } else {
            rng.gen_range(0..n)
        };
        centers.push(observations[next]);
    }

    let mut assignment = vec![usize::MAX; n];
    for _ in 0..KMEANS_ITERS {
        let mut changed = false;
        for (t, x) in observations.iter().enumerate() {
            let nearest = argmax(
                &centers
                    .iter()
                    .map(|c| -squared_distance(x, c))
                    .collect::<Vec<_>>(),
            );
            if assignment[t] != nearest {
                assignment[t] = nearest;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        for (s, center) in centers.iter_mut().enumerate() {
            let members: Vec<FeatureVector> = observations
                .iter()
                .zip(&assignment)
                .filter(|(_, a)| **a == s)
                .map(|(x, _)| *x)
                .collect();
            if !members.is_empty() {
                *center = weighted_mean(&members, None);
            }
        }
    }

    centers
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_block_series(len_a: usize, len_b: usize) -> Vec<FeatureVector> {
        let noise = |i: usize| {
            let x = i as f64;
            [
                (1.7 * x).sin() * 0.1,
                (2.3 * x).cos() * 0.1,
                (0.9 * x + 1.0).sin() * 0.1,
            ]
        };
        (0..len_a + len_b)
            .map(|i| {
                let n = noise(i);
                let base = if i < len_a { 0.0 } else { 5.0 };
                [base + n[0], base + n[1], base + n[2]]
            })
            .collect()
    }

    fn two_state_config() -> HmmConfig {
        HmmConfig {
            n_states: 2,
            ..HmmConfig::default()
        }
    }

    #[test]
    fn test_decode_separates_blocks() {
        let obs = two_block_series(40, 40);
        let hmm = GaussianHmm::fit(&obs, &two_state_config()).unwrap();
        let path = hmm.decode(&obs);

        assert_eq!(path.len(), 80);
        let first = path[0];
        let second = path[79];
        assert_ne!(first, second);
        assert!(path[..40].iter().all(|s| *s == first));
        assert!(path[40..].iter().all(|s| *s == second));
    }

    #[test]
    fn test_fit_is_deterministic() {
        let obs = two_block_series(30, 50);
        let a = GaussianHmm::fit(&obs, &HmmConfig::default()).unwrap();
        let b = GaussianHmm::fit(&obs, &HmmConfig::default()).unwrap();

        assert_eq!(a.decode(&obs), b.decode(&obs));
        assert_eq!(a.log_likelihood(), b.log_likelihood());
        assert_eq!(a.means(), b.means());
    }

    #[test]
    fn test_probabilities_are_normalized() {
        let obs = two_block_series(30, 30);
        let hmm = GaussianHmm::fit(&obs, &HmmConfig::default()).unwrap();

        assert_relative_eq!(hmm.start_prob().iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        for row in hmm.transitions() {
            assert_relative_eq!(row.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        }
        assert!(hmm.log_likelihood().is_finite());
        assert!(hmm.iterations() >= 1);
    }

    #[test]
    fn test_too_few_observations() {
        let obs = two_block_series(2, 1);
        let err = GaussianHmm::fit(&obs, &HmmConfig::default()).unwrap_err();
        assert_eq!(
            err,
            HmmError::TooFewObservations {
                needed: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn test_non_finite_observation_rejected() {
        let mut obs = two_block_series(20, 20);
        obs[7][1] = f64::NAN;
        let err = GaussianHmm::fit(&obs, &HmmConfig::default()).unwrap_err();
        assert_eq!(err, HmmError::NonFiniteObservation(7));
    }

    #[test]
    fn test_cholesky_log_pdf_matches_diagonal_case() {
        let cov = [[4.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.25]];
        let chol = Cholesky::decompose(&cov).unwrap();
        let x = [2.0, 1.0, 0.5];
        let mean = [0.0; 3];
        // Each standardized coordinate is 1.0; det = 1.0.
        let expected = -0.5 * (3.0 * LN_2PI + 0.0 + 3.0);
        assert_relative_eq!(chol.log_pdf(&x, &mean), expected, epsilon = 1e-12);

        let singular = [[1.0, 1.0, 0.0], [1.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        assert!(Cholesky::decompose(&singular).is_none());
    }
}
