//! Maximum-likelihood CRF training with L-BFGS.
//!
//! Minimizes the L2-regularized negative conditional log-likelihood of the
//! fitting slice. Search directions come from the two-loop recursion over the
//! last `nummemories` corrections; steps are chosen by backtracking until the
//! Armijo sufficient-decrease condition holds.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Instant;

use seqlearn_core::params::{non_negative, positive};
use seqlearn_core::{Instance, ParamSpec, ParamStore, Result, SeqlearnError};
use tracing::{info, warn};

use crate::crf1d::Crf1d;
use crate::features::FeatureOptions;
use crate::trainer::{
    Progress, ProgressCallback, TrainSummary, Trainer, TrainingData, evaluate, generate_features,
    publish, split_for_training,
};

const FEATURE_TYPE: &str = "dyad";
/// Sufficient-decrease constant of the Armijo test.
const FTOL: f64 = 1e-4;

/// L-BFGS trainer for the first-order CRF.
#[derive(Debug)]
pub struct LbfgsTrainer {
    params: ParamStore,
    progress: Progress,
}

#[derive(Debug, Clone)]
struct Settings {
    c2: f64,
    max_iterations: usize,
    memories: usize,
    epsilon: f64,
    period: usize,
    delta: f64,
    max_linesearch: usize,
}

impl Settings {
    fn from_params(params: &ParamStore) -> Result<Self> {
        Ok(Self {
            c2: params.get_float("c2")?,
            max_iterations: params.get_int("maxiterations")? as usize,
            memories: params.get_int("nummemories")? as usize,
            epsilon: params.get_float("epsilon")?,
            period: params.get_int("period")? as usize,
            delta: params.get_float("delta")?,
            max_linesearch: params.get_int("maxlinesearch")? as usize,
        })
    }
}

impl LbfgsTrainer {
    pub fn new() -> Self {
        let mut specs = vec![
            ParamSpec::float("c2", 1.0, "Coefficient for L2 regularization")
                .with_validator(non_negative),
            ParamSpec::int("maxiterations", 100, "Maximum number of iterations")
                .with_validator(positive),
            ParamSpec::int(
                "nummemories",
                6,
                "Number of corrections kept to approximate the inverse hessian",
            )
            .with_validator(positive),
            ParamSpec::float(
                "epsilon",
                1e-5,
                "Stop when the gradient norm divided by the weight norm falls below this value",
            )
            .with_validator(positive),
            ParamSpec::int(
                "period",
                10,
                "Window (in iterations) of the objective-improvement test; 0 disables it",
            )
            .with_validator(non_negative),
            ParamSpec::float(
                "delta",
                1e-5,
                "Stop when the relative objective improvement over the window falls below this value",
            )
            .with_validator(non_negative),
            ParamSpec::int("maxlinesearch", 20, "Maximum number of line-search trials per iteration")
                .with_validator(positive),
        ];
        specs.extend(FeatureOptions::param_specs());

        Self {
            params: ParamStore::new(specs),
            progress: Progress::default(),
        }
    }

    pub fn boxed() -> Box<dyn Trainer> {
        Box::new(Self::new())
    }
}

impl Default for LbfgsTrainer {
    fn default() -> Self {
        Self::new()
    }
}

/// Regularized negative log-likelihood of the fitting slice.
struct Objective<'a> {
    crf: Crf1d<'a>,
    instances: &'a [&'a Instance],
    c2: f64,
}

impl Objective<'_> {
    fn evaluate(&self, weights: &[f64], gradient: &mut [f64]) -> f64 {
        gradient.fill(0.0);
        let transitions = self.crf.transition_scores(weights);

        let mut loss = 0.0;
        for instance in self.instances {
            loss += self
                .crf
                .accumulate_gradient(instance, weights, &transitions, gradient);
        }

        if self.c2 > 0.0 {
            for (g, &w) in gradient.iter_mut().zip(weights) {
                loss += self.c2 * w * w;
                *g += 2.0 * self.c2 * w;
            }
        }
        loss
    }
}

/// One `(s, y)` correction pair.
struct Correction {
    s: Vec<f64>,
    y: Vec<f64>,
    rho: f64,
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// Two-loop recursion: returns `-H * gradient`.
fn search_direction(gradient: &[f64], memory: &VecDeque<Correction>) -> Vec<f64> {
    let mut q = gradient.to_vec();
    let mut alphas = Vec::with_capacity(memory.len());

    for c in memory.iter().rev() {
        let alpha = c.rho * dot(&c.s, &q);
        for (qi, yi) in q.iter_mut().zip(&c.y) {
            *qi -= alpha * yi;
        }
        alphas.push(alpha);
    }

    if let Some(last) = memory.back() {
        let gamma = dot(&last.s, &last.y) / dot(&last.y, &last.y);
        for qi in q.iter_mut() {
            *qi *= gamma;
        }
    }

    for (c, alpha) in memory.iter().zip(alphas.iter().rev()) {
        let beta = c.rho * dot(&c.y, &q);
        for (qi, si) in q.iter_mut().zip(&c.s) {
            *qi += (alpha - beta) * si;
        }
    }

    for qi in q.iter_mut() {
        *qi = -*qi;
    }
    q
}

impl Trainer for LbfgsTrainer {
    fn name(&self) -> &str {
        "dyad/lbfgs"
    }

    fn params(&mut self) -> &mut ParamStore {
        &mut self.params
    }

    fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.progress.set(callback);
    }

    fn train(
        &mut self,
        data: &TrainingData<'_>,
        output: &Path,
        holdout: Option<usize>,
    ) -> Result<TrainSummary> {
        let settings = Settings::from_params(&self.params)?;
        let options = FeatureOptions::from_params(&self.params)?;
        let split = split_for_training(data, holdout, &mut self.progress)?;
        let progress = &mut self.progress;

        let features = generate_features(&split, data, &options, progress);

        progress.emit(&format!(
            "L-BFGS optimization\nc2: {}\nnum_memories: {}\nmax_iterations: {}\nepsilon: {}\nstop: {}\ndelta: {}\n\n",
            settings.c2,
            settings.memories,
            settings.max_iterations,
            settings.epsilon,
            settings.period,
            settings.delta
        ));

        let objective = Objective {
            crf: Crf1d::new(&features),
            instances: &split.train,
            c2: settings.c2,
        };

        let n = features.len();
        let mut x = vec![0.0; n];
        let mut g = vec![0.0; n];
        let mut x_next = vec![0.0; n];
        let mut g_next = vec![0.0; n];

        let mut loss = objective.evaluate(&x, &mut g);
        if !loss.is_finite() {
            return Err(SeqlearnError::TrainingFailed(
                "objective is not finite at the starting point".to_string(),
            ));
        }

        let mut memory: VecDeque<Correction> = VecDeque::with_capacity(settings.memories);
        let mut history: VecDeque<f64> = VecDeque::from([loss]);
        let mut iterations = 0;
        let mut converged = norm(&g) <= settings.epsilon;
        let mut evaluation = None;
        let train_clock = Instant::now();

        while !converged && iterations < settings.max_iterations {
            let iteration_clock = Instant::now();
            let k = iterations + 1;

            let mut d = search_direction(&g, &memory);
            let mut gd = dot(&g, &d);
            if gd >= 0.0 {
                // Not a descent direction; restart from steepest descent.
                memory.clear();
                d = g.iter().map(|v| -v).collect();
                gd = dot(&g, &d);
            }

            let mut step = if memory.is_empty() { 1.0 / norm(&d) } else { 1.0 };
            let mut trials = 0;
            let mut next_loss;
            loop {
                trials += 1;
                for ((xn, xi), di) in x_next.iter_mut().zip(&x).zip(&d) {
                    *xn = xi + step * di;
                }
                next_loss = objective.evaluate(&x_next, &mut g_next);
                if next_loss.is_finite() && next_loss <= loss + FTOL * step * gd {
                    break;
                }
                if trials >= settings.max_linesearch {
                    break;
                }
                step *= 0.5;
            }

            if !(next_loss.is_finite() && next_loss <= loss + FTOL * step * gd) {
                let message = format!(
                    "line search failed after {} trials at iteration {}",
                    trials, k
                );
                if iterations == 0 {
                    return Err(SeqlearnError::TrainingFailed(message));
                }
                warn!("{}; keeping the last accepted weights", message);
                progress.emit(&format!(
                    "WARNING: {}; keeping the last accepted weights\n\n",
                    message
                ));
                break;
            }

            let s: Vec<f64> = x_next.iter().zip(&x).map(|(a, b)| a - b).collect();
            let y: Vec<f64> = g_next.iter().zip(&g).map(|(a, b)| a - b).collect();
            let ys = dot(&y, &s);
            if ys > f64::EPSILON * dot(&y, &y) {
                if memory.len() == settings.memories {
                    memory.pop_front();
                }
                memory.push_back(Correction { s, y, rho: 1.0 / ys });
            }

            std::mem::swap(&mut x, &mut x_next);
            std::mem::swap(&mut g, &mut g_next);
            loss = next_loss;
            iterations = k;

            let xnorm = norm(&x);
            let gnorm = norm(&g);
            let active = x.iter().filter(|w| **w != 0.0).count();
            progress.emit(&format!(
                "***** Iteration #{} *****\nLoss: {:.6}\nFeature norm: {:.6}\nError norm: {:.6}\nActive features: {}\nLine search trials: {}\nLine search step: {:.6}\nSeconds required for this iteration: {:.3}\n",
                k,
                loss,
                xnorm,
                gnorm,
                active,
                trials,
                step,
                iteration_clock.elapsed().as_secs_f64()
            ));

            if !split.holdout.is_empty() {
                let eval = evaluate(&objective.crf, &split.holdout, &x);
                progress.emit(&eval.report(data.labels));
                evaluation = Some(eval);
            }
            progress.emit("\n");

            if gnorm / xnorm.max(1.0) <= settings.epsilon {
                converged = true;
                break;
            }

            if settings.period > 0 {
                history.push_back(loss);
                if history.len() > settings.period {
                    let old = history.pop_front().unwrap_or(loss);
                    let rate = (old - loss) / loss.abs().max(f64::MIN_POSITIVE);
                    if rate < settings.delta {
                        converged = true;
                        break;
                    }
                }
            }
        }

        let seconds = train_clock.elapsed().as_secs_f64();
        if converged {
            progress.emit("L-BFGS resulted in convergence\n");
        } else if iterations >= settings.max_iterations {
            progress.emit("L-BFGS reached the maximum number of iterations\n");
        }
        progress.emit(&format!("Total seconds required for training: {:.3}\n\n", seconds));
        info!(iterations, loss, converged, "L-BFGS finished");

        publish(FEATURE_TYPE, &features, &x, data, output, progress)?;

        Ok(TrainSummary {
            iterations,
            loss,
            converged,
            num_features: features.len(),
            holdout_instances: split.holdout.len(),
            evaluation,
            model_path: output.to_path_buf(),
        })
    }
}
