// Two-layer perceptron: features -> ReLU hidden layer -> softmax over notes.
//
//   m = X W1 + b1        (N, H)  hidden pre-activation
//   h = max(0, m)        (N, H)
//   z = h W2 + b2        (N, C)  logits
//   y = softmax(z)       (N, C)  row-wise, max-shifted
//
// Two layers of API live here:
//
// - `Mlp` owns the parameters and is otherwise pure. `forward` returns an
//   immutable `ForwardPass` holding every intermediate; `backward` takes that
//   pass explicitly and returns `Gradients`; `apply` performs the SGD step.
//   Because no batch state is stored on the network, a shared `&Mlp` can run
//   inference from many threads at once.
//
// - `Model` wraps an `Mlp` with single-slot caches and exposes the classic
//   stateful sequence `forward -> backward -> update`, with `reset` between
//   unrelated batches. Out-of-order calls fail with `MissingForward` /
//   `MissingBackward` rather than reusing stale values. The trainer drives
//   this façade.
//
// Gradients follow softmax + mean cross-entropy, so the output error is
// simply `(y - t) / N`. ReLU's subgradient is taken as 0 at exactly 0.

use crate::config::TrainConfig;
use crate::encoding::ALPHABET_SIZE;
use crate::error::{NoteNetError, Result};
use ndarray::{Array1, Array2, ArrayView2, Axis, Zip};
use notenet_prng::NotePrng;
use serde::{Deserialize, Serialize};

/// Learnable parameters plus the three layer sizes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Mlp {
    num_features: usize,
    num_hidden: usize,
    num_classes: usize,
    w1: Array2<f64>,
    b1: Array1<f64>,
    w2: Array2<f64>,
    b2: Array1<f64>,
}

/// Everything `forward` computed for one batch. Consumed by `Mlp::backward`.
#[derive(Clone, Debug)]
pub struct ForwardPass {
    x: Array2<f64>,
    m: Array2<f64>,
    h: Array2<f64>,
    z: Array2<f64>,
    y: Array2<f64>,
}

/// Gradients of the mean cross-entropy for one batch.
#[derive(Clone, Debug)]
pub struct Gradients {
    pub w1: Array2<f64>,
    pub b1: Array1<f64>,
    pub w2: Array2<f64>,
    pub b2: Array1<f64>,
    /// dL/dz, `(y - t) / N`.
    pub output_error: Array2<f64>,
    /// dL/dm, the hidden error after the ReLU mask.
    pub hidden_error: Array2<f64>,
}

impl Mlp {
    /// Randomly initialised network.
    ///
    /// Layer 1 parameters are drawn from `N(0, 2/F)` and layer 2 from
    /// `N(0, 2/H)` (standard deviations). Random rather than zero
    /// initialisation is required: with equal weights every hidden unit
    /// receives the same gradient and they never diverge.
    pub fn new(
        num_features: usize,
        num_hidden: usize,
        num_classes: usize,
        rng: &mut NotePrng,
    ) -> Result<Self> {
        if num_features == 0 || num_hidden == 0 || num_classes == 0 {
            return Err(NoteNetError::InvalidConfig(format!(
                "layer sizes must be non-zero, got {num_features}/{num_hidden}/{num_classes}"
            )));
        }
        let std1 = 2.0 / num_features as f64;
        let std2 = 2.0 / num_hidden as f64;

        let w1 = Array2::from_shape_simple_fn((num_features, num_hidden), || rng.normal(0.0, std1));
        let b1 = Array1::from_shape_simple_fn(num_hidden, || rng.normal(0.0, std1));
        let w2 = Array2::from_shape_simple_fn((num_hidden, num_classes), || rng.normal(0.0, std2));
        let b2 = Array1::from_shape_simple_fn(num_classes, || rng.normal(0.0, std2));

        Ok(Mlp {
            num_features,
            num_hidden,
            num_classes,
            w1,
            b1,
            w2,
            b2,
        })
    }

    /// Network sized for `config`: `context_length * 128` inputs, 128 classes.
    pub fn for_config(config: &TrainConfig, rng: &mut NotePrng) -> Result<Self> {
        config.validate()?;
        let num_features = config.num_features();
        Mlp::new(num_features, config.hidden_size, ALPHABET_SIZE, rng)
    }

    /// Build from explicit tensors. Sizes are read off `w1` and `w2`; the
    /// biases must agree.
    pub fn from_parts(
        w1: Array2<f64>,
        b1: Array1<f64>,
        w2: Array2<f64>,
        b2: Array1<f64>,
    ) -> Result<Self> {
        let (num_features, num_hidden) = w1.dim();
        let num_classes = w2.ncols();
        let mlp = Mlp {
            num_features,
            num_hidden,
            num_classes,
            w1,
            b1,
            w2,
            b2,
        };
        mlp.validate_shapes()?;
        Ok(mlp)
    }

    /// Check that every tensor agrees with the recorded layer sizes. Used
    /// after deserialising a checkpoint.
    pub fn validate_shapes(&self) -> Result<()> {
        let checks: [(&'static str, Vec<usize>, &[usize]); 4] = [
            ("w1", vec![self.num_features, self.num_hidden], self.w1.shape()),
            ("b1", vec![self.num_hidden], self.b1.shape()),
            ("w2", vec![self.num_hidden, self.num_classes], self.w2.shape()),
            ("b2", vec![self.num_classes], self.b2.shape()),
        ];
        for (what, expected, actual) in checks {
            if expected.as_slice() != actual {
                return Err(NoteNetError::ShapeMismatch {
                    what,
                    expected,
                    actual: actual.to_vec(),
                });
            }
        }
        Ok(())
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn num_hidden(&self) -> usize {
        self.num_hidden
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn w1(&self) -> &Array2<f64> {
        &self.w1
    }

    pub fn b1(&self) -> &Array1<f64> {
        &self.b1
    }

    pub fn w2(&self) -> &Array2<f64> {
        &self.w2
    }

    pub fn b2(&self) -> &Array1<f64> {
        &self.b2
    }

    fn check_input(&self, x: &ArrayView2<'_, f64>) -> Result<()> {
        if x.ncols() != self.num_features {
            return Err(NoteNetError::ShapeMismatch {
                what: "input features",
                expected: vec![x.nrows(), self.num_features],
                actual: x.shape().to_vec(),
            });
        }
        Ok(())
    }

    /// (m, h, z, y) for a batch.
    fn propagate(&self, x: ArrayView2<'_, f64>) -> [Array2<f64>; 4] {
        let m = x.dot(&self.w1) + &self.b1;
        let h = m.mapv(relu);
        let z = h.dot(&self.w2) + &self.b2;
        let y = softmax_rows(&z);
        [m, h, z, y]
    }

    /// Forward pass over `x` of shape `(N, num_features)`, keeping every
    /// intermediate for a later `backward`.
    pub fn forward(&self, x: Array2<f64>) -> Result<ForwardPass> {
        self.check_input(&x.view())?;
        let [m, h, z, y] = self.propagate(x.view());
        Ok(ForwardPass { x, m, h, z, y })
    }

    /// Class probabilities only, without retaining intermediates.
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self.check_input(&x)?;
        let [_, _, _, y] = self.propagate(x);
        Ok(y)
    }

    /// Backpropagate one-hot `targets` of shape `(N, num_classes)` through
    /// `pass`. Does not touch the parameters.
    pub fn backward(&self, pass: &ForwardPass, targets: &Array2<f64>) -> Result<Gradients> {
        if pass.x.ncols() != self.num_features || pass.h.ncols() != self.num_hidden {
            return Err(NoteNetError::ShapeMismatch {
                what: "forward pass",
                expected: vec![self.num_features, self.num_hidden],
                actual: vec![pass.x.ncols(), pass.h.ncols()],
            });
        }
        check_targets(pass, targets)?;

        let n = pass.batch_size() as f64;
        let output_error = (&pass.y - targets) / n;
        let w2 = pass.h.t().dot(&output_error);
        let b2 = output_error.sum_axis(Axis(0));

        let mut hidden_error = output_error.dot(&self.w2.t());
        Zip::from(&mut hidden_error).and(&pass.m).for_each(|g, &m| {
            if m <= 0.0 {
                *g = 0.0;
            }
        });
        let w1 = pass.x.t().dot(&hidden_error);
        let b1 = hidden_error.sum_axis(Axis(0));

        Ok(Gradients {
            w1,
            b1,
            w2,
            b2,
            output_error,
            hidden_error,
        })
    }

    /// Gradient-descent step: `p -= learning_rate * dp` for all four tensors.
    pub fn apply(&mut self, grads: &Gradients, learning_rate: f64) -> Result<()> {
        let checks: [(&'static str, &[usize], &[usize]); 4] = [
            ("w1 gradient", self.w1.shape(), grads.w1.shape()),
            ("b1 gradient", self.b1.shape(), grads.b1.shape()),
            ("w2 gradient", self.w2.shape(), grads.w2.shape()),
            ("b2 gradient", self.b2.shape(), grads.b2.shape()),
        ];
        for (what, expected, actual) in checks {
            if expected != actual {
                return Err(NoteNetError::ShapeMismatch {
                    what,
                    expected: expected.to_vec(),
                    actual: actual.to_vec(),
                });
            }
        }

        self.w1.scaled_add(-learning_rate, &grads.w1);
        self.b1.scaled_add(-learning_rate, &grads.b1);
        self.w2.scaled_add(-learning_rate, &grads.w2);
        self.b2.scaled_add(-learning_rate, &grads.b2);
        Ok(())
    }
}

impl ForwardPass {
    pub fn batch_size(&self) -> usize {
        self.x.nrows()
    }

    pub fn probabilities(&self) -> &Array2<f64> {
        &self.y
    }

    pub fn logits(&self) -> &Array2<f64> {
        &self.z
    }

    pub fn hidden(&self) -> &Array2<f64> {
        &self.h
    }

    pub fn pre_activation(&self) -> &Array2<f64> {
        &self.m
    }

    /// Mean cross-entropy of this pass's probabilities against `targets`.
    pub fn loss(&self, targets: &Array2<f64>) -> Result<f64> {
        check_targets(self, targets)?;
        cross_entropy(&self.y, targets)
    }
}

fn check_targets(pass: &ForwardPass, targets: &Array2<f64>) -> Result<()> {
    if targets.nrows() != pass.batch_size() {
        return Err(NoteNetError::BatchSizeMismatch {
            expected: pass.batch_size(),
            actual: targets.nrows(),
        });
    }
    if targets.ncols() != pass.y.ncols() {
        return Err(NoteNetError::ShapeMismatch {
            what: "targets",
            expected: vec![pass.batch_size(), pass.y.ncols()],
            actual: targets.shape().to_vec(),
        });
    }
    Ok(())
}

// Keeps NaN as NaN so divergence stays visible downstream.
fn relu(v: f64) -> f64 {
    if v < 0.0 { 0.0 } else { v }
}

/// Row-wise softmax. Each row is shifted by its max before exponentiating,
/// so large logits cannot overflow.
pub fn softmax_rows(logits: &Array2<f64>) -> Array2<f64> {
    let mut out = logits.clone();
    for mut row in out.rows_mut() {
        let max = row.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    out
}

/// `-(1/N) * sum(t * ln y)`.
///
/// Only entries with a non-zero target contribute, so an underflowed
/// probability on a wrong class is harmless while a zero probability on the
/// true class gives `+inf`. The value is returned as-is, finite or not.
pub fn cross_entropy(probabilities: &Array2<f64>, targets: &Array2<f64>) -> Result<f64> {
    if probabilities.dim() != targets.dim() {
        return Err(NoteNetError::ShapeMismatch {
            what: "cross-entropy operands",
            expected: probabilities.shape().to_vec(),
            actual: targets.shape().to_vec(),
        });
    }
    let n = targets.nrows() as f64;
    let total = Zip::from(probabilities)
        .and(targets)
        .fold(0.0, |acc, &y, &target| {
            if target != 0.0 {
                acc - target * y.ln()
            } else {
                acc
            }
        });
    Ok(total / n)
}

// ---------------------------------------------------------------------------
// Stateful façade
// ---------------------------------------------------------------------------

/// An `Mlp` plus the caches of the batch currently in flight.
#[derive(Clone, Debug)]
pub struct Model {
    mlp: Mlp,
    pass: Option<ForwardPass>,
    grads: Option<Gradients>,
}

impl Model {
    pub fn new(mlp: Mlp) -> Self {
        Model {
            mlp,
            pass: None,
            grads: None,
        }
    }

    pub fn for_config(config: &TrainConfig, rng: &mut NotePrng) -> Result<Self> {
        Ok(Model::new(Mlp::for_config(config, rng)?))
    }

    pub fn network(&self) -> &Mlp {
        &self.mlp
    }

    pub fn into_network(self) -> Mlp {
        self.mlp
    }

    /// Run the forward pass and cache it. Any gradients from an earlier
    /// batch are discarded.
    pub fn forward(&mut self, x: Array2<f64>) -> Result<&Array2<f64>> {
        self.grads = None;
        self.pass = None;
        let pass = self.mlp.forward(x)?;
        Ok(self.pass.insert(pass).probabilities())
    }

    /// Compute and cache gradients for the cached forward pass.
    pub fn backward(&mut self, targets: &Array2<f64>) -> Result<()> {
        let pass = self.pass.as_ref().ok_or(NoteNetError::MissingForward)?;
        self.grads = Some(self.mlp.backward(pass, targets)?);
        Ok(())
    }

    /// Mean cross-entropy of the cached forward pass.
    pub fn loss(&self, targets: &Array2<f64>) -> Result<f64> {
        let pass = self.pass.as_ref().ok_or(NoteNetError::MissingForward)?;
        pass.loss(targets)
    }

    /// Apply the cached gradients. They are consumed, so a second `update`
    /// needs a fresh `backward`.
    pub fn update(&mut self, learning_rate: f64) -> Result<()> {
        let grads = self.grads.take().ok_or(NoteNetError::MissingBackward)?;
        self.mlp.apply(&grads, learning_rate)
    }

    /// Drop every cached intermediate and gradient.
    pub fn reset(&mut self) {
        self.pass = None;
        self.grads = None;
    }

    pub fn probabilities(&self) -> Option<&Array2<f64>> {
        self.pass.as_ref().map(ForwardPass::probabilities)
    }

    pub fn gradients(&self) -> Option<&Gradients> {
        self.grads.as_ref()
    }
}
