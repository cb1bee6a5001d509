//! Two-layer stacked LSTM regressor on `ndarray`.
//!
//! LSTM(h1, full sequence) → dropout → LSTM(h2, final state) → dropout → dense(1).
//! Gate blocks are stacked in input/forget/cell/output order. Training runs
//! full backpropagation through time with Adam.

use ndarray::{s, Array, Array1, Array2, Array3, Axis, Dimension, Zip};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Rows per forward pass when predicting without gradients.
const PREDICT_CHUNK: usize = 512;

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

/// Inverted dropout mask: zero with probability `p`, else `1 / (1 - p)`.
fn dropout_mask<D: Dimension, R: Rng>(dim: D, p: f64, rng: &mut R) -> Array<f64, D> {
    if p <= 0.0 {
        return Array::ones(dim);
    }
    let keep = 1.0 / (1.0 - p);
    Array::from_shape_simple_fn(dim, || if rng.gen::<f64>() < p { 0.0 } else { keep })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmLayer {
    input_size: usize,
    hidden_size: usize,
    /// Input weights, (4h, input)
    w: Array2<f64>,
    /// Recurrent weights, (4h, h)
    u: Array2<f64>,
    b: Array1<f64>,
}

#[derive(Debug, Clone)]
struct StepCache {
    x: Array2<f64>,
    h_prev: Array2<f64>,
    c_prev: Array2<f64>,
    i: Array2<f64>,
    f: Array2<f64>,
    g: Array2<f64>,
    o: Array2<f64>,
    tanh_c: Array2<f64>,
}

#[derive(Debug, Clone)]
pub struct LstmGrads {
    w: Array2<f64>,
    u: Array2<f64>,
    b: Array1<f64>,
}

impl LstmGrads {
    fn zeros_like(layer: &LstmLayer) -> Self {
        Self {
            w: Array2::zeros(layer.w.raw_dim()),
            u: Array2::zeros(layer.u.raw_dim()),
            b: Array1::zeros(layer.b.raw_dim()),
        }
    }
}

impl LstmLayer {
    /// Uniform weights in ±sqrt(1/hidden); forget-gate bias 1.0, other biases 0.
    pub fn new<R: Rng>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let limit = (1.0 / hidden_size.max(1) as f64).sqrt();
        let mut sample = || rng.gen_range(-limit..=limit);
        let w = Array2::from_shape_simple_fn((4 * hidden_size, input_size), &mut sample);
        let u = Array2::from_shape_simple_fn((4 * hidden_size, hidden_size), &mut sample);
        let mut b = Array1::zeros(4 * hidden_size);
        b.slice_mut(s![hidden_size..2 * hidden_size]).fill(1.0);
        Self {
            input_size,
            hidden_size,
            w,
            u,
            b,
        }
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// Run over `x` (batch, time, input). Returns the hidden sequence
    /// (batch, time, hidden) and the per-step cache for backprop.
    fn forward(&self, x: &Array3<f64>) -> (Array3<f64>, Vec<StepCache>) {
        let (batch, steps, _) = x.dim();
        let h = self.hidden_size;
        let mut hs = Array3::zeros((batch, steps, h));
        let mut cache = Vec::with_capacity(steps);
        let mut h_prev = Array2::zeros((batch, h));
        let mut c_prev = Array2::zeros((batch, h));

        for t in 0..steps {
            let x_t = x.slice(s![.., t, ..]).to_owned();
            let z = x_t.dot(&self.w.t()) + h_prev.dot(&self.u.t()) + &self.b;
            let i = z.slice(s![.., 0..h]).mapv(sigmoid);
            let f = z.slice(s![.., h..2 * h]).mapv(sigmoid);
            let g = z.slice(s![.., 2 * h..3 * h]).mapv(f64::tanh);
            let o = z.slice(s![.., 3 * h..4 * h]).mapv(sigmoid);
            let c = &f * &c_prev + &i * &g;
            let tanh_c = c.mapv(f64::tanh);
            let h_t = &o * &tanh_c;
            hs.slice_mut(s![.., t, ..]).assign(&h_t);
            cache.push(StepCache {
                x: x_t,
                h_prev: std::mem::replace(&mut h_prev, h_t),
                c_prev: std::mem::replace(&mut c_prev, c),
                i,
                f,
                g,
                o,
                tanh_c,
            });
        }
        (hs, cache)
    }

    /// Backprop through time given the loss gradient w.r.t. every hidden
    /// output. Returns parameter gradients and the gradient w.r.t. the input.
    fn backward(&self, cache: &[StepCache], dh_seq: &Array3<f64>) -> (LstmGrads, Array3<f64>) {
        let (batch, steps, _) = dh_seq.dim();
        let h = self.hidden_size;
        let mut grads = LstmGrads::zeros_like(self);
        let mut dx = Array3::zeros((batch, steps, self.input_size));
        let mut dh_next = Array2::<f64>::zeros((batch, h));
        let mut dc_next = Array2::<f64>::zeros((batch, h));

        for t in (0..steps).rev() {
            let st = &cache[t];
            let dh = dh_seq.slice(s![.., t, ..]).to_owned() + &dh_next;
            let d_o = &dh * &st.tanh_c;
            let dc = &dh * &st.o * &st.tanh_c.mapv(|v| 1.0 - v * v) + &dc_next;
            let d_i = &dc * &st.g;
            let d_g = &dc * &st.i;
            let d_f = &dc * &st.c_prev;

            let mut dz = Array2::zeros((batch, 4 * h));
            dz.slice_mut(s![.., 0..h])
                .assign(&(d_i * &st.i.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![.., h..2 * h])
                .assign(&(d_f * &st.f.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![.., 2 * h..3 * h])
                .assign(&(d_g * &st.g.mapv(|v| 1.0 - v * v)));
            dz.slice_mut(s![.., 3 * h..4 * h])
                .assign(&(d_o * &st.o.mapv(|v| v * (1.0 - v))));

            grads.w += &dz.t().dot(&st.x);
            grads.u += &dz.t().dot(&st.h_prev);
            grads.b += &dz.sum_axis(Axis(0));
            dx.slice_mut(s![.., t, ..]).assign(&dz.dot(&self.w));
            dh_next = dz.dot(&self.u);
            dc_next = &dc * &st.f;
        }
        (grads, dx)
    }
}

#[derive(Debug, Clone)]
pub struct NetworkGrads {
    first: LstmGrads,
    second: LstmGrads,
    dense_w: Array1<f64>,
    dense_b: Array1<f64>,
}

impl NetworkGrads {
    fn zeros_like(net: &LstmNetwork) -> Self {
        Self {
            first: LstmGrads::zeros_like(&net.first),
            second: LstmGrads::zeros_like(&net.second),
            dense_w: Array1::zeros(net.dense_w.raw_dim()),
            dense_b: Array1::zeros(net.dense_b.raw_dim()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmNetwork {
    first: LstmLayer,
    second: LstmLayer,
    dense_w: Array1<f64>,
    dense_b: Array1<f64>,
    dropout: f64,
}

impl LstmNetwork {
    pub fn new<R: Rng>(n_features: usize, hidden: [usize; 2], dropout: f64, rng: &mut R) -> Self {
        let first = LstmLayer::new(n_features, hidden[0], rng);
        let second = LstmLayer::new(hidden[0], hidden[1], rng);
        let limit = (1.0 / hidden[1].max(1) as f64).sqrt();
        let dense_w = Array1::from_shape_simple_fn(hidden[1], || rng.gen_range(-limit..=limit));
        Self {
            first,
            second,
            dense_w,
            dense_b: Array1::zeros(1),
            dropout,
        }
    }

    pub fn n_features(&self) -> usize {
        self.first.input_size()
    }

    pub fn hidden(&self) -> [usize; 2] {
        [self.first.hidden_size(), self.second.hidden_size()]
    }

    /// Inference forward pass on (batch, time, features). No dropout.
    pub fn predict(&self, x: &Array3<f64>) -> Array1<f64> {
        let batch = x.dim().0;
        let mut out = Array1::zeros(batch);
        let mut start = 0;
        while start < batch {
            let end = (start + PREDICT_CHUNK).min(batch);
            let chunk = x.slice(s![start..end, .., ..]).to_owned();
            let (seq1, _) = self.first.forward(&chunk);
            let (seq2, _) = self.second.forward(&seq1);
            let last_step = seq2.dim().1.saturating_sub(1);
            let last = seq2.slice(s![.., last_step, ..]);
            let pred = last.dot(&self.dense_w) + self.dense_b[0];
            out.slice_mut(s![start..end]).assign(&pred);
            start = end;
        }
        out
    }

    /// Mean squared error of the inference pass against `y`.
    pub fn mse(&self, x: &Array3<f64>, y: &Array1<f64>) -> f64 {
        if y.is_empty() {
            return f64::NAN;
        }
        let err = self.predict(x) - y;
        err.mapv(|e| e * e).mean().unwrap_or(f64::NAN)
    }

    /// Training-mode forward and backward pass on one batch. Returns the
    /// batch MSE and the parameter gradients.
    pub fn gradients<R: Rng>(
        &self,
        x: &Array3<f64>,
        y: &Array1<f64>,
        rng: &mut R,
    ) -> (f64, NetworkGrads) {
        let (batch, steps, _) = x.dim();
        let last_step = steps.saturating_sub(1);

        let (seq1, cache1) = self.first.forward(x);
        let mask1 = dropout_mask(seq1.raw_dim(), self.dropout, rng);
        let seq1_drop = &seq1 * &mask1;
        let (seq2, cache2) = self.second.forward(&seq1_drop);
        let last = seq2.slice(s![.., last_step, ..]).to_owned();
        let mask2 = dropout_mask(last.raw_dim(), self.dropout, rng);
        let last_drop = &last * &mask2;

        let pred = last_drop.dot(&self.dense_w) + self.dense_b[0];
        let err = &pred - y;
        let loss = err.mapv(|e| e * e).mean().unwrap_or(0.0);
        let d_pred = err * (2.0 / batch.max(1) as f64);

        let dense_w = last_drop.t().dot(&d_pred);
        let dense_b = Array1::from_elem(1, d_pred.sum());
        let d_last = d_pred
            .view()
            .insert_axis(Axis(1))
            .dot(&self.dense_w.view().insert_axis(Axis(0)))
            * &mask2;

        let mut d_seq2 = Array3::zeros(seq2.raw_dim());
        d_seq2.slice_mut(s![.., last_step, ..]).assign(&d_last);
        let (second, d_seq1_drop) = self.second.backward(&cache2, &d_seq2);
        let d_seq1 = d_seq1_drop * &mask1;
        let (first, _) = self.first.backward(&cache1, &d_seq1);

        (
            loss,
            NetworkGrads {
                first,
                second,
                dense_w,
                dense_b,
            },
        )
    }
}

/// Adam optimiser state for one [`LstmNetwork`].
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    step: i32,
    m: NetworkGrads,
    v: NetworkGrads,
}

struct AdamStep {
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    lr_t: f64,
}

fn adam_update<D: Dimension>(
    param: &mut Array<f64, D>,
    m: &mut Array<f64, D>,
    v: &mut Array<f64, D>,
    grad: &Array<f64, D>,
    s: &AdamStep,
) {
    Zip::from(param)
        .and(m)
        .and(v)
        .and(grad)
        .for_each(|p, m, v, &g| {
            *m = s.beta1 * *m + (1.0 - s.beta1) * g;
            *v = s.beta2 * *v + (1.0 - s.beta2) * g * g;
            *p -= s.lr_t * *m / (v.sqrt() + s.epsilon);
        });
}

fn adam_layer(layer: &mut LstmLayer, m: &mut LstmGrads, v: &mut LstmGrads, g: &LstmGrads, s: &AdamStep) {
    adam_update(&mut layer.w, &mut m.w, &mut v.w, &g.w, s);
    adam_update(&mut layer.u, &mut m.u, &mut v.u, &g.u, s);
    adam_update(&mut layer.b, &mut m.b, &mut v.b, &g.b, s);
}

impl Adam {
    pub fn new(net: &LstmNetwork, learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            step: 0,
            m: NetworkGrads::zeros_like(net),
            v: NetworkGrads::zeros_like(net),
        }
    }

    pub fn apply(&mut self, net: &mut LstmNetwork, grads: &NetworkGrads) {
        self.step += 1;
        let bias1 = 1.0 - self.beta1.powi(self.step);
        let bias2 = 1.0 - self.beta2.powi(self.step);
        let s = AdamStep {
            beta1: self.beta1,
            beta2: self.beta2,
            epsilon: self.epsilon,
            lr_t: self.learning_rate * bias2.sqrt() / bias1,
        };
        adam_layer(&mut net.first, &mut self.m.first, &mut self.v.first, &grads.first, &s);
        adam_layer(&mut net.second, &mut self.m.second, &mut self.v.second, &grads.second, &s);
        adam_update(&mut net.dense_w, &mut self.m.dense_w, &mut self.v.dense_w, &grads.dense_w, &s);
        adam_update(&mut net.dense_b, &mut self.m.dense_b, &mut self.v.dense_b, &grads.dense_b, &s);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tiny(dropout: f64) -> LstmNetwork {
        let mut rng = StdRng::seed_from_u64(7);
        LstmNetwork::new(2, [3, 2], dropout, &mut rng)
    }

    fn sample_batch() -> (Array3<f64>, Array1<f64>) {
        let x = Array3::from_shape_fn((2, 3, 2), |(b, t, f)| {
            0.1 * (b as f64 + 1.0) + 0.2 * t as f64 - 0.15 * f as f64
        });
        (x, ndarray::array![0.3, -0.2])
    }

    fn loss_of(net: &LstmNetwork, x: &Array3<f64>, y: &Array1<f64>) -> f64 {
        net.mse(x, y)
    }

    #[test]
    fn predict_shape_and_determinism() {
        let (x, _) = sample_batch();
        let a = tiny(0.2).predict(&x);
        let b = tiny(0.2).predict(&x);
        assert_eq!(a.len(), 2);
        assert_eq!(a, b);
    }

    #[test]
    fn forget_bias_starts_at_one() {
        let net = tiny(0.0);
        assert_eq!(net.first.b.slice(s![3..6]).to_vec(), vec![1.0; 3]);
        assert_eq!(net.first.b.slice(s![0..3]).to_vec(), vec![0.0; 3]);
    }

    #[test]
    fn analytic_gradients_match_finite_differences() {
        let net = tiny(0.0);
        let (x, y) = sample_batch();
        let mut rng = StdRng::seed_from_u64(1);
        let (_, grads) = net.gradients(&x, &y, &mut rng);
        let eps = 1e-6;

        let check = |analytic: f64, perturb: &dyn Fn(&mut LstmNetwork, f64)| {
            let mut plus = net.clone();
            perturb(&mut plus, eps);
            let mut minus = net.clone();
            perturb(&mut minus, -eps);
            let numeric = (loss_of(&plus, &x, &y) - loss_of(&minus, &x, &y)) / (2.0 * eps);
            assert!(
                (numeric - analytic).abs() < 1e-6 + 1e-4 * numeric.abs(),
                "numeric={numeric} analytic={analytic}"
            );
        };

        check(grads.first.w[[1, 0]], &|n, d| n.first.w[[1, 0]] += d);
        check(grads.first.u[[4, 2]], &|n, d| n.first.u[[4, 2]] += d);
        check(grads.first.b[7], &|n, d| n.first.b[7] += d);
        check(grads.second.w[[5, 1]], &|n, d| n.second.w[[5, 1]] += d);
        check(grads.second.u[[0, 1]], &|n, d| n.second.u[[0, 1]] += d);
        check(grads.dense_w[1], &|n, d| n.dense_w[1] += d);
        check(grads.dense_b[0], &|n, d| n.dense_b[0] += d);
    }

    #[test]
    fn adam_reduces_training_loss() {
        let mut net = tiny(0.0);
        let (x, y) = sample_batch();
        let before = net.mse(&x, &y);
        let mut adam = Adam::new(&net, 0.01);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let (_, grads) = net.gradients(&x, &y, &mut rng);
            adam.apply(&mut net, &grads);
        }
        assert!(net.mse(&x, &y) < before * 0.5);
    }

    #[test]
    fn dropout_mask_is_inverted() {
        let mut rng = StdRng::seed_from_u64(11);
        let mask = dropout_mask(ndarray::Ix1(10_000), 0.2, &mut rng);
        let dropped = mask.iter().filter(|v| **v == 0.0).count();
        assert!((1500..2500).contains(&dropped));
        assert!(mask.iter().all(|v| *v == 0.0 || (*v - 1.25).abs() < 1e-12));
    }

    #[test]
    fn serde_round_trip_preserves_predictions() {
        let net = tiny(0.2);
        let (x, _) = sample_batch();
        let json = serde_json::to_string(&net).unwrap();
        let back: LstmNetwork = serde_json::from_str(&json).unwrap();
        assert_eq!(net.predict(&x), back.predict(&x));
    }
}
