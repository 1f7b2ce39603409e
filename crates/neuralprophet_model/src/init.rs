//! Seeded parameter initialization.
//!
//! Weights are drawn on the host from a ChaCha stream and then moved to the
//! device, so a seed fixes the initial model on every backend.

use burn::module::Param;
use burn::nn::Linear;
use burn::prelude::*;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Draw `n` samples from `N(0, std²)` with the Box-Muller transform.
pub(crate) fn normal_vec(rng: &mut ChaCha8Rng, n: usize, std: f64) -> Vec<f32> {
    (0..n)
        .map(|_| {
            let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
            let u2: f64 = rng.gen();
            let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
            (z * std) as f32
        })
        .collect()
}

/// A `[n]` parameter with Xavier-normal values, treating it as a `1 x n` matrix.
pub(crate) fn xavier_param<B: Backend>(rng: &mut ChaCha8Rng, n: usize, device: &B::Device) -> Param<Tensor<B, 1>> {
    let std = (2.0 / (1 + n) as f64).sqrt();
    let values = normal_vec(rng, n, std);
    Param::from_tensor(Tensor::<B, 1>::from_floats(values.as_slice(), device))
}

/// A `[n]` parameter of zeros.
pub(crate) fn zeros_param<B: Backend>(n: usize, device: &B::Device) -> Param<Tensor<B, 1>> {
    Param::from_tensor(Tensor::zeros([n], device))
}

/// A linear layer with Kaiming-normal (fan-in) weights and zero bias.
pub(crate) fn kaiming_linear<B: Backend>(
    rng: &mut ChaCha8Rng,
    d_input: usize,
    d_output: usize,
    bias: bool,
    device: &B::Device,
) -> Linear<B> {
    let std = (2.0 / d_input.max(1) as f64).sqrt();
    let values = normal_vec(rng, d_input * d_output, std);
    let weight = Tensor::<B, 1>::from_floats(values.as_slice(), device).reshape([d_input, d_output]);
    Linear {
        weight: Param::from_tensor(weight),
        bias: bias.then(|| Param::from_tensor(Tensor::zeros([d_output], device))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_normal_moments() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let values = normal_vec(&mut rng, 20_000, 2.0);
        let n = values.len() as f64;
        let mean = values.iter().map(|v| f64::from(*v)).sum::<f64>() / n;
        let var = values.iter().map(|v| (f64::from(*v) - mean).powi(2)).sum::<f64>() / n;
        assert!(mean.abs() < 0.1);
        assert!((var.sqrt() - 2.0).abs() < 0.1);
    }
}
