// nn::init — Parameter initialization
//
// Standalone functions that build a freshly initialized Parameter, in the
// spirit of `torch.nn.init`. Every random initializer takes the RNG
// explicitly, so a seeded `StdRng` reproduces the same weights.
//
// AVAILABLE INITIALIZERS:
//
//   uniform(shape, low, high, rng)        U(low, high)
//   normal(shape, mean, std, rng)         N(mean, std)
//   constant(shape, val)                  all elements = val
//   zeros(shape)                          all zeros
//   xavier_uniform(shape, gain, rng)      Glorot uniform
//   kaiming_uniform(shape, a, mode, rng)  He uniform (for ReLU)
//
// Weight matrices are stored as [in, out] (see `Linear`), so for a rank-2
// shape fan_in = dims[0] and fan_out = dims[1].

use marten_core::{Error, Parameter, Result, Shape, Tensor};
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Fan computation mode for Kaiming initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FanMode {
    /// Use fan_in. Preserves variance in the forward pass.
    #[default]
    FanIn,
    /// Use fan_out. Preserves variance in the backward pass.
    FanOut,
}

/// (fan_in, fan_out) of a parameter shape.
///
/// - rank 1: fan_in = fan_out = dims[0]
/// - rank 2: [in, out]
/// - rank 3+: dims[0] and dims[1] times the product of the remaining dims
fn compute_fans(shape: &Shape) -> (f64, f64) {
    let dims = shape.dims();
    match dims.len() {
        0 => (1.0, 1.0),
        1 => (dims[0] as f64, dims[0] as f64),
        2 => (dims[0] as f64, dims[1] as f64),
        _ => {
            let receptive_field: usize = dims[2..].iter().product();
            (
                (dims[0] * receptive_field) as f64,
                (dims[1] * receptive_field) as f64,
            )
        }
    }
}

fn check_fans(shape: &Shape) -> Result<(f64, f64)> {
    let (fan_in, fan_out) = compute_fans(shape);
    if fan_in == 0.0 || fan_out == 0.0 {
        return Err(Error::msg(format!(
            "cannot compute fan for zero-sized shape {shape}"
        )));
    }
    Ok((fan_in, fan_out))
}

/// A parameter drawn from U(low, high).
pub fn uniform<R: Rng + ?Sized>(
    shape: impl Into<Shape>,
    low: f64,
    high: f64,
    rng: &mut R,
) -> Result<Parameter> {
    Ok(Parameter::new(Tensor::random_uniform(shape, low, high, rng)?))
}

/// A parameter drawn from N(mean, std).
pub fn normal<R: Rng + ?Sized>(
    shape: impl Into<Shape>,
    mean: f64,
    std: f64,
    rng: &mut R,
) -> Result<Parameter> {
    let shape = shape.into();
    let dist = Normal::new(mean, std)
        .map_err(|e| Error::msg(format!("normal init (mean={mean}, std={std}): {e}")))?;
    let data = (0..shape.elem_count()).map(|_| dist.sample(rng)).collect();
    Ok(Parameter::new(Tensor::from_vec(data, shape)?))
}

/// A parameter with every element set to `val`.
pub fn constant(shape: impl Into<Shape>, val: f64) -> Result<Parameter> {
    Ok(Parameter::new(Tensor::full(shape, val)?))
}

pub fn zeros(shape: impl Into<Shape>) -> Result<Parameter> {
    constant(shape, 0.0)
}

/// Xavier (Glorot) uniform: U(-a, a) with a = gain · sqrt(6 / (fan_in + fan_out)).
///
/// `gain` is 1.0 for linear/sigmoid layers, sqrt(2) for ReLU.
pub fn xavier_uniform<R: Rng + ?Sized>(
    shape: impl Into<Shape>,
    gain: f64,
    rng: &mut R,
) -> Result<Parameter> {
    let shape = shape.into();
    let (fan_in, fan_out) = check_fans(&shape)?;
    let a = gain * (6.0 / (fan_in + fan_out)).sqrt();
    uniform(shape, -a, a, rng)
}

/// Kaiming (He) uniform: U(-bound, bound) with bound = sqrt(3 · gain² / fan)
/// and gain² = 2 / (1 + a²).
///
/// `a` is the negative slope of the rectifier that follows (0 for ReLU).
/// `a = sqrt(5)` gives bound = sqrt(1 / fan), the default for `Linear`.
pub fn kaiming_uniform<R: Rng + ?Sized>(
    shape: impl Into<Shape>,
    a: f64,
    mode: FanMode,
    rng: &mut R,
) -> Result<Parameter> {
    let shape = shape.into();
    let (fan_in, fan_out) = check_fans(&shape)?;
    let fan = match mode {
        FanMode::FanIn => fan_in,
        FanMode::FanOut => fan_out,
    };
    let gain_sq = 2.0 / (1.0 + a * a);
    let bound = (3.0 * gain_sq / fan).sqrt();
    uniform(shape, -bound, bound, rng)
}
