// Gradient clipping
//
// Applied between backward() and step(), directly on the parameters'
// accumulated gradients:
//
//   grad_norm(params)              global L2 norm over every gradient
//   clip_grad_norm(params, max)    rescale all gradients so the global norm
//                                  is at most `max`; returns the norm before
//                                  clipping
//   clip_grad_value(params, clip)  clamp every element to [-clip, clip]
//
// Parameters without a gradient contribute nothing and are left alone.
// A parameter listed more than once is counted and scaled once.

use marten_core::{unique_parameters, Error, Parameter, Result};

/// Global L2 norm of all gradients: sqrt(Σ_p Σ_i g_pi²).
pub fn grad_norm(params: &[Parameter]) -> f64 {
    unique_parameters(params.iter().cloned())
        .iter()
        .filter_map(|p| p.grad().map(|g| g.as_slice().iter().map(|x| x * x).sum::<f64>()))
        .sum::<f64>()
        .sqrt()
}

/// Scale gradients in place so their global L2 norm is at most `max_norm`.
///
/// Returns the total norm measured before clipping.
pub fn clip_grad_norm(params: &[Parameter], max_norm: f64) -> Result<f64> {
    if max_norm <= 0.0 {
        return Err(Error::msg(format!(
            "clip_grad_norm: max_norm must be positive, got {max_norm}"
        )));
    }
    let total = grad_norm(params);
    if total > max_norm {
        let scale = max_norm / (total + 1e-6);
        for p in unique_parameters(params.iter().cloned()) {
            if let Some(mut g) = p.grad_mut() {
                g.as_mut_slice().iter_mut().for_each(|x| *x *= scale);
            }
        }
        tracing::debug!(total, max_norm, "clipped gradient norm");
    }
    Ok(total)
}

/// Clamp every gradient element to `[-clip_value, clip_value]`.
pub fn clip_grad_value(params: &[Parameter], clip_value: f64) -> Result<()> {
    if clip_value <= 0.0 {
        return Err(Error::msg(format!(
            "clip_grad_value: clip_value must be positive, got {clip_value}"
        )));
    }
    for p in params {
        if let Some(mut g) = p.grad_mut() {
            g.as_mut_slice()
                .iter_mut()
                .for_each(|x| *x = x.clamp(-clip_value, clip_value));
        }
    }
    Ok(())
}
