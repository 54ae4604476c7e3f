// Evaluation metrics
//
// Plain functions over output tensors. They do not touch the graph, so they
// are typically called on `graph.value(node)` after a grad-disabled pass.

use marten_core::{Result, Tensor};

/// Fraction of correct predictions given class indices.
pub fn accuracy(predictions: &[usize], targets: &[usize]) -> f64 {
    if predictions.is_empty() {
        return 0.0;
    }
    let correct = predictions
        .iter()
        .zip(targets.iter())
        .filter(|(p, t)| p == t)
        .count();
    correct as f64 / predictions.len() as f64
}

/// Fraction of probabilities that land on the right side of `threshold`
/// for {0, 1} targets.
pub fn binary_accuracy(probs: &Tensor, targets: &Tensor, threshold: f64) -> Result<f64> {
    probs.check_same_shape(targets)?;
    let preds: Vec<usize> = probs
        .as_slice()
        .iter()
        .map(|&p| usize::from(p >= threshold))
        .collect();
    let labels: Vec<usize> = targets
        .as_slice()
        .iter()
        .map(|&t| usize::from(t >= 0.5))
        .collect();
    Ok(accuracy(&preds, &labels))
}

/// Row-wise argmax of a `[batch, classes]` tensor.
pub fn argmax_classes(logits: &Tensor) -> Result<Vec<usize>> {
    let (batch, classes) = logits.shape().dims2()?;
    let data = logits.as_slice();
    Ok((0..batch)
        .map(|r| {
            let row = &data[r * classes..(r + 1) * classes];
            row.iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |best, (j, &v)| {
                    if v > best.1 {
                        (j, v)
                    } else {
                        best
                    }
                })
                .0
        })
        .collect())
}
