// Optimizer trait — the common interface for parameter update rules
//
// An optimizer holds the Parameter handles of a model (the same Rc-backed
// handles the layers hold) plus whatever per-parameter state its rule
// needs. After `graph.backward(loss)` has flushed gradients into the
// parameters, `step()` reads each gradient and updates the value in place:
//
//   for step in 0..steps {
//       optimizer.zero_grad();
//       let mut g = Graph::new();
//       let loss = build_loss(&mut g)?;
//       g.backward(loss)?;
//       optimizer.step()?;
//   }
//
// Parameters whose gradient was never allocated (not reached by any
// backward since they were created or cleared) are skipped.

use marten_core::{Parameter, Result};

/// Trait that all optimizers implement.
pub trait Optimizer {
    /// Apply one update to every parameter that has a gradient.
    fn step(&mut self) -> Result<()>;

    /// Reset the gradient accumulator of every parameter to zeros.
    fn zero_grad(&self) {
        for p in self.params() {
            p.zero_grad();
        }
    }

    /// Current learning rate.
    fn learning_rate(&self) -> f64;

    /// Set a new learning rate (for schedules).
    fn set_learning_rate(&mut self, lr: f64);

    /// The parameters being optimized.
    fn params(&self) -> &[Parameter];
}
