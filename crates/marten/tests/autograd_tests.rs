// Integration tests for the computation graph and reverse-mode autograd
//
// These tests exercise the engine end to end through the public facade:
// accumulation at shared nodes, finite-difference checks for every built-in
// operator, numerical guards and the graph lifecycle.

use approx::assert_abs_diff_eq;
use marten::ops::{
    Add, Affine, BinaryCrossEntropy, Hinge, MeanSquaredError, Mul, Relu, Sigmoid,
    SoftmaxCrossEntropy, Sum, Tanh,
};
use marten::prelude::*;
use marten::{check_gradients, GradCheckConfig, GraphState};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn assert_vec_approx(got: &[f64], expected: &[f64], tol: f64) {
    assert_eq!(got.len(), expected.len(), "length mismatch");
    for (g, e) in got.iter().zip(expected) {
        assert_abs_diff_eq!(*g, *e, epsilon = tol);
    }
}

fn grad_vec(g: &Graph, id: NodeId) -> marten::Result<Vec<f64>> {
    Ok(g.grad(id)?.map(|t| t.to_vec()).unwrap_or_default())
}

// Fan-in accumulation

#[test]
fn test_fan_in_sums_path_gradients() -> marten::Result<()> {
    // y = sum(relu(a) + a * b): a reaches the loss through two paths.
    let mut g = Graph::new();
    let a = g.leaf(Tensor::from_vec(vec![1.0, -2.0], 2)?);
    let b = g.leaf(Tensor::from_vec(vec![3.0, 4.0], 2)?);
    let r = g.relu(a)?;
    let m = g.mul(a, b)?;
    let s = g.add(r, m)?;
    let loss = g.sum(s)?;
    g.backward(loss)?;

    // d/da = relu'(a) + b
    assert_vec_approx(&grad_vec(&g, a)?, &[1.0 + 3.0, 0.0 + 4.0], 1e-12);
    assert_vec_approx(&grad_vec(&g, b)?, &[1.0, -2.0], 1e-12);
    Ok(())
}

#[test]
fn test_shared_parameter_accumulates_across_layers() -> marten::Result<()> {
    // The same weight used twice: y = sum((x W) W)
    let w = Parameter::new(Tensor::from_vec(vec![2.0], (1, 1))?);
    let mut g = Graph::new();
    let x = g.leaf(Tensor::from_vec(vec![3.0], (1, 1))?);
    let w1 = g.param(&w);
    let w2 = g.param(&w);
    assert_eq!(w1, w2);
    let h = g.affine(x, w1, None)?;
    let y = g.affine(h, w2, None)?;
    let loss = g.sum(y)?;
    g.backward(loss)?;

    // y = x w², dy/dw = 2 x w = 12
    assert_eq!(w.grad().map(|t| t.to_vec()), Some(vec![12.0]));
    Ok(())
}

// Finite-difference checks for every operator

fn assert_gradcheck(op: &dyn Operator, inputs: &[Tensor]) -> marten::Result<()> {
    let report = check_gradients(op, inputs, &GradCheckConfig::default().seed(42))?;
    assert!(
        report.passed,
        "{} failed gradcheck: {:?}",
        op.name(),
        report
    );
    assert!(report.checked > 0);
    Ok(())
}

#[test]
fn test_gradcheck_affine() -> marten::Result<()> {
    let mut rng = StdRng::seed_from_u64(1);
    let x = Tensor::random_normal((3, 2), &mut rng)?;
    let w = Tensor::random_normal((2, 4), &mut rng)?;
    let b = Tensor::random_normal(4, &mut rng)?;
    assert_gradcheck(&Affine, &[x.clone(), w.clone(), b])?;
    assert_gradcheck(&Affine, &[x, w])
}

#[test]
fn test_gradcheck_activations() -> marten::Result<()> {
    // Kept away from relu's kink at 0.
    let x = Tensor::from_vec(vec![-1.5, -0.3, 0.2, 0.9, 2.5, -4.0], (2, 3))?;
    assert_gradcheck(&Relu, &[x.clone()])?;
    assert_gradcheck(&Sigmoid, &[x.clone()])?;
    assert_gradcheck(&Tanh, &[x])
}

#[test]
fn test_gradcheck_elementwise() -> marten::Result<()> {
    let mut rng = StdRng::seed_from_u64(2);
    let a = Tensor::random_normal((2, 3), &mut rng)?;
    let b = Tensor::random_normal((2, 3), &mut rng)?;
    assert_gradcheck(&Add, &[a.clone(), b.clone()])?;
    assert_gradcheck(&Mul, &[a.clone(), b])?;
    assert_gradcheck(&Sum, &[a])
}

#[test]
fn test_gradcheck_losses() -> marten::Result<()> {
    let mut rng = StdRng::seed_from_u64(3);

    let logits = Tensor::random_normal((3, 4), &mut rng)?;
    let onehot = Tensor::from_vec(
        vec![0., 1., 0., 0., 1., 0., 0., 0., 0., 0., 0., 1.],
        (3, 4),
    )?;
    assert_gradcheck(&SoftmaxCrossEntropy, &[logits, onehot])?;

    let probs = Tensor::from_vec(vec![0.2, 0.7, 0.45, 0.9], 4)?;
    let labels = Tensor::from_vec(vec![0.0, 1.0, 1.0, 0.0], 4)?;
    assert_gradcheck(&BinaryCrossEntropy::new(), &[probs, labels])?;

    let pred = Tensor::random_normal((2, 2), &mut rng)?;
    let target = Tensor::random_normal((2, 2), &mut rng)?;
    assert_gradcheck(&MeanSquaredError, &[pred, target])?;

    // margins 1 - t·p = 0.5, -1, 2.2, 0.7: none at the kink
    let scores = Tensor::from_vec(vec![0.5, 2.0, 1.2, -0.3], 4)?;
    let signs = Tensor::from_vec(vec![1.0, 1.0, -1.0, -1.0], 4)?;
    assert_gradcheck(&Hinge::new(), &[scores, signs])
}

// Softmax-cross-entropy vs a from-scratch derivation

#[test]
fn test_softmax_cross_entropy_matches_quotient_rule() -> marten::Result<()> {
    let logits = vec![0.3, -1.2, 2.0, 0.5, 0.5, -0.7];
    let onehot = vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0];
    let (batch, classes) = (2usize, 3usize);

    let mut g = Graph::new();
    let x = g.leaf(Tensor::from_vec(logits.clone(), (batch, classes))?);
    let t = g.leaf(Tensor::from_vec(onehot.clone(), (batch, classes))?);
    let loss = g.softmax_cross_entropy(x, t)?;
    g.backward(loss)?;
    let fused = grad_vec(&g, x)?;

    // L = -(1/B) Σ_j t_j ln s_j with s_j = e^{x_j} / S, S = Σ_k e^{x_k}.
    // Quotient rule: ds_j/dx_k = (δ_jk e^{x_j} S - e^{x_j} e^{x_k}) / S².
    let mut expected = vec![0.0; batch * classes];
    for r in 0..batch {
        let row = &logits[r * classes..(r + 1) * classes];
        let tgt = &onehot[r * classes..(r + 1) * classes];
        let e: Vec<f64> = row.iter().map(|v| v.exp()).collect();
        let sum: f64 = e.iter().sum();
        let s: Vec<f64> = e.iter().map(|v| v / sum).collect();
        for k in 0..classes {
            let mut d = 0.0;
            for j in 0..classes {
                let delta = if j == k { 1.0 } else { 0.0 };
                let ds = (delta * e[j] * sum - e[j] * e[k]) / (sum * sum);
                d += -tgt[j] / s[j] * ds;
            }
            expected[r * classes + k] = d / batch as f64;
        }
    }
    assert_vec_approx(&fused, &expected, 1e-12);

    // And the closed form (softmax - onehot) / B.
    let direct: Vec<f64> = (0..batch * classes)
        .map(|i| {
            let r = i / classes;
            let row = &logits[r * classes..(r + 1) * classes];
            let sum: f64 = row.iter().map(|v| v.exp()).sum();
            (logits[i].exp() / sum - onehot[i]) / batch as f64
        })
        .collect();
    assert_vec_approx(&fused, &direct, 1e-12);
    Ok(())
}

// Gradient lifecycle

#[test]
fn test_zero_grad_twice_is_all_zero() -> marten::Result<()> {
    let mut g = Graph::new();
    let a = g.leaf(Tensor::from_vec(vec![1.0, 2.0, 3.0], 3)?);
    let sq = g.mul(a, a)?;
    let loss = g.sum(sq)?;
    g.backward(loss)?;
    assert_vec_approx(&grad_vec(&g, a)?, &[2.0, 4.0, 6.0], 1e-12);

    g.zero_grad_node(a)?;
    assert_eq!(grad_vec(&g, a)?, vec![0.0; 3]);
    g.zero_grad_node(a)?;
    assert_eq!(grad_vec(&g, a)?, vec![0.0; 3]);

    let p = Parameter::new(Tensor::ones(2)?);
    p.zero_grad();
    p.zero_grad();
    assert_eq!(p.grad().map(|t| t.to_vec()), Some(vec![0.0, 0.0]));
    Ok(())
}

#[test]
fn test_double_backward_fails() -> marten::Result<()> {
    let mut g = Graph::new();
    let a = g.leaf(Tensor::ones(2)?);
    let loss = g.sum(a)?;
    g.backward(loss)?;
    assert_eq!(g.state(), GraphState::Consumed);

    let err = g.backward(loss).unwrap_err();
    assert!(matches!(err, Error::GraphConsumed));
    // Nothing can be appended to a consumed graph either.
    assert!(matches!(g.relu(a), Err(Error::GraphConsumed)));
    Ok(())
}

#[test]
fn test_reset_invalidates_old_handles() -> marten::Result<()> {
    let mut g = Graph::new();
    let a = g.leaf(Tensor::ones(2)?);
    let loss = g.sum(a)?;
    g.backward(loss)?;

    g.reset();
    assert_eq!(g.state(), GraphState::Idle);
    assert!(g.is_empty());
    assert!(matches!(g.value(a), Err(Error::ForeignNode { .. })));

    let b = g.leaf(Tensor::ones(2)?);
    let loss = g.sum(b)?;
    g.backward(loss)?;
    assert_eq!(grad_vec(&g, b)?, vec![1.0, 1.0]);
    Ok(())
}

#[test]
fn test_construction_errors_create_no_node() -> marten::Result<()> {
    let mut g = Graph::new();
    let x = g.leaf(Tensor::ones((2, 3))?);
    let w = g.leaf(Tensor::ones((4, 5))?);
    let before = g.len();
    let err = g.affine(x, w, None).unwrap_err();
    assert!(err.is_construction());
    assert!(matches!(err, Error::MatmulShapeMismatch { .. }));
    assert_eq!(g.len(), before);
    Ok(())
}

#[test]
fn test_grad_disabled_graph_is_inference_only() -> marten::Result<()> {
    let mut g = Graph::with_config(GraphConfig::default().grad_enabled(false));
    let a = g.leaf(Tensor::from_vec(vec![-1.0, 2.0], 2)?);
    let r = g.relu(a)?;
    assert_eq!(g.value(r)?.to_vec(), vec![0.0, 2.0]);
    assert!(g.node(r)?.is_leaf());
    let loss = g.sum(r)?;
    assert!(matches!(g.backward(loss), Err(Error::GradDisabled)));
    Ok(())
}

// Numerical guards

#[test]
fn test_saturated_sigmoid_into_bce_has_no_nan() -> marten::Result<()> {
    init_tracing();
    let mut g = Graph::new();
    let x = g.leaf(Tensor::from_vec(vec![-800.0, 800.0, -800.0, 800.0], (4, 1))?);
    let y = g.leaf(Tensor::from_vec(vec![0.0, 1.0, 1.0, 0.0], (4, 1))?);
    let p = g.sigmoid(x)?;
    assert_eq!(g.value(p)?.to_vec(), vec![0.0, 1.0, 0.0, 1.0]);

    let loss = g.binary_cross_entropy(p, y)?;
    assert!(g.value(loss)?.item()?.is_finite());
    g.backward(loss)?;

    for v in grad_vec(&g, p)?.into_iter().chain(grad_vec(&g, x)?) {
        assert!(!v.is_nan(), "NaN gradient");
    }
    Ok(())
}

#[test]
fn test_mse_single_prediction_at_target_has_zero_grad() -> marten::Result<()> {
    let mut g = Graph::new();
    let p = g.leaf(Tensor::scalar(2.0));
    let t = g.leaf(Tensor::scalar(2.0));
    let loss = g.mse(p, t)?;
    g.backward(loss)?;
    assert_eq!(g.value(loss)?.item()?, 0.0);
    assert_eq!(grad_vec(&g, p)?, vec![0.0]);
    assert!(g.grad(t)?.is_none());
    Ok(())
}

// Runtime-selected losses

#[test]
fn test_boxed_losses_dispatch_through_operator() -> marten::Result<()> {
    let losses: Vec<Box<dyn Operator>> = vec![
        Box::new(MeanSquaredError),
        Box::new(Hinge::new()),
        Box::new(BinaryCrossEntropy::new()),
    ];
    for loss in losses {
        let name = loss.name();
        let mut g = Graph::new();
        let p = g.leaf(Tensor::from_vec(vec![0.3, 0.8], 2)?);
        let t = g.leaf(Tensor::from_vec(vec![1.0, 0.0], 2)?);
        let l = g.apply_boxed(loss, &[p, t])?;
        g.backward(l)?;
        let grad = grad_vec(&g, p)?;
        assert_eq!(grad.len(), 2, "{name}");
        assert!(grad.iter().any(|v| *v != 0.0), "{name} produced no gradient");
    }
    Ok(())
}
