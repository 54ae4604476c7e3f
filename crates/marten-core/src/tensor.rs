use std::fmt;

use rand::Rng;
use rand_distr::{Distribution, StandardNormal, Uniform};

use crate::error::{Error, Result};
use crate::shape::Shape;

// Tensor — The fundamental data structure
//
// A Tensor is a dense n-dimensional array of f64, stored row-major in a flat
// Vec. It knows nothing about gradients: autograd lives one level up, in the
// Node/Graph types, which own tensors for their values and gradients.
//
// MEMORY MODEL:
//
//   Every tensor owns its backing storage. There are no views: transpose
//   and reshape copy, so a gradient accumulator mutated in place never
//   writes through to a value tensor elsewhere in the graph.
//
//   Operators treat tensors as values: they read their inputs and allocate
//   fresh outputs. The in-place utilities (zero, fill, add_assign, axpy)
//   exist for gradient accumulators and optimizer updates.
//
// INDEXING:
//
//   flat_index = sum(index[i] * strides[i]), with strides computed
//   row-major from the shape (strides[last] == 1).

/// A dense, row-major n-dimensional array of `f64`.
#[derive(Clone, PartialEq)]
pub struct Tensor {
    data: Vec<f64>,
    shape: Shape,
    strides: Vec<usize>,
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor(shape={}, data=", self.shape)?;
        const PREVIEW: usize = 8;
        if self.data.len() <= PREVIEW {
            write!(f, "{:?}", self.data)?;
        } else {
            write!(f, "{:?}..", &self.data[..PREVIEW])?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shape.dims() {
            [_, cols] if *cols > 0 => {
                writeln!(f, "Tensor{} [", self.shape)?;
                for row in self.data.chunks(*cols) {
                    let cells: Vec<String> = row.iter().map(|v| format!("{v:>10.4}")).collect();
                    writeln!(f, "  [{}]", cells.join(", "))?;
                }
                write!(f, "]")
            }
            _ => write!(f, "Tensor{} {:?}", self.shape, self.data),
        }
    }
}

impl Tensor {
    // Constructors

    /// Create a tensor from a flat row-major vector.
    ///
    /// Fails if the shape is rank 0 or does not hold exactly `data.len()`
    /// elements.
    pub fn from_vec(data: Vec<f64>, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        shape.validate()?;
        let expected = shape.elem_count();
        if data.len() != expected {
            return Err(Error::ElementCountMismatch {
                shape,
                expected,
                got: data.len(),
            });
        }
        let strides = shape.stride_contiguous();
        Ok(Tensor {
            data,
            shape,
            strides,
        })
    }

    /// Create a tensor by copying a slice.
    pub fn from_slice(data: &[f64], shape: impl Into<Shape>) -> Result<Self> {
        Self::from_vec(data.to_vec(), shape)
    }

    /// Create a tensor filled with a constant value.
    pub fn full(shape: impl Into<Shape>, val: f64) -> Result<Self> {
        let shape = shape.into();
        shape.validate()?;
        let n = shape.elem_count();
        Self::from_vec(vec![val; n], shape)
    }

    /// Create a tensor filled with zeros.
    pub fn zeros(shape: impl Into<Shape>) -> Result<Self> {
        Self::full(shape, 0.0)
    }

    /// Create a tensor filled with ones.
    pub fn ones(shape: impl Into<Shape>) -> Result<Self> {
        Self::full(shape, 1.0)
    }

    /// A one-element tensor of shape `[1]`.
    pub fn scalar(val: f64) -> Self {
        Tensor {
            data: vec![val],
            shape: Shape::from(1),
            strides: vec![1],
        }
    }

    /// Zeros with the same shape as `self`.
    pub fn zeros_like(&self) -> Self {
        Tensor {
            data: vec![0.0; self.data.len()],
            shape: self.shape.clone(),
            strides: self.strides.clone(),
        }
    }

    /// Samples from N(0, 1) using the caller's generator.
    pub fn random_normal<R: Rng + ?Sized>(shape: impl Into<Shape>, rng: &mut R) -> Result<Self> {
        let shape = shape.into();
        shape.validate()?;
        let data = (0..shape.elem_count())
            .map(|_| StandardNormal.sample(rng))
            .collect();
        Self::from_vec(data, shape)
    }

    /// Samples from U(low, high) using the caller's generator.
    pub fn random_uniform<R: Rng + ?Sized>(
        shape: impl Into<Shape>,
        low: f64,
        high: f64,
        rng: &mut R,
    ) -> Result<Self> {
        let shape = shape.into();
        shape.validate()?;
        if !(low.is_finite() && high.is_finite() && (high - low).is_finite()) || low >= high {
            return Err(Error::msg(format!(
                "random_uniform: need finite low ({low}) below high ({high})"
            )));
        }
        let dist = Uniform::new(low, high);
        let data = (0..shape.elem_count()).map(|_| dist.sample(rng)).collect();
        Self::from_vec(data, shape)
    }

    // Accessors

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn elem_count(&self) -> usize {
        self.data.len()
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// The flat row-major data.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Mutable access to the flat data (shape is fixed).
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.data.clone()
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// flat_index = sum(index[i] * strides[i])
    pub fn flat_index(&self, index: &[usize]) -> usize {
        index
            .iter()
            .zip(self.strides.iter())
            .map(|(i, s)| i * s)
            .sum()
    }

    /// Element at a multi-dimensional index, or None when out of range.
    pub fn get(&self, index: &[usize]) -> Option<f64> {
        if index.len() != self.rank() || index.iter().zip(self.dims()).any(|(i, d)| i >= d) {
            return None;
        }
        self.data.get(self.flat_index(index)).copied()
    }

    /// Read out a one-element tensor.
    pub fn item(&self) -> Result<f64> {
        match self.data.as_slice() {
            [v] => Ok(*v),
            _ => Err(Error::NotAScalar {
                shape: self.shape.clone(),
            }),
        }
    }

    /// Fails with `ShapeMismatch` unless `other` has exactly this shape.
    pub fn check_same_shape(&self, other: &Tensor) -> Result<()> {
        if self.shape != other.shape {
            return Err(Error::ShapeMismatch {
                expected: self.shape.clone(),
                got: other.shape.clone(),
            });
        }
        Ok(())
    }

    // In-place utilities (gradient accumulators, optimizer updates)

    /// Set every element to zero.
    pub fn zero(&mut self) {
        self.fill(0.0);
    }

    /// Set every element to `val`.
    pub fn fill(&mut self, val: f64) {
        self.data.iter_mut().for_each(|x| *x = val);
    }

    /// self += other
    pub fn add_assign(&mut self, other: &Tensor) -> Result<()> {
        self.axpy(1.0, other)
    }

    /// self += alpha * other
    pub fn axpy(&mut self, alpha: f64, other: &Tensor) -> Result<()> {
        self.check_same_shape(other)?;
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += alpha * b;
        }
        Ok(())
    }

    // Element-wise

    /// Apply `f` to every element, producing a new tensor.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Tensor {
        Tensor {
            data: self.data.iter().map(|&x| f(x)).collect(),
            shape: self.shape.clone(),
            strides: self.strides.clone(),
        }
    }

    /// Combine two same-shape tensors element by element.
    pub fn zip_map(&self, other: &Tensor, f: impl Fn(f64, f64) -> f64) -> Result<Tensor> {
        self.check_same_shape(other)?;
        Ok(Tensor {
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(&a, &b)| f(a, b))
                .collect(),
            shape: self.shape.clone(),
            strides: self.strides.clone(),
        })
    }

    pub fn add(&self, rhs: &Tensor) -> Result<Tensor> {
        self.zip_map(rhs, |a, b| a + b)
    }

    pub fn sub(&self, rhs: &Tensor) -> Result<Tensor> {
        self.zip_map(rhs, |a, b| a - b)
    }

    pub fn mul(&self, rhs: &Tensor) -> Result<Tensor> {
        self.zip_map(rhs, |a, b| a * b)
    }

    /// Multiply every element by `s`.
    pub fn scale(&self, s: f64) -> Tensor {
        self.map(|x| x * s)
    }

    /// Largest absolute element-wise difference.
    pub fn max_abs_diff(&self, other: &Tensor) -> Result<f64> {
        self.check_same_shape(other)?;
        Ok(self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max))
    }

    // Linear algebra / reductions

    /// Matrix product of two rank-2 tensors: [m, k] @ [k, n] → [m, n].
    pub fn matmul(&self, rhs: &Tensor) -> Result<Tensor> {
        let (m, k1) = self.shape.dims2()?;
        let (k2, n) = rhs.shape.dims2()?;
        if k1 != k2 {
            return Err(Error::MatmulShapeMismatch { m, k1, k2, n });
        }
        let mut out = vec![0.0; m * n];
        // i-k-j order: the inner loop walks contiguous rows of rhs and out.
        for i in 0..m {
            let out_row = &mut out[i * n..(i + 1) * n];
            for k in 0..k1 {
                let a = self.data[i * k1 + k];
                if a == 0.0 {
                    continue;
                }
                let rhs_row = &rhs.data[k * n..(k + 1) * n];
                for (o, &b) in out_row.iter_mut().zip(rhs_row.iter()) {
                    *o += a * b;
                }
            }
        }
        Tensor::from_vec(out, (m, n))
    }

    /// Materialized transpose of a rank-2 tensor.
    pub fn transpose(&self) -> Result<Tensor> {
        let (rows, cols) = self.shape.dims2()?;
        let mut out = vec![0.0; rows * cols];
        for r in 0..rows {
            for c in 0..cols {
                out[c * rows + r] = self.data[r * cols + c];
            }
        }
        Tensor::from_vec(out, (cols, rows))
    }

    /// Column sums of a rank-2 tensor: [rows, cols] → [cols].
    pub fn sum_rows(&self) -> Result<Tensor> {
        let (_, cols) = self.shape.dims2()?;
        let mut out = vec![0.0; cols];
        if cols > 0 {
            for row in self.data.chunks(cols) {
                for (o, v) in out.iter_mut().zip(row.iter()) {
                    *o += v;
                }
            }
        }
        Tensor::from_vec(out, cols)
    }

    /// Sum of all elements.
    pub fn sum_all(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Mean of all elements.
    pub fn mean_all(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.sum_all() / self.data.len() as f64
    }

    /// Same data under a new shape with the same element count (copies).
    pub fn reshape(&self, shape: impl Into<Shape>) -> Result<Tensor> {
        Tensor::from_vec(self.data.clone(), shape)
    }
}
