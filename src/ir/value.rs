//! Numeric results of evaluating a symbol.
//!
//! Vectors are dense `(n, 1)` columns, Jacobian blocks are either dense
//! `Array2` or `CsrMatrix`. Binary operations follow array broadcasting
//! rules; a column vector times a sparse block scales its rows and keeps the
//! block sparse.

use crate::ir::error::{IrError, Result};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use std::ops::Range;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Dense(Array2<f64>),
    Sparse(CsrMatrix<f64>),
}

impl Value {
    /// A dense `(n, 1)` column.
    pub fn column(values: Vec<f64>) -> Value {
        Value::Dense(Array1::from_vec(values).insert_axis(Axis(1)))
    }

    /// The result of concatenating nothing.
    pub fn empty() -> Value {
        Value::Dense(Array2::zeros((0, 1)))
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Value::Scalar(_))
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, Value::Sparse(_))
    }

    /// `(rows, cols)`; scalars report `(1, 1)`.
    pub fn shape(&self) -> (usize, usize) {
        match self {
            Value::Scalar(_) => (1, 1),
            Value::Dense(a) => a.dim(),
            Value::Sparse(m) => (m.nrows(), m.ncols()),
        }
    }

    pub fn nrows(&self) -> usize {
        self.shape().0
    }

    /// True for dense arrays with a single column.
    pub fn is_column(&self) -> bool {
        matches!(self, Value::Dense(a) if a.ncols() == 1)
    }

    pub fn to_dense(&self) -> Array2<f64> {
        match self {
            Value::Scalar(v) => Array2::from_elem((1, 1), *v),
            Value::Dense(a) => a.clone(),
            Value::Sparse(m) => sparse_to_dense(m),
        }
    }

    /// Flattened values of a dense column, or a scalar as a single entry.
    pub fn column_values(&self) -> Result<Vec<f64>> {
        match self {
            Value::Scalar(v) => Ok(vec![*v]),
            Value::Dense(a) if a.ncols() == 1 => Ok(a.iter().copied().collect()),
            other => Err(IrError::Shape(format!(
                "expected a column vector, got shape {:?}",
                other.shape()
            ))),
        }
    }

    /// Rows `[start, end)` of a 2-D value.
    pub fn rows(&self, range: Range<usize>) -> Result<Value> {
        let (nrows, ncols) = self.shape();
        let out_of_range = || {
            IrError::Shape(format!(
                "cannot take rows {:?} of a value with shape {:?}",
                range, (nrows, ncols)
            ))
        };
        if range.start > range.end || range.end > nrows {
            return Err(out_of_range());
        }
        match self {
            Value::Scalar(_) => Err(out_of_range()),
            Value::Dense(a) => Ok(Value::Dense(a.slice(s![range.clone(), ..]).to_owned())),
            Value::Sparse(m) => {
                let mut coo = CooMatrix::new(range.len(), ncols);
                for (i, j, v) in m.triplet_iter() {
                    if range.contains(&i) {
                        coo.push(i - range.start, j, *v);
                    }
                }
                Ok(Value::Sparse(CsrMatrix::from(&coo)))
            }
        }
    }

    /// Ordered join of column vectors along the first axis.
    pub fn concatenate(values: &[Value]) -> Result<Value> {
        if values.is_empty() {
            return Ok(Value::empty());
        }
        let mut arrays = Vec::with_capacity(values.len());
        for value in values {
            match value {
                Value::Dense(a) => arrays.push(a.clone()),
                Value::Scalar(_) => {
                    return Err(IrError::Shape(
                        "zero-dimensional values cannot be concatenated".to_string(),
                    ))
                }
                Value::Sparse(_) => {
                    return Err(IrError::Shape(
                        "sparse blocks must be stacked, not concatenated".to_string(),
                    ))
                }
            }
        }
        join_rows(&arrays)
    }

    /// Dense vertical stack; scalars become `1 x 1` rows.
    pub fn vstack_dense(values: &[Value]) -> Result<Value> {
        if values.is_empty() {
            return Ok(Value::empty());
        }
        let arrays: Vec<Array2<f64>> = values.iter().map(Value::to_dense).collect();
        join_rows(&arrays)
    }

    /// Sparse vertical stack; dense inputs are converted.
    pub fn vstack_sparse(values: &[Value]) -> Result<Value> {
        let ncols = values.first().map(|v| v.shape().1).unwrap_or(0);
        let nrows: usize = values.iter().map(Value::nrows).sum();
        let mut coo = CooMatrix::new(nrows, ncols);
        let mut offset = 0;
        for value in values {
            let (rows, cols) = value.shape();
            if cols != ncols {
                return Err(IrError::Shape(format!(
                    "cannot stack blocks with {} and {} columns",
                    ncols, cols
                )));
            }
            match value {
                Value::Sparse(m) => {
                    for (i, j, v) in m.triplet_iter() {
                        coo.push(offset + i, j, *v);
                    }
                }
                other => {
                    for ((i, j), v) in other.to_dense().indexed_iter() {
                        if *v != 0.0 {
                            coo.push(offset + i, j, *v);
                        }
                    }
                }
            }
            offset += rows;
        }
        Ok(Value::Sparse(CsrMatrix::from(&coo)))
    }

    pub fn add(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(a + b)),
            (Value::Sparse(m), Value::Scalar(z)) | (Value::Scalar(z), Value::Sparse(m))
                if *z == 0.0 =>
            {
                Ok(Value::Sparse(m.clone()))
            }
            (Value::Sparse(a), Value::Sparse(b))
                if a.nrows() == b.nrows() && a.ncols() == b.ncols() =>
            {
                let mut coo = CooMatrix::new(a.nrows(), a.ncols());
                for (i, j, v) in a.triplet_iter().chain(b.triplet_iter()) {
                    coo.push(i, j, *v);
                }
                Ok(Value::Sparse(CsrMatrix::from(&coo)))
            }
            _ => dense_binary(self, other, |x, y| x + y),
        }
    }

    pub fn mul(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(a * b)),
            (Value::Sparse(m), Value::Scalar(k)) | (Value::Scalar(k), Value::Sparse(m)) => {
                let mut out = m.clone();
                out.values_mut().iter_mut().for_each(|v| *v *= *k);
                Ok(Value::Sparse(out))
            }
            (Value::Sparse(m), Value::Dense(d)) | (Value::Dense(d), Value::Sparse(m)) => {
                let sparse_shape = (m.nrows(), m.ncols());
                match broadcast_shape(sparse_shape, d.dim()) {
                    Some(shape) if shape == sparse_shape => {
                        Ok(Value::Sparse(scale_sparse(m, d.view())))
                    }
                    _ => dense_binary(self, other, |x, y| x * y),
                }
            }
            _ => dense_binary(self, other, |x, y| x * y),
        }
    }
}

fn sparse_to_dense(m: &CsrMatrix<f64>) -> Array2<f64> {
    let mut out = Array2::zeros((m.nrows(), m.ncols()));
    for (i, j, v) in m.triplet_iter() {
        out[[i, j]] += *v;
    }
    out
}

fn join_rows(arrays: &[Array2<f64>]) -> Result<Value> {
    let views: Vec<ArrayView2<f64>> = arrays.iter().map(|a| a.view()).collect();
    ndarray::concatenate(Axis(0), &views)
        .map(Value::Dense)
        .map_err(|err| IrError::Shape(err.to_string()))
}

fn broadcast_shape(a: (usize, usize), b: (usize, usize)) -> Option<(usize, usize)> {
    fn dim(x: usize, y: usize) -> Option<usize> {
        match (x, y) {
            (x, y) if x == y => Some(x),
            (1, y) => Some(y),
            (x, 1) => Some(x),
            _ => None,
        }
    }
    Some((dim(a.0, b.0)?, dim(a.1, b.1)?))
}

/// Multiply every stored entry of `m` by the broadcast entry of `d`.
fn scale_sparse(m: &CsrMatrix<f64>, d: ArrayView2<f64>) -> CsrMatrix<f64> {
    let (drows, dcols) = d.dim();
    let mut coo = CooMatrix::new(m.nrows(), m.ncols());
    for (i, j, v) in m.triplet_iter() {
        let di = if drows == 1 { 0 } else { i };
        let dj = if dcols == 1 { 0 } else { j };
        let scaled = v * d[[di, dj]];
        if scaled != 0.0 {
            coo.push(i, j, scaled);
        }
    }
    CsrMatrix::from(&coo)
}

fn dense_binary(left: &Value, right: &Value, op: impl Fn(f64, f64) -> f64) -> Result<Value> {
    let a = left.to_dense();
    let b = right.to_dense();
    let shape = broadcast_shape(a.dim(), b.dim()).ok_or_else(|| {
        IrError::Shape(format!(
            "operands could not be broadcast together with shapes {:?} and {:?}",
            a.dim(),
            b.dim()
        ))
    })?;
    let (Some(av), Some(bv)) = (a.broadcast(shape), b.broadcast(shape)) else {
        return Err(IrError::Shape(format!(
            "cannot broadcast to shape {:?}",
            shape
        )));
    };
    let mut out = Array2::zeros(shape);
    ndarray::Zip::from(&mut out)
        .and(&av)
        .and(&bv)
        .for_each(|o, x, y| *o = op(*x, *y));
    Ok(Value::Dense(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn identity(n: usize) -> Value {
        Value::Sparse(CsrMatrix::identity(n))
    }

    #[test]
    fn test_concatenate_columns() {
        let joined = Value::concatenate(&[Value::column(vec![1.0, 2.0]), Value::column(vec![3.0])])
            .expect("columns join");
        assert_eq!(joined, Value::column(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_concatenate_rejects_scalars() {
        let err = Value::concatenate(&[Value::Scalar(1.0), Value::column(vec![3.0])]).unwrap_err();
        assert!(matches!(err, IrError::Shape(_)));
    }

    #[test]
    fn test_rows_of_sparse() {
        let block = identity(4).rows(1..3).expect("in range");
        assert!(block.is_sparse());
        assert_eq!(block.to_dense(), array![[0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0]]);
        assert!(identity(4).rows(2..5).is_err());
    }

    #[test]
    fn test_vstack_sparse_mixed() {
        let stacked =
            Value::vstack_sparse(&[identity(2), Value::Dense(array![[0.0, 3.0]])]).expect("stack");
        assert!(stacked.is_sparse());
        assert_eq!(
            stacked.to_dense(),
            array![[1.0, 0.0], [0.0, 1.0], [0.0, 3.0]]
        );
    }

    #[test]
    fn test_column_scales_sparse_rows() {
        let scaled = Value::column(vec![2.0, 3.0]).mul(&identity(2)).expect("broadcast");
        assert!(scaled.is_sparse());
        assert_eq!(scaled.to_dense(), array![[2.0, 0.0], [0.0, 3.0]]);
    }

    #[test]
    fn test_broadcast_add() {
        let sum = Value::Scalar(1.0)
            .add(&Value::column(vec![1.0, 2.0]))
            .expect("scalar broadcast");
        assert_eq!(sum, Value::column(vec![2.0, 3.0]));
        let err = Value::column(vec![1.0, 2.0])
            .add(&Value::column(vec![1.0, 2.0, 3.0]))
            .unwrap_err();
        assert!(matches!(err, IrError::Shape(_)));
    }

    #[test]
    fn test_sparse_sum_stays_sparse() {
        let sum = identity(2).add(&identity(2)).expect("same shape");
        assert!(sum.is_sparse());
        assert_eq!(sum.to_dense(), array![[2.0, 0.0], [0.0, 2.0]]);
    }
}
