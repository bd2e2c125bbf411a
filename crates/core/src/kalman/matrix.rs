//! Checked matrix primitives
//!
//! Thin wrappers over nalgebra's in-place operations. Every wrapper validates
//! operand shapes before touching the output, so a bad shape is reported as
//! [`MatrixError::DimensionMismatch`] instead of a panic. Outputs may be whole
//! matrices or views into a scratch buffer; nothing here allocates except
//! inversion of matrices larger than 4x4.

use super::error::{MatrixError, MatrixResult};
use nalgebra::storage::{Storage, StorageMut};
use nalgebra::{DMatrix, Dyn, Matrix};

/// Filter matrix type (heap-allocated once at init)
pub type Mat = DMatrix<f32>;

/// Any dynamically-shaped f32 matrix or view
pub type Operand<S> = Matrix<f32, Dyn, Dyn, S>;

fn check(ok: bool) -> MatrixResult {
    if ok {
        Ok(())
    } else {
        Err(MatrixError::DimensionMismatch)
    }
}

/// `out = a + b`
pub fn add<SA, SB, SO>(a: &Operand<SA>, b: &Operand<SB>, out: &mut Operand<SO>) -> MatrixResult
where
    SA: Storage<f32, Dyn, Dyn>,
    SB: Storage<f32, Dyn, Dyn>,
    SO: StorageMut<f32, Dyn, Dyn>,
{
    check(a.shape() == b.shape() && a.shape() == out.shape())?;
    a.add_to(b, out);
    Ok(())
}

/// `out = a - b`
pub fn sub<SA, SB, SO>(a: &Operand<SA>, b: &Operand<SB>, out: &mut Operand<SO>) -> MatrixResult
where
    SA: Storage<f32, Dyn, Dyn>,
    SB: Storage<f32, Dyn, Dyn>,
    SO: StorageMut<f32, Dyn, Dyn>,
{
    check(a.shape() == b.shape() && a.shape() == out.shape())?;
    a.sub_to(b, out);
    Ok(())
}

/// `out = a * b`
pub fn mul<SA, SB, SO>(a: &Operand<SA>, b: &Operand<SB>, out: &mut Operand<SO>) -> MatrixResult
where
    SA: Storage<f32, Dyn, Dyn>,
    SB: Storage<f32, Dyn, Dyn>,
    SO: StorageMut<f32, Dyn, Dyn>,
{
    check(
        a.ncols() == b.nrows() && out.nrows() == a.nrows() && out.ncols() == b.ncols(),
    )?;
    a.mul_to(b, out);
    Ok(())
}

/// `out = aᵀ`
pub fn transpose<SA, SO>(a: &Operand<SA>, out: &mut Operand<SO>) -> MatrixResult
where
    SA: Storage<f32, Dyn, Dyn>,
    SO: StorageMut<f32, Dyn, Dyn>,
{
    check(a.nrows() == out.ncols() && a.ncols() == out.nrows())?;
    a.transpose_to(out);
    Ok(())
}

/// `out = a`
pub fn copy<SA, SO>(a: &Operand<SA>, out: &mut Operand<SO>) -> MatrixResult
where
    SA: Storage<f32, Dyn, Dyn>,
    SO: StorageMut<f32, Dyn, Dyn>,
{
    check(a.shape() == out.shape())?;
    out.copy_from(a);
    Ok(())
}

/// `out = a⁻¹`
///
/// On failure `out` holds unspecified values and must not be consumed.
pub fn invert<SA, SO>(a: &Operand<SA>, out: &mut Operand<SO>) -> MatrixResult
where
    SA: Storage<f32, Dyn, Dyn>,
    SO: StorageMut<f32, Dyn, Dyn>,
{
    check(a.is_square() && a.shape() == out.shape())?;
    out.copy_from(a);
    if !out.try_inverse_mut() || out.iter().any(|v| !v.is_finite()) {
        return Err(MatrixError::Singular);
    }
    Ok(())
}

/// Exponentially-weighted blend: `target = alpha * target + (1 - alpha) * sample`
pub fn blend<ST, SS>(target: &mut Operand<ST>, sample: &Operand<SS>, alpha: f32) -> MatrixResult
where
    ST: StorageMut<f32, Dyn, Dyn>,
    SS: Storage<f32, Dyn, Dyn>,
{
    check(target.shape() == sample.shape())?;
    target.zip_apply(sample, |t, s| *t = alpha * *t + (1.0 - alpha) * s);
    Ok(())
}
