//! Short-Weierstrass curve descriptors and the public curve-kernel surface.
//!
//! A [`CurveDescriptor`] extends a field descriptor with the curve
//! coefficients and the scalar-field shape. Points are Jacobian
//! `(X, Y, Z)` with the identity at `Z = 0`, or affine `(X, Y)` with the
//! identity at `(0, 0)`; all coordinates live in the Montgomery domain.

use inkwell::types::ArrayType;
use inkwell::values::{BasicMetadataValueEnum, PointerValue, };

use log::debug;

use crate::assembler::{Assembler, EcPointAff, EcPointJac, };
use crate::error::{Error, Result, };
use crate::field::FieldDescriptor;

mod jacobian;
mod msm;

/// Curve parameter record. `coef_a` drives the slope formula
/// (`0`, `-3` and small general values are supported); `coef_b` only
/// documents the curve, no formula needs it.
#[derive(Clone)]
pub struct CurveDescriptor<'ctx> {
  pub name: String,
  pub fp: FieldDescriptor<'ctx>,
  pub coef_a: i64,
  pub coef_b: i64,
  pub scalar_bits: u32,
  pub scalar_words: u32,
  /// `[3 x fieldTy]`: X, Y, Z.
  pub curve_ty: ArrayType<'ctx>,
  /// `[2 x fieldTy]`: X, Y.
  pub curve_aff_ty: ArrayType<'ctx>,
  /// `[scalarWords x wordTy]`, canonical (non-Montgomery) scalars.
  pub scalar_ty: ArrayType<'ctx>,
}

impl<'ctx> Assembler<'ctx> {
  /// Build a curve descriptor; the base field is configured as
  /// `<name>_fp`. The scalar field is described only by its bit width here
  /// (MSM consumes canonical scalars); configure `<name>_fr` separately
  /// when its arithmetic is needed.
  #[allow(clippy::too_many_arguments)]
  pub fn configure_curve(&self, name: &str, bits: u32, modulus_hex: &str,
                         v: u32, w: u32, a: i64, b: i64, scalar_bits: u32)
    -> Result<CurveDescriptor<'ctx>>
  {
    let fp = self.configure_field(&format!("{}_fp", name), bits,
                                  modulus_hex, v, w)?;
    match a {
      0 | -3 => { },
      other => {
        let abs = other.unsigned_abs();
        if !matches!(abs, 0..=12 | 15 | 21) {
          return Err(Error::Configuration(format!(
            "unsupported curve coefficient a = {}", other)));
        }
      },
    }
    if scalar_bits == 0 {
      return Err(Error::Configuration("scalar width cannot be zero".into()));
    }
    let scalar_words = (scalar_bits + w - 1) / w;
    debug!("curve `{}`: a = {}, b = {}, {}-bit scalars in {} words",
           name, a, b, scalar_bits, scalar_words);
    Ok(CurveDescriptor {
      name: name.into(),
      curve_ty: fp.field_ty.array_type(3),
      curve_aff_ty: fp.field_ty.array_type(2),
      scalar_ty: fp.word_ty.array_type(scalar_words),
      fp,
      coef_a: a,
      coef_b: b,
      scalar_bits,
      scalar_words,
    })
  }
}

impl<'ctx> CurveDescriptor<'ctx> {
  /// Internal symbol for a Jacobian short-Weierstrass group operation.
  pub(crate) fn sym(&self, op: &str) -> String {
    format!("_{}_ecg1swjac_{}_{}", self.name, op, self.fp.shape())
  }

  /// Public kernel name for `op`.
  pub fn kernel_name(&self, op: &str) -> String {
    format!("{}_{}", self.name, op)
  }

  pub(crate) fn jac(&self, ptr: PointerValue<'ctx>) -> EcPointJac<'ctx> {
    EcPointJac::view(ptr, self.curve_ty)
  }

  pub(crate) fn aff(&self, ptr: PointerValue<'ctx>) -> EcPointAff<'ctx> {
    EcPointAff::view(ptr, self.curve_aff_ty)
  }
}

impl<'ctx> Assembler<'ctx> {
  fn curve_kernel(&self, cd: &CurveDescriptor<'ctx>, op: &str,
                  internal: String, arity: usize)
    -> Result<String>
  {
    let name = cd.kernel_name(op);
    let params = vec![self.ptr_ty(); arity];
    let section = cd.fp.name.clone();
    self.define_public_function(&name, &section, &params, &[],
                                |asm, p| {
      let args: Vec<BasicMetadataValueEnum> = (0..arity)
        .map(|i| Ok(p.ptr(i)?.into()))
        .collect::<Result<Vec<_>>>()?;
      asm.call(&internal, &args)?;
      Ok(None)
    })?;
    Ok(name)
  }

  /// `<curve>_sum(r, p, q)`: complete Jacobian addition.
  pub fn gen_ec_sum(&self, cd: &CurveDescriptor<'ctx>) -> Result<String> {
    let internal = self.ensure_ec_sum(cd)?;
    self.curve_kernel(cd, "sum", internal, 3)
  }

  /// `<curve>_double(r, p)`: Jacobian doubling.
  pub fn gen_ec_double(&self, cd: &CurveDescriptor<'ctx>) -> Result<String> {
    let internal = self.ensure_ec_double(cd)?;
    self.curve_kernel(cd, "double", internal, 2)
  }

  /// `<curve>_madd(r, p, q)`: mixed Jacobian + affine addition (`Z₂ = 1`).
  pub fn gen_ec_madd(&self, cd: &CurveDescriptor<'ctx>) -> Result<String> {
    let internal = self.ensure_ec_madd(cd)?;
    self.curve_kernel(cd, "madd", internal, 3)
  }
}
