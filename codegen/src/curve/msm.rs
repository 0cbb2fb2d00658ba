//! Multi-scalar multiplication, bucket method.
//!
//! One kernel per `(curve, c, N)`: the specialisation keeps every loop
//! bound constant so the optimiser can unroll. The kernel is serial within
//! a single thread; it is a building block, not a scheduler.
//!
//! Layout per window, from the most significant window down:
//! zero the `2^c - 1` bucket accumulators, scatter the points into buckets
//! by their `c`-bit digit (mixed add), fold the buckets with the running-
//! sum trick (`2·(numBuckets - 1)` additions), then Horner-combine into
//! the total: `c` doublings and one addition per window.
//!
//! Scalars arrive canonical (not Montgomery); point coordinates are
//! Montgomery affine.

use inkwell::types::BasicTypeEnum;
use inkwell::values::IntValue;
use inkwell::IntPredicate;

use log::debug;

use crate::assembler::{Assembler, EcPointJac, FnAttr, };
use crate::error::{Error, Result, };

use super::CurveDescriptor;

impl<'ctx> Assembler<'ctx> {
  /// Extract the `c`-bit window of `scalar` at `bit_off`. The slice may
  /// straddle a limb boundary; shift amounts are kept in `[0, w)` so no
  /// poison shifts are ever built, and the clamp keeps the second load in
  /// bounds on the top limb.
  fn msm_window_digit(&self, cd: &CurveDescriptor<'ctx>,
                      scalar: &crate::assembler::Field<'ctx>,
                      bit_off: IntValue<'ctx>, c: u32)
    -> Result<IntValue<'ctx>>
  {
    let fd = &cd.fp;
    let bd = self.builder();
    let w = fd.w;
    let word = fd.word_ty;
    let log2w = w.trailing_zeros() as u64;

    let limb_idx = bd.build_right_shift(
      bit_off, word.const_int(log2w, false), false, "")?;
    let shift = bd.build_and(bit_off, word.const_int((w - 1) as u64, false), "")?;
    let lo_limb = scalar.limb_at(self, limb_idx)?;
    let lo = bd.build_right_shift(lo_limb, shift, false, "")?;

    let next_idx = bd.build_int_add(limb_idx, word.const_int(1, false), "")?;
    let last = word.const_int((cd.scalar_words - 1) as u64, false);
    let in_range = bd.build_int_compare(IntPredicate::ULE, next_idx, last, "")?;
    let safe_idx = bd.build_select(in_range, next_idx, last, "")?
      .into_int_value();
    let next_raw = scalar.limb_at(self, safe_idx)?;
    let next = bd.build_select(in_range, next_raw, word.const_zero(), "")?
      .into_int_value();

    let bd = self.builder();
    let w_minus = bd.build_int_sub(word.const_int(w as u64, false), shift, "")?;
    let amt = bd.build_and(w_minus, word.const_int((w - 1) as u64, false), "")?;
    let hi_raw = bd.build_left_shift(next, amt, "")?;
    let shift_zero = bd.build_int_compare(IntPredicate::EQ, shift,
                                          word.const_zero(), "")?;
    let hi = bd.build_select(shift_zero, word.const_zero(), hi_raw, "")?
      .into_int_value();

    let digit = bd.build_or(lo, hi, "")?;
    let mask = word.const_int((1u64 << c) - 1, false);
    Ok(bd.build_and(digit, mask, "")?)
  }

  /// `<curve>_msm_c<c>_n<n>(r, scalars, points)`: `r = Σ kⱼ·Pⱼ` over `n`
  /// affine points with `c`-bit windows.
  pub fn gen_ec_msm(&self, cd: &CurveDescriptor<'ctx>, c: u32, n: u32)
    -> Result<String>
  {
    if c == 0 || c > cd.scalar_bits || c > 30 {
      return Err(Error::Configuration(format!(
        "bucket width {} out of range for {}-bit scalars", c, cd.scalar_bits)));
    }
    if n == 0 {
      return Err(Error::Configuration("MSM over zero points".into()));
    }
    let name = format!("{}_c{}_n{}", cd.kernel_name("msm"), c, n);
    if self.is_defined(&name) {
      return Ok(name);
    }

    let sum = self.ensure_ec_sum(cd)?;
    let dbl = self.ensure_ec_double(cd)?;
    let madd = self.ensure_ec_madd(cd)?;

    let num_buckets = (1u64 << c) - 1;
    let num_windows = (cd.scalar_bits + c - 1) / c;
    debug!("msm `{}`: {} windows, {} buckets", name, num_windows, num_buckets);

    let cd = cd.clone();
    let params: Vec<BasicTypeEnum> =
      vec![self.ptr_ty(), self.ptr_ty(), self.ptr_ty()];
    self.define_public_function(&name, &cd.fp.name.clone(), &params,
                                &[FnAttr::NoInline],
                                |asm, prm| {
      let fd = &cd.fp;
      let word = fd.word_ty;
      let r_ptr = prm.ptr(0)?;
      let scalars_ptr = prm.ptr(1)?;
      let points_ptr = prm.ptr(2)?;

      let scalars = crate::assembler::Array::view(
        scalars_ptr, cd.scalar_ty.array_type(n));
      let points = crate::assembler::Array::view(
        points_ptr, cd.curve_aff_ty.array_type(n));

      let buckets_ty = cd.curve_ty.array_type(num_buckets as u32);
      let buckets = crate::assembler::Array::alloca(asm, buckets_ty,
                                                    "buckets")?;
      let total = EcPointJac::alloca(asm, cd.curve_ty, "total")?;
      let acc = EcPointJac::alloca(asm, cd.curve_ty, "acc")?;
      let win_sum = EcPointJac::alloca(asm, cd.curve_ty, "winsum")?;
      total.set_identity(asm)?;

      let win_top = word.const_int((num_windows - 1) as u64, false);
      asm.emit_loop("win", win_top, word.const_zero(), true, |asm, win| {
        // Horner shift: the previous windows move up c bits.
        for _ in 0..c {
          asm.call(&dbl, &[total.ptr().into(), total.ptr().into()])?;
        }

        let zero32 = asm.context().i32_type().const_zero();
        let btop = asm.context().i32_type()
          .const_int(num_buckets - 1, false);
        asm.emit_loop("zero", zero32, btop, false, |asm, k| {
          let b = buckets.elem_ptr(asm, k)?;
          EcPointJac::view(b, cd.curve_ty).set_identity(asm)
        })?;

        // Scatter points into buckets by digit.
        let bit_off = asm.builder().build_int_mul(
          win, word.const_int(c as u64, false), "")?;
        let jtop = asm.context().i32_type().const_int((n - 1) as u64, false);
        asm.emit_loop("pt", zero32, jtop, false, |asm, j| {
          let s_ptr = scalars.elem_ptr(asm, j)?;
          let scalar = crate::assembler::Field::view(s_ptr, cd.scalar_ty);
          let digit = asm.msm_window_digit(&cd, &scalar, bit_off, c)?;
          let nz = asm.builder().build_int_compare(
            IntPredicate::NE, digit, word.const_zero(), "")?;
          asm.emit_if("hit", nz, |asm| {
            let idx = asm.builder().build_int_sub(
              digit, word.const_int(1, false), "")?;
            let b = buckets.elem_ptr(asm, idx)?;
            let pt = points.elem_ptr(asm, j)?;
            asm.call(&madd, &[b.into(), b.into(), pt.into()])?;
            Ok(())
          })
        })?;

        // Running-sum fold: the top bucket seeds both accumulators, the
        // rest yield Σ k·S_k in 2(numBuckets - 1) additions.
        let top = EcPointJac::view(buckets.elem_ptr(asm, btop)?, cd.curve_ty);
        acc.store_from(asm, &top)?;
        win_sum.store_from(asm, &acc)?;
        if num_buckets > 1 {
          let fold_top = asm.context().i32_type()
            .const_int(num_buckets - 2, false);
          asm.emit_loop("fold", fold_top, zero32, true, |asm, k| {
            let b = buckets.elem_ptr(asm, k)?;
            asm.call(&sum, &[acc.ptr().into(), acc.ptr().into(), b.into()])?;
            asm.call(&sum, &[win_sum.ptr().into(), win_sum.ptr().into(),
                             acc.ptr().into()])?;
            Ok(())
          })?;
        }

        asm.call(&sum, &[total.ptr().into(), total.ptr().into(),
                         win_sum.ptr().into()])?;
        Ok(())
      })?;

      let out = cd.jac(r_ptr);
      out.store_from(asm, &total)?;
      Ok(None)
    })?;
    Ok(name)
  }
}
