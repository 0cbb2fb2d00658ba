//! Montgomery multiplication: CIOS, coarsely-integrated operand scanning.
//!
//! The working state is `numWords + 1` limbs (the top one is the word
//! accumulator `A`), plus a single carry bit when the field has no spare
//! bit. Each round multiplies one limb of `a` into the state, folds in
//! `m·p` with `m = t₀ · (-1/p₀ mod 2^w)`, and shifts down one word.
//! Rounds are unrolled at emission time.
//!
//! On NVPTX each row (multiply step, reduce step) is emitted as one inline
//! asm block of `mad.lo.cc` / `madc.hi.cc` / `addc` so the carry flag never
//! has to survive an asm-block boundary; every other backend uses the
//! double-width generic step.
//!
//! The final subtraction is a separate internal function per descriptor:
//! `finalsub_noo` when a spare bit rules out the extra carry word,
//! `finalsub_mayo` when it does not.

use inkwell::types::BasicTypeEnum;
use inkwell::values::{BasicMetadataValueEnum, IntValue, };
use inkwell::IntPredicate;

use crate::assembler::{Assembler, FnAttr, };
use crate::backend::Backend;
use crate::error::{Error, Result, };

use super::FieldDescriptor;

impl<'ctx> Assembler<'ctx> {
  /// Conditional subtraction of `p`, no-overflow variant: the value fits
  /// the buffer, so `r = a >= p ? a - p : a`.
  pub(crate) fn ensure_finalsub_noo(&self, fd: &FieldDescriptor<'ctx>)
    -> Result<String>
  {
    let name = fd.sym("finalsub_noo");
    if self.is_defined(&name) {
      return Ok(name);
    }
    let fd = fd.clone();
    let params: Vec<BasicTypeEnum> = vec![self.ptr_ty(), fd.field_ty.into()];
    let fname = name.clone();
    self.define_internal_function(&fname, &fd.name.clone(), None, &params,
                                  &[FnAttr::Hot, FnAttr::AlwaysInline],
                                  |asm, p| {
      let r = fd.view(p.ptr(0)?);
      let a = p.field(asm, 1, fd.field_ty)?;
      let n = fd.num_words as usize;
      let a_limbs: Vec<IntValue> = (0..n)
        .map(|i| a.limb(asm, i as u64))
        .collect::<Result<_>>()?;
      let g = fd.modulus_global(asm)?;
      let p_limbs = fd.load_global_limbs(asm, g)?;
      let (d, borrow) = asm.sub_limbs(&fd, &a_limbs, &p_limbs)?;
      for i in 0..n {
        let v = asm.builder()
          .build_select(borrow, a_limbs[i], d[i], "")?
          .into_int_value();
        r.set_limb(asm, i as u64, v)?;
      }
      Ok(None)
    })?;
    Ok(name)
  }

  /// Conditional subtraction of `p`, may-overflow variant: `hi` carries the
  /// bit that fell off the buffer, so subtract when `hi` is set or no
  /// borrow occurs.
  pub(crate) fn ensure_finalsub_mayo(&self, fd: &FieldDescriptor<'ctx>)
    -> Result<String>
  {
    let name = fd.sym("finalsub_mayo");
    if self.is_defined(&name) {
      return Ok(name);
    }
    let fd = fd.clone();
    let params: Vec<BasicTypeEnum> = vec![
      self.ptr_ty(), fd.field_ty.into(), fd.word_ty.into(),
    ];
    let fname = name.clone();
    self.define_internal_function(&fname, &fd.name.clone(), None, &params,
                                  &[FnAttr::Hot, FnAttr::AlwaysInline],
                                  |asm, p| {
      let r = fd.view(p.ptr(0)?);
      let a = p.field(asm, 1, fd.field_ty)?;
      let hi = p.int(2)?;
      let n = fd.num_words as usize;
      let a_limbs: Vec<IntValue> = (0..n)
        .map(|i| a.limb(asm, i as u64))
        .collect::<Result<_>>()?;
      let g = fd.modulus_global(asm)?;
      let p_limbs = fd.load_global_limbs(asm, g)?;
      let (d, borrow) = asm.sub_limbs(&fd, &a_limbs, &p_limbs)?;
      let bd = asm.builder();
      let hi_set = bd.build_int_compare(IntPredicate::NE, hi,
                                        fd.word_ty.const_zero(), "")?;
      let no_borrow = bd.build_not(borrow, "")?;
      let need = bd.build_or(hi_set, no_borrow, "")?;
      for i in 0..n {
        let v = asm.builder()
          .build_select(need, d[i], a_limbs[i], "")?
          .into_int_value();
        r.set_limb(asm, i as u64, v)?;
      }
      Ok(None)
    })?;
    Ok(name)
  }

  fn nvptx_rows(&self, fd: &FieldDescriptor<'ctx>) -> bool {
    // The asm rows drop the pass-one carry-out, which only a spare bit
    // makes unreachable.
    matches!(self.backend(), Backend::NvidiaPtx { .. }) && fd.spare_bits >= 1
  }

  /// One CIOS row on NVPTX: `t += x·ys`, `t` being `len(ys) + 1` limbs.
  /// Two flag chains (low halves, then high halves at offset one) inside a
  /// single asm block.
  fn nvptx_cios_row(&self, fd: &FieldDescriptor<'ctx>, x: IntValue<'ctx>,
                    ys: &[IntValue<'ctx>], t: &mut [IntValue<'ctx>])
    -> Result<()>
  {
    let n = ys.len();
    debug_assert_eq!(t.len(), n + 1);
    let (rc, sfx) = if fd.w == 64 { ("l", "u64") } else { ("r", "u32") };
    let xi = n + 1;
    let y = |j: usize| n + 2 + j;

    let mut tpl = String::new();
    tpl.push_str(&format!("mad.lo.cc.{} $0, ${}, ${}, $0;\n", sfx, xi, y(0)));
    for j in 1..n {
      tpl.push_str(&format!("madc.lo.cc.{} ${}, ${}, ${}, ${};\n",
                            sfx, j, xi, y(j), j));
    }
    tpl.push_str(&format!("addc.{} ${}, ${}, 0;\n", sfx, n, n));
    tpl.push_str(&format!("mad.hi.cc.{} $1, ${}, ${}, $1;\n", sfx, xi, y(0)));
    for j in 1..n {
      let op = if j + 1 == n { "madc.hi" } else { "madc.hi.cc" };
      tpl.push_str(&format!("{}.{} ${}, ${}, ${}, ${};\n",
                            op, sfx, j + 1, xi, y(j), j + 1));
    }

    let mut cons: Vec<String> = Vec::new();
    cons.extend(std::iter::repeat(format!("={}", rc)).take(n + 1));
    cons.push(rc.to_string());
    cons.extend(std::iter::repeat(rc.to_string()).take(n));
    // t arrives tied to the outputs.
    cons.extend((0..=n).map(|i| i.to_string()));

    let word = fd.word_ty;
    let outs: Vec<BasicTypeEnum> =
      std::iter::repeat(BasicTypeEnum::from(word)).take(n + 1).collect();
    let ret_ty = self.context().struct_type(&outs, false);
    let ins: Vec<_> = std::iter::repeat(
        inkwell::types::BasicMetadataTypeEnum::from(word))
      .take(1 + n + n + 1)
      .collect();
    let fn_ty = ret_ty.fn_type(&ins, false);
    let blob = self.context().create_inline_asm(
      fn_ty, tpl, cons.join(","), false, false, None, false);

    let mut args: Vec<BasicMetadataValueEnum> = Vec::with_capacity(2 * n + 2);
    args.push(x.into());
    for &yv in ys {
      args.push(yv.into());
    }
    for &tv in t.iter() {
      args.push(tv.into());
    }
    let ret = self.builder()
      .build_indirect_call(fn_ty, blob, &args, "")?
      .try_as_basic_value().left()
      .ok_or_else(|| Error::Codegen("asm row returned void".into()))?
      .into_struct_value();
    for (j, slot) in t.iter_mut().enumerate() {
      *slot = self.builder()
        .build_extract_value(ret, j as u32, "")?
        .into_int_value();
    }
    Ok(())
  }

  /// Montgomery product. `reduced` performs the final subtraction; the
  /// unreduced variant needs two spare bits and may return values up to
  /// `2p`.
  pub(crate) fn ensure_mty_mul(&self, fd: &FieldDescriptor<'ctx>,
                               reduced: bool)
    -> Result<String>
  {
    if !reduced && fd.spare_bits < 2 {
      return Err(Error::Configuration(format!(
        "unreduced multiplication needs two spare bits, `{}` has {}",
        fd.name, fd.spare_bits)));
    }
    let name = if reduced {
      fd.sym("mty_mul")
    } else {
      fd.sym_b("mty_mulur")
    };
    if self.is_defined(&name) {
      return Ok(name);
    }

    let finalsub = if fd.spare_bits == 0 {
      Some(self.ensure_finalsub_mayo(fd)?)
    } else if reduced {
      Some(self.ensure_finalsub_noo(fd)?)
    } else {
      None
    };

    let fd = fd.clone();
    let params: Vec<BasicTypeEnum> =
      vec![self.ptr_ty(), fd.field_ty.into(), fd.field_ty.into()];
    let fname = name.clone();
    self.define_internal_function(&fname, &fd.name.clone(), None, &params,
                                  &[FnAttr::Hot, FnAttr::InlineHint],
                                  |asm, p| {
      let r = p.ptr(0)?;
      let a = p.field(asm, 1, fd.field_ty)?;
      let b = p.field(asm, 2, fd.field_ty)?;
      let n = fd.num_words as usize;
      let a_limbs: Vec<IntValue> = (0..n)
        .map(|i| a.limb(asm, i as u64))
        .collect::<Result<_>>()?;
      let b_limbs: Vec<IntValue> = (0..n)
        .map(|i| b.limb(asm, i as u64))
        .collect::<Result<_>>()?;
      let g = fd.modulus_global(asm)?;
      let p_limbs = fd.load_global_limbs(asm, g)?;
      let m0 = fd.word_const(fd.m0ninv);

      let mut t = vec![fd.zero; n + 1];
      // Carry bit beyond the accumulator; only reachable without a spare
      // bit.
      let mut hi = fd.zero;

      for i in 0..n {
        if asm.nvptx_rows(&fd) {
          asm.nvptx_cios_row(&fd, a_limbs[i], &b_limbs, &mut t)?;
          let m = asm.builder().build_int_mul(t[0], m0, "")?;
          asm.nvptx_cios_row(&fd, m, &p_limbs, &mut t)?;
        } else {
          // Multiply step: t += a[i]·b.
          let mut c = fd.zero;
          for j in 0..n {
            let (lo, co) = asm.mul_wide_add2(&fd, a_limbs[i], b_limbs[j],
                                             t[j], c)?;
            t[j] = lo;
            c = co;
          }
          if fd.spare_bits >= 1 {
            t[n] = asm.builder().build_int_add(t[n], c, "")?;
          } else {
            let (tn, cy) = asm.addc(&fd, t[n], c, None)?;
            t[n] = tn;
            let cy_w = asm.builder().build_int_z_extend(cy, fd.word_ty, "")?;
            hi = asm.builder().build_int_add(hi, cy_w, "")?;
          }
          // Reduce step: t += m·p zeroes the low limb.
          let m = asm.builder().build_int_mul(t[0], m0, "")?;
          let mut c = fd.zero;
          for j in 0..n {
            let (lo, co) = asm.mul_wide_add2(&fd, m, p_limbs[j], t[j], c)?;
            t[j] = lo;
            c = co;
          }
          if fd.spare_bits >= 1 {
            t[n] = asm.builder().build_int_add(t[n], c, "")?;
          } else {
            let (tn, cy) = asm.addc(&fd, t[n], c, None)?;
            t[n] = tn;
            let cy_w = asm.builder().build_int_z_extend(cy, fd.word_ty, "")?;
            hi = asm.builder().build_int_add(hi, cy_w, "")?;
          }
        }
        // Shift down one word.
        for j in 0..n {
          t[j] = t[j + 1];
        }
        t[n] = if fd.spare_bits == 0 { hi } else { fd.zero };
        hi = fd.zero;
      }

      let tmp = fd.alloca(asm, "mty.t")?;
      for j in 0..n {
        tmp.set_limb(asm, j as u64, t[j])?;
      }
      let tmp_arg = fd.arg(asm, tmp.ptr())?;
      match &finalsub {
        Some(fs) if fd.spare_bits == 0 => {
          asm.call(fs, &[r.into(), tmp_arg, t[n].into()])?;
        },
        Some(fs) => {
          asm.call(fs, &[r.into(), tmp_arg])?;
        },
        None => {
          let out = fd.view(r);
          for j in 0..n {
            out.set_limb(asm, j as u64, t[j])?;
          }
        },
      }
      Ok(None)
    })?;
    Ok(name)
  }

  /// Montgomery square. Delegates to the multiplier; a dedicated
  /// half-product schedule is a possible later specialisation.
  pub(crate) fn ensure_mty_sqr(&self, fd: &FieldDescriptor<'ctx>)
    -> Result<String>
  {
    let name = fd.sym("mty_sqr");
    if self.is_defined(&name) {
      return Ok(name);
    }
    let mul = self.ensure_mty_mul(fd, true)?;
    let fd = fd.clone();
    let params: Vec<BasicTypeEnum> = vec![self.ptr_ty(), fd.field_ty.into()];
    let fname = name.clone();
    self.define_internal_function(&fname, &fd.name.clone(), None, &params,
                                  &[FnAttr::Hot, FnAttr::InlineHint],
                                  |asm, p| {
      let r = p.ptr(0)?;
      let a = p.field(asm, 1, fd.field_ty)?;
      let a1 = fd.arg(asm, a.ptr())?;
      let a2 = fd.arg(asm, a.ptr())?;
      asm.call(&mul, &[r.into(), a1, a2])?;
      Ok(None)
    })?;
    Ok(name)
  }

  /// Square-in-place `count` times (squaring chains).
  pub(crate) fn ensure_mty_nsqr(&self, fd: &FieldDescriptor<'ctx>)
    -> Result<String>
  {
    let name = fd.sym_b("mty_nsqr");
    if self.is_defined(&name) {
      return Ok(name);
    }
    let sqr = self.ensure_mty_sqr(fd)?;
    let fd = fd.clone();
    let params: Vec<BasicTypeEnum> = vec![
      self.ptr_ty(), fd.field_ty.into(), fd.word_ty.into(),
    ];
    let fname = name.clone();
    self.define_internal_function(&fname, &fd.name.clone(), None, &params,
                                  &[FnAttr::Hot, FnAttr::NoInline],
                                  |asm, p| {
      let r_ptr = p.ptr(0)?;
      let r = fd.view(r_ptr);
      let a = p.field(asm, 1, fd.field_ty)?;
      let count = p.int(2)?;
      r.store_from(asm, &a)?;
      let one = fd.word_const(1);
      asm.emit_loop("nsqr", one, count, false, |asm, _i| {
        let r_arg = fd.arg(asm, r_ptr)?;
        asm.call(&sqr, &[r_ptr.into(), r_arg])?;
        Ok(())
      })?;
      Ok(None)
    })?;
    Ok(name)
  }
}
