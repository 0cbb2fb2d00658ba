//! Modular add/sub-class operations.
//!
//! These load field elements as one wide integer (`intBufTy`) and let LLVM
//! legalise the add/sub into carry chains; reduction is a select on the top
//! bit of the trial subtraction. Two variants exist, chosen by the spare
//! bit count: in-width when at least one spare bit guarantees the sum
//! cannot wrap, widened by one word (then truncated) when there is none.
//!
//! On ARM64 the generic legalisation is poor (it spills the flags between
//! limbs), so 64-bit shapes up to five limbs get a hand-built block of
//! `adds`/`adcs`/`subs`/`sbcs`/`csel` instead.

use inkwell::types::BasicTypeEnum;
use inkwell::values::{BasicValueEnum, IntValue, };
use inkwell::IntPredicate;

use crate::assembler::{Assembler, FnAttr, Params, };
use crate::backend::Backend;
use crate::error::{Error, Result, };

use super::FieldDescriptor;

/// Widest shape the ARM64 asm path covers; beyond it the operand count
/// exceeds what the register allocator can satisfy.
const ARM64_MAX_WORDS: u32 = 5;

fn arm64_path(asm: &Assembler, fd: &FieldDescriptor) -> bool {
  matches!(asm.backend(), Backend::Arm64MacOs)
    && fd.w == 64
    && fd.num_words <= ARM64_MAX_WORDS
}

impl<'ctx> Assembler<'ctx> {
  /// `r = a + b mod p`.
  pub(crate) fn ensure_mod_add(&self, fd: &FieldDescriptor<'ctx>)
    -> Result<String>
  {
    let name = fd.sym("mod_add");
    if self.is_defined(&name) {
      return Ok(name);
    }
    let fd = fd.clone();
    let params: Vec<BasicTypeEnum> =
      vec![self.ptr_ty(), fd.field_ty.into(), fd.field_ty.into()];
    let fname = name.clone();
    self.define_internal_function(&fname, &fd.name.clone(), None, &params,
                                  &[FnAttr::Hot, FnAttr::AlwaysInline],
                                  |asm, p| {
      if arm64_path(asm, &fd) && fd.spare_bits >= 1 {
        return emit_mod_add_arm64(asm, &fd, p);
      }
      let r = fd.view(p.ptr(0)?);
      let a = p.field(asm, 1, fd.field_ty)?;
      let b = p.field(asm, 2, fd.field_ty)?;
      let av = a.load_int(asm, fd.int_buf_ty)?;
      let bv = b.load_int(asm, fd.int_buf_ty)?;
      let m = fd.load_modulus_int(asm)?;
      let bd = asm.builder();
      let nw = fd.num_words * fd.w;

      let res = if fd.spare_bits >= 1 {
        // t = a + b cannot wrap; keep t when t - p borrows.
        let t = bd.build_int_add(av, bv, "")?;
        let u = bd.build_int_sub(t, m, "")?;
        let top = bd.build_right_shift(
          u, fd.int_buf_ty.const_int((nw - 1) as u64, false), false, "")?;
        let borrowed = bd.build_int_truncate(top, asm.bool_ty(), "")?;
        bd.build_select(borrowed, t, u, "")?.into_int_value()
      } else {
        // No spare bit: widen by one word, reduce, truncate back.
        let ext_ty = asm.context().custom_width_int_type(nw + fd.w);
        let ae = bd.build_int_z_extend(av, ext_ty, "")?;
        let be = bd.build_int_z_extend(bv, ext_ty, "")?;
        let me = bd.build_int_z_extend(m, ext_ty, "")?;
        let t = bd.build_int_add(ae, be, "")?;
        let u = bd.build_int_sub(t, me, "")?;
        let top = bd.build_right_shift(
          u, ext_ty.const_int((nw + fd.w - 1) as u64, false), false, "")?;
        let borrowed = bd.build_int_truncate(top, asm.bool_ty(), "")?;
        let sel = bd.build_select(borrowed, t, u, "")?.into_int_value();
        bd.build_int_truncate(sel, fd.int_buf_ty, "")?
      };
      r.store_int(asm, res)?;
      Ok(None)
    })?;
    Ok(name)
  }

  /// `r = a - b mod p`.
  pub(crate) fn ensure_mod_sub(&self, fd: &FieldDescriptor<'ctx>)
    -> Result<String>
  {
    let name = fd.sym("mod_sub");
    if self.is_defined(&name) {
      return Ok(name);
    }
    let fd = fd.clone();
    let params: Vec<BasicTypeEnum> =
      vec![self.ptr_ty(), fd.field_ty.into(), fd.field_ty.into()];
    let fname = name.clone();
    self.define_internal_function(&fname, &fd.name.clone(), None, &params,
                                  &[FnAttr::Hot, FnAttr::AlwaysInline],
                                  |asm, p| {
      if arm64_path(asm, &fd) {
        return emit_mod_sub_arm64(asm, &fd, p);
      }
      let r = fd.view(p.ptr(0)?);
      let a = p.field(asm, 1, fd.field_ty)?;
      let b = p.field(asm, 2, fd.field_ty)?;
      let av = a.load_int(asm, fd.int_buf_ty)?;
      let bv = b.load_int(asm, fd.int_buf_ty)?;
      let m = fd.load_modulus_int(asm)?;
      let bd = asm.builder();

      // Underflow detection is a compare, the fixup an AND-masked add.
      let t = bd.build_int_sub(av, bv, "")?;
      let under = bd.build_int_compare(IntPredicate::ULT, av, bv, "")?;
      let mask = bd.build_select(under, m, fd.int_buf_ty.const_zero(), "")?
        .into_int_value();
      let res = bd.build_int_add(t, mask, "")?;
      r.store_int(asm, res)?;
      Ok(None)
    })?;
    Ok(name)
  }

  /// `r = p - a`, with `neg(0) = 0`.
  pub(crate) fn ensure_neg(&self, fd: &FieldDescriptor<'ctx>)
    -> Result<String>
  {
    let name = fd.sym("neg");
    if self.is_defined(&name) {
      return Ok(name);
    }
    let fd = fd.clone();
    let params: Vec<BasicTypeEnum> = vec![self.ptr_ty(), fd.field_ty.into()];
    let fname = name.clone();
    self.define_internal_function(&fname, &fd.name.clone(), None, &params,
                                  &[FnAttr::Hot, FnAttr::InlineHint],
                                  |asm, p| {
      let r = fd.view(p.ptr(0)?);
      let a = p.field(asm, 1, fd.field_ty)?;
      let av = a.load_int(asm, fd.int_buf_ty)?;
      let m = fd.load_modulus_int(asm)?;
      let bd = asm.builder();
      let u = bd.build_int_sub(m, av, "")?;
      let zero = fd.int_buf_ty.const_zero();
      let is_zero = bd.build_int_compare(IntPredicate::EQ, av, zero, "")?;
      let res = bd.build_select(is_zero, zero, u, "")?.into_int_value();
      r.store_int(asm, res)?;
      Ok(None)
    })?;
    Ok(name)
  }

  /// `r = a / 2 mod p`: funnel shift right one bit, then add `(p+1)/2`
  /// masked by the dropped bit. Branch-free; the result stays below `p`.
  pub(crate) fn ensure_div2(&self, fd: &FieldDescriptor<'ctx>)
    -> Result<String>
  {
    let name = fd.sym("div2");
    if self.is_defined(&name) {
      return Ok(name);
    }
    let fd = fd.clone();
    let params: Vec<BasicTypeEnum> = vec![self.ptr_ty(), fd.field_ty.into()];
    let fname = name.clone();
    self.define_internal_function(&fname, &fd.name.clone(), None, &params,
                                  &[FnAttr::Hot, FnAttr::InlineHint],
                                  |asm, p| {
      let r = fd.view(p.ptr(0)?);
      let a = p.field(asm, 1, fd.field_ty)?;
      let n = fd.num_words as usize;
      let limbs: Vec<IntValue> = (0..n)
        .map(|i| a.limb(asm, i as u64))
        .collect::<Result<_>>()?;
      let bd = asm.builder();

      let one = fd.word_const(1);
      let odd = bd.build_int_truncate(limbs[0], asm.bool_ty(), "")?;

      let mut shifted = Vec::with_capacity(n);
      for i in 0..n {
        let lo = bd.build_right_shift(limbs[i], one, false, "")?;
        let v = if i + 1 < n {
          let hi = bd.build_left_shift(
            limbs[i + 1], fd.word_const((fd.w - 1) as u64), "")?;
          bd.build_or(lo, hi, "")?
        } else {
          lo
        };
        shifted.push(v);
      }

      // mask = odd ? !0 : 0
      let mask = bd.build_int_s_extend(odd, fd.word_ty, "")?;
      let g = fd.pp1d2_global(asm)?;
      let half = fd.load_global_limbs(asm, g)?;
      let addend: Vec<IntValue> = half
        .iter()
        .map(|&h| Ok(asm.builder().build_and(h, mask, "")?))
        .collect::<Result<_>>()?;
      let (sum, _carry) = asm.add_limbs(&fd, &shifted, &addend)?;
      for (i, &s) in sum.iter().enumerate() {
        r.set_limb(asm, i as u64, s)?;
      }
      Ok(None)
    })?;
    Ok(name)
  }

  /// `r = k·a mod p` for the small constants curve formulas need. Emitted
  /// as an unrolled double-and-add chain; other constants are rejected at
  /// codegen time.
  pub(crate) fn ensure_small_mul(&self, fd: &FieldDescriptor<'ctx>, k: u64)
    -> Result<String>
  {
    match k {
      0..=12 | 15 | 21 => { },
      _ => {
        return Err(Error::Configuration(format!(
          "no addition chain for scalar multiplication by {}", k)));
      },
    }
    let name = fd.sym(&format!("smul{}", k));
    if self.is_defined(&name) {
      return Ok(name);
    }
    let add = self.ensure_mod_add(fd)?;
    let fd = fd.clone();
    let params: Vec<BasicTypeEnum> = vec![self.ptr_ty(), fd.field_ty.into()];
    let fname = name.clone();
    self.define_internal_function(&fname, &fd.name.clone(), None, &params,
                                  &[FnAttr::Hot, FnAttr::InlineHint],
                                  |asm, p| {
      let r = fd.view(p.ptr(0)?);
      let a = p.field(asm, 1, fd.field_ty)?;
      if k == 0 {
        r.store_int(asm, fd.int_buf_ty.const_zero())?;
        return Ok(None);
      }
      let t = fd.alloca(asm, "smul.acc")?;
      t.store_from(asm, &a)?;
      for bit in (0..63 - k.leading_zeros()).rev() {
        // Re-materialize the arguments every step: small shapes pass by
        // value and must observe the updated accumulator.
        let t_arg = fd.arg(asm, t.ptr())?;
        asm.call(&add, &[t.ptr().into(), t_arg, t_arg])?;
        if k >> bit & 1 == 1 {
          let t_arg = fd.arg(asm, t.ptr())?;
          let a_arg = fd.arg(asm, a.ptr())?;
          asm.call(&add, &[t.ptr().into(), t_arg, a_arg])?;
        }
      }
      r.store_from(asm, &t)?;
      Ok(None)
    })?;
    Ok(name)
  }
}

fn arm64_reg(i: usize) -> String {
  format!("${}", i)
}

/// `adds`/`adcs` the limbs, trial-subtract the modulus with `subs`/`sbcs`,
/// keep the un-reduced sum when the subtraction borrowed (`cc`). One asm
/// block so the flags never leave the chain. Requires a spare bit (the sum
/// must not carry out of the top limb).
fn emit_mod_add_arm64<'ctx>(asm: &Assembler<'ctx>, fd: &FieldDescriptor<'ctx>,
                            p: &Params<'ctx>)
  -> Result<Option<BasicValueEnum<'ctx>>>
{
  let n = fd.num_words as usize;
  let r = fd.view(p.ptr(0)?);
  let a = p.field(asm, 1, fd.field_ty)?;
  let b = p.field(asm, 2, fd.field_ty)?;

  // Operand layout: $0..$n-1 = t (outs), $n..$2n-1 = u (outs),
  // then inputs a, b, p.
  let t0 = 0;
  let u0 = n;
  let a0 = 2 * n;
  let b0 = 3 * n;
  let p0 = 4 * n;

  let mut tpl = String::new();
  tpl.push_str(&format!("adds {}, {}, {}\n",
                        arm64_reg(t0), arm64_reg(a0), arm64_reg(b0)));
  for i in 1..n {
    tpl.push_str(&format!("adcs {}, {}, {}\n",
                          arm64_reg(t0 + i), arm64_reg(a0 + i),
                          arm64_reg(b0 + i)));
  }
  tpl.push_str(&format!("subs {}, {}, {}\n",
                        arm64_reg(u0), arm64_reg(t0), arm64_reg(p0)));
  for i in 1..n {
    tpl.push_str(&format!("sbcs {}, {}, {}\n",
                          arm64_reg(u0 + i), arm64_reg(t0 + i),
                          arm64_reg(p0 + i)));
  }
  // cc = borrow: the sum was already reduced.
  for i in 0..n {
    tpl.push_str(&format!("csel {}, {}, {}, cc\n",
                          arm64_reg(t0 + i), arm64_reg(t0 + i),
                          arm64_reg(u0 + i)));
  }

  let mut cons: Vec<String> = Vec::new();
  cons.extend(std::iter::repeat("=&r".to_string()).take(2 * n));
  cons.extend(std::iter::repeat("r".to_string()).take(3 * n));
  cons.push("~{cc}".into());

  let word = fd.word_ty;
  let outs: Vec<_> = std::iter::repeat(word.into()).take(2 * n).collect();
  let ret_ty = asm.context().struct_type(&outs, false);
  let ins: Vec<_> = std::iter::repeat(inkwell::types::BasicMetadataTypeEnum::from(word))
    .take(3 * n)
    .collect();
  let fn_ty = ret_ty.fn_type(&ins, false);

  let asm_ptr = asm.context().create_inline_asm(
    fn_ty, tpl, cons.join(","), false, false, None, false);

  let mut args: Vec<inkwell::values::BasicMetadataValueEnum> =
    Vec::with_capacity(3 * n);
  let g = fd.modulus_global(asm)?;
  let pl = fd.load_global_limbs(asm, g)?;
  for i in 0..n {
    args.push(a.limb(asm, i as u64)?.into());
  }
  for i in 0..n {
    args.push(b.limb(asm, i as u64)?.into());
  }
  for &l in pl.iter() {
    args.push(l.into());
  }

  let ret = asm.builder()
    .build_indirect_call(fn_ty, asm_ptr, &args, "")?
    .try_as_basic_value().left()
    .ok_or_else(|| Error::Codegen("asm block returned void".into()))?
    .into_struct_value();
  for i in 0..n {
    let v = asm.builder().build_extract_value(ret, i as u32, "")?
      .into_int_value();
    r.set_limb(asm, i as u64, v)?;
  }
  Ok(None)
}

/// `subs`/`sbcs`, then a per-limb `csel` of the modulus (or zero) while the
/// borrow flag is still live, then `adds`/`adcs` the mask back in.
fn emit_mod_sub_arm64<'ctx>(asm: &Assembler<'ctx>, fd: &FieldDescriptor<'ctx>,
                            p: &Params<'ctx>)
  -> Result<Option<BasicValueEnum<'ctx>>>
{
  let n = fd.num_words as usize;
  let r = fd.view(p.ptr(0)?);
  let a = p.field(asm, 1, fd.field_ty)?;
  let b = p.field(asm, 2, fd.field_ty)?;

  let t0 = 0;
  let u0 = n;
  let a0 = 2 * n;
  let b0 = 3 * n;
  let p0 = 4 * n;

  let mut tpl = String::new();
  tpl.push_str(&format!("subs {}, {}, {}\n",
                        arm64_reg(t0), arm64_reg(a0), arm64_reg(b0)));
  for i in 1..n {
    tpl.push_str(&format!("sbcs {}, {}, {}\n",
                          arm64_reg(t0 + i), arm64_reg(a0 + i),
                          arm64_reg(b0 + i)));
  }
  // cc = borrowed: mask in the modulus, else zero.
  for i in 0..n {
    tpl.push_str(&format!("csel {}, {}, xzr, cc\n",
                          arm64_reg(u0 + i), arm64_reg(p0 + i)));
  }
  tpl.push_str(&format!("adds {}, {}, {}\n",
                        arm64_reg(t0), arm64_reg(t0), arm64_reg(u0)));
  for i in 1..n {
    tpl.push_str(&format!("adcs {}, {}, {}\n",
                          arm64_reg(t0 + i), arm64_reg(t0 + i),
                          arm64_reg(u0 + i)));
  }

  let mut cons: Vec<String> = Vec::new();
  cons.extend(std::iter::repeat("=&r".to_string()).take(2 * n));
  cons.extend(std::iter::repeat("r".to_string()).take(3 * n));
  cons.push("~{cc}".into());

  let word = fd.word_ty;
  let outs: Vec<_> = std::iter::repeat(word.into()).take(2 * n).collect();
  let ret_ty = asm.context().struct_type(&outs, false);
  let ins: Vec<_> = std::iter::repeat(inkwell::types::BasicMetadataTypeEnum::from(word))
    .take(3 * n)
    .collect();
  let fn_ty = ret_ty.fn_type(&ins, false);

  let asm_ptr = asm.context().create_inline_asm(
    fn_ty, tpl, cons.join(","), false, false, None, false);

  let mut args: Vec<inkwell::values::BasicMetadataValueEnum> =
    Vec::with_capacity(3 * n);
  let g = fd.modulus_global(asm)?;
  let pl = fd.load_global_limbs(asm, g)?;
  for i in 0..n {
    args.push(a.limb(asm, i as u64)?.into());
  }
  for i in 0..n {
    args.push(b.limb(asm, i as u64)?.into());
  }
  for &l in pl.iter() {
    args.push(l.into());
  }

  let ret = asm.builder()
    .build_indirect_call(fn_ty, asm_ptr, &args, "")?
    .try_as_basic_value().left()
    .ok_or_else(|| Error::Codegen("asm block returned void".into()))?
    .into_struct_value();
  for i in 0..n {
    let v = asm.builder().build_extract_value(ret, i as u32, "")?
      .into_int_value();
    r.set_limb(asm, i as u64, v)?;
  }
  Ok(None)
}
