//! Word-level carry primitives.
//!
//! Everything multi-limb funnels through here so the backend dispatch lives
//! in one place: x86-64 uses the target's `addcarry`/`subborrow` intrinsics,
//! every other backend the generic `uadd`/`usub.with.overflow` pair (the
//! NVPTX multiplier rows and the ARM64 add/sub bodies bypass these with
//! inline asm; see the respective emitters).

use inkwell::intrinsics::Intrinsic;
use inkwell::values::{FunctionValue, IntValue, };
use inkwell::IntPredicate;

use crate::assembler::Assembler;
use crate::backend::Backend;
use crate::error::{Error, Result, };

use super::FieldDescriptor;

impl<'ctx> Assembler<'ctx> {
  fn overflow_intrinsic(&self, name: &str, fd: &FieldDescriptor<'ctx>)
    -> Result<FunctionValue<'ctx>>
  {
    let intr = Intrinsic::find(name)
      .ok_or_else(|| Error::Codegen(format!("intrinsic `{}` not found", name)))?;
    intr.get_declaration(self.module(), &[fd.word_ty.into()])
      .ok_or_else(|| {
        Error::Codegen(format!("no declaration for `{}` at u{}", name, fd.w))
      })
  }

  fn x86_carry_intrinsic(&self, name: &str) -> Result<FunctionValue<'ctx>> {
    let intr = Intrinsic::find(name)
      .ok_or_else(|| Error::Codegen(format!("intrinsic `{}` not found", name)))?;
    intr.get_declaration(self.module(), &[])
      .ok_or_else(|| Error::Codegen(format!("no declaration for `{}`", name)))
  }

  fn use_x86_chain(&self, fd: &FieldDescriptor<'ctx>) -> bool {
    matches!(self.backend(), Backend::X86_64Linux) && (fd.w == 32 || fd.w == 64)
  }

  /// `a + b + carry_in`, carry flag as `i1`.
  pub(crate) fn addc(&self, fd: &FieldDescriptor<'ctx>,
                     a: IntValue<'ctx>, b: IntValue<'ctx>,
                     carry_in: Option<IntValue<'ctx>>)
    -> Result<(IntValue<'ctx>, IntValue<'ctx>)>
  {
    let bd = self.builder();
    if self.use_x86_chain(fd) {
      let f = self.x86_carry_intrinsic(&format!("llvm.x86.addcarry.{}", fd.w))?;
      let i8t = self.context().i8_type();
      let cin = match carry_in {
        Some(c) => bd.build_int_z_extend(c, i8t, "")?,
        None => i8t.const_zero(),
      };
      let ret = self.builder()
        .build_call(f, &[cin.into(), a.into(), b.into()], "")?
        .try_as_basic_value().left()
        .ok_or_else(|| Error::Codegen("addcarry returned void".into()))?
        .into_struct_value();
      let cout = bd.build_extract_value(ret, 0, "")?.into_int_value();
      let sum = bd.build_extract_value(ret, 1, "")?.into_int_value();
      let cout = bd.build_int_compare(IntPredicate::NE, cout,
                                      i8t.const_zero(), "")?;
      return Ok((sum, cout));
    }

    let f = self.overflow_intrinsic("llvm.uadd.with.overflow", fd)?;
    let call = |x: IntValue<'ctx>, y: IntValue<'ctx>| -> Result<(IntValue<'ctx>, IntValue<'ctx>)> {
      let ret = self.builder()
        .build_call(f, &[x.into(), y.into()], "")?
        .try_as_basic_value().left()
        .ok_or_else(|| Error::Codegen("uadd.with.overflow returned void".into()))?
        .into_struct_value();
      let s = self.builder().build_extract_value(ret, 0, "")?.into_int_value();
      let o = self.builder().build_extract_value(ret, 1, "")?.into_int_value();
      Ok((s, o))
    };
    let (s1, c1) = call(a, b)?;
    match carry_in {
      None => Ok((s1, c1)),
      Some(cin) => {
        let cin_w = bd.build_int_z_extend(cin, fd.word_ty, "")?;
        let (s2, c2) = call(s1, cin_w)?;
        let c = bd.build_or(c1, c2, "")?;
        Ok((s2, c))
      },
    }
  }

  /// `a - b - borrow_in`, borrow flag as `i1`.
  pub(crate) fn subb(&self, fd: &FieldDescriptor<'ctx>,
                     a: IntValue<'ctx>, b: IntValue<'ctx>,
                     borrow_in: Option<IntValue<'ctx>>)
    -> Result<(IntValue<'ctx>, IntValue<'ctx>)>
  {
    let bd = self.builder();
    if self.use_x86_chain(fd) {
      let f = self.x86_carry_intrinsic(&format!("llvm.x86.subborrow.{}", fd.w))?;
      let i8t = self.context().i8_type();
      let bin = match borrow_in {
        Some(b) => bd.build_int_z_extend(b, i8t, "")?,
        None => i8t.const_zero(),
      };
      let ret = self.builder()
        .build_call(f, &[bin.into(), a.into(), b.into()], "")?
        .try_as_basic_value().left()
        .ok_or_else(|| Error::Codegen("subborrow returned void".into()))?
        .into_struct_value();
      let bout = bd.build_extract_value(ret, 0, "")?.into_int_value();
      let diff = bd.build_extract_value(ret, 1, "")?.into_int_value();
      let bout = bd.build_int_compare(IntPredicate::NE, bout,
                                      i8t.const_zero(), "")?;
      return Ok((diff, bout));
    }

    let f = self.overflow_intrinsic("llvm.usub.with.overflow", fd)?;
    let call = |x: IntValue<'ctx>, y: IntValue<'ctx>| -> Result<(IntValue<'ctx>, IntValue<'ctx>)> {
      let ret = self.builder()
        .build_call(f, &[x.into(), y.into()], "")?
        .try_as_basic_value().left()
        .ok_or_else(|| Error::Codegen("usub.with.overflow returned void".into()))?
        .into_struct_value();
      let d = self.builder().build_extract_value(ret, 0, "")?.into_int_value();
      let o = self.builder().build_extract_value(ret, 1, "")?.into_int_value();
      Ok((d, o))
    };
    let (d1, b1) = call(a, b)?;
    match borrow_in {
      None => Ok((d1, b1)),
      Some(bin) => {
        let bin_w = bd.build_int_z_extend(bin, fd.word_ty, "")?;
        let (d2, b2) = call(d1, bin_w)?;
        let b = bd.build_or(b1, b2, "")?;
        Ok((d2, b))
      },
    }
  }

  /// Limb-wise `a - b`, returning the difference limbs and the final borrow.
  pub(crate) fn sub_limbs(&self, fd: &FieldDescriptor<'ctx>,
                          a: &[IntValue<'ctx>], b: &[IntValue<'ctx>])
    -> Result<(Vec<IntValue<'ctx>>, IntValue<'ctx>)>
  {
    debug_assert_eq!(a.len(), b.len());
    let mut out = Vec::with_capacity(a.len());
    let mut borrow = None;
    for (&x, &y) in a.iter().zip(b.iter()) {
      let (d, bo) = self.subb(fd, x, y, borrow)?;
      out.push(d);
      borrow = Some(bo);
    }
    Ok((out, borrow.unwrap()))
  }

  /// Limb-wise `a + b`, returning the sum limbs and the final carry.
  pub(crate) fn add_limbs(&self, fd: &FieldDescriptor<'ctx>,
                          a: &[IntValue<'ctx>], b: &[IntValue<'ctx>])
    -> Result<(Vec<IntValue<'ctx>>, IntValue<'ctx>)>
  {
    debug_assert_eq!(a.len(), b.len());
    let mut out = Vec::with_capacity(a.len());
    let mut carry = None;
    for (&x, &y) in a.iter().zip(b.iter()) {
      let (s, co) = self.addc(fd, x, y, carry)?;
      out.push(s);
      carry = Some(co);
    }
    Ok((out, carry.unwrap()))
  }

  /// `x·y + c + d` over the double-width type: returns `(lo, hi)`. The sum
  /// cannot overflow `2w` bits. This is the CIOS inner step.
  pub(crate) fn mul_wide_add2(&self, fd: &FieldDescriptor<'ctx>,
                              x: IntValue<'ctx>, y: IntValue<'ctx>,
                              c: IntValue<'ctx>, d: IntValue<'ctx>)
    -> Result<(IntValue<'ctx>, IntValue<'ctx>)>
  {
    let bd = self.builder();
    let xe = bd.build_int_z_extend(x, fd.word2x_ty, "")?;
    let ye = bd.build_int_z_extend(y, fd.word2x_ty, "")?;
    let ce = bd.build_int_z_extend(c, fd.word2x_ty, "")?;
    let de = bd.build_int_z_extend(d, fd.word2x_ty, "")?;
    let m = bd.build_int_mul(xe, ye, "")?;
    let m = bd.build_int_add(m, ce, "")?;
    let m = bd.build_int_add(m, de, "")?;
    let lo = bd.build_int_truncate(m, fd.word_ty, "")?;
    let shift = fd.word2x_ty.const_int(fd.w as u64, false);
    let hi_wide = bd.build_right_shift(m, shift, false, "")?;
    let hi = bd.build_int_truncate(hi_wide, fd.word_ty, "")?;
    Ok((lo, hi))
  }
}
