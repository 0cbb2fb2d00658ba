//! Constant-time conditional operations.
//!
//! `ccopy` is the primitive: a limb-wise select with no branch anywhere.
//! `csetZero`, `csetOne`, `cadd`, `csub` and `cneg` are built on top of it
//! and stay branch-free too; the CFG of every function here is a single
//! basic block, which the test suite asserts.

use inkwell::types::BasicTypeEnum;

use crate::assembler::{Assembler, FnAttr, };
use crate::error::Result;

use super::FieldDescriptor;

impl<'ctx> Assembler<'ctx> {
  /// `if ctl { r = a }`, branch-free.
  pub(crate) fn ensure_ccopy(&self, fd: &FieldDescriptor<'ctx>)
    -> Result<String>
  {
    let name = fd.sym("ccopy");
    if self.is_defined(&name) {
      return Ok(name);
    }
    let fd = fd.clone();
    let params: Vec<BasicTypeEnum> = vec![
      self.ptr_ty(), fd.field_ty.into(), self.bool_ty().into(),
    ];
    let fname = name.clone();
    self.define_internal_function(&fname, &fd.name.clone(), None, &params,
                                  &[FnAttr::Hot, FnAttr::AlwaysInline],
                                  |asm, p| {
      let r = fd.view(p.ptr(0)?);
      let a = p.field(asm, 1, fd.field_ty)?;
      let ctl = p.int(2)?;
      for i in 0..fd.num_words as u64 {
        let cur = r.limb(asm, i)?;
        let src = a.limb(asm, i)?;
        let v = asm.builder().build_select(ctl, src, cur, "")?
          .into_int_value();
        r.set_limb(asm, i, v)?;
      }
      Ok(None)
    })?;
    Ok(name)
  }

  /// `if ctl { r = 0 }`.
  pub(crate) fn ensure_cset_zero(&self, fd: &FieldDescriptor<'ctx>)
    -> Result<String>
  {
    let name = fd.sym("cset_zero");
    if self.is_defined(&name) {
      return Ok(name);
    }
    let fd = fd.clone();
    let params: Vec<BasicTypeEnum> = vec![self.ptr_ty(), self.bool_ty().into()];
    let fname = name.clone();
    self.define_internal_function(&fname, &fd.name.clone(), None, &params,
                                  &[FnAttr::Hot, FnAttr::AlwaysInline],
                                  |asm, p| {
      let r = fd.view(p.ptr(0)?);
      let ctl = p.int(1)?;
      for i in 0..fd.num_words as u64 {
        let cur = r.limb(asm, i)?;
        let v = asm.builder().build_select(ctl, fd.zero, cur, "")?
          .into_int_value();
        r.set_limb(asm, i, v)?;
      }
      Ok(None)
    })?;
    Ok(name)
  }

  /// `if ctl { r = 1 }` in the Montgomery domain, i.e. `R mod p`.
  pub(crate) fn ensure_cset_one(&self, fd: &FieldDescriptor<'ctx>)
    -> Result<String>
  {
    let name = fd.sym("cset_one");
    if self.is_defined(&name) {
      return Ok(name);
    }
    let one = fd.one_global(self)?;
    let fd = fd.clone();
    let params: Vec<BasicTypeEnum> = vec![self.ptr_ty(), self.bool_ty().into()];
    let fname = name.clone();
    self.define_internal_function(&fname, &fd.name.clone(), None, &params,
                                  &[FnAttr::Hot, FnAttr::AlwaysInline],
                                  |asm, p| {
      let r = fd.view(p.ptr(0)?);
      let ctl = p.int(1)?;
      let one_limbs = fd.load_global_limbs(asm, one)?;
      for i in 0..fd.num_words as u64 {
        let cur = r.limb(asm, i)?;
        let v = asm.builder()
          .build_select(ctl, one_limbs[i as usize], cur, "")?
          .into_int_value();
        r.set_limb(asm, i, v)?;
      }
      Ok(None)
    })?;
    Ok(name)
  }

  /// `if ctl { r = r + a mod p }`.
  pub(crate) fn ensure_cadd(&self, fd: &FieldDescriptor<'ctx>)
    -> Result<String>
  {
    let name = fd.sym("cadd");
    if self.is_defined(&name) {
      return Ok(name);
    }
    let add = self.ensure_mod_add(fd)?;
    let ccopy = self.ensure_ccopy(fd)?;
    self.cond_binop(fd, name, add, ccopy)
  }

  /// `if ctl { r = r - a mod p }`.
  pub(crate) fn ensure_csub(&self, fd: &FieldDescriptor<'ctx>)
    -> Result<String>
  {
    let name = fd.sym("csub");
    if self.is_defined(&name) {
      return Ok(name);
    }
    let sub = self.ensure_mod_sub(fd)?;
    let ccopy = self.ensure_ccopy(fd)?;
    self.cond_binop(fd, name, sub, ccopy)
  }

  fn cond_binop(&self, fd: &FieldDescriptor<'ctx>, name: String,
                op: String, ccopy: String)
    -> Result<String>
  {
    let fd = fd.clone();
    let params: Vec<BasicTypeEnum> = vec![
      self.ptr_ty(), fd.field_ty.into(), self.bool_ty().into(),
    ];
    let fname = name.clone();
    self.define_internal_function(&fname, &fd.name.clone(), None, &params,
                                  &[FnAttr::Hot, FnAttr::InlineHint],
                                  |asm, p| {
      let r = p.ptr(0)?;
      let a = p.field(asm, 1, fd.field_ty)?;
      let ctl = p.int(2)?;
      let t = fd.alloca(asm, "cond.tmp")?;
      let r_arg = fd.arg(asm, r)?;
      let a_arg = fd.arg(asm, a.ptr())?;
      asm.call(&op, &[t.ptr().into(), r_arg, a_arg])?;
      let t_arg = fd.arg(asm, t.ptr())?;
      asm.call(&ccopy, &[r.into(), t_arg, ctl.into()])?;
      Ok(None)
    })?;
    Ok(name)
  }

  /// `if ctl { r = -r mod p }`.
  pub(crate) fn ensure_cneg(&self, fd: &FieldDescriptor<'ctx>)
    -> Result<String>
  {
    let name = fd.sym("cneg");
    if self.is_defined(&name) {
      return Ok(name);
    }
    let neg = self.ensure_neg(fd)?;
    let ccopy = self.ensure_ccopy(fd)?;
    let fd = fd.clone();
    let params: Vec<BasicTypeEnum> = vec![self.ptr_ty(), self.bool_ty().into()];
    let fname = name.clone();
    self.define_internal_function(&fname, &fd.name.clone(), None, &params,
                                  &[FnAttr::Hot, FnAttr::InlineHint],
                                  |asm, p| {
      let r = p.ptr(0)?;
      let ctl = p.int(1)?;
      let t = fd.alloca(asm, "cneg.tmp")?;
      let r_arg = fd.arg(asm, r)?;
      asm.call(&neg, &[t.ptr().into(), r_arg])?;
      let t_arg = fd.arg(asm, t.ptr())?;
      asm.call(&ccopy, &[r.into(), t_arg, ctl.into()])?;
      Ok(None)
    })?;
    Ok(name)
  }
}
