//! Jacobian-coordinate group law.
//!
//! `sum` is the unified add-or-double: both formulas share one instruction
//! stream and `ccopy` swaps the operands that differ, so there is no
//! data-dependent branch anywhere. `P + (-P)` needs no special case either:
//! `H = 0` makes `Z₃ = Z₁·Z₂·H = 0`, which already is the identity
//! encoding. Identity operands are resolved by two trailing conditional
//! copies.
//!
//! `double` is the standalone dbl-2009-l schedule (2M + 5S + 6add for
//! `a = 0`); `madd` assumes `Z₂ = 1` and saves one squaring and one
//! multiplication against `sum`.

use inkwell::types::BasicTypeEnum;
use inkwell::values::IntValue;

use crate::assembler::{Assembler, Field, FnAttr, };
use crate::error::Result;
use crate::field::FieldDescriptor;

use super::CurveDescriptor;

/// Pre-resolved internal field routines for one curve's base field. Curve
/// emitters go through this instead of touching symbol names directly.
pub(crate) struct CurveOps<'ctx> {
  pub fd: FieldDescriptor<'ctx>,
  add: String,
  sub: String,
  mul: String,
  sqr: String,
  neg: String,
  div2: String,
  smul3: String,
  ccopy: String,
  cset_zero: String,
  cset_one: String,
}

impl<'ctx> CurveOps<'ctx> {
  pub fn prepare(asm: &Assembler<'ctx>, fd: &FieldDescriptor<'ctx>)
    -> Result<Self>
  {
    Ok(CurveOps {
      add: asm.ensure_mod_add(fd)?,
      sub: asm.ensure_mod_sub(fd)?,
      mul: asm.ensure_mty_mul(fd, true)?,
      sqr: asm.ensure_mty_sqr(fd)?,
      neg: asm.ensure_neg(fd)?,
      div2: asm.ensure_div2(fd)?,
      smul3: asm.ensure_small_mul(fd, 3)?,
      ccopy: asm.ensure_ccopy(fd)?,
      cset_zero: asm.ensure_cset_zero(fd)?,
      cset_one: asm.ensure_cset_one(fd)?,
      fd: fd.clone(),
    })
  }

  pub fn tmp(&self, asm: &Assembler<'ctx>, name: &str) -> Result<Field<'ctx>> {
    self.fd.alloca(asm, name)
  }

  fn bin(&self, asm: &Assembler<'ctx>, op: &str, r: &Field<'ctx>,
         a: &Field<'ctx>, b: &Field<'ctx>)
    -> Result<()>
  {
    let aa = self.fd.arg(asm, a.ptr())?;
    let bb = self.fd.arg(asm, b.ptr())?;
    asm.call(op, &[r.ptr().into(), aa, bb])?;
    Ok(())
  }

  fn un(&self, asm: &Assembler<'ctx>, op: &str, r: &Field<'ctx>,
        a: &Field<'ctx>)
    -> Result<()>
  {
    let aa = self.fd.arg(asm, a.ptr())?;
    asm.call(op, &[r.ptr().into(), aa])?;
    Ok(())
  }

  pub fn add(&self, asm: &Assembler<'ctx>, r: &Field<'ctx>, a: &Field<'ctx>,
             b: &Field<'ctx>) -> Result<()> {
    self.bin(asm, &self.add, r, a, b)
  }

  pub fn sub(&self, asm: &Assembler<'ctx>, r: &Field<'ctx>, a: &Field<'ctx>,
             b: &Field<'ctx>) -> Result<()> {
    self.bin(asm, &self.sub, r, a, b)
  }

  pub fn mul(&self, asm: &Assembler<'ctx>, r: &Field<'ctx>, a: &Field<'ctx>,
             b: &Field<'ctx>) -> Result<()> {
    self.bin(asm, &self.mul, r, a, b)
  }

  pub fn sqr(&self, asm: &Assembler<'ctx>, r: &Field<'ctx>, a: &Field<'ctx>)
    -> Result<()> {
    self.un(asm, &self.sqr, r, a)
  }

  pub fn neg(&self, asm: &Assembler<'ctx>, r: &Field<'ctx>, a: &Field<'ctx>)
    -> Result<()> {
    self.un(asm, &self.neg, r, a)
  }

  pub fn half(&self, asm: &Assembler<'ctx>, r: &Field<'ctx>, a: &Field<'ctx>)
    -> Result<()> {
    self.un(asm, &self.div2, r, a)
  }

  pub fn triple(&self, asm: &Assembler<'ctx>, r: &Field<'ctx>,
                a: &Field<'ctx>) -> Result<()> {
    self.un(asm, &self.smul3, r, a)
  }

  pub fn small_mul(&self, asm: &Assembler<'ctx>, r: &Field<'ctx>,
                   a: &Field<'ctx>, k: u64) -> Result<()> {
    let f = asm.ensure_small_mul(&self.fd, k)?;
    self.un(asm, &f, r, a)
  }

  pub fn ccopy(&self, asm: &Assembler<'ctx>, r: &Field<'ctx>,
               a: &Field<'ctx>, ctl: IntValue<'ctx>) -> Result<()> {
    let aa = self.fd.arg(asm, a.ptr())?;
    asm.call(&self.ccopy, &[r.ptr().into(), aa, ctl.into()])?;
    Ok(())
  }

  pub fn cset_zero(&self, asm: &Assembler<'ctx>, r: &Field<'ctx>,
                   ctl: IntValue<'ctx>) -> Result<()> {
    asm.call(&self.cset_zero, &[r.ptr().into(), ctl.into()])?;
    Ok(())
  }

  pub fn cset_one(&self, asm: &Assembler<'ctx>, r: &Field<'ctx>,
                  ctl: IntValue<'ctx>) -> Result<()> {
    asm.call(&self.cset_one, &[r.ptr().into(), ctl.into()])?;
    Ok(())
  }

  pub fn is_zero(&self, asm: &Assembler<'ctx>, a: &Field<'ctx>)
    -> Result<IntValue<'ctx>>
  {
    a.is_zero(asm, self.fd.int_buf_ty)
  }

  pub fn copy(&self, asm: &Assembler<'ctx>, r: &Field<'ctx>, a: &Field<'ctx>)
    -> Result<()>
  {
    r.store_from(asm, a)
  }

  /// The halved doubling slope `M`, dispatched on the curve coefficient at
  /// emission time:
  /// `a = 0`:  `M = 3·X₁²/2`
  /// `a = -3`: `M = 3·(X₁ - Z₁²)(X₁ + Z₁²)/2`
  /// general:  `M = (3·X₁² + a·Z₁⁴)/2`
  pub fn slope(&self, asm: &Assembler<'ctx>, m: &Field<'ctx>,
               x1: &Field<'ctx>, z1z1: &Field<'ctx>, coef_a: i64)
    -> Result<()>
  {
    match coef_a {
      0 => {
        self.sqr(asm, m, x1)?;
        self.triple(asm, m, m)?;
      },
      -3 => {
        let t1 = self.tmp(asm, "slope.t1")?;
        let t2 = self.tmp(asm, "slope.t2")?;
        self.sub(asm, &t1, x1, z1z1)?;
        self.add(asm, &t2, x1, z1z1)?;
        self.mul(asm, m, &t1, &t2)?;
        self.triple(asm, m, m)?;
      },
      a => {
        self.sqr(asm, m, x1)?;
        self.triple(asm, m, m)?;
        let z4 = self.tmp(asm, "slope.z4")?;
        self.sqr(asm, &z4, z1z1)?;
        self.small_mul(asm, &z4, &z4, a.unsigned_abs())?;
        if a < 0 {
          self.neg(asm, &z4, &z4)?;
        }
        self.add(asm, m, m, &z4)?;
      },
    }
    self.half(asm, m, m)
  }
}

impl<'ctx> Assembler<'ctx> {
  /// Unified Jacobian addition, complete up to endomorphisms.
  pub(crate) fn ensure_ec_sum(&self, cd: &CurveDescriptor<'ctx>)
    -> Result<String>
  {
    let name = cd.sym("add");
    if self.is_defined(&name) {
      return Ok(name);
    }
    let ops = CurveOps::prepare(self, &cd.fp)?;
    let cd = cd.clone();
    let params: Vec<BasicTypeEnum> =
      vec![self.ptr_ty(), self.ptr_ty(), self.ptr_ty()];
    let fname = name.clone();
    self.define_internal_function(&fname, &cd.fp.name.clone(), None, &params,
                                  &[FnAttr::Hot, FnAttr::NoInline],
                                  |asm, prm| {
      let out = cd.jac(prm.ptr(0)?);
      let pp = cd.jac(prm.ptr(1)?);
      let qq = cd.jac(prm.ptr(2)?);
      let (px, py, pz) = (pp.x(asm)?, pp.y(asm)?, pp.z(asm)?);
      let (qx, qy, qz) = (qq.x(asm)?, qq.y(asm)?, qq.z(asm)?);

      let p_inf = ops.is_zero(asm, &pz)?;
      let q_inf = ops.is_zero(asm, &qz)?;

      let z1z1 = ops.tmp(asm, "z1z1")?;
      let z2z2 = ops.tmp(asm, "z2z2")?;
      let u1 = ops.tmp(asm, "u1")?;
      let u2 = ops.tmp(asm, "u2")?;
      let s1 = ops.tmp(asm, "s1")?;
      let s2 = ops.tmp(asm, "s2")?;
      let h = ops.tmp(asm, "h")?;
      let rr = ops.tmp(asm, "rr")?;

      ops.sqr(asm, &z1z1, &pz)?;
      ops.sqr(asm, &z2z2, &qz)?;
      ops.mul(asm, &u1, &px, &z2z2)?;
      ops.mul(asm, &u2, &qx, &z1z1)?;
      ops.mul(asm, &s1, &py, &qz)?;
      ops.mul(asm, &s1, &s1, &z2z2)?;
      ops.mul(asm, &s2, &qy, &pz)?;
      ops.mul(asm, &s2, &s2, &z1z1)?;
      ops.sub(asm, &h, &u2, &u1)?;
      ops.sub(asm, &rr, &s2, &s1)?;

      let bd = asm.builder();
      let h_zero = ops.is_zero(asm, &h)?;
      let r_zero = ops.is_zero(asm, &rr)?;
      let is_dbl = bd.build_and(h_zero, r_zero, "")?;
      let not_dbl = bd.build_not(is_dbl, "")?;

      // Re-point the shared buffers for the doubling formula.
      ops.ccopy(asm, &h, &py, is_dbl)?;   // H        <- Y1
      ops.ccopy(asm, &u1, &px, is_dbl)?;  // U1       <- X1
      let hh = ops.tmp(asm, "hh")?;
      ops.sqr(asm, &hh, &h)?;             // HH  or YY
      let v = ops.tmp(asm, "v")?;
      ops.mul(asm, &v, &u1, &hh)?;        // V   or S

      let hhh = ops.tmp(asm, "hhh")?;
      ops.mul(asm, &hhh, &h, &hh)?;       // HHH (garbage when doubling)
      let hz = ops.tmp(asm, "hz")?;
      ops.copy(asm, &hz, &hhh)?;
      ops.cset_zero(asm, &hz, is_dbl)?;   // X3 subtracts HHH only on add
      ops.ccopy(asm, &hhh, &hh, is_dbl)?; // HHH      <- YY
      ops.ccopy(asm, &s1, &hh, is_dbl)?;  // S1       <- YY
      let wv = ops.tmp(asm, "w")?;
      ops.mul(asm, &wv, &s1, &hhh)?;      // S1·HHH or YY²

      let m = ops.tmp(asm, "m")?;
      ops.slope(asm, &m, &px, &z1z1, cd.coef_a)?;
      ops.ccopy(asm, &m, &rr, not_dbl)?;  // M        <- R on the add path

      let mm = ops.tmp(asm, "mm")?;
      ops.sqr(asm, &mm, &m)?;
      let x3 = ops.tmp(asm, "x3")?;
      ops.sub(asm, &x3, &mm, &hz)?;       // M² - HHH
      ops.sub(asm, &x3, &x3, &v)?;
      ops.sub(asm, &x3, &x3, &v)?;        // ... - 2V

      let y3 = ops.tmp(asm, "y3")?;
      ops.sub(asm, &y3, &v, &x3)?;
      ops.mul(asm, &y3, &m, &y3)?;
      ops.sub(asm, &y3, &y3, &wv)?;       // M·(V - X3) - W

      let zz = ops.tmp(asm, "zz")?;
      ops.copy(asm, &zz, &qz)?;
      ops.cset_one(asm, &zz, is_dbl)?;    // Z2  or 1
      let z3 = ops.tmp(asm, "z3")?;
      ops.mul(asm, &z3, &pz, &zz)?;
      ops.mul(asm, &z3, &z3, &h)?;        // Z1·Z2·H or Z1·Y1

      // Identity operands override the formula output.
      ops.ccopy(asm, &x3, &qx, p_inf)?;
      ops.ccopy(asm, &y3, &qy, p_inf)?;
      ops.ccopy(asm, &z3, &qz, p_inf)?;
      ops.ccopy(asm, &x3, &px, q_inf)?;
      ops.ccopy(asm, &y3, &py, q_inf)?;
      ops.ccopy(asm, &z3, &pz, q_inf)?;

      ops.copy(asm, &out.x(asm)?, &x3)?;
      ops.copy(asm, &out.y(asm)?, &y3)?;
      ops.copy(asm, &out.z(asm)?, &z3)?;
      Ok(None)
    })?;
    Ok(name)
  }

  /// Jacobian doubling, dbl-2009-l.
  pub(crate) fn ensure_ec_double(&self, cd: &CurveDescriptor<'ctx>)
    -> Result<String>
  {
    let name = cd.sym("dbl");
    if self.is_defined(&name) {
      return Ok(name);
    }
    let ops = CurveOps::prepare(self, &cd.fp)?;
    let cd = cd.clone();
    let params: Vec<BasicTypeEnum> = vec![self.ptr_ty(), self.ptr_ty()];
    let fname = name.clone();
    self.define_internal_function(&fname, &cd.fp.name.clone(), None, &params,
                                  &[FnAttr::Hot, FnAttr::NoInline],
                                  |asm, prm| {
      let out = cd.jac(prm.ptr(0)?);
      let pp = cd.jac(prm.ptr(1)?);
      let (px, py, pz) = (pp.x(asm)?, pp.y(asm)?, pp.z(asm)?);

      let a_ = ops.tmp(asm, "a")?;
      let b_ = ops.tmp(asm, "b")?;
      let c_ = ops.tmp(asm, "c")?;
      let d = ops.tmp(asm, "d")?;
      let e = ops.tmp(asm, "e")?;

      ops.sqr(asm, &a_, &px)?;                 // A = X²
      ops.sqr(asm, &b_, &py)?;                 // B = Y²
      ops.sqr(asm, &c_, &b_)?;                 // C = B²
      ops.add(asm, &d, &px, &b_)?;
      ops.sqr(asm, &d, &d)?;
      ops.sub(asm, &d, &d, &a_)?;
      ops.sub(asm, &d, &d, &c_)?;
      ops.add(asm, &d, &d, &d)?;               // D = 2((X+B)² - A - C)

      // E is the full slope numerator, per curve coefficient.
      match cd.coef_a {
        0 => {
          ops.triple(asm, &e, &a_)?;           // E = 3A
        },
        -3 => {
          let zz = ops.tmp(asm, "zz")?;
          let t1 = ops.tmp(asm, "t1")?;
          let t2 = ops.tmp(asm, "t2")?;
          ops.sqr(asm, &zz, &pz)?;
          ops.sub(asm, &t1, &px, &zz)?;
          ops.add(asm, &t2, &px, &zz)?;
          ops.mul(asm, &e, &t1, &t2)?;
          ops.triple(asm, &e, &e)?;            // E = 3(X - Z²)(X + Z²)
        },
        a => {
          let zz = ops.tmp(asm, "zz")?;
          let z4 = ops.tmp(asm, "z4")?;
          ops.sqr(asm, &zz, &pz)?;
          ops.sqr(asm, &z4, &zz)?;
          ops.small_mul(asm, &z4, &z4, a.unsigned_abs())?;
          if a < 0 {
            ops.neg(asm, &z4, &z4)?;
          }
          ops.triple(asm, &e, &a_)?;
          ops.add(asm, &e, &e, &z4)?;          // E = 3A + a·Z⁴
        },
      }

      let f = ops.tmp(asm, "f")?;
      ops.sqr(asm, &f, &e)?;                   // F = E²
      let x3 = ops.tmp(asm, "x3")?;
      let t = ops.tmp(asm, "t")?;
      ops.add(asm, &t, &d, &d)?;
      ops.sub(asm, &x3, &f, &t)?;              // X3 = F - 2D

      let y3 = ops.tmp(asm, "y3")?;
      ops.sub(asm, &y3, &d, &x3)?;
      ops.mul(asm, &y3, &e, &y3)?;
      ops.small_mul(asm, &t, &c_, 8)?;
      ops.sub(asm, &y3, &y3, &t)?;             // Y3 = E(D - X3) - 8C

      let z3 = ops.tmp(asm, "z3")?;
      ops.mul(asm, &z3, &py, &pz)?;
      ops.add(asm, &z3, &z3, &z3)?;            // Z3 = 2YZ; identity stays put

      ops.copy(asm, &out.x(asm)?, &x3)?;
      ops.copy(asm, &out.y(asm)?, &y3)?;
      ops.copy(asm, &out.z(asm)?, &z3)?;
      Ok(None)
    })?;
    Ok(name)
  }

  /// Mixed Jacobian + affine addition (`Z₂ = 1`).
  pub(crate) fn ensure_ec_madd(&self, cd: &CurveDescriptor<'ctx>)
    -> Result<String>
  {
    let name = cd.sym("madd");
    if self.is_defined(&name) {
      return Ok(name);
    }
    let ops = CurveOps::prepare(self, &cd.fp)?;
    let cd = cd.clone();
    let params: Vec<BasicTypeEnum> =
      vec![self.ptr_ty(), self.ptr_ty(), self.ptr_ty()];
    let fname = name.clone();
    self.define_internal_function(&fname, &cd.fp.name.clone(), None, &params,
                                  &[FnAttr::Hot, FnAttr::NoInline],
                                  |asm, prm| {
      let out = cd.jac(prm.ptr(0)?);
      let pp = cd.jac(prm.ptr(1)?);
      let qq = cd.aff(prm.ptr(2)?);
      let (px, py, pz) = (pp.x(asm)?, pp.y(asm)?, pp.z(asm)?);
      let (qx, qy) = (qq.x(asm)?, qq.y(asm)?);

      let p_inf = ops.is_zero(asm, &pz)?;
      let qx_zero = ops.is_zero(asm, &qx)?;
      let qy_zero = ops.is_zero(asm, &qy)?;
      let q_inf = asm.builder().build_and(qx_zero, qy_zero, "")?;

      let z1z1 = ops.tmp(asm, "z1z1")?;
      let u2 = ops.tmp(asm, "u2")?;
      let s2 = ops.tmp(asm, "s2")?;
      let h = ops.tmp(asm, "h")?;
      let rr = ops.tmp(asm, "rr")?;

      ops.sqr(asm, &z1z1, &pz)?;
      ops.mul(asm, &u2, &qx, &z1z1)?;          // U2 = X2·Z1² (U1 = X1)
      ops.mul(asm, &s2, &qy, &pz)?;
      ops.mul(asm, &s2, &s2, &z1z1)?;          // S2 = Y2·Z1³ (S1 = Y1)
      ops.sub(asm, &h, &u2, &px)?;
      ops.sub(asm, &rr, &s2, &py)?;

      let bd = asm.builder();
      let h_zero = ops.is_zero(asm, &h)?;
      let r_zero = ops.is_zero(asm, &rr)?;
      let is_dbl = bd.build_and(h_zero, r_zero, "")?;
      let not_dbl = bd.build_not(is_dbl, "")?;

      let s1 = ops.tmp(asm, "s1")?;
      ops.copy(asm, &s1, &py)?;
      ops.ccopy(asm, &h, &py, is_dbl)?;        // H <- Y1 when doubling
      let hh = ops.tmp(asm, "hh")?;
      ops.sqr(asm, &hh, &h)?;                  // HH or YY
      let v = ops.tmp(asm, "v")?;
      ops.mul(asm, &v, &px, &hh)?;             // V = X1·HH, S = X1·YY

      let hhh = ops.tmp(asm, "hhh")?;
      ops.mul(asm, &hhh, &h, &hh)?;
      let hz = ops.tmp(asm, "hz")?;
      ops.copy(asm, &hz, &hhh)?;
      ops.cset_zero(asm, &hz, is_dbl)?;
      ops.ccopy(asm, &hhh, &hh, is_dbl)?;
      ops.ccopy(asm, &s1, &hh, is_dbl)?;
      let wv = ops.tmp(asm, "w")?;
      ops.mul(asm, &wv, &s1, &hhh)?;

      let m = ops.tmp(asm, "m")?;
      ops.slope(asm, &m, &px, &z1z1, cd.coef_a)?;
      ops.ccopy(asm, &m, &rr, not_dbl)?;

      let mm = ops.tmp(asm, "mm")?;
      ops.sqr(asm, &mm, &m)?;
      let x3 = ops.tmp(asm, "x3")?;
      ops.sub(asm, &x3, &mm, &hz)?;
      ops.sub(asm, &x3, &x3, &v)?;
      ops.sub(asm, &x3, &x3, &v)?;

      let y3 = ops.tmp(asm, "y3")?;
      ops.sub(asm, &y3, &v, &x3)?;
      ops.mul(asm, &y3, &m, &y3)?;
      ops.sub(asm, &y3, &y3, &wv)?;

      let z3 = ops.tmp(asm, "z3")?;
      ops.mul(asm, &z3, &pz, &h)?;             // Z1·H or Z1·Y1

      // P at infinity: lift Q to Jacobian. Q at infinity: keep P.
      ops.ccopy(asm, &x3, &qx, p_inf)?;
      ops.ccopy(asm, &y3, &qy, p_inf)?;
      ops.cset_one(asm, &z3, p_inf)?;
      ops.ccopy(asm, &x3, &px, q_inf)?;
      ops.ccopy(asm, &y3, &py, q_inf)?;
      ops.ccopy(asm, &z3, &pz, q_inf)?;

      ops.copy(asm, &out.x(asm)?, &x3)?;
      ops.copy(asm, &out.y(asm)?, &y3)?;
      ops.copy(asm, &out.z(asm)?, &z3)?;
      Ok(None)
    })?;
    Ok(name)
  }
}
