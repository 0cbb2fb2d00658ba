//! Prime-field descriptors and the public field-kernel surface.
//!
//! A [`FieldDescriptor`] fixes the shape of one field: modulus, word size,
//! limb count, the derived IR types and the host-precomputed Montgomery
//! constants. Every arithmetic emitter is parameterized by a descriptor and
//! emits at most once per `(descriptor, operation)`; the assembler's
//! function table enforces that.
//!
//! All values handled by the arithmetic kernels live in the Montgomery
//! domain; `to_mont` / `from_mont` are the boundary.

use inkwell::types::{ArrayType, IntType, };
use inkwell::values::{ArrayValue, BasicMetadataValueEnum, GlobalValue,
                      IntValue, PointerValue, };
use inkwell::IntPredicate;

use log::debug;

use crate::assembler::{Assembler, Field, };
use crate::bignum::BigNum;
use crate::error::{Error, Result, };

mod addsub;
mod carries;
mod cond;
mod montgomery;

/// Value record describing one prime field `Fp`.
///
/// Holds borrows of IR types from the assembler's context; must not outlive
/// it. Cheap to clone.
#[derive(Clone)]
pub struct FieldDescriptor<'ctx> {
  /// Symbol prefix for everything emitted on behalf of this field.
  pub name: String,
  /// Big-endian hex of `p`, as supplied.
  pub modulus_hex: String,
  pub bits: u32,
  /// Word size, 32 or 64.
  pub w: u32,
  pub num_words: u32,
  /// `numWords·w − bits`; selects the reduction variant.
  pub spare_bits: u32,

  pub word_ty: IntType<'ctx>,
  pub word2x_ty: IntType<'ctx>,
  /// Single wide integer of `numWords·w` bits.
  pub int_buf_ty: IntType<'ctx>,
  /// `[numWords x wordTy]`.
  pub field_ty: ArrayType<'ctx>,
  pub zero: IntValue<'ctx>,
  pub zero_i1: IntValue<'ctx>,

  // Host-side precompute, little-endian limbs below 2^w.
  pub(crate) modulus: Vec<u64>,
  pub(crate) monty_one: Vec<u64>,
  pub(crate) monty_r2: Vec<u64>,
  pub(crate) half_plus_one: Vec<u64>,
  pub(crate) m0ninv: u64,
}

struct Precomputed {
  modulus: Vec<u64>,
  monty_one: Vec<u64>,
  monty_r2: Vec<u64>,
  half_plus_one: Vec<u64>,
  m0ninv: u64,
}

fn precompute<W: crate::bignum::Word>(modulus_hex: &str, bits: u32)
  -> Result<Precomputed>
{
  let p = BigNum::<W>::parse_modulus(modulus_hex, bits)?;
  if !p.is_odd() {
    return Err(Error::Configuration(
      "modulus must be odd for Montgomery arithmetic".into()));
  }
  Ok(Precomputed {
    monty_one: BigNum::monty_one(&p).limbs_u64(),
    monty_r2: BigNum::monty_r2(&p).limbs_u64(),
    half_plus_one: BigNum::half_plus_one(&p).limbs_u64(),
    m0ninv: BigNum::<W>::m0ninv(p.limbs[0]).to_u64(),
    modulus: p.limbs_u64(),
  })
}

impl<'ctx> Assembler<'ctx> {
  /// Build a field descriptor. `v` is the SIMD vector length and must be 1;
  /// the modulus must be odd and its MSB must sit exactly at `bits - 1`.
  pub fn configure_field(&self, name: &str, bits: u32, modulus_hex: &str,
                         v: u32, w: u32)
    -> Result<FieldDescriptor<'ctx>>
  {
    if v != 1 {
      return Err(Error::Configuration(format!(
        "SIMD vector length {} is not supported (only 1)", v)));
    }
    let pre = match w {
      32 => precompute::<u32>(modulus_hex, bits)?,
      64 => precompute::<u64>(modulus_hex, bits)?,
      _ => {
        return Err(Error::Configuration(format!(
          "word size {} is not supported (only 32 and 64)", w)));
      },
    };

    let num_words = (bits + w - 1) / w;
    let spare_bits = num_words * w - bits;
    let ctx = self.context();
    let word_ty = ctx.custom_width_int_type(w);
    let word2x_ty = ctx.custom_width_int_type(2 * w);
    let int_buf_ty = ctx.custom_width_int_type(num_words * w);
    let field_ty = word_ty.array_type(num_words);

    debug!("field `{}`: {} bits, {} x u{}, {} spare bits, m0ninv {:#x}",
           name, bits, num_words, w, spare_bits, pre.m0ninv);

    Ok(FieldDescriptor {
      name: name.into(),
      modulus_hex: modulus_hex.into(),
      bits,
      w,
      num_words,
      spare_bits,
      word_ty,
      word2x_ty,
      int_buf_ty,
      field_ty,
      zero: word_ty.const_zero(),
      zero_i1: ctx.bool_type().const_zero(),
      modulus: pre.modulus,
      monty_one: pre.monty_one,
      monty_r2: pre.monty_r2,
      half_plus_one: pre.half_plus_one,
      m0ninv: pre.m0ninv,
    })
  }
}

impl<'ctx> FieldDescriptor<'ctx> {
  /// `u<w>x<numWords>`; the shape part of every internal symbol.
  pub fn shape(&self) -> String {
    format!("u{}x{}", self.w, self.num_words)
  }

  /// Internal symbol for `op`. The descriptor prefix keeps symbols unique
  /// when two fields share a shape.
  pub(crate) fn sym(&self, op: &str) -> String {
    format!("_{}_{}_{}", self.name, op, self.shape())
  }

  /// Internal symbol for an `op` whose code depends on the spare-bit count.
  pub(crate) fn sym_b(&self, op: &str) -> String {
    format!("_{}_{}_{}b{}", self.name, op, self.shape(), self.spare_bits)
  }

  /// Public kernel name for `op`.
  pub fn kernel_name(&self, op: &str) -> String {
    format!("{}_{}", self.name, op)
  }

  pub(crate) fn word_const(&self, v: u64) -> IntValue<'ctx> {
    self.word_ty.const_int(v, false)
  }

  pub(crate) fn const_field(&self, limbs: &[u64]) -> ArrayValue<'ctx> {
    let vals: Vec<IntValue> = limbs.iter().map(|&l| self.word_const(l)).collect();
    self.word_ty.const_array(&vals)
  }

  pub(crate) fn alloca(&self, asm: &Assembler<'ctx>, name: &str)
    -> Result<Field<'ctx>>
  {
    Field::alloca(asm, self.field_ty, name)
  }

  pub(crate) fn view(&self, ptr: PointerValue<'ctx>) -> Field<'ctx> {
    Field::view(ptr, self.field_ty)
  }

  /// Whether field-element parameters of this shape pass by pointer under
  /// the aggregate-wrapping rule.
  pub(crate) fn passes_by_ptr(&self) -> bool {
    // element count >= 3; the byte-size clause cannot trigger below that.
    self.num_words >= 3
  }

  fn global(&self, asm: &Assembler<'ctx>, tag: &str, limbs: &[u64])
    -> Result<GlobalValue<'ctx>>
  {
    asm.define_global_constant(&format!("_{}_{}", self.name, tag), &self.name,
                               self.const_field(limbs).into(), self.w / 8)
  }

  pub(crate) fn modulus_global(&self, asm: &Assembler<'ctx>)
    -> Result<GlobalValue<'ctx>>
  {
    self.global(asm, "mod", &self.modulus)
  }

  /// Montgomery one, `R mod p`.
  pub(crate) fn one_global(&self, asm: &Assembler<'ctx>)
    -> Result<GlobalValue<'ctx>>
  {
    self.global(asm, "one", &self.monty_one)
  }

  /// `R² mod p`, the to-Montgomery factor.
  pub(crate) fn r2_global(&self, asm: &Assembler<'ctx>)
    -> Result<GlobalValue<'ctx>>
  {
    self.global(asm, "r2", &self.monty_r2)
  }

  /// `(p+1)/2`, the halving constant.
  pub(crate) fn pp1d2_global(&self, asm: &Assembler<'ctx>)
    -> Result<GlobalValue<'ctx>>
  {
    self.global(asm, "pp1d2", &self.half_plus_one)
  }

  /// Load the modulus as one wide integer.
  pub(crate) fn load_modulus_int(&self, asm: &Assembler<'ctx>)
    -> Result<IntValue<'ctx>>
  {
    let g = self.modulus_global(asm)?;
    self.view(g.as_pointer_value()).load_int(asm, self.int_buf_ty)
  }

  /// Load all limbs of a per-field global.
  pub(crate) fn load_global_limbs(&self, asm: &Assembler<'ctx>,
                                  g: GlobalValue<'ctx>)
    -> Result<Vec<IntValue<'ctx>>>
  {
    let view = self.view(g.as_pointer_value());
    (0..self.num_words as u64).map(|i| view.limb(asm, i)).collect()
  }

  /// Turn a kernel-side pointer into the argument an internal function
  /// expects for a field-element parameter: the pointer itself for wrapped
  /// shapes, the loaded aggregate for small ones.
  pub(crate) fn arg(&self, asm: &Assembler<'ctx>, ptr: PointerValue<'ctx>)
    -> Result<BasicMetadataValueEnum<'ctx>>
  {
    if self.passes_by_ptr() {
      Ok(ptr.into())
    } else {
      Ok(asm.builder().build_load(self.field_ty, ptr, "")?.into())
    }
  }
}

// Public kernel surface. Each generator memoizes through the assembler's
// function table and returns the kernel symbol.
impl<'ctx> Assembler<'ctx> {
  fn field_kernel_3(&self, fd: &FieldDescriptor<'ctx>, op: &str,
                    internal: String)
    -> Result<String>
  {
    let name = fd.kernel_name(op);
    let p = self.ptr_ty();
    let fd = fd.clone();
    self.define_public_function(&name, &fd.name.clone(), &[p, p, p], &[],
                                |asm, params| {
      let r = params.ptr(0)?;
      let a = fd.arg(asm, params.ptr(1)?)?;
      let b = fd.arg(asm, params.ptr(2)?)?;
      asm.call(&internal, &[r.into(), a, b])?;
      Ok(None)
    })?;
    Ok(name)
  }

  fn field_kernel_2(&self, fd: &FieldDescriptor<'ctx>, op: &str,
                    internal: String)
    -> Result<String>
  {
    let name = fd.kernel_name(op);
    let p = self.ptr_ty();
    let fd = fd.clone();
    self.define_public_function(&name, &fd.name.clone(), &[p, p], &[],
                                |asm, params| {
      let r = params.ptr(0)?;
      let a = fd.arg(asm, params.ptr(1)?)?;
      asm.call(&internal, &[r.into(), a])?;
      Ok(None)
    })?;
    Ok(name)
  }

  /// `<field>_add(r, a, b)`: modular addition.
  pub fn gen_fp_add(&self, fd: &FieldDescriptor<'ctx>) -> Result<String> {
    let internal = self.ensure_mod_add(fd)?;
    self.field_kernel_3(fd, "add", internal)
  }

  /// `<field>_sub(r, a, b)`: modular subtraction.
  pub fn gen_fp_sub(&self, fd: &FieldDescriptor<'ctx>) -> Result<String> {
    let internal = self.ensure_mod_sub(fd)?;
    self.field_kernel_3(fd, "sub", internal)
  }

  /// `<field>_mul(r, a, b)`: Montgomery-domain multiplication.
  pub fn gen_fp_mul(&self, fd: &FieldDescriptor<'ctx>) -> Result<String> {
    let internal = self.ensure_mty_mul(fd, true)?;
    self.field_kernel_3(fd, "mul", internal)
  }

  /// `<field>_mulur(r, a, b)`: multiplication without the final
  /// subtraction. Needs two spare bits; outputs may reach `2p`.
  pub fn gen_fp_mulur(&self, fd: &FieldDescriptor<'ctx>) -> Result<String> {
    let internal = self.ensure_mty_mul(fd, false)?;
    self.field_kernel_3(fd, "mulur", internal)
  }

  /// `<field>_sqr(r, a)`.
  pub fn gen_fp_sqr(&self, fd: &FieldDescriptor<'ctx>) -> Result<String> {
    let internal = self.ensure_mty_sqr(fd)?;
    self.field_kernel_2(fd, "sqr", internal)
  }

  /// `<field>_nsqr(r, a, n)`: square `n` times. The count arrives through a
  /// pointer like every other kernel parameter.
  pub fn gen_fp_nsqr(&self, fd: &FieldDescriptor<'ctx>) -> Result<String> {
    let internal = self.ensure_mty_nsqr(fd)?;
    let name = fd.kernel_name("nsqr");
    let p = self.ptr_ty();
    let fd = fd.clone();
    self.define_public_function(&name, &fd.name.clone(), &[p, p, p], &[],
                                |asm, params| {
      let r = params.ptr(0)?;
      let a = fd.arg(asm, params.ptr(1)?)?;
      let n = asm.builder()
        .build_load(fd.word_ty, params.ptr(2)?, "")?
        .into_int_value();
      asm.call(&internal, &[r.into(), a, n.into()])?;
      Ok(None)
    })?;
    Ok(name)
  }

  /// `<field>_neg(r, a)`: additive inverse, with `neg(0) = 0`.
  pub fn gen_fp_neg(&self, fd: &FieldDescriptor<'ctx>) -> Result<String> {
    let internal = self.ensure_neg(fd)?;
    self.field_kernel_2(fd, "neg", internal)
  }

  /// `<field>_div2(r, a)`: halving, odd values via `(p+1)/2`.
  pub fn gen_fp_div2(&self, fd: &FieldDescriptor<'ctx>) -> Result<String> {
    let internal = self.ensure_div2(fd)?;
    self.field_kernel_2(fd, "div2", internal)
  }

  /// `<field>_ccopy(r, a, ctl)`: constant-time conditional copy; `ctl` is a
  /// word pointer, nonzero means copy.
  pub fn gen_fp_ccopy(&self, fd: &FieldDescriptor<'ctx>) -> Result<String> {
    let internal = self.ensure_ccopy(fd)?;
    self.cond_kernel_3(fd, "ccopy", internal)
  }

  fn cond_kernel_3(&self, fd: &FieldDescriptor<'ctx>, op: &str,
                   internal: String)
    -> Result<String>
  {
    let name = fd.kernel_name(op);
    let p = self.ptr_ty();
    let fd = fd.clone();
    self.define_public_function(&name, &fd.name.clone(), &[p, p, p], &[],
                                |asm, params| {
      let r = params.ptr(0)?;
      let a = fd.arg(asm, params.ptr(1)?)?;
      let ctl_word = asm.builder()
        .build_load(fd.word_ty, params.ptr(2)?, "")?
        .into_int_value();
      let ctl = asm.builder().build_int_compare(
        IntPredicate::NE, ctl_word, fd.word_ty.const_zero(), "")?;
      asm.call(&internal, &[r.into(), a, ctl.into()])?;
      Ok(None)
    })?;
    Ok(name)
  }

  /// `<field>_cadd(r, a, ctl)`: conditional in-place addition.
  pub fn gen_fp_cadd(&self, fd: &FieldDescriptor<'ctx>) -> Result<String> {
    let internal = self.ensure_cadd(fd)?;
    self.cond_kernel_3(fd, "cadd", internal)
  }

  /// `<field>_csub(r, a, ctl)`: conditional in-place subtraction.
  pub fn gen_fp_csub(&self, fd: &FieldDescriptor<'ctx>) -> Result<String> {
    let internal = self.ensure_csub(fd)?;
    self.cond_kernel_3(fd, "csub", internal)
  }

  /// `<field>_cneg(r, ctl)`: conditional in-place negation.
  pub fn gen_fp_cneg(&self, fd: &FieldDescriptor<'ctx>) -> Result<String> {
    let internal = self.ensure_cneg(fd)?;
    let name = fd.kernel_name("cneg");
    let p = self.ptr_ty();
    let fd = fd.clone();
    self.define_public_function(&name, &fd.name.clone(), &[p, p], &[],
                                |asm, params| {
      let r = params.ptr(0)?;
      let ctl_word = asm.builder()
        .build_load(fd.word_ty, params.ptr(1)?, "")?
        .into_int_value();
      let ctl = asm.builder().build_int_compare(
        IntPredicate::NE, ctl_word, fd.word_ty.const_zero(), "")?;
      asm.call(&internal, &[r.into(), ctl.into()])?;
      Ok(None)
    })?;
    Ok(name)
  }

  /// `<field>_to_mont(r, a)`: into the Montgomery domain, `a·R mod p`.
  pub fn gen_fp_to_mont(&self, fd: &FieldDescriptor<'ctx>) -> Result<String> {
    let mul = self.ensure_mty_mul(fd, true)?;
    let r2 = fd.r2_global(self)?;
    let name = fd.kernel_name("to_mont");
    let p = self.ptr_ty();
    let fd = fd.clone();
    self.define_public_function(&name, &fd.name.clone(), &[p, p], &[],
                                |asm, params| {
      let r = params.ptr(0)?;
      let a = fd.arg(asm, params.ptr(1)?)?;
      let b = fd.arg(asm, r2.as_pointer_value())?;
      asm.call(&mul, &[r.into(), a, b])?;
      Ok(None)
    })?;
    Ok(name)
  }

  /// `<field>_from_mont(r, a)`: out of the Montgomery domain, `a·R⁻¹ mod p`,
  /// i.e. a multiplication by canonical one.
  pub fn gen_fp_from_mont(&self, fd: &FieldDescriptor<'ctx>) -> Result<String> {
    let mul = self.ensure_mty_mul(fd, true)?;
    let name = fd.kernel_name("from_mont");
    let p = self.ptr_ty();
    let fd = fd.clone();
    self.define_public_function(&name, &fd.name.clone(), &[p, p], &[],
                                |asm, params| {
      let r = params.ptr(0)?;
      let a = fd.arg(asm, params.ptr(1)?)?;
      let one = fd.alloca(asm, "one.can")?;
      let mut limbs = vec![0u64; fd.num_words as usize];
      limbs[0] = 1;
      asm.store(one.ptr(), fd.const_field(&limbs).into())?;
      let b = fd.arg(asm, one.ptr())?;
      asm.call(&mul, &[r.into(), a, b])?;
      Ok(None)
    })?;
    Ok(name)
  }
}
