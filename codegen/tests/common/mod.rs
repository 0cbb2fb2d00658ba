//! Shared harness: build a module on the x86-64 backend, run the fixed
//! pipeline, JIT it with MCJIT and call the public kernels through raw
//! function pointers. Only compiled on hosts that can actually execute the
//! result.
#![cfg(all(target_arch = "x86_64", target_os = "linux"))]
#![allow(dead_code)]

use std::mem;

use inkwell::execution_engine::ExecutionEngine;
use inkwell::OptimizationLevel;

use ecliptic_codegen::{Assembler, BigNum, };

pub const BLS12_381_P: &str =
  "1A0111EA397FE69A4B1BA7B6434BACD764774B84F38512BF6730D2A0F6B0F624\
   1EABFFFEB153FFFFB9FEFFFFFFFFAAAB";
pub const BN254_R: &str =
  "30644E72E131A029B85045B68181585D2833E84879B9709143E1F593F0000001";
pub const SECP256K1_P: &str =
  "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEFFFFFC2F";

pub const SECP256K1_GX: &str =
  "79BE667EF9DCBBAC55A06295CE870B07029BFCDB2DCE28D959F2815B16F81798";
pub const SECP256K1_GY: &str =
  "483ADA7726A3C4655DA4FBFC0E1108A8FD17B448A68554199C47D08FFB10D4B8";
pub const SECP256K1_2GX: &str =
  "C6047F9441ED7D6D3045406E95C07CD85C778E4B8CEF3CA7ABAC09B95C709EE5";
pub const SECP256K1_2GY: &str =
  "1AE168FEA63DC339A3C58419466CEAEEF7F632653266D0E1236431A55CF8F65B";

pub const BLS12_381_G1X: &str =
  "17F1D3A73197D7942695638C4FA9AC0FC3688C4F9774B905A14E3A3F171BAC58\
   6C55E83FF97A1AEFFB3AF00ADB22C6BB";
pub const BLS12_381_G1Y: &str =
  "08B3F481E3AAA0F1A09E30ED741D8AE4FCF5E095D5D00AF600DB18CB2C04B3ED\
   D03CC744A2888AE40CAA232946C5E7E1";

pub type Kernel3 = unsafe extern "C" fn(*mut u64, *const u64, *const u64);
pub type Kernel2 = unsafe extern "C" fn(*mut u64, *const u64);

/// A finished module under MCJIT.
pub struct Jit<'ctx> {
  ee: ExecutionEngine<'ctx>,
}

impl<'ctx> Jit<'ctx> {
  /// Verify, run the pass pipeline, JIT.
  pub fn finish(asm: &Assembler<'ctx>) -> Self {
    asm.verify().expect("module verification");
    asm.optimize().expect("pass pipeline");
    let ee = asm.module()
      .create_jit_execution_engine(OptimizationLevel::Aggressive)
      .expect("mcjit");
    Jit { ee, }
  }

  pub fn kernel3(&self, name: &str) -> Kernel3 {
    let addr = self.ee.get_function_address(name).expect("kernel address");
    unsafe { mem::transmute(addr) }
  }

  pub fn kernel2(&self, name: &str) -> Kernel2 {
    let addr = self.ee.get_function_address(name).expect("kernel address");
    unsafe { mem::transmute(addr) }
  }

  pub fn run3(&self, name: &str, out_words: usize, a: &[u64], b: &[u64])
    -> Vec<u64>
  {
    let f = self.kernel3(name);
    let mut out = vec![0u64; out_words];
    unsafe { f(out.as_mut_ptr(), a.as_ptr(), b.as_ptr()); }
    out
  }

  pub fn run2(&self, name: &str, out_words: usize, a: &[u64]) -> Vec<u64> {
    let f = self.kernel2(name);
    let mut out = vec![0u64; out_words];
    unsafe { f(out.as_mut_ptr(), a.as_ptr()); }
    out
  }
}

/// Host-side model of one field, the oracle the kernels are checked
/// against.
pub struct FieldModel {
  pub bits: u32,
  pub p: BigNum<u64>,
  pub monty_one: BigNum<u64>,
}

impl FieldModel {
  pub fn new(hex: &str, bits: u32) -> Self {
    let p = BigNum::<u64>::parse_modulus(hex, bits).unwrap();
    let monty_one = BigNum::monty_one(&p);
    FieldModel { bits, p, monty_one, }
  }

  pub fn words(&self) -> usize {
    self.p.limbs.len()
  }

  pub fn from_hex(&self, hex: &str) -> BigNum<u64> {
    BigNum::from_hex(hex, self.bits).unwrap()
  }

  /// Into the Montgomery domain, host side.
  pub fn to_mont(&self, a: &BigNum<u64>) -> BigNum<u64> {
    a.mul_mod(&self.monty_one, &self.p)
  }

  pub fn zero(&self) -> BigNum<u64> {
    BigNum::zero(self.bits)
  }

  pub fn one(&self) -> BigNum<u64> {
    BigNum::one(self.bits)
  }
}

/// Concatenated Montgomery-form Jacobian point `(X, Y, Z = 1)` from
/// canonical affine hex coordinates.
pub fn jac_point(fm: &FieldModel, x_hex: &str, y_hex: &str) -> Vec<u64> {
  let x = fm.to_mont(&fm.from_hex(x_hex));
  let y = fm.to_mont(&fm.from_hex(y_hex));
  let mut out = x.limbs_u64();
  out.extend(y.limbs_u64());
  out.extend(fm.monty_one.limbs_u64());
  out
}

/// Concatenated Montgomery-form affine point.
pub fn aff_point(fm: &FieldModel, x_hex: &str, y_hex: &str) -> Vec<u64> {
  let x = fm.to_mont(&fm.from_hex(x_hex));
  let y = fm.to_mont(&fm.from_hex(y_hex));
  let mut out = x.limbs_u64();
  out.extend(y.limbs_u64());
  out
}

pub fn coords(point: &[u64], n: usize) -> (&[u64], &[u64], &[u64]) {
  (&point[..n], &point[n..2 * n], &point[2 * n..3 * n])
}

/// Projective equality of two Jacobian points, decided with the generated
/// field kernels themselves: `X₁·Z₂² = X₂·Z₁²` and `Y₁·Z₂³ = Y₂·Z₁³`.
pub fn jac_eq(jit: &Jit, mul: &str, n: usize, a: &[u64], b: &[u64]) -> bool {
  let (ax, ay, az) = coords(a, n);
  let (bx, by, bz) = coords(b, n);
  let az_zero = az.iter().all(|&l| l == 0);
  let bz_zero = bz.iter().all(|&l| l == 0);
  if az_zero || bz_zero {
    return az_zero == bz_zero;
  }
  let az2 = jit.run3(mul, n, az, az);
  let bz2 = jit.run3(mul, n, bz, bz);
  let az3 = jit.run3(mul, n, &az2, az);
  let bz3 = jit.run3(mul, n, &bz2, bz);

  let lhs_x = jit.run3(mul, n, ax, &bz2);
  let rhs_x = jit.run3(mul, n, bx, &az2);
  let lhs_y = jit.run3(mul, n, ay, &bz3);
  let rhs_y = jit.run3(mul, n, by, &az3);
  lhs_x == rhs_x && lhs_y == rhs_y
}
