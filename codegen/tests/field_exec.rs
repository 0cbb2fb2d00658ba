//! Executable field-arithmetic scenarios: the generated x86-64 kernels are
//! JIT-compiled and checked against the host big-integer model.
#![cfg(all(target_arch = "x86_64", target_os = "linux"))]

mod common;

use ecliptic_codegen::{Assembler, Backend, BigNum, FieldDescriptor, };
use inkwell::context::Context;
use proptest::prelude::*;

use common::*;

fn build<'ctx>(ctx: &'ctx Context, name: &str, hex: &str, bits: u32, w: u32)
  -> (Assembler<'ctx>, FieldDescriptor<'ctx>)
{
  let _ = env_logger::builder().is_test(true).try_init();
  let asm = Assembler::new(ctx, Backend::X86_64Linux, name).unwrap();
  let fd = asm.configure_field(name, bits, hex, 1, w).unwrap();
  asm.gen_fp_add(&fd).unwrap();
  asm.gen_fp_sub(&fd).unwrap();
  asm.gen_fp_mul(&fd).unwrap();
  asm.gen_fp_sqr(&fd).unwrap();
  asm.gen_fp_nsqr(&fd).unwrap();
  asm.gen_fp_neg(&fd).unwrap();
  asm.gen_fp_div2(&fd).unwrap();
  asm.gen_fp_ccopy(&fd).unwrap();
  asm.gen_fp_cadd(&fd).unwrap();
  asm.gen_fp_cneg(&fd).unwrap();
  asm.gen_fp_to_mont(&fd).unwrap();
  asm.gen_fp_from_mont(&fd).unwrap();
  (asm, fd)
}

#[test]
fn bls12_381_fp_add_wraps_to_zero() {
  let ctx = Context::create();
  let (asm, _) = build(&ctx, "bls12_381_fp", BLS12_381_P, 381, 64);
  let jit = Jit::finish(&asm);
  let fm = FieldModel::new(BLS12_381_P, 381);

  let pm1 = fm.p.sub_mod(&fm.one(), &fm.p);
  let out = jit.run3("bls12_381_fp_add", 6, &pm1.limbs_u64(),
                     &fm.one().limbs_u64());
  assert_eq!(out, vec![0u64; 6], "(p-1) + 1 = 0 mod p");
}

#[test]
fn bn254_fr_montgomery_identities() {
  let ctx = Context::create();
  let (asm, _) = build(&ctx, "bn254_fr", BN254_R, 254, 64);
  let jit = Jit::finish(&asm);
  let fm = FieldModel::new(BN254_R, 254);

  let r = fm.monty_one.clone();
  let r2 = BigNum::monty_r2(&fm.p);

  // mtymul(1, R²) = R mod p: one enters the Montgomery domain.
  let out = jit.run3("bn254_fr_mul", 4, &fm.one().limbs_u64(),
                     &r2.limbs_u64());
  assert_eq!(out, r.limbs_u64());

  // Montgomery one squared stays Montgomery one.
  let out = jit.run3("bn254_fr_mul", 4, &r.limbs_u64(), &r.limbs_u64());
  assert_eq!(out, r.limbs_u64());

  // Round trip into and out of the domain is the identity.
  let x = fm.from_hex("DEADBEEF0123456789ABCDEF");
  let xm = jit.run2("bn254_fr_to_mont", 4, &x.limbs_u64());
  let back = jit.run2("bn254_fr_from_mont", 4, &xm);
  assert_eq!(back, x.limbs_u64());

  // A squaring chain of three is x^8, still in the domain.
  let count = [3u64];
  let chained = jit.run3("bn254_fr_nsqr", 4, &xm, &count);
  let mut x8 = x.clone();
  for _ in 0..3 {
    x8 = x8.mul_mod(&x8, &fm.p);
  }
  assert_eq!(chained, fm.to_mont(&x8).limbs_u64());

  // A zero-length chain is a copy.
  let zero_count = [0u64];
  let same = jit.run3("bn254_fr_nsqr", 4, &xm, &zero_count);
  assert_eq!(same, xm);
}

#[test]
fn secp256k1_no_spare_bits_path() {
  // secp256k1 has spareBits = 0, so this exercises the widened add and the
  // carry-word (mayo) final subtraction.
  let ctx = Context::create();
  let (asm, _) = build(&ctx, "secp256k1_fp", SECP256K1_P, 256, 64);
  let jit = Jit::finish(&asm);
  let fm = FieldModel::new(SECP256K1_P, 256);

  let pm1 = fm.p.sub_mod(&fm.one(), &fm.p);
  let out = jit.run3("secp256k1_fp_add", 4, &pm1.limbs_u64(),
                     &pm1.limbs_u64());
  let expect = pm1.add_mod(&pm1, &fm.p);
  assert_eq!(out, expect.limbs_u64());

  // R·R in the domain equals host-side to_mont(R).
  let r = fm.monty_one.clone();
  let out = jit.run3("secp256k1_fp_mul", 4, &r.limbs_u64(), &r.limbs_u64());
  assert_eq!(out, r.limbs_u64());
}

#[test]
fn u32_limbs_behave_like_u64() {
  let ctx = Context::create();
  let (asm, _) = build(&ctx, "secp256k1_fp", SECP256K1_P, 256, 32);
  let jit = Jit::finish(&asm);

  // 8 x u32 limbs occupy the same 4 u64 host words, little-endian.
  let p32 = BigNum::<u32>::parse_modulus(SECP256K1_P, 256).unwrap();
  let one32 = BigNum::<u32>::one(256);
  let pm1 = p32.sub_mod(&one32, &p32);
  let pack = |n: &BigNum<u32>| ecliptic_codegen::bignum::pack_words(&n.limbs_u64(), 32);
  let out = jit.run3("secp256k1_fp_add", 4, &pack(&pm1), &pack(&one32));
  assert_eq!(out, vec![0u64; 4]);
}

#[test]
fn neg_and_div2() {
  let ctx = Context::create();
  let (asm, _) = build(&ctx, "bls12_381_fp", BLS12_381_P, 381, 64);
  let jit = Jit::finish(&asm);
  let fm = FieldModel::new(BLS12_381_P, 381);

  // neg(0) = 0
  let out = jit.run2("bls12_381_fp_neg", 6, &fm.zero().limbs_u64());
  assert_eq!(out, vec![0u64; 6]);

  // a + neg(a) = 0
  let a = fm.from_hex("123456789ABCDEF0FEDCBA987654321");
  let na = jit.run2("bls12_381_fp_neg", 6, &a.limbs_u64());
  let s = jit.run3("bls12_381_fp_add", 6, &a.limbs_u64(), &na);
  assert_eq!(s, vec![0u64; 6]);

  // div2 then doubling is the identity, odd and even alike.
  for hex in ["2", "3", "DEADBEEF", "10000000000000001"] {
    let a = fm.from_hex(hex);
    let h = jit.run2("bls12_381_fp_div2", 6, &a.limbs_u64());
    let d = jit.run3("bls12_381_fp_add", 6, &h, &h);
    assert_eq!(d, a.limbs_u64(), "2·(a/2) = a for a = {}", hex);
  }
}

#[test]
fn ccopy_obeys_its_control() {
  let ctx = Context::create();
  let (asm, _) = build(&ctx, "bn254_fr", BN254_R, 254, 64);
  let jit = Jit::finish(&asm);
  let fm = FieldModel::new(BN254_R, 254);

  let a = fm.from_hex("1111111111111111111111111111").limbs_u64();
  let b = fm.from_hex("2222222222222222222222222222").limbs_u64();

  let f = jit.kernel3("bn254_fr_ccopy");
  let mut dst = a.clone();
  let ctl0 = [0u64];
  let ctl1 = [1u64];
  unsafe { f(dst.as_mut_ptr(), b.as_ptr(), ctl0.as_ptr()); }
  assert_eq!(dst, a, "ctl = 0 leaves the destination alone");
  unsafe { f(dst.as_mut_ptr(), b.as_ptr(), ctl1.as_ptr()); }
  assert_eq!(dst, b, "ctl = 1 copies");

  // cadd with the control off is the identity, with it on a modular add.
  let cadd = jit.kernel3("bn254_fr_cadd");
  let mut dst = a.clone();
  unsafe { cadd(dst.as_mut_ptr(), b.as_ptr(), ctl0.as_ptr()); }
  assert_eq!(dst, a);
  unsafe { cadd(dst.as_mut_ptr(), b.as_ptr(), ctl1.as_ptr()); }
  let expect = BigNum::from_limbs(254, &a)
    .add_mod(&BigNum::from_limbs(254, &b), &fm.p);
  assert_eq!(dst, expect.limbs_u64());

  // cneg twice round-trips; with the control off nothing moves.
  let cneg = jit.kernel2("bn254_fr_cneg");
  let mut dst = a.clone();
  unsafe { cneg(dst.as_mut_ptr(), ctl0.as_ptr()); }
  assert_eq!(dst, a);
  unsafe { cneg(dst.as_mut_ptr(), ctl1.as_ptr()); }
  assert_ne!(dst, a);
  unsafe { cneg(dst.as_mut_ptr(), ctl1.as_ptr()); }
  assert_eq!(dst, a);
}

proptest! {
  // Module construction dominates each case, so keep the count modest.
  #![proptest_config(ProptestConfig::with_cases(12))]

  #[test]
  fn bls12_381_matches_the_model(a_raw in prop::collection::vec(any::<u64>(), 6),
                                 b_raw in prop::collection::vec(any::<u64>(), 6)) {
    // One JIT per case keeps the harness simple; 64 cases stay fast
    // because module construction dominates, not execution.
    let ctx = Context::create();
    let (asm, _) = build(&ctx, "bls12_381_fp", BLS12_381_P, 381, 64);
    let jit = Jit::finish(&asm);
    let fm = FieldModel::new(BLS12_381_P, 381);

    let clamp = |mut v: Vec<u64>| -> BigNum<u64> {
      v[5] &= (1u64 << (381 - 5 * 64)) - 1;
      BigNum::from_limbs(381, &v).reduce_mod(&fm.p)
    };
    let a = clamp(a_raw);
    let b = clamp(b_raw);

    let add = jit.run3("bls12_381_fp_add", 6, &a.limbs_u64(), &b.limbs_u64());
    prop_assert_eq!(add, a.add_mod(&b, &fm.p).limbs_u64());

    let sub = jit.run3("bls12_381_fp_sub", 6, &a.limbs_u64(), &b.limbs_u64());
    prop_assert_eq!(sub, a.sub_mod(&b, &fm.p).limbs_u64());

    // Montgomery product: aR · bR ↦ abR.
    let am = fm.to_mont(&a);
    let bm = fm.to_mont(&b);
    let mul = jit.run3("bls12_381_fp_mul", 6, &am.limbs_u64(), &bm.limbs_u64());
    prop_assert_eq!(mul, fm.to_mont(&a.mul_mod(&b, &fm.p)).limbs_u64());

    let sqr = jit.run2("bls12_381_fp_sqr", 6, &am.limbs_u64());
    prop_assert_eq!(sqr, fm.to_mont(&a.mul_mod(&a, &fm.p)).limbs_u64());
  }

  #[test]
  fn secp256k1_mayo_matches_the_model(a_raw in prop::collection::vec(any::<u64>(), 4),
                                      b_raw in prop::collection::vec(any::<u64>(), 4)) {
    let ctx = Context::create();
    let (asm, _) = build(&ctx, "secp256k1_fp", SECP256K1_P, 256, 64);
    let jit = Jit::finish(&asm);
    let fm = FieldModel::new(SECP256K1_P, 256);

    let a = BigNum::from_limbs(256, &a_raw).reduce_mod(&fm.p);
    let b = BigNum::from_limbs(256, &b_raw).reduce_mod(&fm.p);

    let add = jit.run3("secp256k1_fp_add", 4, &a.limbs_u64(), &b.limbs_u64());
    prop_assert_eq!(add, a.add_mod(&b, &fm.p).limbs_u64());

    let am = fm.to_mont(&a);
    let bm = fm.to_mont(&b);
    let mul = jit.run3("secp256k1_fp_mul", 4, &am.limbs_u64(), &bm.limbs_u64());
    prop_assert_eq!(mul, fm.to_mont(&a.mul_mod(&b, &fm.p)).limbs_u64());
  }
}
