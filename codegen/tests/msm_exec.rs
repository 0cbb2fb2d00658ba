//! Bucket-method MSM, executed end to end.
#![cfg(all(target_arch = "x86_64", target_os = "linux"))]

mod common;

use ecliptic_codegen::{Assembler, Backend, };
use inkwell::context::Context;

use common::*;

#[test]
fn msm_smoke_12p() {
  let _ = env_logger::builder().is_test(true).try_init();
  let ctx = Context::create();
  let asm = Assembler::new(&ctx, Backend::X86_64Linux, "secp256k1_msm")
    .unwrap();
  let cd = asm.configure_curve("secp256k1", 256, SECP256K1_P, 1, 64,
                               0, 7, 256).unwrap();
  let kernel_c3 = asm.gen_ec_msm(&cd, 3, 8).unwrap();
  assert_eq!(kernel_c3, "secp256k1_msm_c3_n8");
  // A second width of the same curve coexists in the module.
  let kernel_c5 = asm.gen_ec_msm(&cd, 5, 8).unwrap();
  asm.gen_ec_sum(&cd).unwrap();
  asm.gen_ec_double(&cd).unwrap();
  asm.gen_fp_mul(&cd.fp).unwrap();
  let jit = Jit::finish(&asm);
  let fm = FieldModel::new(SECP256K1_P, 256);
  let n = 4;

  // Scalars [1, 2, 0, 3, 0, 0, 5, 1] against eight copies of G: 12·G.
  let scalars_small: [u64; 8] = [1, 2, 0, 3, 0, 0, 5, 1];
  let mut scalars = Vec::with_capacity(8 * n);
  for k in scalars_small {
    scalars.push(k);
    scalars.extend([0u64; 3]);
  }
  let g_aff = aff_point(&fm, SECP256K1_GX, SECP256K1_GY);
  let mut points = Vec::with_capacity(8 * 2 * n);
  for _ in 0..8 {
    points.extend(g_aff.iter().copied());
  }

  // 12G by doubling and adding: 2G, 3G, 6G, 12G.
  let g = jac_point(&fm, SECP256K1_GX, SECP256K1_GY);
  let g2 = jit.run2("secp256k1_double", 3 * n, &g);
  let g3 = jit.run3("secp256k1_sum", 3 * n, &g, &g2);
  let g6 = jit.run2("secp256k1_double", 3 * n, &g3);
  let g12 = jit.run2("secp256k1_double", 3 * n, &g6);

  let out = jit.run3(&kernel_c3, 3 * n, &scalars, &points);
  assert!(jac_eq(&jit, "secp256k1_fp_mul", n, &out, &g12),
          "c = 3 bucket MSM equals 12·G");

  // The result must not depend on the bucket width.
  let out5 = jit.run3(&kernel_c5, 3 * n, &scalars, &points);
  assert!(jac_eq(&jit, "secp256k1_fp_mul", n, &out5, &g12),
          "c = 5 bucket MSM equals 12·G");
}

#[test]
fn msm_zero_scalars_give_identity() {
  let ctx = Context::create();
  let asm = Assembler::new(&ctx, Backend::X86_64Linux, "secp256k1_msm0")
    .unwrap();
  let cd = asm.configure_curve("secp256k1", 256, SECP256K1_P, 1, 64,
                               0, 7, 256).unwrap();
  let kernel = asm.gen_ec_msm(&cd, 4, 4).unwrap();
  let jit = Jit::finish(&asm);
  let fm = FieldModel::new(SECP256K1_P, 256);
  let n = 4;

  let scalars = vec![0u64; 4 * n];
  let g_aff = aff_point(&fm, SECP256K1_GX, SECP256K1_GY);
  let mut points = Vec::new();
  for _ in 0..4 {
    points.extend(g_aff.iter().copied());
  }
  let out = jit.run3(&kernel, 3 * n, &scalars, &points);
  assert_eq!(&out[2 * n..], vec![0u64; n], "Σ 0·P is the identity");
}

#[test]
fn msm_top_window_straddles_limbs() {
  // c = 7 does not divide 256, so the top window reads past the scalar's
  // top bit and the digit extraction crosses limb boundaries.
  let ctx = Context::create();
  let asm = Assembler::new(&ctx, Backend::X86_64Linux, "secp256k1_msm7")
    .unwrap();
  let cd = asm.configure_curve("secp256k1", 256, SECP256K1_P, 1, 64,
                               0, 7, 256).unwrap();
  let kernel = asm.gen_ec_msm(&cd, 7, 2).unwrap();
  asm.gen_ec_sum(&cd).unwrap();
  asm.gen_ec_double(&cd).unwrap();
  asm.gen_fp_mul(&cd.fp).unwrap();
  let jit = Jit::finish(&asm);
  let fm = FieldModel::new(SECP256K1_P, 256);
  let n = 4;

  // k₀ = 2^192 + 5 exercises a high limb; k₁ = 2^64 the next one.
  let k0 = vec![5u64, 0, 0, 1];
  let k1 = vec![0u64, 1, 0, 0];
  let mut scalars = k0.clone();
  scalars.extend(k1.iter().copied());

  let g_aff = aff_point(&fm, SECP256K1_GX, SECP256K1_GY);
  let mut points = g_aff.clone();
  points.extend(g_aff.iter().copied());

  let out = jit.run3(&kernel, 3 * n, &scalars, &points);

  // Expected: (2^192 + 2^64 + 5)·G, built from doublings.
  let g = jac_point(&fm, SECP256K1_GX, SECP256K1_GY);
  let mut p192 = g.clone();
  for _ in 0..192 {
    p192 = jit.run2("secp256k1_double", 3 * n, &p192);
  }
  let mut p64 = g.clone();
  for _ in 0..64 {
    p64 = jit.run2("secp256k1_double", 3 * n, &p64);
  }
  let g2 = jit.run2("secp256k1_double", 3 * n, &g);
  let g4 = jit.run2("secp256k1_double", 3 * n, &g2);
  let g5 = jit.run3("secp256k1_sum", 3 * n, &g4, &g);
  let mut expect = jit.run3("secp256k1_sum", 3 * n, &p192, &p64);
  expect = jit.run3("secp256k1_sum", 3 * n, &expect, &g5);

  assert!(jac_eq(&jit, "secp256k1_fp_mul", n, &out, &expect));
}
