//! Hardware end-to-end: generate PTX, load it through the driver, launch.
//! Needs an Nvidia GPU and CUDA 12+, so everything is `#[ignore]`d; run
//! with `cargo test -p ecliptic-runtime-nv -- --ignored` on a machine that
//! has one.

use ecliptic_codegen::{Assembler, Backend, BigNum, };
use inkwell::context::Context;

use ecliptic_runtime_nv::NvExecutor;

const BLS12_381_P: &str =
  "1A0111EA397FE69A4B1BA7B6434BACD764774B84F38512BF6730D2A0F6B0F624\
   1EABFFFEB153FFFFB9FEFFFFFFFFAAAB";

#[test]
#[ignore = "needs an Nvidia GPU"]
fn fp_add_wraps_to_zero_on_device() {
  let _ = env_logger::builder().is_test(true).try_init();

  let ctx = Context::create();
  let asm = Assembler::new(&ctx, Backend::NvidiaPtx { sm: (8, 6), },
                           "bls12_381_dev").unwrap();
  let fp = asm.configure_field("bls12_381_fp", 381, BLS12_381_P, 1, 64)
    .unwrap();
  asm.gen_fp_add(&fp).unwrap();
  let ptx = asm.codegen_nvidia_ptx().unwrap();

  let exec = NvExecutor::new(&ptx).unwrap();

  let p = BigNum::<u64>::parse_modulus(BLS12_381_P, 381).unwrap();
  let one = BigNum::<u64>::one(381);
  let pm1 = p.sub_mod(&one, &p);

  let out = exec.run("bls12_381_fp_add", 6,
                     &[&pm1.limbs_u64(), &one.limbs_u64()]).unwrap();
  assert_eq!(out, vec![0u64; 6], "(p-1) + 1 must wrap to zero");
}
