//! Link a generated gfx90a object and read its kernel metadata back.
//! Needs libamd_comgr, so ignored by default; run with
//! `cargo test -p ecliptic-runtime-amd -- --ignored` on a ROCm machine.

use ecliptic_codegen::{Assembler, Backend, };
use inkwell::context::Context;

use ecliptic_runtime_amd::{isa_name, link_code_object, parse_kernel_metadata, };

const BN254_R: &str =
  "30644E72E131A029B85045B68181585D2833E84879B9709143E1F593F0000001";

#[test]
#[ignore = "needs libamd_comgr"]
fn link_and_read_metadata() {
  let _ = env_logger::builder().is_test(true).try_init();

  let ctx = Context::create();
  let asm = Assembler::new(&ctx, Backend::AmdGpu { gfx: "gfx90a".into(), },
                           "bn254_amd").unwrap();
  let fr = asm.configure_field("bn254_fr", 254, BN254_R, 1, 64).unwrap();
  asm.gen_fp_add(&fr).unwrap();
  asm.gen_fp_mul(&fr).unwrap();
  let obj = asm.codegen_amdgpu_object().unwrap();

  let exe = link_code_object(&obj, &isa_name("gfx90a")).unwrap();
  let kernels = parse_kernel_metadata(&exe).unwrap();

  let names: Vec<_> = kernels.iter().map(|k| k.name.as_str()).collect();
  assert!(names.contains(&"bn254_fr_add"));
  assert!(names.contains(&"bn254_fr_mul"));
  for k in kernels.iter() {
    // Three pointer parameters, 8 bytes each.
    assert!(k.kernarg_segment_size >= 24);
    assert!(k.kernarg_segment_p2align >= 3);
  }
}
