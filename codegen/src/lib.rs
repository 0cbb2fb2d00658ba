//! Ecliptic: a code generator for big-integer modular arithmetic,
//! short-Weierstrass curve operations and multi-scalar multiplication.
//!
//! Algorithms are lowered to LLVM IR once per `(field, word-size, backend)`
//! tuple, optimised with the new pass manager, and emitted as CPU assembly,
//! Nvidia PTX text, or an AMDGPU relocatable object (linked into a code
//! object by the `ecliptic-runtime-amd` crate).
//!
//! The host program owns an LLVM context, binds an [`Assembler`] to a
//! [`Backend`], configures descriptors, and asks for kernels by name;
//! helpers are emitted recursively and memoized, so repeated requests are
//! free.
//!
//! ```no_run
//! use inkwell::context::Context;
//! use ecliptic_codegen::{Assembler, Backend};
//!
//! # fn main() -> Result<(), ecliptic_codegen::Error> {
//! let ctx = Context::create();
//! let asm = Assembler::new(&ctx, Backend::NvidiaPtx { sm: (8, 6) },
//!                          "bls12_381")?;
//! let fp = asm.configure_field(
//!   "bls12_381_fp", 381,
//!   "1A0111EA397FE69A4B1BA7B6434BACD764774B84F38512BF6730D2A0F6B0F624\
//!    1EABFFFEB153FFFFB9FEFFFFFFFFAAAB",
//!   1, 64)?;
//! let kernel = asm.gen_fp_add(&fp)?;
//! assert_eq!(kernel, "bls12_381_fp_add");
//! let ptx = asm.codegen_nvidia_ptx()?;
//! # let _ = ptx;
//! # Ok(())
//! # }
//! ```
//!
//! Code generation is single-threaded by construction: one assembler per
//! module, never shared across threads. Compile several modules in
//! parallel by giving each its own context and assembler.

pub mod assembler;
pub mod backend;
pub mod bignum;
pub mod curve;
pub mod error;
pub mod field;

pub use crate::assembler::{Array, Assembler, EcPointAff, EcPointJac, Field,
                           FnAttr, Params, };
pub use crate::backend::Backend;
pub use crate::bignum::{BigNum, Word, };
pub use crate::curve::CurveDescriptor;
pub use crate::error::{Error, Result, };
pub use crate::field::FieldDescriptor;
