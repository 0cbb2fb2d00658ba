//! Error kinds for the code generator.
//!
//! Every error is fatal: the emitter never recovers, it propagates to the
//! host which aborts the compilation. The GPU runtime crates carry their own
//! driver-status error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Descriptor inconsistency: wrong MSB, even modulus, unsupported SIMD
  /// width, unsupported curve coefficient. Raised at descriptor
  /// construction or when a generator is asked for an unsupported shape.
  #[error("configuration: {0}")]
  Configuration(String),

  /// The emitter rejected an operation before handing it to LLVM
  /// (mismatched types on assignment, call to an unknown symbol, ...).
  #[error("codegen: {0}")]
  Codegen(String),

  /// The IR builder itself refused an instruction.
  #[error("ir builder: {0}")]
  Builder(#[from] inkwell::builder::BuilderError),

  /// `module.verify()` failed after emission.
  #[error("module verification: {0}")]
  Verification(String),

  /// Target-machine creation or pass-pipeline execution failed.
  #[error("target: {0}")]
  Target(String),
}

pub type Result<T> = std::result::Result<T, Error>;
