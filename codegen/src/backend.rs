//! Target configuration and machine-code emission.
//!
//! One [`Backend`] value selects the triple, data layout, kernel calling
//! convention and emission format for a whole module. The pass pipeline is
//! fixed: verify, `default<O3>` plus a cleanup tail with function merging,
//! then assembly (CPU, PTX) or a relocatable object (AMDGPU) that the
//! runtime-amd crate links into an executable code object.

use inkwell::memory_buffer::MemoryBuffer;
use inkwell::passes::PassBuilderOptions;
use inkwell::targets::{CodeModel, FileType, InitializationConfig, RelocMode,
                       Target, TargetMachine, TargetTriple, };
use inkwell::OptimizationLevel;

use log::{debug, info, };

use crate::assembler::Assembler;
use crate::error::{Error, Result, };

/// Fast calling convention for internal procedures (LLVM `fastcc`).
pub const FAST_CALL_CONV: u32 = 8;
/// `ptx_kernel` calling convention.
pub const PTX_KERNEL_CALL_CONV: u32 = 71;
/// `amdgpu_kernel` calling convention.
pub const AMDGPU_KERNEL_CALL_CONV: u32 = 91;

/// NVVM IR 1.8 data layout. The NVPTX backend is tolerant of the shorter
/// modern spelling, but the kernels are compiled against this exact string;
/// changing it silently produces wrong code.
const NVVM_DATA_LAYOUT: &str =
  "e-p:64:64:64-i1:8:8-i8:8:8-i16:16:16-i32:32:32-i64:64:64-i128:128:128-\
   f32:32:32-f64:64:64-v16:16:16-v32:32:32-v64:64:64-v128:128:128-n16:32:64";

/// Optimization pipeline run over every finished module.
const PASS_PIPELINE: &str =
  "default<O3>,function-attrs,memcpyopt,sroa,mem2reg,gvn,dse,instcombine,\
   inline,adce";

/// Code emission target.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Backend {
  X86_64Linux,
  Arm64MacOs,
  /// `sm` is the compute capability, e.g. `(8, 6)` for `sm_86`.
  /// Minimum supported hardware is SM 6.0 (Pascal).
  NvidiaPtx { sm: (u32, u32), },
  /// `gfx` is the GCN arch, e.g. `gfx90a`.
  AmdGpu { gfx: String, },
}

impl Backend {
  pub fn triple(&self) -> &'static str {
    match self {
      Backend::X86_64Linux => "x86_64-pc-linux-gnu",
      Backend::Arm64MacOs => "arm64-apple-macosx",
      Backend::NvidiaPtx { .. } => "nvptx64-nvidia-cuda",
      Backend::AmdGpu { .. } => "amdgcn-amd-amdhsa",
    }
  }

  pub fn cpu(&self) -> String {
    match self {
      Backend::X86_64Linux => "x86-64".into(),
      Backend::Arm64MacOs => "apple-m1".into(),
      Backend::NvidiaPtx { sm: (major, minor), } => format!("sm_{}{}", major, minor),
      Backend::AmdGpu { gfx, } => gfx.clone(),
    }
  }

  pub fn features(&self) -> &'static str {
    ""
  }

  /// Calling convention for public kernels; `None` keeps the C default.
  pub fn kernel_call_conv(&self) -> Option<u32> {
    match self {
      Backend::X86_64Linux | Backend::Arm64MacOs => None,
      Backend::NvidiaPtx { .. } => Some(PTX_KERNEL_CALL_CONV),
      Backend::AmdGpu { .. } => Some(AMDGPU_KERNEL_CALL_CONV),
    }
  }

  pub fn is_gpu(&self) -> bool {
    matches!(self, Backend::NvidiaPtx { .. } | Backend::AmdGpu { .. })
  }

  /// Explicit module data layout, where one is mandated; other targets take
  /// the layout of their target machine.
  pub(crate) fn fixed_data_layout(&self) -> Option<&'static str> {
    match self {
      Backend::NvidiaPtx { .. } => Some(NVVM_DATA_LAYOUT),
      _ => None,
    }
  }

  pub(crate) fn target_machine(&self) -> Result<TargetMachine> {
    Target::initialize_all(&InitializationConfig::default());
    let triple = TargetTriple::create(self.triple());
    let target = Target::from_triple(&triple)
      .map_err(|e| Error::Target(e.to_string()))?;
    target
      .create_target_machine(&triple, &self.cpu(), self.features(),
                             OptimizationLevel::Aggressive,
                             RelocMode::Default, CodeModel::Default)
      .ok_or_else(|| {
        Error::Target(format!("no target machine for `{}` cpu `{}`",
                              self.triple(), self.cpu()))
      })
  }
}

impl<'ctx> Assembler<'ctx> {
  /// Verify the module, aborting codegen with the LLVM diagnostics on
  /// malformed IR.
  pub fn verify(&self) -> Result<()> {
    debug!("verifying module `{}`", self.module_name());
    self.module()
      .verify()
      .map_err(|msg| Error::Verification(msg.to_string()))
  }

  /// Run the fixed pass pipeline. `linkonce_odr` duplicates are collapsed
  /// by the function-merging pass.
  pub fn optimize(&self) -> Result<()> {
    info!("running `{}` on `{}`", PASS_PIPELINE, self.module_name());
    let opts = PassBuilderOptions::create();
    opts.set_merge_functions(true);
    self.module()
      .run_passes(PASS_PIPELINE, self.machine(), opts)
      .map_err(|msg| Error::Target(msg.to_string()))
  }

  fn emit(&self, file_type: FileType) -> Result<MemoryBuffer> {
    self.verify()?;
    self.optimize()?;
    self.machine()
      .write_to_memory_buffer(self.module(), file_type)
      .map_err(|msg| Error::Target(msg.to_string()))
  }

  /// Emit textual assembly for a CPU backend.
  pub fn codegen_cpu_asm(&self) -> Result<String> {
    match self.backend() {
      Backend::X86_64Linux | Backend::Arm64MacOs => { },
      other => {
        return Err(Error::Target(format!("`{:?}` is not a CPU backend", other)));
      },
    }
    let buf = self.emit(FileType::Assembly)?;
    String::from_utf8(buf.as_slice().to_vec())
      .map_err(|e| Error::Target(format!("non-utf8 assembly output: {}", e)))
  }

  /// Emit PTX text for the Nvidia backend.
  pub fn codegen_nvidia_ptx(&self) -> Result<String> {
    let Backend::NvidiaPtx { .. } = self.backend() else {
      return Err(Error::Target("module was not configured for NVPTX".into()));
    };
    let buf = self.emit(FileType::Assembly)?;
    let ptx = String::from_utf8(buf.as_slice().to_vec())
      .map_err(|e| Error::Target(format!("non-utf8 PTX output: {}", e)))?;
    info!("emitted {} bytes of PTX", ptx.len());
    Ok(ptx)
  }

  /// Emit a relocatable AMDGPU object. Linking into an executable code
  /// object happens in the runtime-amd crate via the code-object manager.
  pub fn codegen_amdgpu_object(&self) -> Result<Vec<u8>> {
    let Backend::AmdGpu { .. } = self.backend() else {
      return Err(Error::Target("module was not configured for AMDGPU".into()));
    };
    let buf = self.emit(FileType::Object)?;
    info!("emitted {} bytes of relocatable object", buf.as_slice().len());
    Ok(buf.as_slice().to_vec())
  }
}
