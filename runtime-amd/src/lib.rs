//! AMD code-object handling for generated kernels.
//!
//! The codegen crate emits a relocatable ELF for `amdgcn-amd-amdhsa`; the
//! code-object manager turns it into an executable code object here. The
//! kernel dispatch parameters (segment sizes, kernarg alignment) live in a
//! msgpack map inside an `NT_AMDGPU_METADATA` note of the linked image, so
//! this crate also knows how to dig them out.

use std::path::PathBuf;

use amd_comgr::action::{Action, ActionInfo, ActionKind, };
use amd_comgr::data::{Data, RelocatableData, };
use amd_comgr::set::DataSet;

use goblin::Object;

use log::{debug, info, };

use serde::Deserialize;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
  /// The code-object manager returned a non-success status.
  #[error("comgr: {0}")]
  Comgr(#[from] amd_comgr::Error),

  /// The linked image failed the log dump path or linked with errors.
  #[error("link failed:\n{0}")]
  Link(String),

  #[error("object parse: {0}")]
  Object(#[from] goblin::error::Error),

  #[error("kernel metadata decode: {0}")]
  Metadata(#[from] rmp_serde::decode::Error),

  /// The image carries no `NT_AMDGPU_METADATA` note.
  #[error("missing kernel metadata note")]
  MissingKernelMetadata,

  #[error("io: {0}")]
  Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Full ISA name the code-object manager wants, e.g.
/// `amdgcn-amd-amdhsa--gfx90a`.
pub fn isa_name(gfx: &str) -> String {
  format!("amdgcn-amd-amdhsa--{}", gfx)
}

/// Link one relocatable object into an executable code object. On failure
/// the comgr logs are folded into the error.
pub fn link_code_object(obj: &[u8], isa: &str) -> Result<Vec<u8>> {
  info!("linking {} byte relocatable for {}", obj.len(), isa);

  let mut data = RelocatableData::new()?;
  data.set_data(obj)?;
  data.set_name("ecliptic-kernels.o".into())?;
  let mut set = DataSet::new()?;
  set.add_data(&data)?;

  let mut action = Action {
    kind: ActionKind::LinkRelocToExe,
    info: ActionInfo::new()?,
  };
  let tdir = tempfile::Builder::new()
    .prefix("ecliptic-amd-link-")
    .tempdir()?;
  let work: PathBuf = tdir.path().into();
  action.set_working_path(Some(work))?;
  action.set_logging(true)?;
  // comgr requires an isa, even for linking.
  action.set_isa_name(Some(isa.to_string()))?;

  let mut out_set = DataSet::new()?;
  if let Err(err) = set.perform_into(&action, &mut out_set) {
    let mut logs = String::new();
    if out_set.logs_len().unwrap_or(0) > 0 {
      for log in out_set.log_iter()? {
        let log = log?;
        if let Ok(text) = log.data_str() {
          logs.push_str(&text);
          logs.push('\n');
        }
      }
    }
    if logs.is_empty() {
      return Err(err.into());
    }
    return Err(Error::Link(logs));
  }

  let exe = out_set.get_executable(0)?;
  Ok(exe.data()?)
}

// See https://llvm.org/docs/AMDGPUUsage.html#code-object-v3-metadata
const NT_AMDGPU_METADATA: u32 = 32;

#[derive(Clone, Debug, Deserialize)]
struct HsaMetadataMap<'a> {
  #[serde(rename = "amdhsa.version")]
  #[allow(dead_code)]
  version: (u32, u32),
  // "amdhsa.printf" is skipped.
  #[serde(borrow, rename = "amdhsa.kernels")]
  kernels: Vec<HsaKernelMetadataMap<'a>>,
}

#[derive(Clone, Debug, Deserialize)]
struct HsaKernelMetadataMap<'a> {
  #[serde(borrow, rename = ".name")]
  name: &'a str,
  #[serde(borrow, rename = ".symbol")]
  kernel_desc_symbol: &'a str,
  #[serde(rename = ".kernarg_segment_size")]
  kernarg_segment_size: u32,
  #[serde(rename = ".group_segment_fixed_size")]
  group_segment_size: u32,
  #[serde(rename = ".private_segment_fixed_size")]
  private_segment_size: u32,
  #[serde(rename = ".kernarg_segment_align")]
  kernarg_segment_align: u32,
}

/// Dispatch-relevant metadata of one kernel in a linked code object.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KernelMeta {
  pub name: String,
  /// The `.kd` kernel-descriptor symbol dispatch packets point at.
  pub descriptor_symbol: String,
  pub kernarg_segment_size: u32,
  pub group_segment_size: u32,
  pub private_segment_size: u32,
  pub kernarg_segment_p2align: u8,
}

/// Parse the `NT_AMDGPU_METADATA` note of a linked code object.
pub fn parse_kernel_metadata(exe: &[u8]) -> Result<Vec<KernelMeta>> {
  let elf = match Object::parse(exe)? {
    Object::Elf(elf) => elf,
    // The linker only ever hands back ELF images.
    other => {
      debug!("not an ELF image: {:?}", other);
      return Err(Error::MissingKernelMetadata);
    },
  };

  let mut metadata: Option<HsaMetadataMap> = None;
  if let Some(notes) = elf.iter_note_sections(exe, None) {
    for note in notes {
      let note = note?;
      if note.n_type != NT_AMDGPU_METADATA {
        continue;
      }
      let md: HsaMetadataMap = rmp_serde::from_slice(note.desc)?;
      debug!("found NT_AMDGPU_METADATA with {} kernels", md.kernels.len());
      metadata = Some(md);
      break;
    }
  }
  let metadata = metadata.ok_or(Error::MissingKernelMetadata)?;

  Ok(metadata.kernels
    .iter()
    .map(|k| KernelMeta {
      name: k.name.into(),
      descriptor_symbol: k.kernel_desc_symbol.into(),
      kernarg_segment_size: k.kernarg_segment_size,
      group_segment_size: k.group_segment_size,
      private_segment_size: k.private_segment_size,
      kernarg_segment_p2align: k.kernarg_segment_align.trailing_zeros() as u8,
    })
    .collect())
}
