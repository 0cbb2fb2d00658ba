//! Structured façade over the LLVM IR builder.
//!
//! The [`Assembler`] owns the module, builder and target machine for one
//! compilation unit and enforces the rules every emitter relies on:
//!
//! - internal procedures get `internal` linkage and the fast calling
//!   convention, public kernels get the backend's kernel convention;
//! - aggregate parameters above the ABI threshold are passed by pointer;
//! - definitions are idempotent by name. The name → `(type, value,
//!   is_internal)` table is the sole guard against duplicate emission, and
//!   it is load-bearing: the algorithms are mutually recursive (point add
//!   calls field mul calls the carry primitives).
//!
//! The builder's insertion point is saved and restored around every
//! definition so nested emissions compose.

use std::cell::RefCell;
use std::collections::HashMap;

use inkwell::attributes::{Attribute, AttributeLoc, };
use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::{Linkage, Module, };
use inkwell::targets::{TargetData, TargetMachine, TargetTriple, };
use inkwell::types::{ArrayType, BasicMetadataTypeEnum, BasicType,
                     BasicTypeEnum, FunctionType, IntType, };
use inkwell::values::{BasicMetadataValueEnum, BasicValueEnum, FunctionValue,
                      GlobalValue, IntValue, PointerValue, UnnamedAddress, };
use inkwell::AddressSpace;

use log::debug;

use crate::backend::{Backend, FAST_CALL_CONV, };
use crate::error::{Error, Result, };

mod flow;
mod values;

pub use self::values::{Array, EcPointAff, EcPointJac, Field, };

/// Prefix for every linker section the generator creates.
pub const SECTION_PREFIX: &str = "ctt";

/// Function attributes the emitters may request. The underlying handles are
/// created once per assembler and cached.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FnAttr {
  Hot,
  InlineHint,
  AlwaysInline,
  NoInline,
}

struct AttrCache {
  hot: Attribute,
  inline_hint: Attribute,
  always_inline: Attribute,
  no_inline: Attribute,
}

impl AttrCache {
  fn new(ctx: &Context) -> Self {
    let mk = |name: &str| {
      ctx.create_enum_attribute(Attribute::get_named_enum_kind_id(name), 0)
    };
    AttrCache {
      hot: mk("hot"),
      inline_hint: mk("inlinehint"),
      always_inline: mk("alwaysinline"),
      no_inline: mk("noinline"),
    }
  }

  fn get(&self, attr: FnAttr) -> Attribute {
    match attr {
      FnAttr::Hot => self.hot,
      FnAttr::InlineHint => self.inline_hint,
      FnAttr::AlwaysInline => self.always_inline,
      FnAttr::NoInline => self.no_inline,
    }
  }
}

#[derive(Clone, Copy)]
struct FnEntry<'ctx> {
  ty: FunctionType<'ctx>,
  val: FunctionValue<'ctx>,
  internal: bool,
}

/// Typed access to the parameters of a function under definition.
///
/// Aggregates that were wrapped into pointers arrive as pointers here; the
/// declared type is kept alongside so emitters can reconstruct views.
pub struct Params<'ctx> {
  vals: Vec<BasicValueEnum<'ctx>>,
  decls: Vec<BasicTypeEnum<'ctx>>,
}

impl<'ctx> Params<'ctx> {
  pub fn len(&self) -> usize {
    self.vals.len()
  }

  pub fn is_empty(&self) -> bool {
    self.vals.is_empty()
  }

  pub fn raw(&self, i: usize) -> BasicValueEnum<'ctx> {
    self.vals[i]
  }

  pub fn decl(&self, i: usize) -> BasicTypeEnum<'ctx> {
    self.decls[i]
  }

  pub fn ptr(&self, i: usize) -> Result<PointerValue<'ctx>> {
    match self.vals[i] {
      BasicValueEnum::PointerValue(p) => Ok(p),
      other => {
        Err(Error::Codegen(format!("parameter {} is not a pointer: {:?}",
                                   i, other.get_type())))
      },
    }
  }

  pub fn int(&self, i: usize) -> Result<IntValue<'ctx>> {
    match self.vals[i] {
      BasicValueEnum::IntValue(v) => Ok(v),
      other => {
        Err(Error::Codegen(format!("parameter {} is not an integer: {:?}",
                                   i, other.get_type())))
      },
    }
  }

  /// View an aggregate parameter declared with array type `ty`, whether it
  /// was wrapped into a pointer or still passes by value (small shapes).
  pub fn array(&self, asm: &Assembler<'ctx>, i: usize, ty: ArrayType<'ctx>)
    -> Result<Array<'ctx>>
  {
    match self.vals[i] {
      BasicValueEnum::PointerValue(p) => Ok(Array::view(p, ty)),
      BasicValueEnum::ArrayValue(a) => {
        let slot = asm.alloca(ty.into(), "arg.spill")?;
        asm.store(slot, a.into())?;
        Ok(Array::view(slot, ty))
      },
      other => {
        Err(Error::Codegen(format!("parameter {} is not an aggregate: {:?}",
                                   i, other.get_type())))
      },
    }
  }

  pub fn field(&self, asm: &Assembler<'ctx>, i: usize, ty: ArrayType<'ctx>)
    -> Result<Field<'ctx>>
  {
    Ok(Field::from_array(self.array(asm, i, ty)?))
  }
}

/// Process-wide aggregate owning the module, builder and target machine of
/// one compilation unit. Create one per module; drop it last.
pub struct Assembler<'ctx> {
  ctx: &'ctx Context,
  module: Module<'ctx>,
  builder: Builder<'ctx>,
  machine: TargetMachine,
  layout: TargetData,
  backend: Backend,
  name: String,
  fns: RefCell<HashMap<String, FnEntry<'ctx>>>,
  globals: RefCell<HashMap<String, GlobalValue<'ctx>>>,
  attrs: AttrCache,
}

impl<'ctx> Assembler<'ctx> {
  pub fn new(ctx: &'ctx Context, backend: Backend, module_name: &str)
    -> Result<Self>
  {
    if cfg!(target_endian = "big") {
      return Err(Error::Configuration(
        "big-endian hosts are not supported".into()));
    }

    let machine = backend.target_machine()?;
    let layout = machine.get_target_data();
    let module = ctx.create_module(module_name);
    module.set_triple(&TargetTriple::create(backend.triple()));
    match backend.fixed_data_layout() {
      Some(s) => {
        let td = TargetData::create(s);
        module.set_data_layout(&td.get_data_layout());
      },
      None => {
        module.set_data_layout(&layout.get_data_layout());
      },
    }

    debug!("new assembler `{}` for {:?}", module_name, backend);

    Ok(Assembler {
      module,
      builder: ctx.create_builder(),
      machine,
      layout,
      backend,
      name: module_name.into(),
      fns: RefCell::new(HashMap::new()),
      globals: RefCell::new(HashMap::new()),
      attrs: AttrCache::new(ctx),
      ctx,
    })
  }

  pub fn context(&self) -> &'ctx Context {
    self.ctx
  }

  pub fn module(&self) -> &Module<'ctx> {
    &self.module
  }

  pub fn module_name(&self) -> &str {
    &self.name
  }

  pub fn builder(&self) -> &Builder<'ctx> {
    &self.builder
  }

  pub fn backend(&self) -> &Backend {
    &self.backend
  }

  pub(crate) fn machine(&self) -> &TargetMachine {
    &self.machine
  }

  pub fn ptr_ty(&self) -> BasicTypeEnum<'ctx> {
    self.ctx.ptr_type(AddressSpace::default()).into()
  }

  pub fn bool_ty(&self) -> IntType<'ctx> {
    self.ctx.bool_type()
  }

  /// Whether `name` has already been defined through this assembler.
  pub fn is_defined(&self, name: &str) -> bool {
    self.fns.borrow().contains_key(name)
  }

  /// PTX has no linker sections; everywhere else symbols are grouped so
  /// the linker can drop unused per-descriptor constants.
  fn supports_sections(&self) -> bool {
    !matches!(self.backend, Backend::NvidiaPtx { .. })
  }

  /// Aggregate-passing rule: wrap into a pointer any aggregate whose ABI
  /// size exceeds three pointer widths or whose element count is three or
  /// more. SIMD vectors are exempt and pass by value.
  fn wrap_param(&self, ty: BasicTypeEnum<'ctx>) -> BasicMetadataTypeEnum<'ctx> {
    let by_ptr = match ty {
      BasicTypeEnum::VectorType(_) => false,
      BasicTypeEnum::ArrayType(a) => {
        a.len() >= 3 || self.layout.get_abi_size(&ty)
          > 3 * self.layout.get_pointer_byte_size(None) as u64
      },
      BasicTypeEnum::StructType(_) => {
        self.layout.get_abi_size(&ty)
          > 3 * self.layout.get_pointer_byte_size(None) as u64
      },
      _ => false,
    };
    if by_ptr {
      self.ctx.ptr_type(AddressSpace::default()).into()
    } else {
      ty.into()
    }
  }

  fn define_function<F>(&self, name: &str, section: &str,
                        ret: Option<BasicTypeEnum<'ctx>>,
                        params: &[BasicTypeEnum<'ctx>],
                        attrs: &[FnAttr],
                        linkage: Linkage, call_conv: Option<u32>,
                        internal: bool,
                        body: F)
    -> Result<FunctionValue<'ctx>>
    where F: FnOnce(&Self, &Params<'ctx>) -> Result<Option<BasicValueEnum<'ctx>>>,
  {
    if let Some(entry) = self.fns.borrow().get(name) {
      return Ok(entry.val);
    }
    debug!("defining `{}` in section `{}`", name, section);

    let wrapped: Vec<BasicMetadataTypeEnum> = params
      .iter()
      .map(|&t| self.wrap_param(t))
      .collect();
    let fn_ty = match ret {
      Some(t) => t.fn_type(&wrapped, false),
      None => self.ctx.void_type().fn_type(&wrapped, false),
    };
    let f = self.module.add_function(name, fn_ty, Some(linkage));
    if let Some(cc) = call_conv {
      f.set_call_conventions(cc);
    }
    if self.supports_sections() {
      f.as_global_value()
        .set_section(Some(&format!("{}.{}", SECTION_PREFIX, section)));
    }
    for &a in attrs {
      f.add_attribute(AttributeLoc::Function, self.attrs.get(a));
    }
    self.fns.borrow_mut().insert(name.into(), FnEntry {
      ty: fn_ty,
      val: f,
      internal,
    });

    let saved = self.builder.get_insert_block();
    let entry = self.ctx.append_basic_block(f, "entry");
    self.builder.position_at_end(entry);

    let params = Params {
      vals: f.get_param_iter().collect(),
      decls: params.to_vec(),
    };
    let ret_val = body(self, &params)?;
    match ret_val {
      Some(v) => {
        self.builder.build_return(Some(&v))?;
      },
      None => {
        self.builder.build_return(None)?;
      },
    }

    if let Some(bb) = saved {
      self.builder.position_at_end(bb);
    }
    Ok(f)
  }

  /// Define an internal procedure: `internal` linkage, fast calling
  /// convention. Idempotent by name.
  pub fn define_internal_function<F>(&self, name: &str, section: &str,
                                     ret: Option<BasicTypeEnum<'ctx>>,
                                     params: &[BasicTypeEnum<'ctx>],
                                     attrs: &[FnAttr],
                                     body: F)
    -> Result<FunctionValue<'ctx>>
    where F: FnOnce(&Self, &Params<'ctx>) -> Result<Option<BasicValueEnum<'ctx>>>,
  {
    self.define_function(name, section, ret, params, attrs,
                         Linkage::Internal, Some(FAST_CALL_CONV), true, body)
  }

  /// Define a public kernel: default linkage, backend kernel calling
  /// convention. On Nvidia the function is additionally tagged through the
  /// `nvvm.annotations` metadata so the driver treats it as a kernel.
  pub fn define_public_function<F>(&self, name: &str, section: &str,
                                   params: &[BasicTypeEnum<'ctx>],
                                   attrs: &[FnAttr],
                                   body: F)
    -> Result<FunctionValue<'ctx>>
    where F: FnOnce(&Self, &Params<'ctx>) -> Result<Option<BasicValueEnum<'ctx>>>,
  {
    if let Some(entry) = self.fns.borrow().get(name) {
      return Ok(entry.val);
    }
    let cc = self.backend.kernel_call_conv();
    let f = self.define_function(name, section, None, params, attrs,
                                 Linkage::External, cc, false, body)?;
    if let Backend::NvidiaPtx { .. } = self.backend {
      let i32_ty = self.ctx.i32_type();
      let md = self.ctx.metadata_node(&[
        f.as_global_value().as_pointer_value().into(),
        self.ctx.metadata_string("kernel").into(),
        i32_ty.const_int(1, false).into(),
      ]);
      self.module
        .add_global_metadata("nvvm.annotations", &md)
        .map_err(|e| Error::Codegen(format!("nvvm annotation: {}", e)))?;
    }
    Ok(f)
  }

  /// Call a previously defined function, applying the fast convention on
  /// the call site when the target is internal.
  pub fn call(&self, name: &str, args: &[BasicMetadataValueEnum<'ctx>])
    -> Result<Option<BasicValueEnum<'ctx>>>
  {
    let entry = *self.fns.borrow().get(name).ok_or_else(|| {
      Error::Codegen(format!("call to undefined function `{}`", name))
    })?;
    debug_assert_eq!(entry.ty.count_param_types() as usize, args.len(),
                     "arity mismatch calling `{}`", name);
    let site = self.builder.build_call(entry.val, args, "")?;
    if entry.internal {
      site.set_call_convention(FAST_CALL_CONV);
    }
    Ok(site.try_as_basic_value().left())
  }

  /// Define (or fetch) an immutable global. Globals are grouped per
  /// section under `ctt.<section>.constants` so the linker can drop the
  /// unused ones; `linkonce_odr` merges duplicates across modules.
  pub fn define_global_constant(&self, name: &str, section: &str,
                                init: BasicValueEnum<'ctx>, align: u32)
    -> Result<GlobalValue<'ctx>>
  {
    if let Some(g) = self.globals.borrow().get(name) {
      return Ok(*g);
    }
    let g = self.module.add_global(init.get_type(), None, name);
    g.set_initializer(&init);
    g.set_constant(true);
    g.set_linkage(Linkage::LinkOnceODR);
    g.set_unnamed_address(UnnamedAddress::Global);
    if self.supports_sections() {
      g.set_section(Some(&format!("{}.{}.constants", SECTION_PREFIX, section)));
    }
    g.set_alignment(align);
    self.globals.borrow_mut().insert(name.into(), g);
    Ok(g)
  }

  /// Alloca in the entry block of the current function, regardless of
  /// where the builder currently sits. Keeps loop bodies from growing the
  /// stack per iteration.
  pub fn alloca(&self, ty: BasicTypeEnum<'ctx>, name: &str)
    -> Result<PointerValue<'ctx>>
  {
    let cur = self.current_block()?;
    let f = cur.get_parent().ok_or_else(|| {
      Error::Codegen("alloca outside of a function".into())
    })?;
    let entry = f.get_first_basic_block().ok_or_else(|| {
      Error::Codegen("function has no entry block".into())
    })?;
    match entry.get_first_instruction() {
      Some(inst) => self.builder.position_before(&inst),
      None => self.builder.position_at_end(entry),
    }
    let p = self.builder.build_alloca(ty, name)?;
    self.builder.position_at_end(cur);
    Ok(p)
  }

  pub(crate) fn current_block(&self) -> Result<BasicBlock<'ctx>> {
    self.builder.get_insert_block().ok_or_else(|| {
      Error::Codegen("builder has no insertion point".into())
    })
  }

  /// Store a non-pointer value. Storing a pointer through this entry point
  /// is almost always an aliasing bug; use [`Assembler::store_ptr`] when a
  /// pointer is really what should land in memory.
  pub fn store(&self, dst: PointerValue<'ctx>, v: BasicValueEnum<'ctx>)
    -> Result<()>
  {
    if v.is_pointer_value() {
      return Err(Error::Codegen(
        "store of a pointer value; use store_ptr if intended".into()));
    }
    self.builder.build_store(dst, v)?;
    Ok(())
  }

  pub fn store_ptr(&self, dst: PointerValue<'ctx>, v: PointerValue<'ctx>)
    -> Result<()>
  {
    self.builder.build_store(dst, v)?;
    Ok(())
  }
}
