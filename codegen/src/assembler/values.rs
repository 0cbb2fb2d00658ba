//! Structured views over IR buffers.
//!
//! An [`Array`] is a `(pointer, array type)` pair; [`Field`] and the point
//! views wrap it with domain meaning. All of them are move-only on the
//! host: cloning one would alias an IR pointer under a second name and the
//! generated loads/stores would silently go wrong. Semantic copies are
//! spelled out with `store_from`.

use inkwell::types::{ArrayType, BasicTypeEnum, IntType, };
use inkwell::values::{BasicValueEnum, IntValue, PointerValue, };
use inkwell::IntPredicate;

use crate::error::{Error, Result, };

use super::Assembler;

/// View of an in-memory array of homogeneous elements.
pub struct Array<'ctx> {
  ptr: PointerValue<'ctx>,
  arr_ty: ArrayType<'ctx>,
  elem_ty: BasicTypeEnum<'ctx>,
}

impl<'ctx> Array<'ctx> {
  pub fn view(ptr: PointerValue<'ctx>, arr_ty: ArrayType<'ctx>) -> Self {
    Array {
      ptr,
      arr_ty,
      elem_ty: arr_ty.get_element_type(),
    }
  }

  pub fn alloca(asm: &Assembler<'ctx>, arr_ty: ArrayType<'ctx>, name: &str)
    -> Result<Self>
  {
    Ok(Self::view(asm.alloca(arr_ty.into(), name)?, arr_ty))
  }

  pub fn ptr(&self) -> PointerValue<'ctx> {
    self.ptr
  }

  pub fn ty(&self) -> ArrayType<'ctx> {
    self.arr_ty
  }

  pub fn len(&self) -> u32 {
    self.arr_ty.len()
  }

  pub fn elem_ptr(&self, asm: &Assembler<'ctx>, idx: IntValue<'ctx>)
    -> Result<PointerValue<'ctx>>
  {
    let zero = asm.context().i32_type().const_zero();
    let p = unsafe {
      asm.builder().build_in_bounds_gep(self.arr_ty, self.ptr,
                                        &[zero, idx], "")?
    };
    Ok(p)
  }

  pub fn get(&self, asm: &Assembler<'ctx>, i: u64) -> Result<BasicValueEnum<'ctx>> {
    let idx = asm.context().i32_type().const_int(i, false);
    self.get_at(asm, idx)
  }

  pub fn get_at(&self, asm: &Assembler<'ctx>, idx: IntValue<'ctx>)
    -> Result<BasicValueEnum<'ctx>>
  {
    let p = self.elem_ptr(asm, idx)?;
    Ok(asm.builder().build_load(self.elem_ty, p, "")?)
  }

  pub fn set(&self, asm: &Assembler<'ctx>, i: u64, v: BasicValueEnum<'ctx>)
    -> Result<()>
  {
    let idx = asm.context().i32_type().const_int(i, false);
    self.set_at(asm, idx, v)
  }

  pub fn set_at(&self, asm: &Assembler<'ctx>, idx: IntValue<'ctx>,
                v: BasicValueEnum<'ctx>)
    -> Result<()>
  {
    if v.get_type() != self.elem_ty {
      return Err(Error::Codegen(format!(
        "assignment type mismatch: element is {:?}, value is {:?}",
        self.elem_ty, v.get_type())));
    }
    let p = self.elem_ptr(asm, idx)?;
    asm.store(p, v)
  }

  /// Element-wise copy from `src`. This is the only way to duplicate the
  /// contents of a view.
  pub fn store_from(&self, asm: &Assembler<'ctx>, src: &Array<'ctx>)
    -> Result<()>
  {
    if src.arr_ty != self.arr_ty {
      return Err(Error::Codegen(format!(
        "copy between mismatched array types: {:?} vs {:?}",
        self.arr_ty, src.arr_ty)));
    }
    let v = asm.builder().build_load(self.arr_ty, src.ptr, "")?;
    asm.store(self.ptr, v)
  }
}

/// View of one field element: `numWords` limbs of `wordTy`.
pub struct Field<'ctx> {
  arr: Array<'ctx>,
}

impl<'ctx> Field<'ctx> {
  pub fn view(ptr: PointerValue<'ctx>, field_ty: ArrayType<'ctx>) -> Self {
    Field { arr: Array::view(ptr, field_ty), }
  }

  pub fn from_array(arr: Array<'ctx>) -> Self {
    Field { arr, }
  }

  pub fn alloca(asm: &Assembler<'ctx>, field_ty: ArrayType<'ctx>, name: &str)
    -> Result<Self>
  {
    Ok(Field { arr: Array::alloca(asm, field_ty, name)?, })
  }

  pub fn ptr(&self) -> PointerValue<'ctx> {
    self.arr.ptr()
  }

  pub fn ty(&self) -> ArrayType<'ctx> {
    self.arr.ty()
  }

  pub fn num_limbs(&self) -> u32 {
    self.arr.len()
  }

  pub fn limb(&self, asm: &Assembler<'ctx>, i: u64) -> Result<IntValue<'ctx>> {
    Ok(self.arr.get(asm, i)?.into_int_value())
  }

  pub fn limb_at(&self, asm: &Assembler<'ctx>, idx: IntValue<'ctx>)
    -> Result<IntValue<'ctx>>
  {
    Ok(self.arr.get_at(asm, idx)?.into_int_value())
  }

  pub fn set_limb(&self, asm: &Assembler<'ctx>, i: u64, v: IntValue<'ctx>)
    -> Result<()>
  {
    self.arr.set(asm, i, v.into())
  }

  /// Load the whole element as one wide integer (`intBufTy`). Limbs are
  /// little-endian, hosts are little-endian, so this is a plain load.
  pub fn load_int(&self, asm: &Assembler<'ctx>, int_buf_ty: IntType<'ctx>)
    -> Result<IntValue<'ctx>>
  {
    Ok(asm.builder().build_load(int_buf_ty, self.arr.ptr(), "")?
       .into_int_value())
  }

  pub fn store_int(&self, asm: &Assembler<'ctx>, v: IntValue<'ctx>)
    -> Result<()>
  {
    asm.store(self.arr.ptr(), v.into())
  }

  /// `self == 0`, as an `i1`.
  pub fn is_zero(&self, asm: &Assembler<'ctx>, int_buf_ty: IntType<'ctx>)
    -> Result<IntValue<'ctx>>
  {
    let v = self.load_int(asm, int_buf_ty)?;
    Ok(asm.builder().build_int_compare(IntPredicate::EQ, v,
                                       int_buf_ty.const_zero(), "")?)
  }

  pub fn store_from(&self, asm: &Assembler<'ctx>, src: &Field<'ctx>)
    -> Result<()>
  {
    self.arr.store_from(asm, &src.arr)
  }
}

/// Jacobian point view: three field elements X, Y, Z. Identity at Z = 0.
pub struct EcPointJac<'ctx> {
  arr: Array<'ctx>,
  field_ty: ArrayType<'ctx>,
}

impl<'ctx> EcPointJac<'ctx> {
  pub fn view(ptr: PointerValue<'ctx>, curve_ty: ArrayType<'ctx>) -> Self {
    let field_ty = curve_ty.get_element_type().into_array_type();
    EcPointJac { arr: Array::view(ptr, curve_ty), field_ty, }
  }

  pub fn alloca(asm: &Assembler<'ctx>, curve_ty: ArrayType<'ctx>, name: &str)
    -> Result<Self>
  {
    Ok(Self::view(asm.alloca(curve_ty.into(), name)?, curve_ty))
  }

  pub fn ptr(&self) -> PointerValue<'ctx> {
    self.arr.ptr()
  }

  fn coord(&self, asm: &Assembler<'ctx>, i: u64) -> Result<Field<'ctx>> {
    let idx = asm.context().i32_type().const_int(i, false);
    Ok(Field::view(self.arr.elem_ptr(asm, idx)?, self.field_ty))
  }

  pub fn x(&self, asm: &Assembler<'ctx>) -> Result<Field<'ctx>> {
    self.coord(asm, 0)
  }

  pub fn y(&self, asm: &Assembler<'ctx>) -> Result<Field<'ctx>> {
    self.coord(asm, 1)
  }

  pub fn z(&self, asm: &Assembler<'ctx>) -> Result<Field<'ctx>> {
    self.coord(asm, 2)
  }

  /// Set to the identity: all-zero coordinates (Z = 0 is what matters).
  pub fn set_identity(&self, asm: &Assembler<'ctx>) -> Result<()> {
    asm.store(self.arr.ptr(), self.arr.ty().const_zero().into())
  }

  pub fn store_from(&self, asm: &Assembler<'ctx>, src: &EcPointJac<'ctx>)
    -> Result<()>
  {
    self.arr.store_from(asm, &src.arr)
  }
}

/// Affine point view: X and Y, identity encoded as (0, 0).
pub struct EcPointAff<'ctx> {
  arr: Array<'ctx>,
  field_ty: ArrayType<'ctx>,
}

impl<'ctx> EcPointAff<'ctx> {
  pub fn view(ptr: PointerValue<'ctx>, curve_aff_ty: ArrayType<'ctx>) -> Self {
    let field_ty = curve_aff_ty.get_element_type().into_array_type();
    EcPointAff { arr: Array::view(ptr, curve_aff_ty), field_ty, }
  }

  pub fn ptr(&self) -> PointerValue<'ctx> {
    self.arr.ptr()
  }

  fn coord(&self, asm: &Assembler<'ctx>, i: u64) -> Result<Field<'ctx>> {
    let idx = asm.context().i32_type().const_int(i, false);
    Ok(Field::view(self.arr.elem_ptr(asm, idx)?, self.field_ty))
  }

  pub fn x(&self, asm: &Assembler<'ctx>) -> Result<Field<'ctx>> {
    self.coord(asm, 0)
  }

  pub fn y(&self, asm: &Assembler<'ctx>) -> Result<Field<'ctx>> {
    self.coord(asm, 1)
  }
}
