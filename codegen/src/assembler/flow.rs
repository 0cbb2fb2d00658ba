//! Structured control flow.
//!
//! Two combinators cover everything the emitters need: a counted loop with
//! a phi-carried induction variable, and if / if-else. The closures run
//! exactly once, at emission time, writing straight-line IR into the
//! builder; `elif` chains are spelled by nesting in the else arm.

use inkwell::values::IntValue;
use inkwell::IntPredicate;

use crate::error::Result;

use super::Assembler;

impl<'ctx> Assembler<'ctx> {
  /// Counted loop over `[from, to_incl]`, inclusive on both ends, stepping
  /// by one. Descending loops compare with `sge`, ascending with `sle`.
  /// The body receives the induction value.
  pub fn emit_loop<F>(&self, name: &str, from: IntValue<'ctx>,
                      to_incl: IntValue<'ctx>, descending: bool, body: F)
    -> Result<()>
    where F: FnOnce(&Self, IntValue<'ctx>) -> Result<()>,
  {
    let pre = self.current_block()?;
    let f = pre.get_parent().unwrap();
    let ctx = self.context();
    let cond_bb = ctx.append_basic_block(f, &format!("{}.cond", name));
    let body_bb = ctx.append_basic_block(f, &format!("{}.body", name));
    let exit_bb = ctx.append_basic_block(f, &format!("{}.exit", name));

    let b = self.builder();
    b.build_unconditional_branch(cond_bb)?;

    b.position_at_end(cond_bb);
    let ty = from.get_type();
    let phi = b.build_phi(ty, &format!("{}.i", name))?;
    phi.add_incoming(&[(&from, pre)]);
    let iv = phi.as_basic_value().into_int_value();
    let pred = if descending { IntPredicate::SGE } else { IntPredicate::SLE };
    let keep_going = b.build_int_compare(pred, iv, to_incl, "")?;
    b.build_conditional_branch(keep_going, body_bb, exit_bb)?;

    b.position_at_end(body_bb);
    body(self, iv)?;
    // The body may have ended in a different block.
    let body_end = self.current_block()?;
    let one = ty.const_int(1, false);
    let next = if descending {
      self.builder().build_int_sub(iv, one, "")?
    } else {
      self.builder().build_int_add(iv, one, "")?
    };
    self.builder().build_unconditional_branch(cond_bb)?;
    phi.add_incoming(&[(&next, body_end)]);

    self.builder().position_at_end(exit_bb);
    Ok(())
  }

  /// `if cond { then_body }`.
  pub fn emit_if<F>(&self, name: &str, cond: IntValue<'ctx>, then_body: F)
    -> Result<()>
    where F: FnOnce(&Self) -> Result<()>,
  {
    let f = self.current_block()?.get_parent().unwrap();
    let ctx = self.context();
    let then_bb = ctx.append_basic_block(f, &format!("{}.then", name));
    let after_bb = ctx.append_basic_block(f, &format!("{}.after", name));

    self.builder().build_conditional_branch(cond, then_bb, after_bb)?;
    self.builder().position_at_end(then_bb);
    then_body(self)?;
    self.builder().build_unconditional_branch(after_bb)?;
    self.builder().position_at_end(after_bb);
    Ok(())
  }

  /// `if cond { then_body } else { else_body }`.
  pub fn emit_if_else<T, E>(&self, name: &str, cond: IntValue<'ctx>,
                            then_body: T, else_body: E)
    -> Result<()>
    where T: FnOnce(&Self) -> Result<()>,
          E: FnOnce(&Self) -> Result<()>,
  {
    let f = self.current_block()?.get_parent().unwrap();
    let ctx = self.context();
    let then_bb = ctx.append_basic_block(f, &format!("{}.then", name));
    let else_bb = ctx.append_basic_block(f, &format!("{}.else", name));
    let after_bb = ctx.append_basic_block(f, &format!("{}.after", name));

    self.builder().build_conditional_branch(cond, then_bb, else_bb)?;
    self.builder().position_at_end(then_bb);
    then_body(self)?;
    self.builder().build_unconditional_branch(after_bb)?;
    self.builder().position_at_end(else_bb);
    else_body(self)?;
    self.builder().build_unconditional_branch(after_bb)?;
    self.builder().position_at_end(after_bb);
    Ok(())
  }
}
