//! Register allocation.

use crate::expr::ExprId;
use alloc::format;
use alloc::vec::Vec;
use hashbrown::HashMap;
use shardql_core::{Error, Result};
use tracing::trace;

/// Hands out result registers, one per expression node.
///
/// Registers are never reused within a plan. Asking again for the register
/// of a node returns the one it already has; writing a different one is an
/// internal error.
#[derive(Debug, Default)]
pub struct RegisterAllocator {
    /// Node owning each allocated register, indexed by register.
    owners: Vec<Option<ExprId>>,
    regs: HashMap<ExprId, usize>,
    tuples: HashMap<ExprId, Vec<usize>>,
}

impl RegisterAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the register of `id`, allocating one if necessary.
    pub fn alloc(&mut self, id: ExprId) -> Result<usize> {
        if let Some(&reg) = self.regs.get(&id) {
            return Ok(reg);
        }
        let reg = self.fresh();
        trace!(node = %id, reg, "allocated register");
        self.assign(id, reg)?;
        Ok(reg)
    }

    /// Records `reg` as the result register of `id`.
    ///
    /// Writing the register a node already has is a no-op. Giving a node a
    /// second register, or a register held by another node, fails.
    pub fn assign(&mut self, id: ExprId, reg: usize) -> Result<()> {
        if let Some(&old) = self.regs.get(&id) {
            if old == reg {
                return Ok(());
            }
            return Err(Error::internal(format!(
                "register reassignment for node {}: ${} -> ${}",
                id, old, reg
            )));
        }
        match self.owners.get(reg) {
            None => Err(Error::internal(format!(
                "register ${} assigned to node {} was never allocated",
                reg, id
            ))),
            Some(Some(owner)) => Err(Error::internal(format!(
                "register ${} of node {} assigned to node {}",
                reg, owner, id
            ))),
            Some(None) => {
                self.owners[reg] = Some(id);
                self.regs.insert(id, reg);
                Ok(())
            }
        }
    }

    /// Returns the contiguous block of `len` registers of a tuple-producing
    /// node, allocating it if necessary.
    pub fn alloc_tuple(&mut self, id: ExprId, len: usize) -> Result<Vec<usize>> {
        if let Some(regs) = self.tuples.get(&id) {
            if regs.len() != len {
                return Err(Error::internal(format!(
                    "tuple register reassignment for node {}: {} -> {} registers",
                    id,
                    regs.len(),
                    len
                )));
            }
            return Ok(regs.clone());
        }
        let regs: Vec<usize> = (0..len).map(|_| self.fresh()).collect();
        for &reg in &regs {
            self.owners[reg] = Some(id);
        }
        trace!(node = %id, len, "allocated tuple registers");
        self.tuples.insert(id, regs.clone());
        Ok(regs)
    }

    /// Returns the register of `id` if it has one.
    #[inline]
    pub fn get(&self, id: ExprId) -> Option<usize> {
        self.regs.get(&id).copied()
    }

    /// Total number of registers allocated.
    #[inline]
    pub fn num_registers(&self) -> usize {
        self.owners.len()
    }

    fn fresh(&mut self) -> usize {
        self.owners.push(None);
        self.owners.len() - 1
    }
}
