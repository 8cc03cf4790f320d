use modular_bitfield::prelude::*;

use std::fmt;

/// Base address of the local stack. Global-stack addresses lie strictly
/// below it, so a plain integer comparison decides both the region an
/// address belongs to and its age: global cells are older than local
/// cells, and within a region lower addresses are older.
pub const LOCAL_BASE: usize = 1 << 32;

/// Sentinel for "no frame" / "no choice point". Local addresses start at
/// `LOCAL_BASE` and the global cell at 0 is never a frame pointer, so
/// zero is free to mean absence.
pub const NONE: usize = 0;

#[derive(BitfieldSpecifier, Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[bits = 2]
pub enum WordTag {
    /// An address of another cell; a cell referencing itself is an
    /// unbound variable.
    Ref = 0b00,
    /// A global-stack address holding a `Fun` word followed by that
    /// functor's argument cells.
    Str = 0b01,
    /// A constant-pool index of a functor symbol; found only at the
    /// head of a structure block.
    Fun = 0b10,
    /// A constant-pool index of a 0-ary functor (an atom).
    Con = 0b11,
}

/// A tagged machine word. Every cell of the global and local stacks is
/// one of these; the payload is an address for `Ref`/`Str` and a
/// constant-pool index for `Fun`/`Con`.
#[bitfield]
#[repr(u64)]
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct MachineWord {
    val: B62,
    tag: WordTag,
}

impl MachineWord {
    #[inline(always)]
    pub fn build_with(tag: WordTag, val: usize) -> Self {
        MachineWord::new().with_tag(tag).with_val(val as u64)
    }

    #[inline(always)]
    pub fn reference(addr: usize) -> Self {
        MachineWord::build_with(WordTag::Ref, addr)
    }

    #[inline(always)]
    pub fn structure(addr: usize) -> Self {
        MachineWord::build_with(WordTag::Str, addr)
    }

    #[inline(always)]
    pub fn functor(index: usize) -> Self {
        MachineWord::build_with(WordTag::Fun, index)
    }

    #[inline(always)]
    pub fn constant(index: usize) -> Self {
        MachineWord::build_with(WordTag::Con, index)
    }

    #[inline(always)]
    pub fn get_tag(self) -> WordTag {
        self.tag()
    }

    #[inline(always)]
    pub fn get_value(self) -> usize {
        self.val() as usize
    }

    /// An unbound variable is a reference to its own cell.
    #[inline(always)]
    pub fn is_unbound_at(self, addr: usize) -> bool {
        self.get_tag() == WordTag::Ref && self.get_value() == addr
    }
}

impl Default for MachineWord {
    fn default() -> Self {
        MachineWord::reference(0)
    }
}

impl fmt::Debug for MachineWord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let tag = match self.get_tag() {
            WordTag::Ref => "REF",
            WordTag::Str => "STR",
            WordTag::Fun => "FUN",
            WordTag::Con => "CON",
        };

        write!(f, "{}({})", tag, self.get_value())
    }
}

#[inline(always)]
pub fn is_local(addr: usize) -> bool {
    addr >= LOCAL_BASE
}

#[inline(always)]
pub fn is_global(addr: usize) -> bool {
    addr < LOCAL_BASE
}
