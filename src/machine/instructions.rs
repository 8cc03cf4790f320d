use crate::machine::machine_errors::MachineError;

use modular_bitfield::prelude::*;

use std::convert::TryFrom;
use std::fmt;

/// One word of code memory: an operator or an operand, at the
/// bytecode provider's discretion.
pub type CodeWord = u64;

/// Processor modes. The mode is OR'd into the high bits of a fetched
/// operator word, so one `(opcode, mode)` match dispatches the loop.
#[derive(BitfieldSpecifier, Copy, Clone, Debug, PartialEq, Eq)]
#[bits = 2]
pub enum Mode {
    /// Top-level literal arguments: write or match the target frame's
    /// parameter slots.
    Arg = 0b00,
    /// Building a compound term's argument cells on the global stack.
    Copy = 0b01,
    /// Unifying against an existing term's argument cells.
    Match = 0b10,
}

pub const MODE_SHIFT: u32 = 62;
pub const OPCODE_MASK: u64 = (1 << MODE_SHIFT) - 1;

#[inline]
pub fn mode_bits(mode: Mode) -> u64 {
    (mode as u64) << MODE_SHIFT
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Opcode {
    /// Push a target frame for the next call.
    Frame = 0,
    /// Finalize the target frame as the activation of the called
    /// clause; operand is the frame size.
    Enter = 1,
    /// Call a predicate; operand is its constant-pool index.
    Call = 2,
    /// Return from a fact without ever entering it; operand is the
    /// frame size.
    Exit = 3,
    /// Return from a clause body; halts when the query frame returns.
    Return = 4,
    /// Functor argument; operand is a functor's constant-pool index.
    Functor = 5,
    /// Atom argument; operand is a 0-ary functor's constant-pool index.
    Constant = 6,
    /// First occurrence of a clause variable; operand is its cell index.
    FirstVar = 7,
    /// Later occurrence of a clause variable; operand is its cell index.
    Var = 8,
    /// Restore mode and argument cursor saved by the innermost
    /// enclosing `Functor`.
    Pop = 9,
}

impl TryFrom<CodeWord> for Opcode {
    type Error = MachineError;

    fn try_from(word: CodeWord) -> Result<Self, MachineError> {
        match word & OPCODE_MASK {
            0 => Ok(Opcode::Frame),
            1 => Ok(Opcode::Enter),
            2 => Ok(Opcode::Call),
            3 => Ok(Opcode::Exit),
            4 => Ok(Opcode::Return),
            5 => Ok(Opcode::Functor),
            6 => Ok(Opcode::Constant),
            7 => Ok(Opcode::FirstVar),
            8 => Ok(Opcode::Var),
            9 => Ok(Opcode::Pop),
            _ => Err(MachineError::IllegalOpcode(word)),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Opcode::Frame => "frame",
            Opcode::Enter => "enter",
            Opcode::Call => "call",
            Opcode::Exit => "exit",
            Opcode::Return => "return",
            Opcode::Functor => "functor",
            Opcode::Constant => "constant",
            Opcode::FirstVar => "firstvar",
            Opcode::Var => "var",
            Opcode::Pop => "pop",
        };

        write!(f, "{}", name)
    }
}

/// A scratchpad entry: an address together with the mode to restore
/// when it is popped.
#[bitfield]
#[repr(u64)]
#[derive(Copy, Clone, Debug)]
pub struct ScratchWord {
    addr: B62,
    mode: Mode,
}

impl ScratchWord {
    #[inline]
    pub fn build_with(mode: Mode, addr: usize) -> Self {
        ScratchWord::new().with_mode(mode).with_addr(addr as u64)
    }

    #[inline]
    pub fn get_mode(self) -> Mode {
        self.mode()
    }

    #[inline]
    pub fn get_addr(self) -> usize {
        self.addr() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_decodes_with_mode_bits() {
        let word = Opcode::Functor as u64 | mode_bits(Mode::Match);

        assert_eq!(Opcode::try_from(word).unwrap(), Opcode::Functor);
        assert_eq!(word >> MODE_SHIFT, Mode::Match as u64);
    }

    #[test]
    fn illegal_opcode_is_fatal() {
        assert_eq!(
            Opcode::try_from(0x3f),
            Err(MachineError::IllegalOpcode(0x3f))
        );
    }

    #[test]
    fn scratch_word_carries_mode_and_address() {
        let w = ScratchWord::build_with(Mode::Copy, crate::types::LOCAL_BASE + 3);

        assert_eq!(w.get_mode(), Mode::Copy);
        assert_eq!(w.get_addr(), crate::types::LOCAL_BASE + 3);
    }
}
