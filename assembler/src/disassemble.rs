//! Disassembler used only as a test oracle for `assemble(disassemble(rom)) == rom`.
//!
//! Not exposed through the runner CLI; it exists so the assembler's
//! round-trip property can be checked without a second, independent
//! source of truth for the ISA.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use vm_core::isa::Operand;
use vm_core::prelude::Opcode;

use crate::error::AssembleError;

enum OperandValue {
    Reg(u8),
    Imm16(u16),
    Addr16(u16),
    Imm32(u32),
}

struct Decoded {
    offset: usize,
    opcode: Opcode,
    operands: Vec<OperandValue>,
}

/// Walk `rom` opcode by opcode and render assembly text with synthetic
/// `L<offset>:` labels at every address an `Addr16` operand names.
pub fn disassemble(rom: &[u8]) -> Result<String, AssembleError> {
    let mut decoded = Vec::new();
    let mut targets = BTreeSet::new();
    let mut offset = 0usize;

    while offset < rom.len() {
        let byte = rom[offset];
        let opcode =
            Opcode::from_byte(byte).ok_or(AssembleError::UnknownOpcodeByte { offset, byte })?;

        if offset + opcode.size() > rom.len() {
            return Err(AssembleError::TruncatedInstruction { offset });
        }

        let mut cursor = offset + 1;
        let mut operands = Vec::new();
        for shape in opcode.operands() {
            match shape {
                Operand::Reg => {
                    operands.push(OperandValue::Reg(rom[cursor]));
                    cursor += 1;
                }
                Operand::Imm16 => {
                    let value = u16::from_le_bytes([rom[cursor], rom[cursor + 1]]);
                    operands.push(OperandValue::Imm16(value));
                    cursor += 2;
                }
                Operand::Addr16 => {
                    let value = u16::from_le_bytes([rom[cursor], rom[cursor + 1]]);
                    targets.insert(value);
                    operands.push(OperandValue::Addr16(value));
                    cursor += 2;
                }
                Operand::Imm32 => {
                    let value = u32::from_le_bytes([
                        rom[cursor],
                        rom[cursor + 1],
                        rom[cursor + 2],
                        rom[cursor + 3],
                    ]);
                    operands.push(OperandValue::Imm32(value));
                    cursor += 4;
                }
            }
        }

        decoded.push(Decoded {
            offset,
            opcode,
            operands,
        });
        offset = cursor;
    }

    let mut out = String::new();
    for inst in &decoded {
        if targets.contains(&(inst.offset as u16)) {
            writeln!(out, "L{}:", inst.offset).unwrap();
        }

        write!(out, "{}", inst.opcode.mnemonic()).unwrap();
        let mut first = true;
        for operand in &inst.operands {
            out.push_str(if first { " " } else { ", " });
            first = false;
            match operand {
                OperandValue::Reg(r) => write!(out, "R{r}").unwrap(),
                OperandValue::Imm16(v) => write!(out, "{v}").unwrap(),
                OperandValue::Addr16(v) => write!(out, "L{v}").unwrap(),
                OperandValue::Imm32(v) => write!(out, "{v}").unwrap(),
            }
        }
        writeln!(out).unwrap();
    }

    Ok(out)
}
