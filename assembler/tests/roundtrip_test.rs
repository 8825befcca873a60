//! `assemble(disassemble(rom)) == rom` for a handful of representative
//! programs, exercising every branch/addressing shape in the ISA.

use vm_assembler::disassemble::disassemble;
use vm_assembler::{assemble, AssembleError};

fn assert_round_trips(source: &str) {
    let rom = assemble(source).expect("assemble");
    let text = disassemble(&rom).expect("disassemble");
    let rom_again = assemble(&text).expect("re-assemble disassembled text");
    assert_eq!(rom, rom_again, "round trip mismatch for:\n{source}\n---\n{text}");
}

#[test]
fn straight_line_program_round_trips() {
    assert_round_trips("MOV R0, 3\nMOV R1, 4\nADD R0, R1\nHLT\n");
}

#[test]
fn conditional_branch_round_trips() {
    assert_round_trips(
        "MOV R0, 0\nJZ R0, DONE\nMOV R0, 9\nDONE: HLT\n",
    );
}

#[test]
fn call_and_ret_round_trip() {
    assert_round_trips(
        "MOV R0, 1\nCALL ADDONE\nHLT\nADDONE: MOV R1, 1\nADD R0, R1\nRET\n",
    );
}

#[test]
fn two_register_compare_branch_round_trips() {
    assert_round_trips(
        "MOV R0, 1\nMOV R1, 1\nJEQ R0, R1, SAME\nHLT\nSAME: MOV R2, 1\nHLT\n",
    );
}

#[test]
fn drawing_instructions_round_trip() {
    assert_round_trips(
        "MOV R0, 1\nMOV R1, 2\nMOV R2, 255\nDRW R0, R1, R2\nCLR\nRENDER\nHLT\n",
    );
}

#[test]
fn rect_and_rnd_and_rndmap_round_trip() {
    assert_round_trips(
        "MOV R0, 0\nMOV R1, 0\nMOV R2, 4\nMOV R3, 4\nMOV R4, 7\nRECT R0, R1, R2, R3, R4\nSEED 42\nRND R5\nRNDMAP R5, 0, 255\nHLT\n",
    );
}

#[test]
fn forward_and_backward_labels_share_one_table() {
    assert_round_trips(
        "JMP START\nLOOP: SUB R0, R1\nJNZ R0, LOOP\nHLT\nSTART: MOV R0, 10\nMOV R1, 1\nJMP LOOP\n",
    );
}

#[test]
fn truncated_rom_is_rejected_not_panicked() {
    let rom = [0x01, 0x00, 1]; // MOV missing its last operand byte
    assert!(matches!(
        disassemble(&rom),
        Err(AssembleError::TruncatedInstruction { offset: 0 })
    ));
}
