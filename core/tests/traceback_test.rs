//! A fatal halt must flip the `halted` flag exactly once and leave the VM
//! state readable afterwards (the debug plane still needs to answer
//! GET_REGISTERS/GET_STACK after a crash).

use vm_core::vm::Vm;

#[test]
fn halting_twice_is_a_no_op() {
    let rom = [0xFF]; // HLT
    let mut vm = Vm::new(&rom).unwrap();
    vm.cycle();
    assert!(vm.halted());
    let pc_after_first_halt = vm.pc();

    // A second halt (e.g. a racing debug HALT command) must not move PC
    // or re-print a second traceback.
    vm.halt("redundant halt");
    assert_eq!(vm.pc(), pc_after_first_halt);
}

#[test]
fn state_remains_readable_after_a_fatal_halt() {
    let rom = [
        0x01, 0x00, 5, 0, // MOV R0, 5
        0x09, 0x00, // PUSH R0
        0xAB, // unknown opcode
    ];
    let mut vm = Vm::new(&rom).unwrap();
    for _ in 0..10 {
        if vm.halted() {
            break;
        }
        vm.cycle();
    }
    assert!(vm.halted());
    assert_eq!(vm.registers().get(0).unwrap(), 5);
    assert_eq!(vm.stack().snapshot(), &[5]);
}
