use regvm::assembler;
use regvm::disasm;
use regvm::spec;
use regvm::vm::{self, Machine};

fn assemble(source: &str) -> Vec<u8> {
    assembler::assemble(source.as_bytes(), false).unwrap().rom
}

/// S1 - Hello world: a ROM-resident string printed through SYSCALL 0x00.
#[test]
fn hello_world_header_and_layout() {
    let source = "STR:\n.db \"Hello!\\n\"\n_START:\nLDA 0x0\nLEX STR\nSYSCALL\nBRK\n";
    let rom = assemble(source);

    assert_eq!(rom[0], spec::MAGIC_NUMBER);
    assert_eq!(rom[1], spec::LANGUAGE_VERSION);
    assert_eq!(&rom[4..15], &[spec::RESERVED_FILL; 11]);

    // STR is at offset 16, spans 8 bytes ("Hello!\n" + NUL), so _START is at 0x18.
    let entry_point = u16::from_le_bytes([rom[2], rom[3]]);
    assert_eq!(entry_point, 0x18);
    assert_eq!(&rom[16..24], b"Hello!\n\0");

    let mut machine = Machine::load(&rom, None).unwrap();
    let halt = machine.run().unwrap();
    assert_eq!(halt, vm::Halt::Break);
}

/// S3 - Relative labels: `@-` and `@--` must resolve in strict backward order.
#[test]
fn relative_labels_resolve_in_insertion_order() {
    let source = "_START:\n@:\nNOP\n@:\nNOP\nJMP @-\nJMP @--\nBRK\n";
    let rom = assemble(source);

    // _START: (0 bytes) @: (0 bytes) NOP (1 byte) @: (0 bytes) NOP (1 byte)
    // -> first anonymous label at offset 16, second at offset 17.
    let first_anon = spec::HEADER_LEN as u16;
    let second_anon = spec::HEADER_LEN as u16 + 1;

    // First JMP (@-) targets the nearer (second) anonymous label.
    let jmp1_operand_offset = 19;
    let target1 = u16::from_le_bytes([rom[jmp1_operand_offset], rom[jmp1_operand_offset + 1]]);
    assert_eq!(target1, second_anon);

    // Second JMP (@--) targets the farther (first) anonymous label.
    let jmp2_operand_offset = jmp1_operand_offset + 3;
    let target2 = u16::from_le_bytes([rom[jmp2_operand_offset], rom[jmp2_operand_offset + 1]]);
    assert_eq!(target2, first_anon);
}

/// S5 - Arithmetic flags match the exact bit patterns in spec.md.
#[test]
fn arithmetic_flags_match_known_vectors() {
    let (result, flags) = vm::add_with_carry(0x7FFF_FFFF, 1, false);
    assert_eq!(result, 0x8000_0000);
    assert!(!flags.carry);
    assert!(flags.overflow);
    assert!(flags.negative);
    assert!(!flags.zero);

    let (result, flags) = vm::sub_with_borrow(0x8000_0000, 1, true);
    assert_eq!(result, 0x7FFF_FFFF);
    assert!(!flags.carry);
    assert!(flags.overflow);
    assert!(!flags.negative);
    assert!(!flags.zero);
}

/// S6 - Wrap-safe WRAM read spanning the top of the address space.
#[test]
fn wrap_safe_read_crosses_address_space_boundary() {
    let rom = assemble("_START:\nBRK\n");
    let mut machine = Machine::load(&rom, None).unwrap();
    for (i, byte) in [0xFB, 0xFC, 0xFD, 0xFE, 0xFF].iter().enumerate() {
        let addr = (0xFFFB + i) as u16;
        machine.wram[addr as usize] = *byte;
    }
    machine.wram[0x0000] = 0x00;
    machine.wram[0x0001] = 0x01;

    assert_eq!(machine.read_wram(0xFFFF, 4), 0x0201_00FF);
}

/// Invariant 3: a debug-metadata-free ROM survives a disassemble/reassemble round trip.
#[test]
fn disassemble_reassemble_round_trip_is_byte_exact() {
    let source = "_START:\nLDA 0x2A\nSTA $0x100\nJMP skip\nNOP\nskip:\nBRK\n";
    let rom = assemble(source);
    let text = disasm::disassemble(&rom);

    let reassembled_source: String = text
        .lines()
        .filter(|line| !line.starts_with(';'))
        .collect::<Vec<_>>()
        .join("\n")
        + "\n";
    let rom2 = assemble(&reassembled_source);
    assert_eq!(rom, rom2);
}

/// Invariant 6: two-pass codegen is a fixed point under re-emission.
#[test]
fn codegen_is_a_fixed_point_across_runs() {
    let source = "_START:\nJMP done\nNOP\ndone:\nBRK\n";
    let rom_a = assemble(source);
    let rom_b = assemble(source);
    assert_eq!(rom_a, rom_b);
}

/// Invariant 5: JSR/RET round-trips PC back to the instruction after the call site.
#[test]
fn jsr_ret_returns_to_instruction_after_call_site() {
    let rom = assemble("_START:\nJSR sub\nBRK\nsub:\nRET\n");
    let mut machine = Machine::load(&rom, None).unwrap();
    assert_eq!(machine.run().unwrap(), vm::Halt::Break);
}

#[test]
fn missing_start_label_is_a_lexer_error() {
    let err = assembler::assemble(b"NOP\nBRK\n", false).unwrap_err();
    assert!(matches!(err, assembler::Error::Lexer(_)));
}

#[test]
fn undefined_identifier_is_a_codegen_error() {
    let err = assembler::assemble(b"_START:\nJMP nowhere\nBRK\n", false).unwrap_err();
    assert!(matches!(err, assembler::Error::Codegen(_)));
}
