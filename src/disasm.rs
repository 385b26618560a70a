//! Straightforward inverse of the opcode table: turns a ROM image back into
//! readable assembly text. One line per decoded instruction, falling back to
//! a raw `.db` line for any byte that isn't a recognized opcode. Debug
//! metadata spans (when present) are rendered as comments rather than
//! instructions.

use crate::spec::{self, DebugMetadataKind, Header, Opcode};

/// Disassemble a full ROM, header included, into a text listing.
pub fn disassemble(rom: &[u8]) -> String {
    let mut out = String::new();
    let header = match Header::parse(rom) {
        Ok(h) => h,
        Err(e) => {
            out.push_str(&format!("; unparsable header: {e}\n"));
            return out;
        }
    };
    out.push_str(&format!(
        "; language_version={} entry_point=0x{:04X} debug_mode={}\n",
        header.language_version, header.entry_point, header.debug_mode
    ));

    let mut pc = spec::HEADER_LEN;
    while pc < rom.len() {
        if pc == header.entry_point as usize {
            out.push_str("_START:\n");
        }
        let byte = rom[pc];
        let Some(op) = Opcode::from_byte(byte) else {
            out.push_str(&format!(".db 0x{byte:02X}\n"));
            pc += 1;
            continue;
        };

        if op == Opcode::DebugMetadataSignal {
            let (line, consumed) = decode_debug_metadata(rom, pc);
            out.push_str(&line);
            out.push('\n');
            pc += consumed;
            continue;
        }

        let len = op.instruction_length().unwrap_or(1) as usize;
        let operand = &rom[pc + 1..(pc + len).min(rom.len())];
        out.push_str(&decode_instruction(op, operand));
        out.push('\n');
        pc += len;
    }
    out
}

fn decode_debug_metadata(rom: &[u8], pc: usize) -> (String, usize) {
    if pc + 1 >= rom.len() {
        return (format!(".db 0x{:02X}", Opcode::DebugMetadataSignal as u8), 1);
    }
    let kind_byte = rom[pc + 1];
    let mut cursor = pc + 2;
    while cursor < rom.len() && rom[cursor] != Opcode::DebugMetadataSignal as u8 {
        cursor += 1;
    }
    let payload = &rom[pc + 2..cursor.min(rom.len())];
    let consumed = cursor.min(rom.len()) + 1 - pc;
    match kind_byte {
        k if k == DebugMetadataKind::LabelName as u8 => {
            (format!("; debug: label '{}'", String::from_utf8_lossy(payload)), consumed)
        }
        other => (format!("; debug: unknown metadata kind 0x{other:02X}"), consumed),
    }
}

/// Render one instruction given its opcode and already-sliced operand bytes.
fn decode_instruction(op: Opcode, operand: &[u8]) -> String {
    use Opcode::*;
    let mnemonic = op.mnemonic();
    match op {
        Panic | Systemcall | Brk | Nop | Clc | Sec | Ret => mnemonic.to_string(),

        StrideLit => format!("{mnemonic} 0x{:02X}", operand.first().copied().unwrap_or(0)),

        LdaLit | LdxLit | LdyLit => format!("{mnemonic} 0x{:08X}", le_u32(operand)),

        LdaAddr | LdxAddr | LdyAddr | LdaAddrX | LdaAddrY | LeaAddr | LexAddr | LeyAddr | StaAddr | StxAddr
        | StyAddr | JmpAddr | JsrAddr | BcsAddr | BccAddr | BeqAddr | BneAddr | BmiAddr | BplAddr | BvsAddr
        | BvcAddr | CmpAAddr | CmpXAddr | CmpYAddr | AddAddr | SubAddr | IncAddr | DecAddr => {
            let indexed = match op {
                LdaAddrX => " X",
                LdaAddrY => " Y",
                _ => "",
            };
            format!("{mnemonic} ${:#06X}{indexed}", le_u16(operand))
        }

        LdaX | LdaY => format!("{mnemonic} {}", if op == LdaX { "X" } else { "Y" }),
        LdxA | LdxY => format!("{mnemonic} {}", if op == LdxA { "A" } else { "Y" }),
        LdyA | LdyX => format!("{mnemonic} {}", if op == LdyA { "A" } else { "X" }),

        CmpAX | CmpXA => format!("{mnemonic} A, X"),
        CmpAY | CmpYA => format!("{mnemonic} A, Y"),
        CmpXY | CmpYX => format!("{mnemonic} X, Y"),
        CmpALit => format!("{mnemonic} A, 0x{:08X}", le_u32(operand)),
        CmpXLit => format!("{mnemonic} X, 0x{:08X}", le_u32(operand)),
        CmpYLit => format!("{mnemonic} Y, 0x{:08X}", le_u32(operand)),

        AddLit | SubLit => format!("{mnemonic} 0x{:08X}", le_u32(operand)),
        AddX | SubX => format!("{mnemonic} X"),
        AddY | SubY => format!("{mnemonic} Y"),

        IncA | DecA => format!("{mnemonic} A"),
        IncX | DecX => format!("{mnemonic} X"),
        IncY | DecY => format!("{mnemonic} Y"),

        PushA | PopA => format!("{mnemonic} A"),
        PushX | PopX => format!("{mnemonic} X"),
        PushY | PopY => format!("{mnemonic} Y"),

        DebugMetadataSignal => unreachable!("handled by decode_debug_metadata"),
    }
}

fn le_u32(bytes: &[u8]) -> u32 {
    let mut padded = [0u8; 4];
    let n = bytes.len().min(4);
    padded[..n].copy_from_slice(&bytes[..n]);
    u32::from_le_bytes(padded)
}

fn le_u16(bytes: &[u8]) -> u16 {
    let mut padded = [0u8; 2];
    let n = bytes.len().min(2);
    padded[..n].copy_from_slice(&bytes[..n]);
    u16::from_le_bytes(padded)
}
