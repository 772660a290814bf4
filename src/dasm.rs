// The disassembler: a straight consumer of the instruction codec.
//
// Output is legal assembler input. Push payloads render as character
// literals when the value is one the lexer will read back, so a
// disassembly assembles to the identical byte stream.

use std::io::{Read, Write};

use crate::instruction::{self, Instruction};


pub fn render(inst: &Instruction) -> String {
    match inst {
        Instruction::Push(value) => format!("push {}", render_value(*value)),
        Instruction::Die(msg) => format!("die \"{}\"", msg),
        Instruction::AssertAllocated(expected, msg) => {
            format!("assert_allocated {} \"{}\"", expected, msg)
        }
        other => other.mnemonic().to_string(),
    }
}


// Prefer a character literal for anything printable. Quote and
// backslash would need escapes the language doesn't have, so they
// fall back to decimal along with everything else.
fn render_value(value: i32) -> String {
    match value {
        10 => String::from("'\\n'"),
        0x21..=0x7e if value != 0x27 && value != 0x5c => {
            format!("'{}'", (value as u8) as char)
        }
        _ => value.to_string(),
    }
}


pub fn disassemble(
    input: &mut impl Read,
    out: &mut impl Write,
) -> instruction::Result<()> {
    while let Some(inst) = instruction::fetch(input)? {
        writeln!(out, "{}", render(&inst))
            .map_err(|e| instruction::Error::Io(e.kind()))?;
    }
    Ok(())
}
