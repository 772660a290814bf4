// The binary instruction format shared by the assembler, the
// disassembler and the interpreter.
//
// A program is a raw concatenation of instruction encodings: one
// opcode byte, then the payload fields in declaration order. Integers
// are four bytes little-endian, strings are NUL-terminated with no
// length prefix. There is no header and no alignment.
//
// Everything that touches the wire format goes through `encode` and
// `fetch`; nothing else in the crate writes or reads instruction
// bytes.

use std::fmt;
use std::io::{self, Read, Write};


const OP_OUT: u8 = 0x00;
const OP_IN: u8 = 0x01;
const OP_PUSH: u8 = 0x02;
const OP_PAIR: u8 = 0x03;
const OP_SWAP: u8 = 0x04;
const OP_POP: u8 = 0x05;
const OP_HALT: u8 = 0x06;
const OP_DIE: u8 = 0x07;
const OP_GC: u8 = 0x10;
const OP_ASSERT: u8 = 0x12;


pub type Result<T> = core::result::Result<T, Error>;


#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    UnknownOpcode(u8),
    Truncated(&'static str),
    Io(io::ErrorKind),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnknownOpcode(byte) => {
                write!(f, "Not a known instruction code: 0x{:x}", byte)
            }
            Error::Truncated(what) => write!(f, "{}", what),
            Error::Io(kind) => {
                write!(f, "while reading input: {}", io::Error::from(*kind))
            }
        }
    }
}


#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Out,
    In,
    Push(i32),
    Pair,
    Swap,
    Pop,
    Halt,
    Die(String),
    Gc,
    AssertAllocated(i32, String),
}


impl Instruction {
    pub fn opcode(&self) -> u8 {
        match self {
            Instruction::Out => OP_OUT,
            Instruction::In => OP_IN,
            Instruction::Push(_) => OP_PUSH,
            Instruction::Pair => OP_PAIR,
            Instruction::Swap => OP_SWAP,
            Instruction::Pop => OP_POP,
            Instruction::Halt => OP_HALT,
            Instruction::Die(_) => OP_DIE,
            Instruction::Gc => OP_GC,
            Instruction::AssertAllocated(_, _) => OP_ASSERT,
        }
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Out => "out",
            Instruction::In => "in",
            Instruction::Push(_) => "push",
            Instruction::Pair => "pair",
            Instruction::Swap => "swap",
            Instruction::Pop => "pop",
            Instruction::Halt => "halt",
            Instruction::Die(_) => "die",
            Instruction::Gc => "gc",
            Instruction::AssertAllocated(_, _) => "assert_allocated",
        }
    }

    pub fn encode(&self, out: &mut impl Write) -> io::Result<()> {
        out.write_all(&[self.opcode()])?;
        match self {
            Instruction::Push(value) => out.write_all(&value.to_le_bytes())?,
            Instruction::Die(msg) => write_str(out, msg)?,
            Instruction::AssertAllocated(expected, msg) => {
                out.write_all(&expected.to_le_bytes())?;
                write_str(out, msg)?;
            }
            _ => (),
        }
        Ok(())
    }
}


fn write_str(out: &mut impl Write, msg: &str) -> io::Result<()> {
    out.write_all(msg.as_bytes())?;
    out.write_all(&[0])
}


// Decode one instruction. A clean end of stream before the opcode
// byte yields None; running dry anywhere inside a payload is an
// error, as is an opcode byte we don't know.
pub fn fetch(input: &mut impl Read) -> Result<Option<Instruction>> {
    let first = match read_byte(input)? {
        None => return Ok(None),
        Some(byte) => byte,
    };

    let inst = match first {
        OP_OUT => Instruction::Out,
        OP_IN => Instruction::In,
        OP_PAIR => Instruction::Pair,
        OP_SWAP => Instruction::Swap,
        OP_POP => Instruction::Pop,
        OP_HALT => Instruction::Halt,
        OP_GC => Instruction::Gc,
        OP_PUSH => Instruction::Push(read_i32(input, "push: expected constant")?),
        OP_DIE => Instruction::Die(read_str(input)?),
        OP_ASSERT => {
            let expected = read_i32(input, "assert: expected constant")?;
            Instruction::AssertAllocated(expected, read_str(input)?)
        }
        other => return Err(Error::UnknownOpcode(other)),
    };

    Ok(Some(inst))
}


fn read_byte(input: &mut impl Read) -> Result<Option<u8>> {
    let mut buf = [0u8; 1];
    loop {
        match input.read(&mut buf) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(buf[0])),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e.kind())),
        }
    }
}


fn read_i32(input: &mut impl Read, what: &'static str) -> Result<i32> {
    let mut buf = [0u8; 4];
    match input.read_exact(&mut buf) {
        Ok(()) => Ok(i32::from_le_bytes(buf)),
        Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            Err(Error::Truncated(what))
        }
        Err(e) => Err(Error::Io(e.kind())),
    }
}


fn read_str(input: &mut impl Read) -> Result<String> {
    let mut buf = Vec::new();
    loop {
        match read_byte(input)? {
            Some(0) => return Ok(String::from_utf8_lossy(&buf).into_owned()),
            Some(byte) => buf.push(byte),
            None => {
                return Err(Error::Truncated("expected string to end in a zero byte"))
            }
        }
    }
}
