// Line-oriented lexer for the assembly language.
//
// Each source line is stripped of its `;` comment and surrounding
// whitespace, then split into whitespace-separated tokens; a token
// opening with `"` runs to the matching quote instead. Every token is
// classified here, but number values are only parsed when someone
// needs them, so a bad literal inside a never-expanded block still
// errors the same way the rest of the pipeline would report it.
//
// This module also owns the error type for the whole assembler front
// end; the parser and the emitter report through it.

use std::fmt;
use std::io;

use enumflags2::BitFlags;
use regex::Regex;


pub type Result<T> = core::result::Result<T, Error>;


// The kinds a resolved constant can have, as a flag set so errors can
// name several acceptable kinds at once.
#[derive(BitFlags, Copy, Clone, Debug, PartialEq)]
#[repr(u8)]
pub enum ConstKind {
    Number = 0b01,
    Str    = 0b10,
}

impl ConstKind {
    pub fn name(self) -> &'static str {
        match self {
            ConstKind::Number => "number",
            ConstKind::Str => "string",
        }
    }
}

fn kind_set_names(set: BitFlags<ConstKind>) -> String {
    let mut names = Vec::new();
    if set.contains(ConstKind::Number) {
        names.push("number");
    }
    if set.contains(ConstKind::Str) {
        names.push("string");
    }
    names.join(" or ")
}


#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    UnknownToken {
        text: String,
        line: usize,
        col: usize,
    },
    UnknownDirective {
        text: String,
        line: usize,
        col: usize,
    },
    NumberOverflow {
        text: String,
        line: usize,
        col: usize,
    },
    Expected {
        expect: &'static str,
        got: &'static str,
        text: String,
        line: usize,
        col: usize,
    },
    WrongKind {
        expect: BitFlags<ConstKind>,
        got: ConstKind,
        text: String,
        line: usize,
        col: usize,
    },
    Unresolved {
        name: String,
        line: usize,
        col: usize,
    },
    NegativeRepeat {
        value: i32,
        line: usize,
    },
    ExtraArguments {
        mnemonic: &'static str,
        arity: usize,
        line: usize,
    },
    UnclosedScope {
        decl_line: usize,
    },
    ExtraEnd {
        line: usize,
    },
    Io(io::ErrorKind),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnknownToken { text, line, col } => {
                write!(f, "Unknown token: `{}` at {}:{}", text, line, col)
            }
            Error::UnknownDirective { text, line, col } => {
                write!(f, "Unknown directive: `{}` at {}:{}", text, line, col)
            }
            Error::NumberOverflow { text, line, col } => write!(
                f,
                "Number overflows integer capacity at {}:{}: {}",
                line, col, text
            ),
            Error::Expected {
                expect,
                got,
                text,
                line,
                col,
            } => write!(
                f,
                "Got {} while expecting {} at {}:{}: `{}`",
                got, expect, line, col, text
            ),
            Error::WrongKind {
                expect,
                got,
                text,
                line,
                col,
            } => write!(
                f,
                "Expected {}, got {} at {}:{}: `{}`",
                kind_set_names(*expect),
                got.name(),
                line,
                col,
                text
            ),
            Error::Unresolved { name, line, col } => write!(
                f,
                "Couldn't find constant `{}` from {}:{} in the current scope",
                name, line, col
            ),
            Error::NegativeRepeat { value, line } => write!(
                f,
                "Attempt to repeat a negative amount at line {}: {}",
                line, value
            ),
            Error::ExtraArguments {
                mnemonic, arity, ..
            } => match arity {
                0 => write!(f, "Opcode `{}` takes no arguments", mnemonic),
                1 => write!(f, "Opcode `{}` takes one argument", mnemonic),
                n => write!(f, "Opcode `{}` takes {} arguments", mnemonic, n),
            },
            Error::UnclosedScope { decl_line } => write!(
                f,
                "Scope declared at line {} needs an end marker with `%end`",
                decl_line
            ),
            Error::ExtraEnd { line } => {
                write!(f, "`%end` at line {} without an open scope", line)
            }
            Error::Io(kind) => write!(f, "i/o error: {}", io::Error::from(*kind)),
        }
    }
}


#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Mnemonic {
    Out,
    In,
    Push,
    Pair,
    Swap,
    Gc,
    Pop,
    AssertAllocated,
    Print,
    Die,
    Halt,
}

impl Mnemonic {
    pub fn from_word(text: &str) -> Option<Mnemonic> {
        let lower = text.to_ascii_lowercase();
        Some(match lower.as_str() {
            "out" => Mnemonic::Out,
            "in" => Mnemonic::In,
            "push" => Mnemonic::Push,
            "pair" => Mnemonic::Pair,
            "swap" => Mnemonic::Swap,
            "gc" => Mnemonic::Gc,
            "pop" => Mnemonic::Pop,
            "assert_allocated" => Mnemonic::AssertAllocated,
            "print" => Mnemonic::Print,
            "die" => Mnemonic::Die,
            "halt" => Mnemonic::Halt,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Mnemonic::Out => "out",
            Mnemonic::In => "in",
            Mnemonic::Push => "push",
            Mnemonic::Pair => "pair",
            Mnemonic::Swap => "swap",
            Mnemonic::Gc => "gc",
            Mnemonic::Pop => "pop",
            Mnemonic::AssertAllocated => "assert_allocated",
            Mnemonic::Print => "print",
            Mnemonic::Die => "die",
            Mnemonic::Halt => "halt",
        }
    }
}


#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Directive {
    Repeat,
    End,
}


// How a number literal is spelled. The spelling decides the radix;
// character literals carry their value directly.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum NumKind {
    Dec,
    Hex,
    Char,
}


#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ConstClass {
    Number(NumKind),
    Str,
    Ident,
}


#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TokenKind {
    Mnemonic(Mnemonic),
    Constant(ConstClass),
    Directive(Directive),
    Eol,
}

impl TokenKind {
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::Mnemonic(_) => "mnemonic",
            TokenKind::Constant(ConstClass::Ident) => "identifier",
            TokenKind::Constant(_) => "constant",
            TokenKind::Directive(_) => "directive",
            TokenKind::Eol => "end of line",
        }
    }
}


#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    // string tokens hold their contents without the quotes
    pub text: String,
    pub line: usize,
    pub col: usize,
}


// The tokens of one source line, always terminated by an Eol token.
#[derive(Clone, Debug, PartialEq)]
pub struct TokenLine {
    pub tokens: Vec<Token>,
    pub line_no: usize,
}


// Cut the comment off at `;` and trim the rest.
pub fn trim_line(line: &str) -> &str {
    let uncommented = match line.find(';') {
        Some(stop) => &line[..stop],
        None => line,
    };
    uncommented.trim()
}


// Split into (column, text) pieces. Only ASCII bytes delimit tokens,
// so slicing at these offsets always lands on character boundaries.
fn split_tokens(line: &str) -> Vec<(usize, &str)> {
    let bytes = line.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i == bytes.len() {
            break;
        }
        let start = i;
        if bytes[i] == b'"' {
            i += 1;
            while i < bytes.len() && bytes[i] != b'"' {
                i += 1;
            }
            // a missing closing quote runs the string to end of line
            if i < bytes.len() {
                i += 1;
            }
        } else {
            while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                i += 1;
            }
        }
        out.push((start, &line[start..i]));
    }

    out
}


fn num_kind(text: &str) -> Option<NumKind> {
    lazy_static! {
        static ref DEC: Regex = Regex::new(r"^[+-]?(0|[1-9][0-9]*)$").unwrap();
        static ref HEX: Regex = Regex::new(r"^[+-]?0x[0-9A-Fa-f]+$").unwrap();
        static ref CHAR: Regex =
            Regex::new(r"^'([\x21-\x26\x28-\x5b\x5d-\x7e]|\\n|\\\\)'$").unwrap();
    }

    if DEC.is_match(text) {
        Some(NumKind::Dec)
    } else if HEX.is_match(text) {
        Some(NumKind::Hex)
    } else if CHAR.is_match(text) {
        Some(NumKind::Char)
    } else {
        None
    }
}


fn is_identifier(text: &str) -> bool {
    lazy_static! {
        static ref IDENT: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    }
    IDENT.is_match(text)
}


fn classify(text: &str, line: usize, col: usize) -> Result<TokenKind> {
    if text.starts_with('%') {
        let name = &text[1..];
        if name.eq_ignore_ascii_case("repeat") {
            return Ok(TokenKind::Directive(Directive::Repeat));
        }
        if name.eq_ignore_ascii_case("end") {
            return Ok(TokenKind::Directive(Directive::End));
        }
        return Err(Error::UnknownDirective {
            text: text.to_string(),
            line,
            col,
        });
    }

    if text.starts_with('"') {
        return Ok(TokenKind::Constant(ConstClass::Str));
    }

    if let Some(kind) = num_kind(text) {
        return Ok(TokenKind::Constant(ConstClass::Number(kind)));
    }

    if let Some(mnemonic) = Mnemonic::from_word(text) {
        return Ok(TokenKind::Mnemonic(mnemonic));
    }

    if is_identifier(text) {
        return Ok(TokenKind::Constant(ConstClass::Ident));
    }

    Err(Error::UnknownToken {
        text: text.to_string(),
        line,
        col,
    })
}


pub fn tokenize_line(line: &str, line_no: usize) -> Result<TokenLine> {
    let mut tokens = Vec::new();

    for (col, raw) in split_tokens(line) {
        let kind = classify(raw, line_no, col)?;
        let text = match kind {
            TokenKind::Constant(ConstClass::Str) => {
                let inner = &raw[1..];
                if inner.ends_with('"') {
                    inner[..inner.len() - 1].to_string()
                } else {
                    inner.to_string()
                }
            }
            _ => raw.to_string(),
        };
        tokens.push(Token {
            kind,
            text,
            line: line_no,
            col,
        });
    }

    tokens.push(Token {
        kind: TokenKind::Eol,
        text: String::new(),
        line: line_no,
        col: line.len(),
    });

    Ok(TokenLine { tokens, line_no })
}


// Parse a number literal. The accumulator runs in u32; wrapping past
// the accumulated value or setting the sign bit rejects the literal,
// and the sign is applied afterward.
pub fn number_value(text: &str, kind: NumKind, line: usize, col: usize) -> Result<i32> {
    if let NumKind::Char = kind {
        let inner = &text[1..text.len() - 1];
        let value = match inner {
            "\\n" => '\n' as i32,
            "\\\\" => '\\' as i32,
            other => other.as_bytes()[0] as i32,
        };
        return Ok(value);
    }

    let (rest, negative) = match text.as_bytes()[0] {
        b'+' => (&text[1..], false),
        b'-' => (&text[1..], true),
        _ => (text, false),
    };
    let (digits, radix) = if let NumKind::Hex = kind {
        (&rest[2..], 16u32)
    } else {
        (rest, 10u32)
    };

    let mut val: u32 = 0;
    for c in digits.chars() {
        let dig = c.to_digit(radix).unwrap_or(0);
        let next = val.wrapping_mul(radix).wrapping_add(dig);
        if next < val || next & 0x8000_0000 != 0 {
            return Err(Error::NumberOverflow {
                text: text.to_string(),
                line,
                col,
            });
        }
        val = next;
    }

    Ok(if negative { -(val as i32) } else { val as i32 })
}
