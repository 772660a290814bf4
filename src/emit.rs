// Walks the scope tree and emits bytecode through the instruction
// codec.
//
// Repeat scopes are expanded here: each iteration gets a fresh
// environment frame binding the loop variable, so a nested block
// always reads the value of the iteration it belongs to. Everything
// else is a straight post-order walk, one instruction per token line.

use std::io::Write;

use enumflags2::BitFlags;

use crate::instruction::Instruction;
use crate::lexer::{
    self, ConstClass, ConstKind, Error, Mnemonic, Result, TokenKind, TokenLine,
};
use crate::parser;
use crate::scope::{Constant, Env, Output, Scope, ScopeKind};


// The argument schedule for each mnemonic.
fn arg_kinds(mnemonic: Mnemonic) -> &'static [ConstKind] {
    match mnemonic {
        Mnemonic::AssertAllocated => &[ConstKind::Number, ConstKind::Str],
        Mnemonic::Die | Mnemonic::Print => &[ConstKind::Str],
        Mnemonic::Push => &[ConstKind::Number],
        _ => &[],
    }
}


// Read the next token as a constant of the wanted kind, resolving
// identifiers through the scope chain.
fn expect_constant_kind(
    line: &TokenLine,
    index: &mut usize,
    want: ConstKind,
    env: &Env,
) -> Result<Constant> {
    let tok = &line.tokens[*index];
    *index += 1;

    let resolved = match tok.kind {
        TokenKind::Constant(ConstClass::Number(kind)) => {
            Constant::Num(lexer::number_value(&tok.text, kind, tok.line, tok.col)?)
        }
        TokenKind::Constant(ConstClass::Str) => Constant::Str(tok.text.clone()),
        TokenKind::Constant(ConstClass::Ident) => match env.resolve(&tok.text) {
            Some(constant) => constant,
            None => {
                return Err(Error::Unresolved {
                    name: tok.text.clone(),
                    line: tok.line,
                    col: tok.col,
                })
            }
        },
        _ => {
            return Err(Error::Expected {
                expect: "constant",
                got: tok.kind.name(),
                text: tok.text.clone(),
                line: tok.line,
                col: tok.col,
            })
        }
    };

    let got = match &resolved {
        Constant::Num(_) => ConstKind::Number,
        Constant::Str(_) => ConstKind::Str,
        Constant::Ident(name) => {
            return Err(Error::Unresolved {
                name: name.clone(),
                line: tok.line,
                col: tok.col,
            })
        }
    };
    if got != want {
        return Err(Error::WrongKind {
            expect: BitFlags::from_flag(want),
            got,
            text: tok.text.clone(),
            line: tok.line,
            col: tok.col,
        });
    }

    Ok(resolved)
}


fn num_arg(args: &[Constant], index: usize) -> i32 {
    match &args[index] {
        Constant::Num(value) => *value,
        _ => panic!("argument kind already checked"),
    }
}

fn str_arg(args: &[Constant], index: usize) -> String {
    match &args[index] {
        Constant::Str(value) => value.clone(),
        _ => panic!("argument kind already checked"),
    }
}


fn emit(inst: Instruction, out: &mut impl Write) -> Result<()> {
    inst.encode(out).map_err(|e| Error::Io(e.kind()))
}


// `print "s"` compiles to a cons chain of the characters, a trailing
// newline, an out, and a pop. The gc at the end reclaims the chain
// before the next statement runs. Zero- and one-character strings
// degenerate to a shorter chain instead of being rejected.
fn emit_print(text: &str, out: &mut impl Write) -> Result<()> {
    let bytes = text.as_bytes();

    if let Some((&first, rest)) = bytes.split_first() {
        emit(Instruction::Push(first as i32), out)?;
        if let Some((&second, rest)) = rest.split_first() {
            emit(Instruction::Push(second as i32), out)?;
            emit(Instruction::Pair, out)?;
            for &byte in rest {
                emit(Instruction::Push(byte as i32), out)?;
                emit(Instruction::Pair, out)?;
            }
        }
        emit(Instruction::Push('\n' as i32), out)?;
        emit(Instruction::Pair, out)?;
    } else {
        emit(Instruction::Push('\n' as i32), out)?;
    }

    emit(Instruction::Out, out)?;
    emit(Instruction::Pop, out)?;
    emit(Instruction::Gc, out)
}


fn emit_line(line: &TokenLine, env: &Env, out: &mut impl Write) -> Result<()> {
    let first = &line.tokens[0];
    let mnemonic = match first.kind {
        TokenKind::Mnemonic(mnemonic) => mnemonic,
        _ => {
            return Err(Error::Expected {
                expect: "mnemonic",
                got: first.kind.name(),
                text: first.text.clone(),
                line: first.line,
                col: first.col,
            })
        }
    };

    let kinds = arg_kinds(mnemonic);
    let mut index = 1;
    let mut args = Vec::with_capacity(kinds.len());
    for &kind in kinds {
        args.push(expect_constant_kind(line, &mut index, kind, env)?);
    }

    // anything left over past the schedule is an arity error
    if line.tokens[index].kind != TokenKind::Eol {
        return Err(Error::ExtraArguments {
            mnemonic: mnemonic.name(),
            arity: kinds.len(),
            line: line.line_no,
        });
    }

    let inst = match mnemonic {
        Mnemonic::Out => Instruction::Out,
        Mnemonic::In => Instruction::In,
        Mnemonic::Pair => Instruction::Pair,
        Mnemonic::Swap => Instruction::Swap,
        Mnemonic::Pop => Instruction::Pop,
        Mnemonic::Gc => Instruction::Gc,
        Mnemonic::Halt => Instruction::Halt,
        Mnemonic::Push => Instruction::Push(num_arg(&args, 0)),
        Mnemonic::Die => Instruction::Die(str_arg(&args, 0)),
        Mnemonic::AssertAllocated => {
            Instruction::AssertAllocated(num_arg(&args, 0), str_arg(&args, 1))
        }
        Mnemonic::Print => return emit_print(&str_arg(&args, 0), out),
    };
    emit(inst, out)
}


fn emit_outputs(scope: &Scope, env: &mut Env, out: &mut impl Write) -> Result<()> {
    for output in &scope.outputs {
        match output {
            Output::Line(line) => emit_line(line, env, out)?,
            Output::Nested(inner) => emit_scope(inner, env, out)?,
        }
    }
    Ok(())
}


fn emit_scope(scope: &Scope, env: &mut Env, out: &mut impl Write) -> Result<()> {
    match &scope.kind {
        ScopeKind::Normal => emit_outputs(scope, env, out),
        ScopeKind::Repeat { count, var } => {
            trace!("expanding repeat x{} at line {}", count, scope.decl_line);
            for i in 0..*count {
                env.push();
                if let Some(name) = var {
                    env.set(name, Constant::Num(i));
                }
                let result = emit_outputs(scope, env, out);
                env.pop();
                result?;
            }
            Ok(())
        }
    }
}


// The whole front end: source text in, bytecode out.
pub fn assemble(source: &str, out: &mut impl Write) -> Result<()> {
    let root = parser::parse_program(source)?;
    let mut env = Env::new();
    emit_scope(&root, &mut env, out)
}


#[cfg(test)]
mod tests {
    use super::*;

    fn assemble_bytes(source: &str) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        assemble(source, &mut out)?;
        Ok(out)
    }

    fn encode_all(program: &[Instruction]) -> Vec<u8> {
        let mut out = Vec::new();
        for inst in program {
            inst.encode(&mut out).unwrap();
        }
        out
    }

    #[test]
    fn test_plain_instructions() {
        assert_eq!(
            assemble_bytes("out\nin\npair\nswap\npop\ngc\nhalt\n"),
            Ok(vec![0x00, 0x01, 0x03, 0x04, 0x05, 0x10, 0x06])
        );
    }

    #[test]
    fn test_push_is_little_endian() {
        assert_eq!(
            assemble_bytes("push 0x01020304\n"),
            Ok(vec![0x02, 0x04, 0x03, 0x02, 0x01])
        );
        assert_eq!(
            assemble_bytes("push -1\n"),
            Ok(vec![0x02, 0xff, 0xff, 0xff, 0xff])
        );
        assert_eq!(assemble_bytes("push 'A'\n"), Ok(vec![0x02, 65, 0, 0, 0]));
    }

    #[test]
    fn test_strings_and_asserts() {
        assert_eq!(
            assemble_bytes("die \"oh no\"\n"),
            Ok(vec![0x07, b'o', b'h', b' ', b'n', b'o', 0x00])
        );
        assert_eq!(
            assemble_bytes("assert_allocated 2 \"leak\"\n"),
            Ok(vec![0x12, 2, 0, 0, 0, b'l', b'e', b'a', b'k', 0x00])
        );
    }

    #[test]
    fn test_comments_and_case() {
        assert_eq!(
            assemble_bytes("  PUSH 1 ; the first\n\n; nothing\nPop\n"),
            Ok(vec![0x02, 1, 0, 0, 0, 0x05])
        );
    }

    #[test]
    fn test_repeat_binds_the_loop_variable() {
        assert_eq!(
            assemble_bytes("%repeat 3 i\npush i\n%end\n"),
            Ok(encode_all(&[
                Instruction::Push(0),
                Instruction::Push(1),
                Instruction::Push(2),
            ]))
        );
    }

    #[test]
    fn test_repeat_without_variable() {
        assert_eq!(assemble_bytes("%repeat 2\npair\n%end\n"), Ok(vec![0x03, 0x03]));
        assert_eq!(assemble_bytes("%repeat 0 i\npush i\n%end\n"), Ok(vec![]));
    }

    #[test]
    fn test_nested_repeat_shadows_the_outer_variable() {
        let bytes = assemble_bytes(
            "%repeat 2 i\n%repeat 2 i\npush i\n%end\n%end\n",
        );
        assert_eq!(
            bytes,
            Ok(encode_all(&[
                Instruction::Push(0),
                Instruction::Push(1),
                Instruction::Push(0),
                Instruction::Push(1),
            ]))
        );
    }

    #[test]
    fn test_outer_variable_visible_in_nested_scope() {
        let bytes = assemble_bytes(
            "%repeat 2 i\n%repeat 1 j\npush i\npush j\n%end\n%end\n",
        );
        assert_eq!(
            bytes,
            Ok(encode_all(&[
                Instruction::Push(0),
                Instruction::Push(0),
                Instruction::Push(1),
                Instruction::Push(0),
            ]))
        );
    }

    #[test]
    fn test_print_desugars_to_a_cons_chain() {
        assert_eq!(
            assemble_bytes("print \"Hi\"\n"),
            Ok(encode_all(&[
                Instruction::Push('H' as i32),
                Instruction::Push('i' as i32),
                Instruction::Pair,
                Instruction::Push('\n' as i32),
                Instruction::Pair,
                Instruction::Out,
                Instruction::Pop,
                Instruction::Gc,
            ]))
        );
    }

    #[test]
    fn test_print_short_strings() {
        assert_eq!(
            assemble_bytes("print \"A\"\n"),
            Ok(encode_all(&[
                Instruction::Push('A' as i32),
                Instruction::Push('\n' as i32),
                Instruction::Pair,
                Instruction::Out,
                Instruction::Pop,
                Instruction::Gc,
            ]))
        );
        assert_eq!(
            assemble_bytes("print \"\"\n"),
            Ok(encode_all(&[
                Instruction::Push('\n' as i32),
                Instruction::Out,
                Instruction::Pop,
                Instruction::Gc,
            ]))
        );
    }

    #[test]
    fn test_wrong_argument_kind() {
        match assemble_bytes("push \"text\"\n") {
            Err(Error::WrongKind { expect, got, .. }) => {
                assert_eq!(expect, BitFlags::from_flag(ConstKind::Number));
                assert_eq!(got, ConstKind::Str);
            }
            other => panic!("expected WrongKind, got {:?}", other),
        }

        match assemble_bytes("die 42\n") {
            Err(Error::WrongKind { got, .. }) => assert_eq!(got, ConstKind::Number),
            other => panic!("expected WrongKind, got {:?}", other),
        }
    }

    #[test]
    fn test_arity_errors() {
        match assemble_bytes("pair 1\n") {
            Err(Error::ExtraArguments {
                mnemonic: "pair",
                arity: 0,
                ..
            }) => (),
            other => panic!("expected ExtraArguments, got {:?}", other),
        }

        match assemble_bytes("push 1 2\n") {
            Err(Error::ExtraArguments {
                mnemonic: "push",
                arity: 1,
                ..
            }) => (),
            other => panic!("expected ExtraArguments, got {:?}", other),
        }

        // a missing argument runs into the end of the line
        match assemble_bytes("push\n") {
            Err(Error::Expected { expect, got, .. }) => {
                assert_eq!(expect, "constant");
                assert_eq!(got, "end of line");
            }
            other => panic!("expected an error, got {:?}", other),
        }
    }

    #[test]
    fn test_unresolved_identifier() {
        match assemble_bytes("push k\n") {
            Err(Error::Unresolved { name, line, .. }) => {
                assert_eq!(name, "k");
                assert_eq!(line, 1);
            }
            other => panic!("expected Unresolved, got {:?}", other),
        }

        // the loop variable is out of scope after %end
        match assemble_bytes("%repeat 1 i\npush i\n%end\npush i\n") {
            Err(Error::Unresolved { name, line, .. }) => {
                assert_eq!(name, "i");
                assert_eq!(line, 4);
            }
            other => panic!("expected Unresolved, got {:?}", other),
        }
    }

    #[test]
    fn test_repeat_count_from_literal_only() {
        // the count is read at parse time, before any binding exists
        match assemble_bytes("%repeat 2 i\n%repeat i\n%end\n%end\n") {
            Err(Error::Expected { expect, got, .. }) => {
                assert_eq!(expect, "number");
                assert_eq!(got, "identifier");
            }
            other => panic!("expected an error, got {:?}", other),
        }
    }

    #[test]
    fn test_number_overflow_is_reported_lazily() {
        // the literal only parses when the line is emitted
        match assemble_bytes("push 2147483648\n") {
            Err(Error::NumberOverflow { .. }) => (),
            other => panic!("expected NumberOverflow, got {:?}", other),
        }

        // a repeat of zero never emits its body, bad literal included
        assert_eq!(assemble_bytes("%repeat 0\npush 2147483648\n%end\n"), Ok(vec![]));
    }
}
