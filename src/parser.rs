// Turns token lines into the scope tree.
//
// Each line is classified into an intermediate code: a plain
// instruction line, the beginning or end of a scope, or nothing. A
// stack of open scopes, rooted at a single normal scope, folds the
// stream of codes into the tree the emitter walks.

use crate::lexer::{self, ConstClass, Directive, Error, Result, TokenKind, TokenLine};
use crate::scope::Scope;


#[derive(Clone, Debug, PartialEq)]
pub enum ImCode {
    // commented or blank lines
    NoOp,
    Instruction(TokenLine),
    BeginScope(Scope),
    EndScope { line: usize },
}


fn expect_eol(line: &TokenLine, index: usize) -> Result<()> {
    let tok = &line.tokens[index];
    match tok.kind {
        TokenKind::Eol => Ok(()),
        _ => Err(Error::Expected {
            expect: "end of line",
            got: tok.kind.name(),
            text: tok.text.clone(),
            line: tok.line,
            col: tok.col,
        }),
    }
}


// `%repeat <count> [<var>]`: the count must be a number literal, the
// loop variable an identifier when present.
fn parse_repeat(line: &TokenLine) -> Result<ImCode> {
    let count_tok = &line.tokens[1];
    let kind = match count_tok.kind {
        TokenKind::Constant(ConstClass::Number(kind)) => kind,
        _ => {
            return Err(Error::Expected {
                expect: "number",
                got: count_tok.kind.name(),
                text: count_tok.text.clone(),
                line: count_tok.line,
                col: count_tok.col,
            })
        }
    };
    let count = lexer::number_value(&count_tok.text, kind, count_tok.line, count_tok.col)?;
    if count < 0 {
        return Err(Error::NegativeRepeat {
            value: count,
            line: line.line_no,
        });
    }

    let var_tok = &line.tokens[2];
    let mut next = 2;
    let var = match var_tok.kind {
        TokenKind::Eol => None,
        TokenKind::Constant(ConstClass::Ident) => {
            next = 3;
            Some(var_tok.text.clone())
        }
        _ => {
            return Err(Error::Expected {
                expect: "identifier",
                got: var_tok.kind.name(),
                text: var_tok.text.clone(),
                line: var_tok.line,
                col: var_tok.col,
            })
        }
    };
    expect_eol(line, next)?;

    Ok(ImCode::BeginScope(Scope::repeat(count, var, line.line_no)))
}


pub fn classify_line(line: TokenLine) -> Result<ImCode> {
    match line.tokens[0].kind {
        TokenKind::Eol => Ok(ImCode::NoOp),
        TokenKind::Mnemonic(_) => Ok(ImCode::Instruction(line)),
        TokenKind::Directive(Directive::Repeat) => parse_repeat(&line),
        TokenKind::Directive(Directive::End) => {
            expect_eol(&line, 1)?;
            Ok(ImCode::EndScope { line: line.line_no })
        }
        _ => {
            let first = &line.tokens[0];
            Err(Error::Expected {
                expect: "directive or mnemonic",
                got: first.kind.name(),
                text: first.text.clone(),
                line: first.line,
                col: first.col,
            })
        }
    }
}


pub struct ScopeBuilder {
    stack: Vec<Scope>,
}

impl ScopeBuilder {
    pub fn new() -> ScopeBuilder {
        ScopeBuilder {
            stack: vec![Scope::normal()],
        }
    }

    fn current(&mut self) -> &mut Scope {
        self.stack.last_mut().expect("scope stack empty")
    }

    pub fn follow(&mut self, code: ImCode) -> Result<()> {
        match code {
            ImCode::NoOp => (),
            ImCode::Instruction(line) => self.current().push_line(line),
            ImCode::BeginScope(scope) => self.stack.push(scope),
            ImCode::EndScope { line } => {
                if self.stack.len() == 1 {
                    return Err(Error::ExtraEnd { line });
                }
                let finished = self.stack.pop().expect("scope stack empty");
                self.current().push_scope(finished);
            }
        }
        Ok(())
    }

    // The root scope, provided every opened scope was closed.
    pub fn finish(mut self) -> Result<Scope> {
        if self.stack.len() > 1 {
            let open = self.stack.pop().expect("scope stack empty");
            return Err(Error::UnclosedScope {
                decl_line: open.decl_line,
            });
        }
        Ok(self.stack.pop().expect("scope stack empty"))
    }
}


pub fn parse_program(source: &str) -> Result<Scope> {
    let mut builder = ScopeBuilder::new();

    for (index, raw) in source.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = lexer::trim_line(raw);
        if trimmed.is_empty() {
            continue;
        }
        let tokens = lexer::tokenize_line(trimmed, line_no)?;
        builder.follow(classify_line(tokens)?)?;
    }

    builder.finish()
}
