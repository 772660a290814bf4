// The assembler's intermediate representation: a tree of scopes, each
// holding the token lines and nested scopes it will emit, plus the
// environment the emitter uses to resolve identifiers while walking
// that tree.

use std::collections::HashMap;

use crate::lexer::TokenLine;


// A constant value as bound in a scope. Identifier constants are
// links to other bindings and get chased at resolution time.
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Num(i32),
    Str(String),
    Ident(String),
}


#[derive(Clone, Debug, PartialEq)]
pub enum ScopeKind {
    Normal,
    Repeat { count: i32, var: Option<String> },
}


#[derive(Clone, Debug, PartialEq)]
pub enum Output {
    Line(TokenLine),
    Nested(Scope),
}


#[derive(Clone, Debug, PartialEq)]
pub struct Scope {
    pub kind: ScopeKind,
    pub decl_line: usize,
    pub outputs: Vec<Output>,
}

impl Scope {
    pub fn normal() -> Scope {
        Scope {
            kind: ScopeKind::Normal,
            decl_line: 0,
            outputs: Vec::new(),
        }
    }

    pub fn repeat(count: i32, var: Option<String>, decl_line: usize) -> Scope {
        Scope {
            kind: ScopeKind::Repeat { count, var },
            decl_line,
            outputs: Vec::new(),
        }
    }

    pub fn push_line(&mut self, line: TokenLine) {
        self.outputs.push(Output::Line(line));
    }

    pub fn push_scope(&mut self, scope: Scope) {
        self.outputs.push(Output::Nested(scope));
    }
}


// Datastructure to manage lexical scoping during emission. Each open
// scope contributes one frame; lookups walk the chain outward.
pub struct Env {
    stack: Vec<HashMap<String, Constant>>,
}

impl Env {
    pub fn new() -> Env {
        let mut ret = Env { stack: vec![] };
        ret.push();
        ret
    }

    // Begin a new scope.
    pub fn push(&mut self) {
        self.stack.push(HashMap::new());
    }

    // End the current scope.
    pub fn pop(&mut self) {
        self.stack.pop();
    }

    // Bind a value in the current scope, shadowing outer frames.
    pub fn set(&mut self, name: &str, value: Constant) {
        if let Some(frame) = self.stack.last_mut() {
            frame.insert(name.to_string(), value);
        }
    }

    // Look up an identifier from anywhere in the scope chain.
    pub fn get(&self, name: &str) -> Option<&Constant> {
        for frame in self.stack.iter().rev() {
            if let Some(value) = frame.get(name) {
                return Some(value);
            }
        }
        None
    }

    // Chase identifier links until a ground value. Bindings never
    // form cycles: the only binding writer is the repeat expansion,
    // which binds plain numbers.
    pub fn resolve(&self, name: &str) -> Option<Constant> {
        let mut current = self.get(name)?;
        loop {
            match current {
                Constant::Ident(next) => current = self.get(next)?,
                ground => return Some(ground.clone()),
            }
        }
    }
}
