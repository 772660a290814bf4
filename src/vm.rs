// (C) 2020 Brandon Lewis
//
// A stack machine over garbage-collected cons cells.
//
// *Execution Model*
//
// A program is a flat byte stream of instructions, fetched and
// interpreted one at a time. There are no jumps and no conditionals:
// execution never goes backwards, so the interpreter does not keep a
// program counter, just the stream position.
//
// *Values*
//
// Every value is a heap object: a 32-bit integer or a pair of object
// references. The operand stack holds references only; types live on
// the objects themselves.
//
// *Memory*
//
// Objects are reclaimed by mark-and-sweep, with the operand stack as
// the sole root set. A collection runs whenever the live count hits
// the heap's threshold, right before the allocation that would cross
// it, and can also be requested explicitly by the program.
//
// *Errors*
//
// The Error enum covers everything that can stop a program. All are
// non-recoverable: the embedding binary reports the error and exits.

use std::fmt;
use std::io::{self, Read, Write};

use crate::heap::{Heap, ObjKind, ObjRef};
use crate::instruction::{self, Instruction};


pub const STACK_MAX: usize = 256;


pub type Result<T> = core::result::Result<T, Error>;


#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    Underflow,
    Overflow,
    Died(String),
    AssertFailed {
        expected: i32,
        actual: usize,
        msg: String,
    },
    Fetch(instruction::Error),
    Io(io::ErrorKind),
}

impl From<instruction::Error> for Error {
    fn from(e: instruction::Error) -> Error {
        Error::Fetch(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e.kind())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Underflow => write!(f, "Stack underflow"),
            Error::Overflow => write!(f, "Stack overflow"),
            Error::Died(msg) => write!(f, "program error: {}", msg),
            Error::AssertFailed {
                expected,
                actual,
                msg,
            } => write!(
                f,
                "{} (expected {} allocated objects, have {})",
                msg, expected, actual
            ),
            Error::Fetch(e) => write!(f, "{}", e),
            Error::Io(kind) => write!(f, "i/o error: {}", io::Error::from(*kind)),
        }
    }
}


pub struct VM {
    heap: Heap,
    stack: Vec<ObjRef>,
    has_halted: bool,
}


impl VM {
    pub fn new() -> VM {
        VM {
            heap: Heap::new(),
            stack: Vec::with_capacity(STACK_MAX),
            has_halted: false,
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn num_objects(&self) -> usize {
        self.heap.len()
    }

    pub fn halted(&self) -> bool {
        self.has_halted
    }

    pub fn push(&mut self, obj: ObjRef) -> Result<()> {
        if self.stack.len() < STACK_MAX {
            self.stack.push(obj);
            Ok(())
        } else {
            Err(Error::Overflow)
        }
    }

    pub fn pop(&mut self) -> Result<ObjRef> {
        self.stack.pop().ok_or(Error::Underflow)
    }

    // Run a collection if the next allocation would cross the
    // threshold. Callers must keep every object they still need
    // reachable from the stack when calling this.
    fn maybe_collect(&mut self) {
        if self.heap.len() == self.heap.threshold() {
            self.collect();
        }
    }

    pub fn push_int(&mut self, value: i32) -> Result<()> {
        self.maybe_collect();
        let obj = self.heap.alloc(ObjKind::Int(value));
        self.push(obj)
    }

    // Pop two values and push a pair of them. The collection check
    // happens while both operands are still rooted on the stack.
    pub fn push_pair(&mut self) -> Result<ObjRef> {
        self.maybe_collect();
        let tail = self.pop()?;
        let head = self.pop()?;
        let obj = self.heap.alloc(ObjKind::Pair { head, tail });
        self.push(obj)?;
        Ok(obj)
    }

    pub fn swap(&mut self) -> Result<()> {
        let a = self.pop()?;
        let b = self.pop()?;
        self.push(a)?;
        self.push(b)
    }

    pub fn collect(&mut self) {
        trace!("gc: {} objects before", self.heap.len());
        for &root in &self.stack {
            self.heap.mark(root);
        }
        self.heap.sweep();
        trace!("gc: {} objects after", self.heap.len());
    }

    // Drop every root and collect, reclaiming all remaining objects.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.collect();
        self.has_halted = false;
    }

    // Integers print as single characters: only the low byte is
    // emitted, anything outside 0-255 truncates silently. Pairs print
    // head then tail, so a cons chain prints left to right.
    fn print_object(&self, obj: ObjRef, out: &mut impl Write) -> io::Result<()> {
        match self.heap.kind(obj) {
            ObjKind::Int(value) => out.write_all(&[value as u8]),
            ObjKind::Pair { head, tail } => {
                self.print_object(head, out)?;
                self.print_object(tail, out)
            }
        }
    }

    pub fn interpret(
        &mut self,
        inst: &Instruction,
        input: &mut impl Read,
        out: &mut impl Write,
    ) -> Result<()> {
        trace!("{:?} depth={}", inst, self.stack.len());
        match inst {
            Instruction::Die(msg) => return Err(Error::Died(msg.clone())),
            Instruction::Halt => self.has_halted = true,
            Instruction::Pop => {
                self.pop()?;
            }
            Instruction::Out => {
                let obj = self.pop()?;
                self.print_object(obj, out)?;
                self.push(obj)?;
            }
            Instruction::In => {
                let value = read_char(input)?;
                self.push_int(value)?;
            }
            Instruction::Push(value) => self.push_int(*value)?,
            Instruction::Pair => {
                self.push_pair()?;
            }
            Instruction::Swap => self.swap()?,
            Instruction::Gc => self.collect(),
            Instruction::AssertAllocated(expected, msg) => {
                if self.heap.len() != *expected as usize {
                    return Err(Error::AssertFailed {
                        expected: *expected,
                        actual: self.heap.len(),
                        msg: msg.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    // Fetch and interpret until the stream runs out or the program
    // halts.
    pub fn run(
        &mut self,
        program: &mut impl Read,
        input: &mut impl Read,
        out: &mut impl Write,
    ) -> Result<()> {
        while let Some(inst) = instruction::fetch(program)? {
            if self.has_halted {
                break;
            }
            self.interpret(&inst, input, out)?;
        }
        Ok(())
    }
}


// One byte from the input source, or -1 at end of stream, matching
// the usual read-character convention.
fn read_char(input: &mut impl Read) -> Result<i32> {
    let mut buf = [0u8; 1];
    loop {
        match input.read(&mut buf) {
            Ok(0) => return Ok(-1),
            Ok(_) => return Ok(buf[0] as i32),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e.kind())),
        }
    }
}


// These tests are written against the observable behavior of the
// machine: object counts, output bytes and error values. Programs are
// round-tripped through the instruction codec on the way in, so every
// test also exercises the wire format.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction::*;

    fn encode(program: &[Instruction]) -> Vec<u8> {
        let mut encoded = Vec::new();
        for inst in program {
            inst.encode(&mut encoded).unwrap();
        }
        encoded
    }

    // Run a program with the given stdin bytes. Returns the final VM,
    // the status, and whatever the program printed.
    fn eval(program: &[Instruction], input: &[u8]) -> (VM, Result<()>, Vec<u8>) {
        let encoded = encode(program);
        let mut vm = VM::new();
        let mut out = Vec::new();
        let mut input = input;
        let status = vm.run(&mut &encoded[..], &mut input, &mut out);
        (vm, status, out)
    }

    #[test]
    fn test_objects_on_stack_are_preserved() {
        let (vm, status, _) = eval(&[Push(1), Push(2), Gc], b"");
        assert_eq!(status, Ok(()));
        assert_eq!(vm.num_objects(), 2);
    }

    #[test]
    fn test_unreached_objects_are_collected() {
        let (vm, status, _) = eval(&[Push(1), Push(2), Pop, Pop, Gc], b"");
        assert_eq!(status, Ok(()));
        assert_eq!(vm.num_objects(), 0);
    }

    #[test]
    fn test_nested_objects_are_reached() {
        let (vm, status, _) = eval(
            &[
                Push(1),
                Push(2),
                Pair,
                Push(3),
                Push(4),
                Pair,
                Pair,
                Gc,
            ],
            b"",
        );
        assert_eq!(status, Ok(()));
        assert_eq!(vm.num_objects(), 7);
    }

    #[test]
    fn test_cycles_are_handled() {
        let mut vm = VM::new();
        vm.push_int(1).unwrap();
        vm.push_int(2).unwrap();
        let a = vm.push_pair().unwrap();
        vm.push_int(3).unwrap();
        vm.push_int(4).unwrap();
        let b = vm.push_pair().unwrap();

        // cycle through the tails; 2 and 4 become unreachable
        vm.heap.set_tail(a, b);
        vm.heap.set_tail(b, a);

        vm.collect();
        assert_eq!(vm.num_objects(), 4);

        vm.pop().unwrap();
        vm.pop().unwrap();
        vm.collect();
        assert_eq!(vm.num_objects(), 0);
    }

    #[test]
    fn test_churn() {
        let mut vm = VM::new();
        for i in 0..1000 {
            for _ in 0..20 {
                vm.push_int(i).unwrap();
            }
            for _ in 0..20 {
                vm.pop().unwrap();
            }
        }
        vm.reset();
        assert_eq!(vm.num_objects(), 0);
    }

    #[test]
    fn test_object_count_matches_chain() {
        let program = vec![
            Push(1),
            Push(2),
            Pair,
            Push(3),
            Swap,
            Pop,
            Gc,
            Push(10),
            Out,
            Pop,
            Gc,
        ];
        let mut vm = VM::new();
        let mut input: &[u8] = b"";
        let mut out = Vec::new();
        for inst in &program {
            vm.interpret(inst, &mut input, &mut out).unwrap();
            assert_eq!(vm.num_objects(), vm.heap.chain_len());
        }
    }

    #[test]
    fn test_out_prints_and_keeps_top() {
        let (vm, status, out) = eval(&[Push('A' as i32), Out], b"");
        assert_eq!(status, Ok(()));
        assert_eq!(out, b"A");
        assert_eq!(vm.depth(), 1);
        // only the low byte is emitted
        let (_, _, out) = eval(&[Push(0x141), Out], b"");
        assert_eq!(out, vec![0x41]);
    }

    #[test]
    fn test_out_walks_pairs_in_order() {
        let (_, status, out) = eval(
            &[
                Push('H' as i32),
                Push('i' as i32),
                Pair,
                Push('\n' as i32),
                Pair,
                Out,
            ],
            b"",
        );
        assert_eq!(status, Ok(()));
        assert_eq!(out, b"Hi\n");
    }

    #[test]
    fn test_swap() {
        let (_, status, out) = eval(
            &[Push('a' as i32), Push('b' as i32), Swap, Pair, Out],
            b"",
        );
        assert_eq!(status, Ok(()));
        assert_eq!(out, b"ba");
    }

    #[test]
    fn test_in_reads_bytes_then_eof() {
        let (mut vm, status, _) = eval(&[In, In], b"A");
        assert_eq!(status, Ok(()));
        // second read hit end of stream
        let eof = vm.pop().unwrap();
        match vm.heap.kind(eof) {
            ObjKind::Int(value) => assert_eq!(value, -1),
            other => panic!("expected an integer, got {:?}", other),
        }
        let first = vm.pop().unwrap();
        match vm.heap.kind(first) {
            ObjKind::Int(value) => assert_eq!(value, 'A' as i32),
            other => panic!("expected an integer, got {:?}", other),
        }
    }

    #[test]
    fn test_halt_stops_the_program() {
        let (vm, status, _) = eval(
            &[Push(1), Halt, Die(String::from("not reached"))],
            b"",
        );
        assert_eq!(status, Ok(()));
        assert!(vm.halted());
        assert_eq!(vm.num_objects(), 1);
    }

    #[test]
    fn test_die_reports_the_message() {
        let (_, status, _) = eval(&[Die(String::from("boom"))], b"");
        assert_eq!(status, Err(Error::Died(String::from("boom"))));
    }

    #[test]
    fn test_assert_allocated() {
        let (_, status, _) = eval(
            &[Push(1), AssertAllocated(1, String::from("count"))],
            b"",
        );
        assert_eq!(status, Ok(()));

        let (_, status, _) = eval(
            &[Push(1), AssertAllocated(2, String::from("count"))],
            b"",
        );
        assert_eq!(
            status,
            Err(Error::AssertFailed {
                expected: 2,
                actual: 1,
                msg: String::from("count")
            })
        );
    }

    #[test]
    fn test_underflow() {
        let (_, status, _) = eval(&[Pop], b"");
        assert_eq!(status, Err(Error::Underflow));

        let (_, status, _) = eval(&[Push(1), Pair], b"");
        assert_eq!(status, Err(Error::Underflow));
    }

    #[test]
    fn test_overflow() {
        let program: Vec<Instruction> =
            (0..STACK_MAX as i32 + 1).map(Push).collect();
        let (_, status, _) = eval(&program, b"");
        assert_eq!(status, Err(Error::Overflow));
    }

    #[test]
    fn test_collection_triggers_during_allocation() {
        let mut vm = VM::new();
        // cross the initial threshold with everything rooted: the
        // automatic collection must not reclaim any of it
        for i in 0..150 {
            vm.push_int(i).unwrap();
        }
        assert_eq!(vm.num_objects(), 150);

        // drop the roots; churning past the next trigger reclaims them
        for _ in 0..150 {
            vm.pop().unwrap();
        }
        while vm.num_objects() < vm.heap.threshold() {
            vm.push_int(0).unwrap();
            vm.pop().unwrap();
        }
        vm.push_int(0).unwrap();
        assert_eq!(vm.num_objects(), 1);
    }

    #[test]
    fn test_reset_frees_everything() {
        let mut vm = VM::new();
        vm.push_int(1).unwrap();
        vm.push_int(2).unwrap();
        vm.push_pair().unwrap();
        vm.reset();
        assert_eq!(vm.num_objects(), 0);
        assert_eq!(vm.depth(), 0);
    }

    #[test]
    fn test_fetch_error_surfaces() {
        let mut vm = VM::new();
        let bytes = [0x0fu8];
        let mut input: &[u8] = b"";
        let mut out = Vec::new();
        let status = vm.run(&mut &bytes[..], &mut input, &mut out);
        assert_eq!(
            status,
            Err(Error::Fetch(instruction::Error::UnknownOpcode(0x0f)))
        );
    }
}
