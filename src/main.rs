// gcvm: a toy stack machine with mark-and-sweep collection, plus the
// assembler and disassembler for its bytecode.
//
// Copyright (C) 2020  Brandon Lewis
//
// This program is free software: you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public License
// as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this program.  If not, see
// <https://www.gnu.org/licenses/>.

use std::env::args;
use std::fs::File;
use std::io::{self, Read, Write};
use std::process::exit;

use gcvm::util::report_error;
use gcvm::vm::VM;


// Programs print characters one at a time and expect them to show up
// immediately, so stdout stays unbuffered.
struct Unbuffered(io::Stdout);

impl Write for Unbuffered {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.0.write(buf)?;
        self.0.flush()?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}


fn main() {
    let argv: Vec<String> = args().collect();
    if argv.len() > 2 {
        println!("Usage: {} [<file>]", argv[0]);
        exit(1);
    }

    // with no file argument the program itself comes from stdin, and
    // `in` instructions read from the same stream
    let mut program: Box<dyn Read> = match argv.get(1) {
        Some(path) => match File::open(path) {
            Ok(file) => Box::new(file),
            Err(e) => {
                report_error(&format!("Couldn't open `{}`: {}", path, e));
                exit(1);
            }
        },
        None => Box::new(io::stdin()),
    };

    let mut vm = VM::new();
    let result = vm.run(&mut program, &mut io::stdin(), &mut Unbuffered(io::stdout()));

    if let Err(e) = result {
        report_error(&e.to_string());
        exit(1);
    }
}
