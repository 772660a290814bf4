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

extern crate enumflags2;
extern crate nix;
extern crate regex;
#[macro_use]
extern crate lazy_static;


#[macro_use]
pub mod util;
pub mod dasm;
pub mod emit;
pub mod heap;
pub mod instruction;
pub mod lexer;
pub mod parser;
pub mod scope;
pub mod vm;
