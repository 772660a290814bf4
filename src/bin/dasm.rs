// Disassembler driver: list the instructions of a bytecode file as
// assembler source.

use std::env::args;
use std::fs::File;
use std::io;
use std::process::exit;

use gcvm::dasm::disassemble;
use gcvm::util::report_error;


fn main() {
    let argv: Vec<String> = args().collect();
    if argv.len() != 2 {
        eprintln!("Usage: {} <file>", argv[0]);
        exit(1);
    }

    let mut file = match File::open(&argv[1]) {
        Ok(file) => file,
        Err(e) => {
            report_error(&format!("Couldn't open `{}`: {}", argv[1], e));
            exit(1);
        }
    };

    let stdout = io::stdout();
    if let Err(e) = disassemble(&mut file, &mut stdout.lock()) {
        report_error(&e.to_string());
        exit(1);
    }
}
