// Assembler driver: read the source file, assemble into memory, and
// write the bytecode out only if the whole program was good.

use std::env::args;
use std::fs;
use std::process::exit;

use gcvm::emit::assemble;
use gcvm::util::report_error;


fn main() {
    let argv: Vec<String> = args().collect();
    if argv.len() != 2 && argv.len() != 3 {
        println!("Usage: {} <file> [<out>]", argv[0]);
        exit(1);
    }

    let source = match fs::read_to_string(&argv[1]) {
        Ok(source) => source,
        Err(e) => {
            report_error(&format!("Couldn't open `{}`: {}", argv[1], e));
            exit(1);
        }
    };

    let mut bytecode = Vec::new();
    if let Err(e) = assemble(&source, &mut bytecode) {
        report_error(&e.to_string());
        exit(1);
    }

    let out_path = argv.get(2).map(String::as_str).unwrap_or("a.out");
    if let Err(e) = fs::write(out_path, &bytecode) {
        report_error(&format!("Couldn't write `{}`: {}", out_path, e));
        exit(1);
    }
}
