use nix::unistd::isatty;

#[macro_export]
macro_rules! trace(
    ( $($thing:expr),* ) => { if cfg!(test) { println! { $($thing),* } } };
);


// One-line fatal diagnostic, colored when stderr is a terminal.
pub fn report_error(msg: &str) {
    if isatty(2).unwrap_or(false) {
        eprintln!("\x1b[1m\x1b[38;5;1merror:\x1b[m {}", msg);
    } else {
        eprintln!("error: {}", msg);
    }
}
