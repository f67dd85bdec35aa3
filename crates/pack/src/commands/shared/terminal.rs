//! Terminal output helpers shared across commands.
//!
//! Grounded on this crate's `commands/shared/terminal.rs` module (terminal
//! concerns factored out of the command bodies) and the `console` +
//! `is-terminal` crates already in `crates/pack`'s dependency set.

use console::style;
use std::io::IsTerminal;

/// Whether to emit ANSI styling: respects `--no-color`, then falls back to
/// whether stdout is a real terminal.
pub fn colors_enabled(no_color: bool) -> bool {
    !no_color && std::io::stdout().is_terminal()
}

/// Print a success line the way `pack`'s real CLI reports a finished build:
/// a green "Successfully ..." sentence.
pub fn success(no_color: bool, message: &str) {
    if colors_enabled(no_color) {
        println!("{}", style(message).green().bold());
    } else {
        println!("{message}");
    }
}

/// Print an informational line.
pub fn info(no_color: bool, message: &str) {
    if colors_enabled(no_color) {
        println!("{}", style(message).cyan());
    } else {
        println!("{message}");
    }
}

/// Print a warning line to stderr.
pub fn warn(no_color: bool, message: &str) {
    if colors_enabled(no_color) {
        eprintln!("{} {}", style("Warning:").yellow().bold(), message);
    } else {
        eprintln!("Warning: {message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_color_flag_disables_styling_regardless_of_terminal() {
        assert!(!colors_enabled(true));
    }
}
