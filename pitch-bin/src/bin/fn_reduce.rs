use anyhow::{Context, Result};
use log::info;
use pitch_core::memory::{BitFunction, independent_functions};
use std::io::{BufRead, stdin};

/// Reads hexadecimal bit functions (whitespace or line separated) from stdin and
/// prints the linearly independent subset, keeping the input order.
fn main() -> Result<()> {
    env_logger::init();
    let mut functions: Vec<BitFunction> = vec![];
    for line in stdin().lock().lines() {
        let line = line?;
        for token in line.split_whitespace() {
            let digits = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            let f = BitFunction::from_str_radix(digits, 16)
                .with_context(|| format!("invalid bit function {}", token))?;
            functions.push(f);
        }
    }
    let independent = independent_functions(&functions);
    info!(
        "{} of {} functions are independent",
        independent.len(),
        functions.len()
    );
    for f in independent {
        println!("{:#x}", f);
    }
    Ok(())
}
