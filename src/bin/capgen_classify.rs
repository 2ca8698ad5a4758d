//! Classifies predefined-macro tokens into an architecture family.
//!
//! Prints the family, the indicator that matched, and the implied flags as a
//! single JSON object. Tokens may be given as separate arguments or as comma
//! separated lists.

use anyhow::{Result, bail};
use capgen::{ArchitectureClassifier, split_list};
use std::env;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let tokens = parse_tokens(env::args().skip(1))?;
    let classification = ArchitectureClassifier::standard().classify(&tokens)?;
    println!("{}", serde_json::to_string(&classification)?);
    Ok(())
}

fn parse_tokens<I>(args: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = String>,
{
    let mut tokens = Vec::new();
    for arg in args {
        if matches!(arg.as_str(), "-h" | "--help") {
            usage(0);
        }
        if arg.starts_with("--") {
            bail!("unknown argument: {arg}");
        }
        tokens.extend(split_list(&arg));
    }
    if tokens.is_empty() {
        usage(1);
    }
    Ok(tokens)
}

fn usage(code: i32) -> ! {
    eprintln!(
        "Usage: capgen-classify TOKEN...\n\nExample:\n  capgen-classify __aarch64__ __QNX__\n\nExits 1 when no known architecture indicator is present."
    );
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_split_on_commas() {
        let tokens = parse_tokens(["__arm__,__QNX__".to_string(), "__unix__".to_string()]).unwrap();
        assert_eq!(tokens, ["__arm__", "__QNX__", "__unix__"]);
    }

    #[test]
    fn flags_are_rejected() {
        assert!(parse_tokens(["--verbose".to_string()]).is_err());
    }
}
