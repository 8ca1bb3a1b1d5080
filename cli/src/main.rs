#![deny(clippy::all, unused_must_use, unused_imports)]

use failure::{Fallible, format_err};
use prescribe::config::load_config;
use prescribe::{container, run_source, RunConfig, WhitespaceTokenizer};
use std::io::Read;
use std::path::PathBuf;
use std::{fs, process};
use structopt::StructOpt;

/// Prescribe/Lucid executable: runs a `.prsd` source file against stdin.
#[derive(Debug, StructOpt)]
#[structopt(name = "prescribe")]
struct Opt {
    /// Path to the `.prsd` source file.
    #[structopt(parse(from_os_str))]
    path: PathBuf,

    /// Optional JSON file of resource limits (see `RunConfig`). Defaults are
    /// used when this is omitted.
    #[structopt(long = "config", parse(from_os_str))]
    config_path: Option<PathBuf>,
}

fn run(opt: Opt) -> Fallible<String> {
    if opt.path.extension().and_then(|e| e.to_str()) != Some("prsd") {
        return Err(format_err!(
            "expected a .prsd file, got {}",
            opt.path.display()
        ));
    }

    let config: RunConfig = *load_config(opt.config_path.as_deref())?;

    let mut stdin_text = String::new();
    std::io::stdin().read_to_string(&mut stdin_text)?;

    let doc = fs::read_to_string(&opt.path)?;
    let blocks = container::split_blocks(&doc);

    let mut output = String::new();
    for block in blocks {
        let mut input = WhitespaceTokenizer::new(&stdin_text);
        match run_source(&block.source, &mut input, &config) {
            Ok(outcome) => output.push_str(&outcome.output),
            Err(err) => return Err(format_err!("{}", err)),
        }
    }
    Ok(output)
}

fn main() {
    let exit_code = match run(Opt::from_args()) {
        Ok(output) => {
            print!("{}", output);
            0
        }
        Err(err) => {
            eprintln!("{}", err);
            1
        }
    };
    process::exit(exit_code);
}
