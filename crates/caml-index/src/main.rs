//
// main.rs
//
// Command-line driver for the interface indexer
//

use std::env;

use caml_index::cli::query;

fn print_usage() {
    println!(
        "caml-index {}, an OCaml interface indexer.",
        env!("CARGO_PKG_VERSION")
    );
    print!(
        r#"
Usage: caml-index [OPTIONS]

Available options:

--config FILE                JSON settings with "index" and "project" sections
--project DIR                Project root (default: current directory)
--search-path PATH           Search path entry, repeatable (default: .)
--stdlib DIR                 Standard library interface directory
--buffer FILE                Build the tree as seen from this source file
--warm                       Warm the parser memo in the background first
--lookup A.B.c               Print one definition instead of the whole tree
--version                    Print the version
--help                       Print this help message

"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut argv = env::args();
    argv.next(); // skip executable name
    let args: Vec<String> = argv.collect();

    for arg in &args {
        match arg.as_str() {
            "--version" => {
                println!("caml-index {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_usage();
                return Ok(());
            }
            _ => {}
        }
    }

    let parsed = query::parse_args(&mut args.into_iter()).map_err(|e| anyhow::anyhow!(e))?;

    env_logger::init();

    let output = query::run(parsed).await?;
    print!("{}", output);
    Ok(())
}
