//! The pegc driver: reads a grammar file, checks it, and writes the
//! generated parser next to the working directory.
//!
//! Usage: `pegc <grammar-file> [--output <path>] [--ast] [--check]`

mod linemap;

use std::path::{Path, PathBuf};

use anyhow::Context;

use linemap::LineMap;
use pegc::{Diagnostics, ParsedGrammar};
use pegc_backend::{check, emit, Grammar};

fn main() {
    env_logger::init();
    let code = match run() {
        Ok(code) => code,
        Err(error) => {
            eprintln!("pegc: {error:#}");
            1
        }
    };
    std::process::exit(code);
}

fn run() -> anyhow::Result<i32> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut do_ast = false;
    let mut do_check = false;
    let mut output: Option<PathBuf> = None;
    let mut files = Vec::new();

    let mut iter = args.iter().map(String::as_str);
    while let Some(arg) = iter.next() {
        match arg {
            "--ast" => do_ast = true,
            "--check" => do_check = true,
            "--output" => {
                let next = iter.next().context("--output expects a path")?;
                output = Some(PathBuf::from(next));
            }
            "--help" => {
                println!("Usage: pegc <grammar-file> [--output <path>] [--ast] [--check]");
                return Ok(0);
            }
            _ => files.push(arg),
        }
    }

    let path: PathBuf = match files.as_slice() {
        [file] => file.into(),
        [] => anyhow::bail!("no grammar file provided"),
        _ => anyhow::bail!("only one grammar file may be provided"),
    };

    let src = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read `{}`", path.display()))?;

    let diag = Diagnostics::new();

    log::debug!("parsing {} bytes", src.len());
    let tree = ParsedGrammar::new(src.as_bytes(), &diag);

    if do_ast {
        print!("{}", tree.pretty_print(src.as_bytes()));
    }

    let Some(grammar) = Grammar::new(src.as_bytes(), &tree) else {
        report_diagnostics(&path, &src, &diag);
        return Ok(1);
    };

    let nullable = check(&grammar, &diag);
    if !diag.is_empty() {
        report_diagnostics(&path, &src, &diag);
        return Ok(1);
    }
    if do_check {
        return Ok(0);
    }

    let mut generated = String::new();
    let source_name = path.display().to_string();
    emit(&grammar, &nullable, &source_name, &mut generated);

    let output = output.unwrap_or_else(|| PathBuf::from("Parser.rs"));
    std::fs::write(&output, &generated)
        .with_context(|| format!("failed to write `{}`", output.display()))?;
    log::debug!("wrote {} bytes to `{}`", generated.len(), output.display());

    Ok(0)
}

fn report_diagnostics(path: &Path, src: &str, diag: &Diagnostics) {
    let linemap = LineMap::new(src);
    let path = path.display();
    for diagnostic in diag.get().iter() {
        let pos = linemap.offset_to_pos(src, diagnostic.span.start);
        eprintln!(
            "{path}:{}:{}: error[{}]: {}",
            pos.line + 1,
            pos.column + 1,
            diagnostic.tag.name(),
            diagnostic.message
        );

        let line = linemap.line_text(src, pos.line);
        eprintln!("    {line}");
        let mut underline = String::from("    ");
        for byte in line.bytes().take(pos.column as usize) {
            // keep tabs so the caret stays aligned with the source line
            underline.push(match byte {
                b'\t' => '\t',
                _ => ' ',
            });
        }
        underline.push('^');
        let line_end = diagnostic.span.start - pos.column + line.len() as u32;
        let end = u32::min(diagnostic.span.end, line_end);
        for _ in diagnostic.span.start + 1..end {
            underline.push('~');
        }
        eprintln!("{underline}");
    }
}
