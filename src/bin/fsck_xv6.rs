use std::env;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process;

use anyhow::Result;
use colored::*;
use xv6fsck::fsck::{self, FsckError};

fn main() {
    // Colores sólo si stderr es una terminal; el texto es el mismo.
    colored::control::set_override(io::stderr().is_terminal());

    if let Err(err) = run() {
        // Una sola línea de diagnóstico, sin la cadena de causas.
        eprintln!("{} {}", "ERROR:".red().bold(), err);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    // Esperamos exactamente: fsck.xv6 imagen
    let mut args = env::args_os().skip(1);
    let image = args.next().map(PathBuf::from).ok_or(FsckError::Usage)?;
    if args.next().is_some() {
        return Err(FsckError::Usage.into());
    }

    fsck::check_path(&image)?;
    Ok(())
}
