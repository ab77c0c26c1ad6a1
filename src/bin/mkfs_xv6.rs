use std::env;
use std::fs::File;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process;

use anyhow::{anyhow, Context, Result};
use colored::*;
use xv6fsck::ImageBuilder;

const DEFAULT_SIZE: u32 = 1024;
const DEFAULT_NINODES: u32 = 200;
const USAGE: &str = "Uso: mkfs.xv6 imagen [bloques] [inodos]";

fn main() {
    if let Err(err) = run() {
        colored::control::set_override(io::stderr().is_terminal());
        eprintln!("{} {}", "ERROR:".red().bold(), err);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    // 1. Leer imagen y geometría opcional desde los argumentos
    let mut args = env::args().skip(1);
    let path = args.next().map(PathBuf::from).context(USAGE)?;
    let size = parse_arg(args.next(), DEFAULT_SIZE, "bloques")?;
    let ninodes = parse_arg(args.next(), DEFAULT_NINODES, "inodos")?;

    if args.next().is_some() {
        return Err(anyhow!("{USAGE} (demasiados argumentos)"));
    }

    // 2. Construir la imagen vacía (sólo el directorio raíz)
    let builder = ImageBuilder::new(size, ninodes)?;
    let geometry = *builder.geometry();

    // 3. Escribirla a disco
    let mut file = File::create(&path)
        .with_context(|| format!("No se pudo crear el archivo {:?}", path))?;
    file.write_all(&builder.into_bytes())
        .with_context(|| format!("No se pudo escribir la imagen {:?}", path))?;

    colored::control::set_override(io::stdout().is_terminal());
    println!(
        "{} imagen creada con {} bloques, {} inodos, {} bloques de datos.",
        "mkfs.xv6:".green().bold(),
        geometry.size,
        geometry.ninodes,
        geometry.size - geometry.meta_blocks
    );

    Ok(())
}

fn parse_arg(arg: Option<String>, default: u32, what: &str) -> Result<u32> {
    match arg {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .with_context(|| format!("Número de {} inválido: {:?}", what, raw)),
    }
}
