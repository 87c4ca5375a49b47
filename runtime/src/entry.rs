//! Cargador de imágenes (`cmrun`).
//!
//! Carga una imagen emitida por el compilador y la ejecuta con la
//! entrada y salida estándar del proceso. El estado de salida es el
//! valor entero que retorna la rutina de entrada.

use anyhow::{self, Context};
use clap::{crate_version, Arg, Command};
use log::info;
use runtime::{Image, Machine};

use std::{
    fs::File,
    io::{self, BufReader},
    process,
};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Command::new("C-minus image runner")
        .version(crate_version!())
        .arg(
            Arg::new("image")
                .value_name("IMAGE")
                .required(true)
                .help("Compiled program image"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("SEED")
                .takes_value(true)
                .help("Fixed seed for the `?` operator"),
        )
        .get_matches();

    let path = args.value_of("image").context("missing image path")?;
    let seed = args
        .value_of("seed")
        .map(str::parse::<u64>)
        .transpose()
        .context("Seed must be an unsigned integer")?;

    let file = File::open(path).with_context(|| format!("Failed to open: {}", path))?;
    let image = Image::read_from(&mut BufReader::new(file))
        .with_context(|| format!("Failed to load image: {}", path))?;

    info!(
        "Loaded {} ({} routines, {} fields)",
        path,
        image.routines.len(),
        image.fields.len()
    );

    let stdin = io::stdin();
    let stdout = io::stdout();

    let mut machine = Machine::new(&image, stdin.lock(), stdout.lock());
    if let Some(seed) = seed {
        machine = machine.seed(seed);
    }

    let status = machine.run().context("Runtime error")?;
    drop(machine);

    process::exit(status.unwrap_or(0));
}
