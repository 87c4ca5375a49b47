//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las diferentes fases del proceso de
//! compilación y expone una CLI.

use anyhow::{self, bail, Context};
use clap::{crate_version, Arg, Command};
use cminus::{link, listing, Options};
use log::info;
use unicase::UniCase;

use std::{
    env,
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    process,
};

/// Extensión obligatoria de los archivos fuente.
const SOURCE_EXTENSION: &str = "cm";

fn main() -> anyhow::Result<()> {
    env_logger::init();

    // La forma histórica `-output=PATH` equivale a `--output=PATH`
    let argv = env::args_os().map(|arg| match arg.to_str() {
        Some(arg) if arg.starts_with("-output=") => format!("-{}", arg).into(),
        _ => arg,
    });

    // Parsing de CLI
    let args = Command::new("C-minus compiler")
        .version(crate_version!())
        .arg(
            Arg::new("source")
                .value_name("SOURCE")
                .required(true)
                .help("Source file (.cm)"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .takes_value(true)
                .value_name("FILE")
                .help("Output image, defaults to SOURCE with a .cmx extension"),
        )
        .arg(
            Arg::new("listing")
                .short('S')
                .long("listing")
                .takes_value(true)
                .value_name("FILE")
                .help("Also write a disassembly ('-' for stdout)"),
        )
        .arg(
            Arg::new("dump-ast")
                .long("dump-ast")
                .help("Print the syntax tree to stderr"),
        )
        .arg(
            Arg::new("legacy-compound")
                .long("legacy-compound")
                .help("Evaluate the right side of -= and /= twice"),
        )
        .get_matches_from(argv);

    // Se extraen argumentos necesarios
    let source = Path::new(args.value_of("source").context("missing source path")?);
    let has_extension = source
        .extension()
        .and_then(|extension| extension.to_str())
        .map_or(false, |extension| UniCase::new(extension) == UniCase::new(SOURCE_EXTENSION));

    if !has_extension {
        bail!("Source file must have a .{} extension: {}", SOURCE_EXTENSION, source.display());
    }

    let output = match args.value_of("output") {
        Some(output) => PathBuf::from(output),
        None => link::default_output(source),
    };

    let mut options = Options::empty();
    if args.is_present("legacy-compound") {
        options |= Options::LEGACY_COMPOUND;
    }

    let file = File::open(source).with_context(|| format!("Failed to open: {}", source.display()))?;
    let name = source.display().to_string();

    let compilation = match cminus::compile(BufReader::new(file), &name, options) {
        Ok(compilation) => compilation,
        Err(diagnostics) => {
            eprint!("{}", diagnostics);
            process::exit(1);
        }
    };

    if args.is_present("dump-ast") {
        eprint!("{}", compilation.ast);
    }

    let image = &compilation.image;
    match args.value_of("listing") {
        None => (),

        Some("-") => {
            let stdout = io::stdout();
            let mut stdout = stdout.lock();
            listing::write(image, &mut stdout).context("Failed to write listing to stdout")?;
        }

        Some(path) => {
            let file = File::create(path).with_context(|| format!("Failed to open for writing: {}", path))?;
            let mut file = BufWriter::new(file);

            listing::write(image, &mut file)
                .and_then(|()| file.flush())
                .with_context(|| format!("Failed to write listing: {}", path))?;
        }
    }

    link::write_image(image, &output)
        .with_context(|| format!("Failed to write image: {}", output.display()))?;

    info!("Compiled {} into {}", name, output.display());
    Ok(())
}
