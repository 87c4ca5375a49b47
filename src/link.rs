//! Persistencia de imágenes.
//!
//! No existe enlazado: un programa es una única unidad de compilación
//! y la imagen que produce el generador ya es ejecutable. Este módulo
//! se limita a escribirla en disco de forma que nunca quede un archivo
//! parcial en la ruta de salida.

use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use log::info;
use runtime::Image;
use thiserror::Error;

/// Un error de escritura de la imagen.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LinkerError {
    /// Ocurrió un evento de error de E/S al escribir.
    #[error("I/O error")]
    Io(#[from] io::Error),

    /// La ruta de salida no tiene nombre de archivo.
    #[error("Output path `{0}` does not name a file")]
    BadPath(PathBuf),
}

/// Escribe una imagen a `output`.
///
/// La imagen se escribe primero a un archivo temporal junto al destino
/// y luego se renombra.
pub fn write_image<P: AsRef<Path>>(image: &Image, output: P) -> Result<(), LinkerError> {
    let output = output.as_ref();
    let name = output
        .file_name()
        .ok_or_else(|| LinkerError::BadPath(output.to_owned()))?;

    let mut temporary = name.to_owned();
    temporary.push(".partial");
    let temporary = output.with_file_name(temporary);

    let result = write_to(image, &temporary).and_then(|()| fs::rename(&temporary, output));
    if result.is_err() {
        let _ = fs::remove_file(&temporary);
    }

    result?;
    info!("Wrote {} routines to {}", image.routines.len(), output.display());

    Ok(())
}

/// Ruta de salida por omisión: la misma entrada con extensión `.cmx`.
pub fn default_output<P: AsRef<Path>>(input: P) -> PathBuf {
    input.as_ref().with_extension("cmx")
}

fn write_to(image: &Image, path: &Path) -> io::Result<()> {
    let mut output = BufWriter::new(File::create(path)?);
    image.write_to(&mut output)?;
    output.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_replaces_extension() {
        assert_eq!(default_output("dir/prog.cm"), PathBuf::from("dir/prog.cmx"));
        assert_eq!(default_output("prog"), PathBuf::from("prog.cmx"));
    }

    #[test]
    fn bad_output_path() {
        let image = crate::compile(&b""[..], "empty.cm", crate::Options::empty())
            .unwrap()
            .image;

        assert!(matches!(write_image(&image, "/"), Err(LinkerError::BadPath(_))));
    }
}
