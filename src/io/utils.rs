//! Utilities for input/output.

use super::OverwriteMode;
use std::{
    fs,
    io::{self, Read, Write},
    path::Path,
};

#[cfg(feature = "serialization")]
use serde::Serialize;

/// Reads and returns the content of the specified text file.
pub fn read_text_file<P: AsRef<Path>>(file_path: P) -> io::Result<String> {
    let file = fs::File::open(file_path)?;
    let mut text = String::new();
    let _ = io::BufReader::new(file).read_to_string(&mut text)?;
    Ok(text)
}

/// Determines whether the file at the given path may be written, asking
/// the user if required by the overwrite mode.
pub fn write_allowed<P: AsRef<Path>>(file_path: P, overwrite_mode: OverwriteMode) -> io::Result<bool> {
    let file_path = file_path.as_ref();
    if !file_path.exists() {
        return Ok(true);
    }
    match overwrite_mode {
        OverwriteMode::Always => Ok(true),
        OverwriteMode::Never => {
            println!("File {} already exists, skipping", file_path.display());
            Ok(false)
        }
        OverwriteMode::Ask => {
            print!("File {} already exists, overwrite? [y/N] ", file_path.display());
            io::stdout().flush()?;
            let mut answer = String::new();
            io::stdin().read_line(&mut answer)?;
            Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
        }
    }
}

/// Writes the given text to the given path, creating parent directories as needed.
pub fn write_text_file<P: AsRef<Path>>(text: &str, file_path: P) -> io::Result<()> {
    let file_path = file_path.as_ref();
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(file_path)?;
    file.write_all(text.as_bytes())
}

/// Serializes the given data into JSON format and saves it at the given path.
#[cfg(feature = "json")]
pub fn save_data_as_json<P: AsRef<Path>, T: Serialize>(file_path: P, data: &T) -> io::Result<()> {
    let file = fs::File::create(file_path)?;
    serde_json::to_writer(io::BufWriter::new(file), data).map_err(io::Error::from)
}

/// Serializes the given data into protocol 3 pickle format and saves it at the given path.
#[cfg(feature = "pickle")]
pub fn save_data_as_pickle<P: AsRef<Path>, T: Serialize>(file_path: P, data: &T) -> io::Result<()> {
    let mut file = fs::File::create(file_path)?;
    write_data_as_pickle(&mut file, data)
}

/// Serializes the given data into protocol 3 pickle format and writes it to the given writer.
#[cfg(feature = "pickle")]
pub fn write_data_as_pickle<W: Write, T: Serialize>(writer: &mut W, data: &T) -> io::Result<()> {
    match serde_pickle::to_writer(writer, data, serde_pickle::SerOptions::new()) {
        Ok(_) => Ok(()),
        Err(serde_pickle::Error::Io(err)) => Err(err),
        Err(err) => Err(io::Error::new(
            io::ErrorKind::Other,
            format!("Unexpected error while serializing data to pickle: {}", err),
        )),
    }
}
