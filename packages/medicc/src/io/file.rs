use crate::io::fs::ensure_dir;
use eyre::{Report, WrapErr};
use log::info;
use std::fs::File;
use std::io::{stdin, stdout, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Open file for reading given a filepath. If the filepath is None or `-`, then read from stdin.
pub fn open_file_or_stdin<P: AsRef<Path>>(filepath: &Option<P>) -> Result<Box<dyn BufRead>, Report> {
  match filepath {
    Some(filepath) if !is_path_stdin(filepath) => {
      let filepath = filepath.as_ref();
      let file = File::open(filepath).wrap_err_with(|| format!("When opening file '{filepath:?}'"))?;
      Ok(Box::new(BufReader::with_capacity(32 * 1024, file)))
    }
    _ => {
      info!("Reading from standard input");
      Ok(Box::new(BufReader::new(stdin())))
    }
  }
}

/// Open file for writing. If the path does not exist it will be created recursively.
pub fn create_file_or_stdout(filepath: impl AsRef<Path>) -> Result<Box<dyn Write + Send>, Report> {
  let filepath = filepath.as_ref();

  let file: Box<dyn Write + Send> = if is_path_stdout(filepath) {
    info!("File path is {filepath:?}. Writing to standard output.");
    Box::new(stdout())
  } else {
    ensure_dir(filepath)?;
    Box::new(File::create(filepath).wrap_err_with(|| format!("When creating file: '{filepath:?}'"))?)
  };

  Ok(Box::new(BufWriter::with_capacity(32 * 1024, file)))
}

pub fn is_path_stdin(filepath: impl AsRef<Path>) -> bool {
  let filepath = filepath.as_ref();
  filepath == PathBuf::from("-") || filepath == PathBuf::from("/dev/stdin")
}

pub fn is_path_stdout(filepath: impl AsRef<Path>) -> bool {
  let filepath = filepath.as_ref();
  filepath == PathBuf::from("-") || filepath == PathBuf::from("/dev/stdout")
}
