use crate::io::file::create_file_or_stdout;
use crate::make_error;
use csv::{ReaderBuilder as CsvReaderBuilder, StringRecord, Writer as CsvWriterImpl, WriterBuilder as CsvWriterBuilder};
use eyre::{Report, WrapErr};
use serde::Serialize;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Writes CSV. Each row is a serde-annotated struct.
pub struct CsvStructWriter<W: Write + Send> {
  pub writer: CsvWriterImpl<W>,
}

impl<W: Write + Send> CsvStructWriter<W> {
  pub fn new(writer: W, delimiter: u8) -> Result<Self, Report> {
    let writer = CsvWriterBuilder::new().delimiter(delimiter).from_writer(writer);
    Ok(Self { writer })
  }

  pub fn write<T: Serialize>(&mut self, record: &T) -> Result<(), Report> {
    self.writer.serialize(record)?;
    Ok(())
  }

  pub fn flush(&mut self) -> Result<(), Report> {
    self.writer.flush()?;
    Ok(())
  }
}

/// Writes CSV files. Each row is a serde-annotated struct.
pub struct CsvStructFileWriter {
  pub filepath: PathBuf,
  pub writer: CsvStructWriter<Box<dyn Write + Send>>,
}

impl CsvStructFileWriter {
  pub fn new(filepath: impl AsRef<Path>, delimiter: u8) -> Result<Self, Report> {
    let filepath = filepath.as_ref();
    let file = create_file_or_stdout(filepath)?;
    let writer = CsvStructWriter::new(file, delimiter)?;
    Ok(Self {
      filepath: filepath.to_owned(),
      writer,
    })
  }

  pub fn write<T: Serialize>(&mut self, record: &T) -> Result<(), Report> {
    self
      .writer
      .write(record)
      .wrap_err_with(|| format!("When writing file {:?}", self.filepath))
  }

  pub fn flush(&mut self) -> Result<(), Report> {
    self.writer.flush()
  }
}

/// Writes CSV. Each row is a vec of strings.
pub struct CsvVecWriter<W: Write + Send> {
  pub headers: Vec<String>,
  pub writer: CsvWriterImpl<W>,
}

impl<W: Write + Send> CsvVecWriter<W> {
  pub fn new(writer: W, delimiter: u8, headers: &[String]) -> Result<Self, Report> {
    let mut writer = CsvWriterBuilder::new().delimiter(delimiter).from_writer(writer);
    writer.write_record(headers)?;
    Ok(Self {
      headers: headers.to_owned(),
      writer,
    })
  }

  pub fn write<I: IntoIterator<Item = T>, T: AsRef<[u8]>>(&mut self, values: I) -> Result<(), Report> {
    self.writer.write_record(values)?;
    Ok(())
  }

  pub fn flush(&mut self) -> Result<(), Report> {
    self.writer.flush()?;
    Ok(())
  }
}

/// Writes CSV files. Each row is a vec of strings.
pub struct CsvVecFileWriter {
  pub filepath: PathBuf,
  pub writer: CsvVecWriter<Box<dyn Write + Send>>,
}

impl CsvVecFileWriter {
  pub fn new(filepath: impl AsRef<Path>, delimiter: u8, headers: &[String]) -> Result<Self, Report> {
    let filepath = filepath.as_ref();
    let file = create_file_or_stdout(filepath)?;
    let writer = CsvVecWriter::new(file, delimiter, headers)?;
    Ok(Self {
      filepath: filepath.to_owned(),
      writer,
    })
  }

  pub fn write<I: IntoIterator<Item = T>, T: AsRef<[u8]>>(&mut self, values: I) -> Result<(), Report> {
    self
      .writer
      .write(values)
      .wrap_err_with(|| format!("When writing file {:?}", self.filepath))
  }

  pub fn flush(&mut self) -> Result<(), Report> {
    self.writer.flush()
  }
}

/// Reads a delimited table into its header and rows of string fields
pub fn csv_read_records(reader: impl Read, delimiter: u8) -> Result<(Vec<String>, Vec<StringRecord>), Report> {
  let mut reader = CsvReaderBuilder::new()
    .has_headers(true)
    .delimiter(delimiter)
    .trim(csv::Trim::All)
    .comment(Some(b'#'))
    .from_reader(reader);

  let headers = reader.headers()?.iter().map(ToOwned::to_owned).collect();
  let records = reader.records().collect::<Result<Vec<_>, _>>()?;
  Ok((headers, records))
}

/// Finds position of a required column
pub fn get_col_index(headers: &[String], name: &str) -> Result<usize, Report> {
  match headers.iter().position(|header| header == name) {
    Some(idx) => Ok(idx),
    None => make_error!(
      "Unable to find column '{name}'. Available columns are: {}",
      headers.join(", ")
    ),
  }
}
