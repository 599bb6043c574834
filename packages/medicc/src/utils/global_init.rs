use crate::io::fs::filename_maybe;
use crate::utils::datetime::{date_format_precise, date_now};
use color_eyre::config::{Frame, HookBuilder, Theme};
use color_eyre::owo_colors::{OwoColorize, Style};
use env_logger::Env;
use log::{Level, LevelFilter, Record};
use std::io::Write;

/// `file.rs:123:` of the log call site, dimmed
fn log_origin(record: &Record) -> String {
  let origin = match (record.file().and_then(filename_maybe), record.line()) {
    (Some(file), Some(line)) => format!("{file}:{line}:"),
    (Some(file), None) => format!("{file}:"),
    _ => String::new(),
  };
  origin.dimmed().to_string()
}

/// One-letter level tag in brackets, e.g. `[W]`
fn log_level_tag(level: Level) -> String {
  let letter = &level.as_str()[..1];
  let letter = match level {
    Level::Error => letter.red().bold().to_string(),
    Level::Warn => letter.yellow().to_string(),
    Level::Info => letter.cyan().dimmed().to_string(),
    Level::Debug => letter.green().dimmed().to_string(),
    Level::Trace => letter.dimmed().to_string(),
  };
  format!("{}{letter}{}", "[".dimmed(), "]".dimmed())
}

/// Sets up console logging. `RUST_LOG` is respected for modules not covered by `filter_level`.
pub fn setup_logger(filter_level: LevelFilter) {
  env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
    .filter_level(filter_level)
    .format(|buf, record| {
      let date = date_format_precise(&date_now()).dimmed().to_string();
      writeln!(
        buf,
        "{date} {} {} {}",
        log_level_tag(record.level()),
        log_origin(record),
        record.args()
      )?;
      Ok(())
    })
    .init();
}

fn error_theme() -> Theme {
  Theme::dark()
    .dependency_code(Style::new().dimmed())
    .file(Style::new().green())
    .line_number(Style::new().yellow())
    .panic_file(Style::new().green())
    .panic_line_number(Style::new().yellow())
    .panic_message(Style::new().bright_red().bold())
    .active_line(Style::new().cyan())
    .hidden_frames(Style::new().dimmed())
    .code_hash(Style::new().hidden())
}

const HIDDEN_FRAME_PREFIXES: &[&str] = &[
  "__rust_try",
  "alloc::",
  "color_eyre::",
  "core::",
  "eyre::",
  "rayon::",
  "rayon_core::",
  "rustc::",
  "std::",
];

const HIDDEN_FILE_PREFIXES: &[&str] = &["/rustc/"];

/// Frames of the standard library, error handling and the thread pool are hidden from backtraces
fn is_frame_visible(name: Option<&str>, filename: Option<&str>) -> bool {
  let visible_name = name.map_or(false, |name| {
    !HIDDEN_FRAME_PREFIXES
      .iter()
      .any(|&prefix| name.starts_with(prefix) || name.starts_with(&format!("<{prefix}")))
  });
  let visible_file = filename.map_or(true, |filename| {
    !HIDDEN_FILE_PREFIXES.iter().any(|&prefix| filename.starts_with(prefix))
  });
  visible_name && visible_file
}

/// Installs the error report and panic hooks. Called once per process, before anything else.
pub fn global_init() {
  HookBuilder::default()
    .theme(error_theme())
    .panic_section(format!(
      "This is a bug in MEDICC. Please report it at: '{}/issues'",
      env!("CARGO_PKG_REPOSITORY"),
    ))
    .add_frame_filter(Box::new(|frames: &mut Vec<&Frame>| {
      frames.retain(|frame| {
        let filename = frame.filename.as_ref().and_then(|filename| filename.to_str());
        is_frame_visible(frame.name.as_deref(), filename)
      });
    }))
    .install()
    .expect("color_eyre initialization failed");
}

#[cfg(test)]
mod tests {
  use super::*;
  use rstest::rstest;

  #[rstest]
  #[case(Some("medicc::pipeline::run::run_medicc"), Some("src/pipeline/run.rs"), true)]
  #[case(Some("<medicc::model::med_model::MedModel as medicc::model::cost_model::CostModel>::score"), None, true)]
  #[case(Some("std::rt::lang_start"), None, false)]
  #[case(Some("<rayon_core::job::StackJob<L,F,R> as rayon_core::job::Job>::execute"), None, false)]
  #[case(Some("medicc::io::input::read_tsv"), Some("/rustc/abc/library/core/src/ops.rs"), false)]
  #[case(None, None, false)]
  fn hides_library_frames(#[case] name: Option<&str>, #[case] filename: Option<&str>, #[case] expected: bool) {
    assert_eq!(is_frame_visible(name, filename), expected);
  }
}
