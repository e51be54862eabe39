use log::{debug, info, warn};

use attendance_core::*;
use snafu::prelude::*;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use crate::args::Args;
use crate::kiosk::config_reader::*;

pub mod config_reader;

#[derive(Debug, Snafu)]
pub enum CliError {
    #[snafu(display("Error opening settings file {path}"))]
    OpeningJson { source: io::Error, path: String },
    #[snafu(display("Error parsing settings file {path}: {source}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Cannot open workbook {}: {source}", path.display()))]
    OpeningWorkbook { source: KioskError, path: PathBuf },
    #[snafu(display("Error reading the terminal"))]
    ReadingInput { source: io::Error },
    #[snafu(display("Error writing to the terminal"))]
    WritingOutput { source: io::Error },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type CliResult<T> = Result<T, CliError>;

const HELP: &str = "Type your name and press Enter to sign in.
Commands:
  /add NAME      add NAME to the registry as Unregistered
  /suggest TEXT  show the registry names close to TEXT
  /reload        read the registry again from the workbook
  /finalize      mark today's absences and complete the log (matrix layout)
  /help          show this help
  /quit          leave
After a failed sign-in, type the number of a suggestion to pick it.";

enum Flow {
    Continue,
    Quit,
}

/// An operator session on top of a [`Kiosk`].
///
/// Errors coming from the kiosk are shown and the session goes on. Only
/// failures of the terminal itself end it.
pub struct Session<C: Clock> {
    kiosk: Kiosk<C>,
    // Suggestions of the last failed sign-in, for picking by number.
    pending: Vec<String>,
}

impl<C: Clock> Session<C> {
    pub fn new(kiosk: Kiosk<C>) -> Session<C> {
        Session {
            kiosk,
            pending: Vec::new(),
        }
    }

    pub fn kiosk(&self) -> &Kiosk<C> {
        &self.kiosk
    }

    /// Reads lines until `/quit` or the end of the input.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> CliResult<()> {
        writeln!(
            out,
            "Attendance kiosk on {} ({} layout, {} students). /help for commands.",
            self.kiosk.workbook_path().display(),
            match self.kiosk.rules().layout {
                AttendanceLayout::DailySheet => "daily",
                AttendanceLayout::Matrix => "matrix",
            },
            self.kiosk.registry().len()
        )
        .context(WritingOutputSnafu {})?;
        let mut lines = input.lines();
        loop {
            write!(out, "> ").context(WritingOutputSnafu {})?;
            out.flush().context(WritingOutputSnafu {})?;
            let line = match lines.next() {
                Some(l) => l.context(ReadingInputSnafu {})?,
                None => break,
            };
            if let Flow::Quit = self.handle_line(&line, &mut lines, out)? {
                break;
            }
        }
        info!("Session::run: session closed");
        Ok(())
    }

    fn handle_line<I, W>(&mut self, line: &str, lines: &mut I, out: &mut W) -> CliResult<Flow>
    where
        I: Iterator<Item = io::Result<String>>,
        W: Write,
    {
        let l = line.trim();
        debug!("handle_line: {:?}", l);
        let (command, rest) = match l.split_once(' ') {
            Some((c, r)) if c.starts_with('/') => (c, r.trim()),
            _ => (l, ""),
        };
        match command {
            "/quit" | "/exit" => return Ok(Flow::Quit),
            "/help" => say(out, HELP)?,
            "/reload" => {
                self.reload(out)?;
            }
            "/finalize" => {
                self.finalize(out)?;
            }
            "/suggest" => {
                self.lookup(rest, out)?;
            }
            "/add" => {
                if rest.is_empty() {
                    say(out, "Usage: /add NAME")?;
                } else {
                    write!(out, "Add {:?} as Unregistered? [y/N] ", rest)
                        .context(WritingOutputSnafu {})?;
                    out.flush().context(WritingOutputSnafu {})?;
                    let answer = match lines.next() {
                        Some(a) => a.context(ReadingInputSnafu {})?,
                        None => String::new(),
                    };
                    if matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
                        self.add(rest, out)?;
                    } else {
                        say(out, "Not added.")?;
                    }
                }
            }
            c if c.starts_with('/') => say(out, &format!("Unknown command {}. /help for commands.", c))?,
            _ => {
                let picked = l
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|idx| self.pending.get(idx).cloned());
                match picked {
                    Some(name) => {
                        self.sign_in(&name, out)?;
                    }
                    None => {
                        self.sign_in(l, out)?;
                    }
                }
            }
        }
        Ok(Flow::Continue)
    }

    /// Signs in a typed name. Returns whether the attempt went through
    /// (recorded now or already recorded).
    pub fn sign_in<W: Write>(&mut self, typed: &str, out: &mut W) -> CliResult<bool> {
        self.pending.clear();
        match self.kiosk.sign_in(typed) {
            Ok(outcome) => {
                say(out, &outcome.to_string())?;
                Ok(true)
            }
            Err(KioskError::NoMatch { typed, suggestions }) => {
                info!("sign_in: no match for {:?}", typed);
                say(out, &no_match_text(&suggestions))?;
                list(out, &suggestions)?;
                self.pending = suggestions;
                Ok(false)
            }
            Err(e) => self.report(e, out),
        }
    }

    pub fn add<W: Write>(&mut self, name: &str, out: &mut W) -> CliResult<bool> {
        match self.kiosk.add_student(name) {
            Ok(student) => {
                say(out, &format!("Added as {}: {}", student.status, student.official_name))?;
                Ok(true)
            }
            Err(e) => self.report(e, out),
        }
    }

    pub fn lookup<W: Write>(&self, typed: &str, out: &mut W) -> CliResult<bool> {
        match self.kiosk.lookup(typed) {
            MatchResult::Matched(student) => {
                say(
                    out,
                    &format!("Exact match: {} ({})", student.official_name, student.status),
                )?;
                Ok(true)
            }
            MatchResult::Suggestions(suggestions) => {
                say(out, "Suggestions:")?;
                list(out, &suggestions)?;
                Ok(false)
            }
            MatchResult::Unknown => {
                say(out, "No suggestions.")?;
                Ok(false)
            }
        }
    }

    pub fn reload<W: Write>(&mut self, out: &mut W) -> CliResult<bool> {
        match self.kiosk.reload_registry() {
            Ok(()) => {
                say(out, "Registry refreshed.")?;
                Ok(true)
            }
            Err(e) => self.report(e, out),
        }
    }

    pub fn finalize<W: Write>(&mut self, out: &mut W) -> CliResult<bool> {
        match self.kiosk.finalize_day() {
            Ok(report) => {
                say(out, &report.to_string())?;
                say(
                    out,
                    &format!(
                        "{} present, {} absent, {} log rows written.",
                        report.present, report.absent, report.log_rows_written
                    ),
                )?;
                Ok(true)
            }
            Err(e) => self.report(e, out),
        }
    }

    fn report<W: Write>(&self, e: KioskError, out: &mut W) -> CliResult<bool> {
        if let KioskError::Storage { .. } = e {
            warn!("report: {}", e);
        }
        say(out, &e.to_string())?;
        Ok(false)
    }
}

fn no_match_text(suggestions: &[String]) -> String {
    KioskError::NoMatch {
        typed: String::new(),
        suggestions: suggestions.to_vec(),
    }
    .to_string()
}

fn say<W: Write>(out: &mut W, s: &str) -> CliResult<()> {
    writeln!(out, "{}", s).context(WritingOutputSnafu {})
}

fn list<W: Write>(out: &mut W, names: &[String]) -> CliResult<()> {
    for (idx, n) in names.iter().enumerate() {
        writeln!(out, "  {}. {}", idx + 1, n).context(WritingOutputSnafu {})?;
    }
    Ok(())
}

/// Builds the settings from the config file and the arguments, opens the
/// kiosk, then runs the one-shot action or the interactive session.
pub fn run(args: &Args) -> CliResult<()> {
    let config = match args.config.as_deref() {
        Some(p) => read_config(p)?,
        None => KioskConfig::default(),
    };
    let settings = validate_config(&config.with_args(args))?;
    info!("run: settings: {:?}", settings);

    let kiosk = Kiosk::open(
        &settings.workbook_path,
        settings.rules.clone(),
        SystemClock::new(settings.timezone),
    )
    .context(OpeningWorkbookSnafu {
        path: settings.workbook_path.clone(),
    })?;
    let mut session = Session::new(kiosk);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let done = if let Some(name) = args.sign_in.as_deref() {
        Some(session.sign_in(name, &mut out)?)
    } else if let Some(name) = args.add.as_deref() {
        Some(session.add(name, &mut out)?)
    } else if let Some(name) = args.lookup.as_deref() {
        Some(session.lookup(name, &mut out)?)
    } else if args.finalize {
        Some(session.finalize(&mut out)?)
    } else {
        None
    };
    match done {
        Some(true) => Ok(()),
        Some(false) => whatever!("The requested action did not go through"),
        None => {
            let stdin = io::stdin();
            session.run(stdin.lock(), &mut out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn session(layout: AttendanceLayout) -> (tempfile::TempDir, Session<FixedClock>) {
        let dir = tempfile::tempdir().unwrap();
        let clock = FixedClock::new(
            chrono_tz::America::Edmonton,
            NaiveDate::from_ymd_opt(2026, 9, 13)
                .unwrap()
                .and_hms_opt(9, 45, 0)
                .unwrap(),
        );
        let rules = KioskRules {
            layout,
            ..KioskRules::default()
        };
        let kiosk = Kiosk::open(&dir.path().join("attendance.xlsx"), rules, clock).unwrap();
        (dir, Session::new(kiosk))
    }

    fn run_lines(session: &mut Session<FixedClock>, input: &str) -> String {
        let mut out: Vec<u8> = Vec::new();
        session.run(input.as_bytes(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn add_then_pick_a_suggestion() {
        let (_dir, mut s) = session(AttendanceLayout::DailySheet);
        let out = run_lines(&mut s, "/add John Smith\ny\nJon Smth\n1\n/quit\nnot read\n");
        assert!(out.contains("Added as Unregistered: John Smith"), "{}", out);
        assert!(
            out.contains("Name not recognized. Pick a suggestion or re-type.\n  1. John Smith"),
            "{}",
            out
        );
        assert!(out.contains("Signed in: John Smith (Unregistered)"), "{}", out);
        assert_eq!(s.kiosk().registry().len(), 1);
    }

    #[test]
    fn add_needs_confirmation_and_rejects_duplicates() {
        let (_dir, mut s) = session(AttendanceLayout::Matrix);
        let out = run_lines(&mut s, "/add Ada\nn\n/add Ada\nyes\n/add ADA\ny\n");
        assert!(out.contains("Not added."), "{}", out);
        assert!(out.contains("Added as Unregistered: Ada"), "{}", out);
        assert!(out.contains("That student already exists in Students."), "{}", out);
        assert_eq!(s.kiosk().registry().len(), 1);
    }

    #[test]
    fn errors_do_not_end_the_session() {
        let (_dir, mut s) = session(AttendanceLayout::DailySheet);
        let out = run_lines(&mut s, "\nNobody\n/finalize\n/reload\n/suggest x\n");
        assert!(out.contains("Please enter your name."), "{}", out);
        assert!(out.contains("Name not recognized. Ask an admin to add you."), "{}", out);
        assert!(out.contains("Finalize is only available with the matrix layout."), "{}", out);
        assert!(out.contains("Registry refreshed."), "{}", out);
        assert!(out.contains("No suggestions."), "{}", out);
    }

    #[test]
    fn banner_names_the_layout_and_blank_additions_are_refused() {
        let (_dir, mut s) = session(AttendanceLayout::Matrix);
        let out = run_lines(&mut s, "/quit\n");
        assert!(out.contains("(matrix layout, 0 students)"), "{}", out);

        let mut out: Vec<u8> = Vec::new();
        assert!(!s.add("   ", &mut out).unwrap());
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Name cannot be empty."), "{}", out);
        assert_eq!(s.kiosk().registry().len(), 0);
    }

    #[test]
    fn matrix_sign_in_and_finalize() {
        let (_dir, mut s) = session(AttendanceLayout::Matrix);
        let out = run_lines(
            &mut s,
            "/add Ada\ny\n/add Grace\ny\nada\nAda\n/finalize\n",
        );
        assert!(
            out.contains("Ada: Signed in (Unregistered) at 9:45 AM MDT on 13-Sep."),
            "{}",
            out
        );
        assert!(out.contains("Ada: Already signed in for 13-Sep."), "{}", out);
        assert!(out.contains("Finalized 13-Sep: Absences marked + Log created."), "{}", out);
        assert!(out.contains("1 present, 1 absent, 1 log rows written."), "{}", out);
    }
}
