mod config;
pub mod clock;
pub mod daily;
pub mod manual;
pub mod matcher;
pub mod matrix;
pub mod registry;
pub mod schema;
pub mod store;

use std::path::Path;

use log::{debug, info};
use snafu::prelude::*;

pub use crate::clock::{Clock, FixedClock, SystemClock};
pub use crate::config::*;
pub use crate::registry::{AddStudentError, Registry};
pub use crate::store::{Store, StoreError};

/// Everything that can go wrong in an operator-facing operation.
///
/// None of these should stop the kiosk: the display message is meant to be
/// shown to the operator as is.
#[derive(Debug, Snafu)]
pub enum KioskError {
    #[snafu(display("Please enter your name."))]
    EmptyInput {},
    #[snafu(display("Name cannot be empty."))]
    EmptyName {},
    #[snafu(display("{}", no_match_message(suggestions)))]
    NoMatch {
        typed: String,
        suggestions: Vec<String>,
    },
    #[snafu(display("That student already exists in Students."))]
    DuplicateRegistryEntry { name: String },
    #[snafu(display("Finalize is only available with the matrix layout."))]
    FinalizeUnsupported {},
    #[snafu(display("Workbook error: {source}"))]
    Storage { source: StoreError },
}

fn no_match_message(suggestions: &[String]) -> &'static str {
    if suggestions.is_empty() {
        "Name not recognized. Ask an admin to add you."
    } else {
        "Name not recognized. Pick a suggestion or re-type."
    }
}

pub type KioskResult<T> = Result<T, KioskError>;

/// The operations the presentation layer calls.
///
/// The registry held here is a snapshot for lookups while typing. Every
/// mutating operation reads the workbook again from disk before writing, so
/// edits made by hand between two operations are picked up. There is no
/// locking: one kiosk writes to a workbook at a time.
pub struct Kiosk<C: Clock> {
    store: Store,
    registry: Registry,
    rules: KioskRules,
    clock: C,
}

impl<C: Clock> Kiosk<C> {
    /// Opens (or creates) the workbook and loads the registry.
    pub fn open(path: &Path, rules: KioskRules, clock: C) -> KioskResult<Kiosk<C>> {
        info!("Kiosk::open: {:?} with rules {:?}", path, rules);
        let store = Store::open(path).context(StorageSnafu {})?;
        let mut kiosk = Kiosk {
            store,
            registry: Registry::default(),
            rules,
            clock,
        };
        kiosk.reload_registry()?;
        Ok(kiosk)
    }

    pub fn rules(&self) -> &KioskRules {
        &self.rules
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn workbook_path(&self) -> &Path {
        self.store.path()
    }

    /// Re-reads the workbook, creating or upgrading the sheets the layout
    /// needs, and refreshes the registry snapshot.
    pub fn reload_registry(&mut self) -> KioskResult<()> {
        self.store.reload().context(StorageSnafu {})?;
        self.registry = Registry::load(&mut self.store);
        if self.rules.layout == AttendanceLayout::Matrix {
            matrix::prepare_sheets(&mut self.store, self.rules.late_cutoff);
        }
        if self.store.is_dirty() {
            debug!("Kiosk::reload_registry: saving created or upgraded sheets");
            self.store.save().context(StorageSnafu {})?;
        }
        Ok(())
    }

    /// Resolves a typed name against the current registry snapshot.
    pub fn lookup(&self, typed: &str) -> MatchResult {
        matcher::resolve(typed, &self.registry, &self.rules)
    }

    /// Records attendance for a student already resolved from the registry.
    pub fn record_sign_in(&mut self, student: &Student) -> KioskResult<SignInOutcome> {
        self.store.reload().context(StorageSnafu {})?;
        let now = self.clock.local_now();
        let outcome = match self.rules.layout {
            AttendanceLayout::DailySheet => daily::sign_in(&mut self.store, student, now),
            AttendanceLayout::Matrix => matrix::mark_present(
                &mut self.store,
                student,
                now,
                self.rules.late_cutoff,
                &self.clock.zone_abbreviation(),
            ),
        }
        .context(StorageSnafu {})?;
        Ok(outcome)
    }

    /// The whole submit flow: reload, match exactly, then record.
    ///
    /// A name that is not in the registry is never recorded; the error
    /// carries the suggestions to show instead.
    pub fn sign_in(&mut self, typed: &str) -> KioskResult<SignInOutcome> {
        let t = typed.trim();
        ensure!(!t.is_empty(), EmptyInputSnafu {});
        self.reload_registry()?;
        match self.lookup(t) {
            MatchResult::Matched(student) => self.record_sign_in(&student),
            MatchResult::Suggestions(suggestions) => NoMatchSnafu {
                typed: t.to_string(),
                suggestions,
            }
            .fail(),
            MatchResult::Unknown => NoMatchSnafu {
                typed: t.to_string(),
                suggestions: Vec::new(),
            }
            .fail(),
        }
    }

    /// Adds a student to the registry, always as unregistered. With the
    /// matrix layout the student also gets a row in the matrix right away.
    pub fn add_student(&mut self, name: &str) -> KioskResult<Student> {
        let student = match registry::add_unregistered(&mut self.store, name) {
            Ok(s) => s,
            Err(AddStudentError::EmptyName {}) => return EmptyNameSnafu {}.fail(),
            Err(AddStudentError::AlreadyExists { existing }) => {
                return DuplicateRegistryEntrySnafu {
                    name: existing.official_name,
                }
                .fail()
            }
            Err(AddStudentError::Storage { source }) => return Err(KioskError::Storage { source }),
        };
        if self.rules.layout == AttendanceLayout::Matrix {
            matrix::prepare_sheets(&mut self.store, self.rules.late_cutoff);
            let att = self
                .store
                .get_or_create_sheet(schema::ATTENDANCE_SHEET, &schema::ATTENDANCE_HEADER);
            matrix::ensure_student_row(att, &student.official_name);
        }
        self.store.save().context(StorageSnafu {})?;
        self.registry = Registry::load(&mut self.store);
        Ok(student)
    }

    /// Marks everybody not signed in today as absent and completes the log.
    pub fn finalize_day(&mut self) -> KioskResult<FinalizeReport> {
        ensure!(
            self.rules.layout == AttendanceLayout::Matrix,
            FinalizeUnsupportedSnafu {}
        );
        self.reload_registry()?;
        let today = self.clock.local_now().date();
        matrix::finalize(
            &mut self.store,
            &self.registry,
            today,
            self.rules.late_cutoff,
        )
        .context(StorageSnafu {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn kiosk(layout: AttendanceLayout) -> (tempfile::TempDir, Kiosk<FixedClock>) {
        let dir = tempfile::tempdir().unwrap();
        let clock = FixedClock::new(
            chrono_tz::America::Edmonton,
            NaiveDate::from_ymd_opt(2026, 9, 13)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
        );
        let rules = KioskRules {
            layout,
            ..KioskRules::default()
        };
        let k = Kiosk::open(&dir.path().join("attendance.xlsx"), rules, clock).unwrap();
        (dir, k)
    }

    #[test]
    fn open_creates_the_layout_sheets() {
        let (_dir, k) = kiosk(AttendanceLayout::Matrix);
        let store = Store::open(k.workbook_path()).unwrap();
        assert!(store.has_sheet(schema::STUDENTS_SHEET));
        assert!(store.has_sheet(schema::ATTENDANCE_SHEET));
        assert!(store.has_sheet(schema::LOG_SHEET));
    }

    #[test]
    fn unknown_names_are_not_recorded() {
        let (_dir, mut k) = kiosk(AttendanceLayout::DailySheet);
        k.add_student("John Smith").unwrap();
        match k.sign_in("Jon Smth") {
            Err(KioskError::NoMatch { suggestions, .. }) => {
                assert_eq!(suggestions, vec!["John Smith".to_string()])
            }
            x => panic!("unexpected {:?}", x),
        }
        let err = k.sign_in("Nobody At All").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Name not recognized. Ask an admin to add you."
        );
        assert!(matches!(k.sign_in("  "), Err(KioskError::EmptyInput {})));
        let store = Store::open(k.workbook_path()).unwrap();
        assert!(!store.has_sheet("2026-09-13"));
    }

    #[test]
    fn add_student_rejects_case_insensitive_duplicates() {
        let (_dir, mut k) = kiosk(AttendanceLayout::Matrix);
        let added = k.add_student("Jane Doe").unwrap();
        assert_eq!(added.status, OfficialStatus::Unregistered);
        assert!(matches!(
            k.add_student("jane doe"),
            Err(KioskError::DuplicateRegistryEntry { .. })
        ));
        assert_eq!(k.registry().len(), 1);

        let err = k.add_student("   ").unwrap_err();
        assert!(matches!(err, KioskError::EmptyName {}));
        assert_eq!(err.to_string(), "Name cannot be empty.");
        assert_eq!(k.registry().len(), 1);

        let store = Store::open(k.workbook_path()).unwrap();
        let att = store.sheet(schema::ATTENDANCE_SHEET).unwrap();
        assert_eq!(schema::find_student_row(att, "JANE DOE"), Some(1));
    }

    #[test]
    fn finalize_needs_the_matrix_layout() {
        let (_dir, mut k) = kiosk(AttendanceLayout::DailySheet);
        assert!(matches!(
            k.finalize_day(),
            Err(KioskError::FinalizeUnsupported {})
        ));
    }
}
