//! Student x date matrix with late flags, plus the append-only log.
//!
//! Every call reads the sheets as they are in the store and writes only
//! what is missing, so both sign-in and finalize can be repeated safely.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::{debug, info, warn};

use crate::config::*;
use crate::registry::Registry;
use crate::schema::{self, MatrixMark};
use crate::store::*;

/// Makes sure the matrix and log sheets exist and brings cells read back
/// from disk into their written shape. Does not save.
pub fn prepare_sheets(store: &mut Store, late_cutoff: NaiveTime) {
    let att = store.get_or_create_sheet(schema::ATTENDANCE_SHEET, &schema::ATTENDANCE_HEADER);
    schema::normalize_attendance_sheet(att, late_cutoff);
    let log = store.get_or_create_sheet(schema::LOG_SHEET, &schema::LOG_HEADER);
    schema::normalize_log_sheet(log);
}

/// Returns the column of `label`, appending it after the last used column.
pub fn ensure_date_column(sheet: &mut Sheet, label: &str) -> usize {
    if let Some(col) = schema::find_date_column(sheet, label) {
        return col;
    }
    let col = sheet.max_column().max(1);
    sheet.set_cell(0, col, CellValue::text(label), CellStyle::Plain);
    debug!("ensure_date_column: {:?} -> column {}", label, col);
    col
}

/// Returns the row of `name`, appending one if the student has none yet.
pub fn ensure_student_row(sheet: &mut Sheet, name: &str) -> usize {
    if let Some(row) = schema::find_student_row(sheet, name) {
        return row;
    }
    sheet.append_row(vec![CellValue::text(name.trim())])
}

/// Marks `student` present at `now`.
///
/// The matrix cell for (student, day) is written at most once: if it already
/// holds anything, nothing is written and `AlreadyMarked` comes back. On a
/// first sign-in the time goes into the cell, with the late fill when it is
/// strictly after `late_cutoff`, and a `P` row goes to the log. Both sheets
/// are persisted by a single save.
pub fn mark_present(
    store: &mut Store,
    student: &Student,
    now: NaiveDateTime,
    late_cutoff: NaiveTime,
    timezone: &str,
) -> StoreResult<SignInOutcome> {
    prepare_sheets(store, late_cutoff);
    let date_label = schema::matrix_date_label(now.date());

    let att = store.get_or_create_sheet(schema::ATTENDANCE_SHEET, &schema::ATTENDANCE_HEADER);
    let col = ensure_date_column(att, &date_label);
    let row = ensure_student_row(att, &student.official_name);

    if !att.value(row, col).is_blank() {
        info!(
            "mark_present: {:?} already marked on {}",
            student.official_name, date_label
        );
        // A freshly created column or row is still worth keeping.
        if store.is_dirty() {
            store.save()?;
        }
        return Ok(SignInOutcome::AlreadyMarked {
            student: student.clone(),
            date_label,
        });
    }

    let time = now.time();
    let style = schema::late_style(time, late_cutoff);
    let late = style == CellStyle::Late;
    att.set_cell(row, col, CellValue::Time(time), style);

    let entry = LogEntry {
        timestamp: Some(now),
        name: student.official_name.clone(),
        status: student.status,
        date_label: date_label.clone(),
        outcome: Presence::Present,
    };
    store
        .get_or_create_sheet(schema::LOG_SHEET, &schema::LOG_HEADER)
        .append_row(schema::log_entry_row(&entry));
    store.save()?;

    info!(
        "mark_present: {:?} present at {} on {}{}",
        student.official_name,
        time,
        date_label,
        if late { " (late)" } else { "" }
    );
    Ok(SignInOutcome::Marked {
        student: student.clone(),
        date_label,
        time,
        late,
        timezone: timezone.to_string(),
    })
}

/// Closes the day of `today` for every student of the registry.
///
/// Students whose cell is blank get the absence marker and an `A` log row
/// with no timestamp. Students marked present get a `P` log row if the log
/// does not have one yet, stamped with the time read from their cell. When
/// the log already has a row for (day, student) nothing more is written,
/// even if it disagrees with the matrix; the disagreement is only reported
/// in the logs. Running it twice on the same day writes nothing new.
pub fn finalize(
    store: &mut Store,
    registry: &Registry,
    today: NaiveDate,
    late_cutoff: NaiveTime,
) -> StoreResult<FinalizeReport> {
    prepare_sheets(store, late_cutoff);
    let date_label = schema::matrix_date_label(today);

    let existing: HashMap<(String, String), Option<Presence>> = store
        .sheet(schema::LOG_SHEET)
        .map(schema::read_logged_outcomes)
        .unwrap_or_default();

    let att = store.get_or_create_sheet(schema::ATTENDANCE_SHEET, &schema::ATTENDANCE_HEADER);
    let col = ensure_date_column(att, &date_label);

    let mut present = 0;
    let mut absent = 0;
    let mut new_entries: Vec<LogEntry> = Vec::new();
    for student in registry.students() {
        let row = ensure_student_row(att, &student.official_name);
        let (outcome, timestamp) = match schema::read_matrix_mark(att.value(row, col)) {
            MatrixMark::Present(time) => {
                present += 1;
                (Presence::Present, time.map(|t| today.and_time(t)))
            }
            MatrixMark::Absent | MatrixMark::NotRecorded => {
                absent += 1;
                att.set_cell(
                    row,
                    col,
                    CellValue::text(schema::ABSENCE_MARKER),
                    CellStyle::Plain,
                );
                (Presence::Absent, None)
            }
        };

        let key = (date_label.clone(), student.key());
        match existing.get(&key) {
            Some(Some(logged)) => {
                if *logged != outcome {
                    warn!(
                        "finalize: log says {} for {:?} on {} but the matrix says {}; keeping the log",
                        logged.letter(),
                        student.official_name,
                        date_label,
                        outcome.letter()
                    );
                }
            }
            Some(None) => {
                warn!(
                    "finalize: log row for {:?} on {} has no readable outcome; keeping it",
                    student.official_name, date_label
                );
            }
            None => {
                new_entries.push(LogEntry {
                    timestamp,
                    name: student.official_name.clone(),
                    status: student.status,
                    date_label: date_label.clone(),
                    outcome,
                });
            }
        }
    }

    let log = store.get_or_create_sheet(schema::LOG_SHEET, &schema::LOG_HEADER);
    for e in new_entries.iter() {
        log.append_row(schema::log_entry_row(e));
    }
    store.save()?;

    let report = FinalizeReport {
        date_label,
        present,
        absent,
        log_rows_written: new_entries.len(),
    };
    info!("finalize: {:?}", report);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 9, 13)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn cutoff() -> NaiveTime {
        NaiveTime::from_hms_opt(10, 15, 0).unwrap()
    }

    fn open_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("book.xlsx")).unwrap();
        (dir, store)
    }

    fn attendance(store: &Store) -> &Sheet {
        store.sheet(schema::ATTENDANCE_SHEET).unwrap()
    }

    #[test]
    fn mark_present_writes_cell_and_log_once() {
        let (_dir, mut store) = open_store();
        let ada = Student::new("Ada", OfficialStatus::Registered);

        let first = mark_present(&mut store, &ada, at(10, 0, 0), cutoff(), "MDT").unwrap();
        assert!(first.is_recorded());
        assert_eq!(first.date_label(), "13-Sep");

        let again = mark_present(&mut store, &ada, at(10, 5, 0), cutoff(), "MDT").unwrap();
        assert_eq!(
            again,
            SignInOutcome::AlreadyMarked {
                student: ada.clone(),
                date_label: "13-Sep".to_string()
            }
        );

        let sheet = attendance(&store);
        assert_eq!(sheet.value(0, 1), &CellValue::text("13-Sep"));
        assert_eq!(sheet.value(1, 1), &CellValue::Time(at(10, 0, 0).time()));
        let log = schema::read_log_entries(store.sheet(schema::LOG_SHEET).unwrap());
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].timestamp, Some(at(10, 0, 0)));
        assert_eq!(log[0].outcome, Presence::Present);
    }

    #[test]
    fn late_flag_only_after_cutoff() {
        let (_dir, mut store) = open_store();
        let on_time = Student::new("On Time", OfficialStatus::Registered);
        let late = Student::new("Late", OfficialStatus::Registered);

        let a = mark_present(&mut store, &on_time, at(10, 15, 0), cutoff(), "MDT").unwrap();
        let b = mark_present(&mut store, &late, at(10, 15, 1), cutoff(), "MDT").unwrap();
        assert!(matches!(a, SignInOutcome::Marked { late: false, .. }));
        assert!(matches!(b, SignInOutcome::Marked { late: true, .. }));

        let sheet = attendance(&store);
        assert_eq!(sheet.cell(1, 1).style, CellStyle::Plain);
        assert_eq!(sheet.cell(2, 1).style, CellStyle::Late);
    }

    #[test]
    fn dates_are_added_left_to_right() {
        let (_dir, mut store) = open_store();
        let ada = Student::new("Ada", OfficialStatus::Registered);
        mark_present(&mut store, &ada, at(9, 0, 0), cutoff(), "MDT").unwrap();
        let next = at(9, 0, 0) + chrono::Duration::days(7);
        mark_present(&mut store, &ada, next, cutoff(), "MDT").unwrap();
        let header: Vec<String> = attendance(&store)
            .header()
            .iter()
            .map(|c| c.value.as_string())
            .collect();
        assert_eq!(header, vec!["FULL NAME", "13-Sep", "20-Sep"]);
    }

    #[test]
    fn finalize_backfills_missing_present_log_rows() {
        let (_dir, mut store) = open_store();
        let registry = Registry::from_students(vec![Student::new(
            "Ada",
            OfficialStatus::Registered,
        )]);
        {
            let att =
                store.get_or_create_sheet(schema::ATTENDANCE_SHEET, &schema::ATTENDANCE_HEADER);
            let col = ensure_date_column(att, "13-Sep");
            let row = ensure_student_row(att, "Ada");
            att.set_cell(row, col, CellValue::text("10:07 AM"), CellStyle::Plain);
        }
        let report = finalize(&mut store, &registry, at(0, 0, 0).date(), cutoff()).unwrap();
        assert_eq!(report.present, 1);
        assert_eq!(report.log_rows_written, 1);
        let log = schema::read_log_entries(store.sheet(schema::LOG_SHEET).unwrap());
        assert_eq!(log[0].timestamp, Some(at(10, 7, 0)));
        assert_eq!(log[0].outcome, Presence::Present);
    }

    #[test]
    fn finalize_counts_a_log_row_with_a_blank_outcome() {
        let (_dir, mut store) = open_store();
        let ada = Student::new("Ada", OfficialStatus::Registered);
        let registry = Registry::from_students(vec![ada.clone()]);
        store
            .get_or_create_sheet(schema::LOG_SHEET, &schema::LOG_HEADER)
            .append_row(vec![
                CellValue::Empty,
                CellValue::text("ada"),
                CellValue::text("Registered"),
                CellValue::text("13-Sep"),
                CellValue::Empty,
            ]);
        let report = finalize(&mut store, &registry, at(0, 0, 0).date(), cutoff()).unwrap();
        assert_eq!(report.log_rows_written, 0);
        let log = store.sheet(schema::LOG_SHEET).unwrap();
        assert_eq!(log.rows().count(), 1);
        assert_eq!(attendance(&store).value(1, 1), &CellValue::text("A"));
    }

    #[test]
    fn fraction_of_a_second_after_cutoff_is_late() {
        let (dir, mut store) = open_store();
        let ada = Student::new("Ada", OfficialStatus::Registered);
        let now = at(0, 0, 0)
            .date()
            .and_hms_milli_opt(10, 15, 0, 400)
            .unwrap();
        let outcome = mark_present(&mut store, &ada, now, cutoff(), "MDT").unwrap();
        assert!(matches!(outcome, SignInOutcome::Marked { late: true, .. }));

        let mut reopened = Store::open(&dir.path().join("book.xlsx")).unwrap();
        prepare_sheets(&mut reopened, cutoff());
        assert_eq!(attendance(&reopened).cell(1, 1).style, CellStyle::Late);
    }

    #[test]
    fn finalize_keeps_an_existing_log_row() {
        let (_dir, mut store) = open_store();
        let ada = Student::new("Ada", OfficialStatus::Registered);
        let registry = Registry::from_students(vec![ada.clone()]);
        store
            .get_or_create_sheet(schema::LOG_SHEET, &schema::LOG_HEADER)
            .append_row(schema::log_entry_row(&LogEntry {
                timestamp: Some(at(9, 0, 0)),
                name: "ADA".to_string(),
                status: ada.status,
                date_label: "13-Sep".to_string(),
                outcome: Presence::Present,
            }));
        let report = finalize(&mut store, &registry, at(0, 0, 0).date(), cutoff()).unwrap();
        assert_eq!(report.absent, 1);
        assert_eq!(report.log_rows_written, 0);
        assert_eq!(attendance(&store).value(1, 1), &CellValue::text("A"));
    }
}
