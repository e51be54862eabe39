//! Sheet names, headers and the conversions between sheet rows and typed
//! records. Nothing outside this module knows in which column a field lives.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::{info, warn};

use crate::config::*;
use crate::store::*;

pub const STUDENTS_SHEET: &str = "Students";
pub const ATTENDANCE_SHEET: &str = "Attendance";
pub const LOG_SHEET: &str = "Attendance Log";

pub const STUDENTS_HEADER: [&str; 2] = ["Name", "OfficialStatus"];
pub const DAILY_HEADER: [&str; 3] = ["Time", "Name", "OfficialStatus"];
pub const ATTENDANCE_HEADER: [&str; 1] = ["FULL NAME"];
pub const LOG_HEADER: [&str; 5] = [
    "Timestamp",
    "Name",
    "OfficialStatus",
    "Attendance Date",
    "Attendance (P/A)",
];

/// Header of the first registry layout, before the status column existed.
const LEGACY_NAME_HEADER: &str = "Registered Student Name";

/// The marker written in the matrix for students absent on a finalized day.
pub const ABSENCE_MARKER: &str = "A";

const DAILY_TIME_FORMAT: &str = "%H:%M:%S";

// ********* Students **********

/// Returns the Students sheet, creating it or upgrading a legacy header.
///
/// The upgrade renames the first header cell to `Name`, adds the
/// `OfficialStatus` column, and marks every existing student without a
/// status as registered.
pub fn students_sheet(store: &mut Store) -> &mut Sheet {
    let sheet = store.get_or_create_sheet(STUDENTS_SHEET, &STUDENTS_HEADER);
    if is_legacy_students_header(sheet) {
        upgrade_students_sheet(sheet);
    }
    sheet
}

fn is_legacy_students_header(sheet: &Sheet) -> bool {
    let a1 = sheet.value(0, 0).as_string();
    let b1 = sheet.value(0, 1);
    a1 == LEGACY_NAME_HEADER || (a1 == STUDENTS_HEADER[0] && b1.is_blank())
}

fn upgrade_students_sheet(sheet: &mut Sheet) {
    info!("upgrade_students_sheet: upgrading legacy header of {:?}", sheet.name());
    for (col, h) in STUDENTS_HEADER.iter().enumerate() {
        sheet.set_cell(0, col, CellValue::text(h), CellStyle::Plain);
    }
    let missing: Vec<usize> = sheet
        .rows()
        .filter(|(_, r)| !cell_blank(r, 0) && cell_blank(r, 1))
        .map(|(idx, _)| idx)
        .collect();
    for row in missing {
        sheet.set_cell(
            row,
            1,
            CellValue::text(OfficialStatus::Registered.label()),
            CellStyle::Plain,
        );
    }
}

/// Reads the students in sheet order. Rows without a name are skipped.
/// Duplicates are kept here; the registry decides what to do with them.
pub fn read_students(sheet: &Sheet) -> Vec<Student> {
    let mut res: Vec<Student> = Vec::new();
    for (idx, row) in sheet.rows() {
        let name = cell_string(row, 0);
        if name.is_empty() {
            continue;
        }
        let status_s = cell_string(row, 1);
        let status = if status_s.is_empty() {
            OfficialStatus::Unregistered
        } else {
            match OfficialStatus::parse(&status_s) {
                Some(s) => s,
                None => {
                    warn!(
                        "read_students: row {}: unknown status {:?} for {:?}, reading it as {}",
                        idx + 1,
                        status_s,
                        name,
                        OfficialStatus::Unregistered
                    );
                    OfficialStatus::Unregistered
                }
            }
        };
        res.push(Student::new(&name, status));
    }
    res
}

pub fn student_row(student: &Student) -> Vec<CellValue> {
    vec![
        CellValue::text(&student.official_name),
        CellValue::text(student.status.label()),
    ]
}

// ********* Daily sheets **********

pub fn daily_sheet_name(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn read_daily_records(sheet: &Sheet) -> Vec<AttendanceRecord> {
    sheet
        .rows()
        .filter(|(_, r)| !cell_blank(r, 1))
        .map(|(_, r)| AttendanceRecord {
            time: cell_string(r, 0),
            official_name: cell_string(r, 1),
            status: OfficialStatus::parse(&cell_string(r, 2))
                .unwrap_or(OfficialStatus::Unregistered),
        })
        .collect()
}

pub fn daily_record_row(record: &AttendanceRecord) -> Vec<CellValue> {
    vec![
        CellValue::text(&record.time),
        CellValue::text(&record.official_name),
        CellValue::text(record.status.label()),
    ]
}

pub fn daily_time(time: NaiveTime) -> String {
    time.format(DAILY_TIME_FORMAT).to_string()
}

// ********* Matrix **********

/// Column label of a date in the matrix, like `13-Sep` or `4-Oct`.
pub fn matrix_date_label(date: NaiveDate) -> String {
    date.format("%-d-%b").to_string()
}

/// The column holding `label`, if the header already has it.
pub fn find_date_column(sheet: &Sheet, label: &str) -> Option<usize> {
    sheet
        .header()
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, c)| c.value.as_string() == label)
        .map(|(col, _)| col)
}

/// The row of a student in the matrix, matched on the fold key of column 0.
pub fn find_student_row(sheet: &Sheet, name: &str) -> Option<usize> {
    let target = fold_key(name);
    sheet
        .rows()
        .find(|(_, r)| !cell_blank(r, 0) && fold_key(&cell_string(r, 0)) == target)
        .map(|(idx, _)| idx)
}

/// What a matrix cell says about a student on one day.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum MatrixMark {
    NotRecorded,
    Absent,
    /// Present; the time is `None` when the cell holds something that is not
    /// a readable time.
    Present(Option<NaiveTime>),
}

pub fn read_matrix_mark(value: &CellValue) -> MatrixMark {
    match value {
        v if v.is_blank() => MatrixMark::NotRecorded,
        CellValue::Text(s) if s.trim().eq_ignore_ascii_case(ABSENCE_MARKER) => MatrixMark::Absent,
        v => MatrixMark::Present(read_time(v)),
    }
}

/// Reads a time of day out of a cell written by us or edited by hand.
pub fn read_time(value: &CellValue) -> Option<NaiveTime> {
    match value {
        CellValue::Time(t) => Some(*t),
        CellValue::DateTime(dt) => Some(dt.time()),
        CellValue::Number(n) if *n < 1.0 => serial_to_time(*n),
        CellValue::Number(n) => serial_to_datetime(*n).map(|dt| dt.time()),
        CellValue::Text(s) => {
            let t = s.trim().to_uppercase();
            ["%I:%M %p", "%I:%M:%S %p", "%H:%M:%S", "%H:%M"]
                .iter()
                .find_map(|f| NaiveTime::parse_from_str(&t, f).ok())
        }
        CellValue::Empty => None,
    }
}

/// Brings cells read back from disk into the shape the recorders write:
/// numbers in date columns become times, and the late fill, which the
/// reader does not return, is derived again from the cutoff.
pub fn normalize_attendance_sheet(sheet: &mut Sheet, late_cutoff: NaiveTime) {
    let width = sheet.max_column();
    let mut fixes: Vec<(usize, usize, Option<CellValue>, CellStyle)> = Vec::new();
    for (row, cells) in sheet.rows() {
        for col in 1..width.min(cells.len()) {
            let value = &cells[col].value;
            let time = match value {
                CellValue::Time(t) => Some(*t),
                CellValue::Number(n) => serial_to_time(*n),
                _ => None,
            };
            if let Some(t) = time {
                let replaced = match value {
                    CellValue::Time(_) => None,
                    _ => Some(CellValue::Time(t)),
                };
                fixes.push((row, col, replaced, late_style(t, late_cutoff)));
            }
        }
    }
    for (row, col, value, style) in fixes {
        if let Some(v) = value {
            sheet.normalize_value(row, col, v);
        }
        sheet.normalize_style(row, col, style);
    }
}

pub fn late_style(time: NaiveTime, late_cutoff: NaiveTime) -> CellStyle {
    if time > late_cutoff {
        CellStyle::Late
    } else {
        CellStyle::Plain
    }
}

// ********* Log **********

pub fn read_log_entries(sheet: &Sheet) -> Vec<LogEntry> {
    let mut res: Vec<LogEntry> = Vec::new();
    for (_, row) in sheet.rows() {
        let name = cell_string(row, 1);
        let date_label = cell_string(row, 3);
        if name.is_empty() || date_label.is_empty() {
            continue;
        }
        let outcome = match Presence::parse(&cell_string(row, 4)) {
            Some(p) => p,
            None => {
                warn!(
                    "read_log_entries: unreadable outcome for {:?} on {:?}",
                    name, date_label
                );
                continue;
            }
        };
        res.push(LogEntry {
            timestamp: read_timestamp(row.get(0).map(|c| &c.value)),
            status: OfficialStatus::parse(&cell_string(row, 2))
                .unwrap_or(OfficialStatus::Unregistered),
            name,
            date_label,
            outcome,
        });
    }
    res
}

/// Every (date label, fold key) pair that already has a log row, with the
/// outcome of its first row. Rows whose outcome cell cannot be read still
/// count: the pair is logged, only its outcome is unknown.
pub fn read_logged_outcomes(sheet: &Sheet) -> HashMap<(String, String), Option<Presence>> {
    let mut res: HashMap<(String, String), Option<Presence>> = HashMap::new();
    for (_, row) in sheet.rows() {
        let name = cell_string(row, 1);
        let date_label = cell_string(row, 3);
        if name.is_empty() || date_label.is_empty() {
            continue;
        }
        res.entry((date_label.trim().to_string(), fold_key(&name)))
            .or_insert_with(|| Presence::parse(&cell_string(row, 4)));
    }
    res
}

fn read_timestamp(value: Option<&CellValue>) -> Option<NaiveDateTime> {
    match value? {
        CellValue::DateTime(dt) => Some(*dt),
        CellValue::Number(n) => serial_to_datetime(*n),
        CellValue::Text(s) => {
            NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S").ok()
        }
        _ => None,
    }
}

/// Same idea as for the matrix: timestamps read back as plain numbers are
/// turned into date-times again so they keep their format on the next save.
pub fn normalize_log_sheet(sheet: &mut Sheet) {
    let fixes: Vec<(usize, NaiveDateTime)> = sheet
        .rows()
        .filter_map(|(idx, r)| match r.get(0).map(|c| &c.value) {
            Some(CellValue::Number(n)) => serial_to_datetime(*n).map(|dt| (idx, dt)),
            _ => None,
        })
        .collect();
    for (row, dt) in fixes {
        sheet.normalize_value(row, 0, CellValue::DateTime(dt));
    }
}

pub fn log_entry_row(entry: &LogEntry) -> Vec<CellValue> {
    vec![
        entry
            .timestamp
            .map(CellValue::DateTime)
            .unwrap_or(CellValue::Empty),
        CellValue::text(&entry.name),
        CellValue::text(entry.status.label()),
        CellValue::text(&entry.date_label),
        CellValue::text(entry.outcome.letter()),
    ]
}

// ********* Helpers **********

fn cell_string(row: &[Cell], col: usize) -> String {
    row.get(col).map(|c| c.value.as_string()).unwrap_or_default()
}

fn cell_blank(row: &[Cell], col: usize) -> bool {
    row.get(col).map(|c| c.value.is_blank()).unwrap_or(true)
}
