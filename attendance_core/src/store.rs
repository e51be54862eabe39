//! Tabular store adapter on top of a single xlsx workbook.
//!
//! The whole workbook is read into memory with `calamine` and written back in
//! full with `rust_xlsxwriter` on every [`Store::save`]. A single writer is
//! assumed: if another program edits the file between a reload and a save,
//! the last writer wins. A crash in the middle of a save can leave a broken
//! file behind.

use std::fs;
use std::path::{Path, PathBuf};

use calamine::{open_workbook, DataType, Reader, Xlsx};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use log::{debug, info};
use rust_xlsxwriter::{Color, Format, Workbook};
use snafu::prelude::*;

const MILLIS_PER_DAY: f64 = 86_400_000.0;
const MAX_COLUMN_WIDTH: usize = 45;
const LATE_FILL_RGB: u32 = 0xFFC7CE;
const TIME_FORMAT: &str = "h:mm AM/PM";
const DATETIME_FORMAT: &str = "yyyy-mm-dd h:mm AM/PM";

#[derive(Debug, Snafu)]
pub enum StoreError {
    #[snafu(display("Could not create the directory {}", path.display()))]
    CreatingDirectory {
        source: std::io::Error,
        path: PathBuf,
    },
    #[snafu(display("The workbook {} is unreadable or corrupt", path.display()))]
    Corrupt {
        source: calamine::XlsxError,
        path: PathBuf,
    },
    #[snafu(display("Could not write the workbook {}", path.display()))]
    Writing {
        source: rust_xlsxwriter::XlsxError,
        path: PathBuf,
    },
    #[snafu(display("Cell ({row}, {col}) of sheet {sheet} cannot be written"))]
    InvalidCell { sheet: String, row: usize, col: usize },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The content of one cell.
#[derive(PartialEq, Debug, Clone)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    /// A time of day, displayed as `h:mm AM/PM`.
    Time(NaiveTime),
    DateTime(NaiveDateTime),
}

impl CellValue {
    pub fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    /// True for empty cells and for text made only of whitespace.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// The trimmed text rendering of the value, as a spreadsheet would show it.
    pub fn as_string(&self) -> String {
        match self {
            CellValue::Empty => "".to_string(),
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Time(t) => t.format("%-I:%M %p").to_string(),
            CellValue::DateTime(dt) => dt.format("%Y-%m-%d %-I:%M %p").to_string(),
        }
    }
}

/// Visual attributes the adapter knows how to persist.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum CellStyle {
    Plain,
    /// Light red fill used for late sign-ins.
    Late,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Cell {
    pub value: CellValue,
    pub style: CellStyle,
}

static EMPTY_CELL: Cell = Cell {
    value: CellValue::Empty,
    style: CellStyle::Plain,
};

impl Cell {
    pub fn new(value: CellValue) -> Cell {
        Cell {
            value,
            style: CellStyle::Plain,
        }
    }
}

/// A named 2-D grid. Row 0 is the header row.
#[derive(PartialEq, Debug, Clone)]
pub struct Sheet {
    name: String,
    grid: Vec<Vec<Cell>>,
    modified: bool,
}

impl Sheet {
    fn new(name: &str) -> Sheet {
        Sheet {
            name: name.to_string(),
            grid: Vec::new(),
            modified: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of rows, header included.
    pub fn max_row(&self) -> usize {
        self.grid.len()
    }

    /// Width of the widest row.
    pub fn max_column(&self) -> usize {
        self.grid.iter().map(|r| r.len()).max().unwrap_or(0)
    }

    pub fn header(&self) -> &[Cell] {
        self.grid.first().map(|r| r.as_slice()).unwrap_or(&[])
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.grid
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn value(&self, row: usize, col: usize) -> &CellValue {
        &self.cell(row, col).value
    }

    /// Data rows with their row index, skipping the header.
    ///
    /// The iterator borrows the sheet, so calling this again restarts from
    /// the first data row.
    pub fn rows(&self) -> impl Iterator<Item = (usize, &[Cell])> + '_ {
        self.grid
            .iter()
            .enumerate()
            .skip(1)
            .map(|(idx, r)| (idx, r.as_slice()))
    }

    /// Appends a row of plain cells and returns its index.
    pub fn append_row(&mut self, values: Vec<CellValue>) -> usize {
        self.grid.push(values.into_iter().map(Cell::new).collect());
        self.modified = true;
        self.grid.len() - 1
    }

    pub fn set_cell(&mut self, row: usize, col: usize, value: CellValue, style: CellStyle) {
        while self.grid.len() <= row {
            self.grid.push(Vec::new());
        }
        let r = &mut self.grid[row];
        while r.len() <= col {
            r.push(EMPTY_CELL.clone());
        }
        r[col] = Cell { value, style };
        self.modified = true;
    }

    /// Replaces a value in place, keeping the style. Used when normalizing
    /// cells read back from disk, so it does not mark the sheet as modified.
    pub(crate) fn normalize_value(&mut self, row: usize, col: usize, value: CellValue) {
        if let Some(c) = self.grid.get_mut(row).and_then(|r| r.get_mut(col)) {
            c.value = value;
        }
    }

    pub(crate) fn normalize_style(&mut self, row: usize, col: usize, style: CellStyle) {
        if let Some(c) = self.grid.get_mut(row).and_then(|r| r.get_mut(col)) {
            c.style = style;
        }
    }

    fn column_widths(&self) -> Vec<usize> {
        let mut widths = vec![0; self.max_column()];
        for row in self.grid.iter() {
            for (col, c) in row.iter().enumerate() {
                let len = c.value.as_string().chars().count();
                if len > widths[col] {
                    widths[col] = len;
                }
            }
        }
        widths
            .into_iter()
            .map(|w| (w + 2).min(MAX_COLUMN_WIDTH))
            .collect()
    }
}

/// Handle on the workbook file and its in-memory sheets.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    sheets: Vec<Sheet>,
    /// Sheet list changed since the last load or save.
    structure_modified: bool,
}

impl Store {
    /// Opens the workbook at `path`, creating its directory and an empty
    /// workbook when the file does not exist yet.
    pub fn open(path: &Path) -> StoreResult<Store> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).context(CreatingDirectorySnafu {
                    path: parent.to_path_buf(),
                })?;
            }
        }
        let mut store = Store {
            path: path.to_path_buf(),
            sheets: Vec::new(),
            structure_modified: false,
        };
        if path.exists() {
            store.reload()?;
        } else {
            info!("Store::open: creating empty workbook {:?}", path);
            store.save()?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Discards in-memory state and reads every sheet again from disk.
    pub fn reload(&mut self) -> StoreResult<()> {
        if !self.path.exists() {
            debug!("Store::reload: {:?} is missing, starting empty", self.path);
            self.sheets = Vec::new();
            self.structure_modified = true;
            return Ok(());
        }
        let mut workbook: Xlsx<_> = open_workbook(&self.path).context(CorruptSnafu {
            path: self.path.clone(),
        })?;
        let names: Vec<String> = workbook.sheet_names().to_owned();
        let mut sheets: Vec<Sheet> = Vec::new();
        for name in names {
            let grid = match workbook.worksheet_range(&name) {
                Some(range) => {
                    let range = range.context(CorruptSnafu {
                        path: self.path.clone(),
                    })?;
                    read_grid(&range)
                }
                None => Vec::new(),
            };
            debug!("Store::reload: sheet {:?}: {} rows", name, grid.len());
            sheets.push(Sheet {
                name,
                grid,
                modified: false,
            });
        }
        self.sheets = sheets;
        self.structure_modified = false;
        Ok(())
    }

    pub fn has_sheet(&self, name: &str) -> bool {
        self.sheets.iter().any(|s| s.name == name)
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// Returns the named sheet, creating it with `header` if it is missing.
    /// An existing sheet with no header row gets one.
    pub fn get_or_create_sheet(&mut self, name: &str, header: &[&str]) -> &mut Sheet {
        let idx = match self.sheets.iter().position(|s| s.name == name) {
            Some(idx) => idx,
            None => {
                info!("Store: creating sheet {:?}", name);
                self.sheets.push(Sheet::new(name));
                self.structure_modified = true;
                self.sheets.len() - 1
            }
        };
        let sheet = &mut self.sheets[idx];
        if sheet.header().iter().all(|c| c.value.is_blank()) {
            for (col, h) in header.iter().enumerate() {
                sheet.set_cell(0, col, CellValue::text(h), CellStyle::Plain);
            }
        }
        sheet
    }

    /// True when some sheet was created or changed since the last load or save.
    pub fn is_dirty(&self) -> bool {
        self.structure_modified || self.sheets.iter().any(|s| s.modified)
    }

    /// Writes every sheet back to the workbook file.
    pub fn save(&mut self) -> StoreResult<()> {
        let mut workbook = Workbook::new();
        let time_fmt = Format::new().set_num_format(TIME_FORMAT);
        let late_time_fmt = Format::new()
            .set_num_format(TIME_FORMAT)
            .set_background_color(Color::RGB(LATE_FILL_RGB));
        let datetime_fmt = Format::new().set_num_format(DATETIME_FORMAT);
        let late_fmt = Format::new().set_background_color(Color::RGB(LATE_FILL_RGB));

        for sheet in self.sheets.iter() {
            let path = self.path.clone();
            let worksheet = workbook.add_worksheet();
            worksheet
                .set_name(sheet.name.as_str())
                .context(WritingSnafu { path: path.clone() })?;
            for (row_idx, row) in sheet.grid.iter().enumerate() {
                for (col_idx, c) in row.iter().enumerate() {
                    let (r, col) = cell_position(sheet, row_idx, col_idx)?;
                    let late = c.style == CellStyle::Late;
                    let written = match &c.value {
                        CellValue::Empty => continue,
                        CellValue::Text(s) if late => {
                            worksheet.write_string_with_format(r, col, s.as_str(), &late_fmt)
                        }
                        CellValue::Text(s) => worksheet.write_string(r, col, s.as_str()),
                        CellValue::Number(n) if late => {
                            worksheet.write_number_with_format(r, col, *n, &late_fmt)
                        }
                        CellValue::Number(n) => worksheet.write_number(r, col, *n),
                        CellValue::Time(t) => {
                            let fmt = if late { &late_time_fmt } else { &time_fmt };
                            worksheet.write_number_with_format(r, col, time_to_serial(t), fmt)
                        }
                        CellValue::DateTime(dt) => worksheet.write_number_with_format(
                            r,
                            col,
                            datetime_to_serial(dt),
                            &datetime_fmt,
                        ),
                    };
                    written.context(WritingSnafu { path: path.clone() })?;
                }
            }
            for (col_idx, width) in sheet.column_widths().into_iter().enumerate() {
                let (_, col) = cell_position(sheet, 0, col_idx)?;
                worksheet
                    .set_column_width(col, width as f64)
                    .context(WritingSnafu { path: path.clone() })?;
            }
        }
        workbook.save(&self.path).context(WritingSnafu {
            path: self.path.clone(),
        })?;
        debug!("Store::save: wrote {:?}", self.path);

        for sheet in self.sheets.iter_mut() {
            sheet.modified = false;
        }
        self.structure_modified = false;
        Ok(())
    }
}

fn cell_position(sheet: &Sheet, row: usize, col: usize) -> StoreResult<(u32, u16)> {
    let r = u32::try_from(row).ok();
    let c = u16::try_from(col).ok();
    match (r, c) {
        (Some(r), Some(c)) => Ok((r, c)),
        _ => InvalidCellSnafu {
            sheet: sheet.name.clone(),
            row,
            col,
        }
        .fail(),
    }
}

// The range returned by calamine starts at the first non-empty cell, so the
// grid is re-anchored at A1.
fn read_grid(range: &calamine::Range<DataType>) -> Vec<Vec<Cell>> {
    let (row0, col0) = match range.start() {
        Some((r, c)) => (r as usize, c as usize),
        None => return Vec::new(),
    };
    let mut grid: Vec<Vec<Cell>> = vec![Vec::new(); row0];
    for row in range.rows() {
        let mut cells: Vec<Cell> = vec![EMPTY_CELL.clone(); col0];
        cells.extend(row.iter().map(|dt| Cell::new(read_value(dt))));
        while matches!(cells.last(), Some(c) if c.value == CellValue::Empty) {
            cells.pop();
        }
        grid.push(cells);
    }
    grid
}

// Times and timestamps written by `save` come back as plain numbers: calamine
// only reports `DateTime` for some built-in formats. The sheet schema turns
// them back into times where a column is known to hold them.
fn read_value(cell: &DataType) -> CellValue {
    match cell {
        DataType::String(s) => CellValue::Text(s.clone()),
        DataType::Float(f) => CellValue::Number(*f),
        DataType::Int(i) => CellValue::Number(*i as f64),
        DataType::Bool(b) => CellValue::Text(b.to_string()),
        DataType::DateTime(f) if *f < 1.0 => serial_to_time(*f)
            .map(CellValue::Time)
            .unwrap_or(CellValue::Number(*f)),
        DataType::DateTime(f) => serial_to_datetime(*f)
            .map(CellValue::DateTime)
            .unwrap_or(CellValue::Number(*f)),
        DataType::Empty => CellValue::Empty,
        _ => CellValue::Text(format!("{:?}", cell)),
    }
}

fn excel_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

// Serials keep millisecond precision, the precision of `Clock::local_now`.
pub(crate) fn time_to_serial(t: &NaiveTime) -> f64 {
    let millis = t.num_seconds_from_midnight() as f64 * 1000.0 + (t.nanosecond() / 1_000_000) as f64;
    millis / MILLIS_PER_DAY
}

pub(crate) fn datetime_to_serial(dt: &NaiveDateTime) -> f64 {
    let millis = (*dt - excel_epoch()).num_milliseconds();
    millis as f64 / MILLIS_PER_DAY
}

/// Converts the fractional part of a spreadsheet serial into a time of day.
pub(crate) fn serial_to_time(serial: f64) -> Option<NaiveTime> {
    if !(0.0..1.0).contains(&serial) {
        return None;
    }
    let millis = ((serial * MILLIS_PER_DAY).round() as u32).min(86_399_999);
    NaiveTime::from_num_seconds_from_midnight_opt(millis / 1000, (millis % 1000) * 1_000_000)
}

pub(crate) fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let millis = (serial * MILLIS_PER_DAY).round() as i64;
    excel_epoch().checked_add_signed(Duration::milliseconds(millis))
}
