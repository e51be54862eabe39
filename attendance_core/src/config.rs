// ********* Input data structures ***********

use std::fmt::Display;

use chrono::{NaiveDateTime, NaiveTime};

/// The official enrollment status of a student.
///
/// Students added from the kiosk are always `Unregistered`. Registration
/// happens out-of-band, by editing the Students sheet directly.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum OfficialStatus {
    Registered,
    Unregistered,
}

impl OfficialStatus {
    pub const REGISTERED_LABEL: &'static str = "Registered";
    pub const UNREGISTERED_LABEL: &'static str = "Unregistered";

    pub fn label(&self) -> &'static str {
        match self {
            OfficialStatus::Registered => OfficialStatus::REGISTERED_LABEL,
            OfficialStatus::Unregistered => OfficialStatus::UNREGISTERED_LABEL,
        }
    }

    /// Reads a status cell. Blank or unknown text is treated as unregistered.
    pub fn parse(s: &str) -> Option<OfficialStatus> {
        let t = s.trim();
        if t.eq_ignore_ascii_case(OfficialStatus::REGISTERED_LABEL) {
            Some(OfficialStatus::Registered)
        } else if t.eq_ignore_ascii_case(OfficialStatus::UNREGISTERED_LABEL) {
            Some(OfficialStatus::Unregistered)
        } else {
            None
        }
    }
}

impl Display for OfficialStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Student {
    /// The spelling stored in the registry, trimmed.
    pub official_name: String,
    pub status: OfficialStatus,
}

impl Student {
    pub fn new(name: &str, status: OfficialStatus) -> Student {
        Student {
            official_name: name.trim().to_string(),
            status,
        }
    }

    pub fn key(&self) -> String {
        fold_key(&self.official_name)
    }
}

/// Case-insensitive, whitespace-trimmed form of a name.
///
/// Two names with the same fold key refer to the same student, in the
/// registry as well as in every attendance sheet.
pub fn fold_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Outcome letter of the attendance log.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Presence {
    Present,
    Absent,
}

impl Presence {
    pub fn letter(&self) -> &'static str {
        match self {
            Presence::Present => "P",
            Presence::Absent => "A",
        }
    }

    pub fn parse(s: &str) -> Option<Presence> {
        match s.trim() {
            x if x.eq_ignore_ascii_case("P") => Some(Presence::Present),
            x if x.eq_ignore_ascii_case("A") => Some(Presence::Absent),
            _ => None,
        }
    }
}

/// One row of the append-only attendance log.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct LogEntry {
    /// Blank for absences written by finalize.
    pub timestamp: Option<NaiveDateTime>,
    pub name: String,
    pub status: OfficialStatus,
    pub date_label: String,
    pub outcome: Presence,
}

/// One row of a daily attendance sheet.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct AttendanceRecord {
    pub time: String,
    pub official_name: String,
    pub status: OfficialStatus,
}

// ******** Output data structures *********

/// The result of resolving a typed name against the registry.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum MatchResult {
    /// The typed name is a registry name, up to case and surrounding spaces.
    Matched(Student),
    /// No exact match; these registry names are close enough to propose.
    Suggestions(Vec<String>),
    /// No exact match and nothing close, or empty input.
    Unknown,
}

/// What happened when a student tried to sign in.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum SignInOutcome {
    /// A new row was written to today's sheet.
    Logged { student: Student, date_label: String },
    /// Today's sheet already had a row for this student.
    AlreadySignedIn { student: Student, date_label: String },
    /// The matrix cell was written and a `P` log row appended.
    Marked {
        student: Student,
        date_label: String,
        time: NaiveTime,
        late: bool,
        timezone: String,
    },
    /// The matrix cell already held a value.
    AlreadyMarked { student: Student, date_label: String },
}

impl SignInOutcome {
    pub fn student(&self) -> &Student {
        match self {
            SignInOutcome::Logged { student, .. }
            | SignInOutcome::AlreadySignedIn { student, .. }
            | SignInOutcome::Marked { student, .. }
            | SignInOutcome::AlreadyMarked { student, .. } => student,
        }
    }

    pub fn date_label(&self) -> &str {
        match self {
            SignInOutcome::Logged { date_label, .. }
            | SignInOutcome::AlreadySignedIn { date_label, .. }
            | SignInOutcome::Marked { date_label, .. }
            | SignInOutcome::AlreadyMarked { date_label, .. } => date_label,
        }
    }

    /// False when the duplicate guard kicked in.
    pub fn is_recorded(&self) -> bool {
        matches!(
            self,
            SignInOutcome::Logged { .. } | SignInOutcome::Marked { .. }
        )
    }
}

impl Display for SignInOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignInOutcome::Logged { student, .. } => write!(
                f,
                "Signed in: {} ({})",
                student.official_name, student.status
            ),
            SignInOutcome::AlreadySignedIn { student, .. } => {
                write!(f, "Already signed in today: {}", student.official_name)
            }
            SignInOutcome::Marked {
                student,
                date_label,
                time,
                timezone,
                ..
            } => write!(
                f,
                "{}: Signed in ({}) at {} {} on {}.",
                student.official_name,
                student.status,
                time.format("%-I:%M %p"),
                timezone,
                date_label
            ),
            SignInOutcome::AlreadyMarked {
                student,
                date_label,
            } => write!(
                f,
                "{}: Already signed in for {}.",
                student.official_name, date_label
            ),
        }
    }
}

/// Summary of an end-of-day finalize run.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct FinalizeReport {
    pub date_label: String,
    pub present: usize,
    pub absent: usize,
    pub log_rows_written: usize,
}

impl Display for FinalizeReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Finalized {}: Absences marked + Log created.",
            self.date_label
        )
    }
}

// ********* Configuration **********

/// How attendance is laid out in the workbook.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum AttendanceLayout {
    /// One sheet per day, named `YYYY-MM-DD`, one row per sign-in.
    DailySheet,
    /// A single student x date matrix plus the append-only log.
    Matrix,
}

#[derive(PartialEq, Debug, Clone)]
pub struct KioskRules {
    pub layout: AttendanceLayout,
    /// Sign-ins strictly after this local time are flagged late (matrix only).
    pub late_cutoff: NaiveTime,
    pub suggestion_limit: usize,
    /// Minimum similarity in [0, 1] for a name to be suggested.
    pub suggestion_threshold: f64,
}

impl KioskRules {
    pub const DEFAULT_SUGGESTION_LIMIT: usize = 6;
    pub const DEFAULT_SUGGESTION_THRESHOLD: f64 = 0.70;
    pub const DEFAULT_LATE_HOUR: u32 = 10;
    pub const DEFAULT_LATE_MINUTE: u32 = 15;
}

impl Default for KioskRules {
    fn default() -> Self {
        KioskRules {
            layout: AttendanceLayout::Matrix,
            late_cutoff: NaiveTime::from_hms_opt(
                KioskRules::DEFAULT_LATE_HOUR,
                KioskRules::DEFAULT_LATE_MINUTE,
                0,
            )
            .unwrap_or(NaiveTime::MIN),
            suggestion_limit: KioskRules::DEFAULT_SUGGESTION_LIMIT,
            suggestion_threshold: KioskRules::DEFAULT_SUGGESTION_THRESHOLD,
        }
    }
}
