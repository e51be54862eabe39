/*!

This is the long-form manual for `attendance_core` and `attendance-kiosk`.

## The workbook

All state lives in a single `.xlsx` file, `data/attendance.xlsx` by default.
The file and its directory are created on first start. The workbook is read
again before every sign-in, addition or finalize, so it can be edited by hand
between two operations. It should not be edited while the kiosk is writing:
the last writer wins.

### `Students`

The registry of known students.

| Name | OfficialStatus |
|------|----------------|
| Ada Lovelace | Registered |
| Grace Hopper | Unregistered |

Names are compared ignoring case and surrounding spaces. A blank or
unknown status reads as `Unregistered`. Students added from the kiosk are
always `Unregistered`; registering them is an administrative edit of this
sheet.

Older Students sheets are upgraded in place when their first header cell is
`Registered Student Name`, or `Name` with nothing next to it: the header
becomes `Name` and `OfficialStatus`, and existing students without a status
become `Registered`.

## Layouts

The kiosk records attendance in one of two layouts, chosen by configuration.

### `daily`

One sheet per day, named `YYYY-MM-DD`, with one row per sign-in:

| Time | Name | OfficialStatus |
|------|------|----------------|
| 09:02:41 | Ada Lovelace | Registered |

A student appears at most once per day sheet. There is no notion of absence
in this layout.

### `matrix`

The `Attendance` sheet is a grid of students by dates:

| FULL NAME | 13-Sep | 20-Sep |
|-----------|--------|--------|
| Ada Lovelace | 10:02 AM | A |
| Grace Hopper | 10:21 AM | |

A new date column is appended on the first sign-in of a day. A cell holds
the sign-in time, filled in light red when it is strictly after the late
cutoff (10:15 by default), or `A` once the day is finalized and the student
never signed in. A cell is never overwritten by a sign-in.

The `Attendance Log` sheet has one row per (date, student):

| Timestamp | Name | OfficialStatus | Attendance Date | Attendance (P/A) |
|-----------|------|----------------|-----------------|------------------|
| 2026-09-13 10:02:00 | Ada Lovelace | Registered | 13-Sep | P |
| | Grace Hopper | Unregistered | 20-Sep | A |

Absences have no timestamp.

Date labels carry no year: a workbook is meant to cover one school year.

## Finalizing a day

With the `matrix` layout, finalizing marks every registry student with a
blank cell for today as absent and writes the log rows still missing for
today. It can be run any number of times. If the log already has a row for
a student and day, that row is kept as is, even when the matrix says
otherwise.

## Names and suggestions

When a typed name has no exact match, up to 6 registry names with a
similarity of at least 0.70 are proposed, best first. The similarity is the
normalized Levenshtein distance on lowercase names. Nothing is recorded
until an exact registry name is submitted.

*/
