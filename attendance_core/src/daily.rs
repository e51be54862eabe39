//! One sheet per day, one row per sign-in.

use chrono::NaiveDateTime;
use log::info;

use crate::config::*;
use crate::schema;
use crate::store::*;

/// Records a sign-in on the sheet of the day of `now`.
///
/// The sheet is scanned for the student first: for every (day, fold key)
/// pair at most one row is ever written. Saves when a row was added.
pub fn sign_in(
    store: &mut Store,
    student: &Student,
    now: NaiveDateTime,
) -> StoreResult<SignInOutcome> {
    let date_label = schema::daily_sheet_name(now.date());
    let sheet = store.get_or_create_sheet(&date_label, &schema::DAILY_HEADER);

    let key = student.key();
    let already = schema::read_daily_records(sheet)
        .iter()
        .any(|r| fold_key(&r.official_name) == key);
    if already {
        info!(
            "daily::sign_in: {:?} already signed in on {}",
            student.official_name, date_label
        );
        if store.is_dirty() {
            store.save()?;
        }
        return Ok(SignInOutcome::AlreadySignedIn {
            student: student.clone(),
            date_label,
        });
    }

    let record = AttendanceRecord {
        time: schema::daily_time(now.time()),
        official_name: student.official_name.clone(),
        status: student.status,
    };
    sheet.append_row(schema::daily_record_row(&record));
    store.save()?;
    info!(
        "daily::sign_in: logged {:?} at {} on {}",
        student.official_name, record.time, date_label
    );
    Ok(SignInOutcome::Logged {
        student: student.clone(),
        date_label,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 6)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn second_sign_in_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");
        let mut store = Store::open(&path).unwrap();
        let ada = Student::new("Ada Lovelace", OfficialStatus::Registered);

        let first = sign_in(&mut store, &ada, at(9, 0)).unwrap();
        assert!(first.is_recorded());
        assert_eq!(first.to_string(), "Signed in: Ada Lovelace (Registered)");

        let lower = Student::new("ada lovelace", OfficialStatus::Registered);
        let second = sign_in(&mut store, &lower, at(9, 5)).unwrap();
        assert!(!second.is_recorded());
        assert_eq!(second.date_label(), "2026-01-06");

        let reopened = Store::open(&path).unwrap();
        let sheet = reopened.sheet("2026-01-06").unwrap();
        let records = schema::read_daily_records(sheet);
        assert_eq!(
            records,
            vec![AttendanceRecord {
                time: "09:00:00".to_string(),
                official_name: "Ada Lovelace".to_string(),
                status: OfficialStatus::Registered,
            }]
        );
    }

    #[test]
    fn each_day_gets_its_own_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(&dir.path().join("book.xlsx")).unwrap();
        let ada = Student::new("Ada", OfficialStatus::Unregistered);
        sign_in(&mut store, &ada, at(9, 0)).unwrap();
        let next_day = at(9, 0) + chrono::Duration::days(1);
        assert!(sign_in(&mut store, &ada, next_day).unwrap().is_recorded());
        assert!(store.has_sheet("2026-01-06"));
        assert!(store.has_sheet("2026-01-07"));
    }
}
