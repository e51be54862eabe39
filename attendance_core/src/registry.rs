use std::collections::HashMap;

use log::{debug, info, warn};
use snafu::prelude::*;

use crate::config::*;
use crate::schema;
use crate::store::*;

/// In-memory snapshot of the Students sheet.
///
/// Invariant: at most one entry per fold key. On load the first row wins;
/// later duplicate rows stay in the sheet but are not part of the registry.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct Registry {
    students: Vec<Student>,
    by_key: HashMap<String, usize>,
}

#[derive(Debug, Snafu)]
pub enum AddStudentError {
    #[snafu(display("Name cannot be empty."))]
    EmptyName {},
    #[snafu(display("That student already exists in Students."))]
    AlreadyExists { existing: Student },
    #[snafu(display("{source}"))]
    Storage { source: StoreError },
}

impl Registry {
    pub fn from_students(students: Vec<Student>) -> Registry {
        let mut reg = Registry::default();
        for s in students {
            let key = s.key();
            if let Some(idx) = reg.by_key.get(&key) {
                warn!(
                    "Registry: duplicate row {:?} dropped, keeping {:?}",
                    s.official_name, reg.students[*idx].official_name
                );
                continue;
            }
            reg.by_key.insert(key, reg.students.len());
            reg.students.push(s);
        }
        reg
    }

    /// Reads the registry from the store, creating or upgrading the Students
    /// sheet if needed. Does not save.
    pub fn load(store: &mut Store) -> Registry {
        let reg = Registry::from_students(schema::read_students(schema::students_sheet(store)));
        debug!("Registry::load: {} students", reg.len());
        reg
    }

    pub fn get(&self, name: &str) -> Option<&Student> {
        self.by_key
            .get(&fold_key(name))
            .map(|idx| &self.students[*idx])
    }

    /// Official names in sheet order.
    pub fn names(&self) -> Vec<&str> {
        self.students
            .iter()
            .map(|s| s.official_name.as_str())
            .collect()
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }
}

/// Appends `name` to the Students sheet as an unregistered student. The
/// caller saves.
///
/// The registry is read again from the store first, so a student added by
/// hand in the meantime is still detected as a duplicate. There is no way to
/// add a registered student through this path.
pub fn add_unregistered(store: &mut Store, name: &str) -> Result<Student, AddStudentError> {
    let trimmed = name.trim();
    ensure!(!trimmed.is_empty(), EmptyNameSnafu {});

    store.reload().context(StorageSnafu {})?;
    let registry = Registry::load(store);
    if let Some(existing) = registry.get(trimmed) {
        return AlreadyExistsSnafu {
            existing: existing.clone(),
        }
        .fail();
    }

    let student = Student::new(trimmed, OfficialStatus::Unregistered);
    schema::students_sheet(store).append_row(schema::student_row(&student));
    info!("add_unregistered: added {:?}", student.official_name);
    Ok(student)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CellValue;

    fn open_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("book.xlsx")).unwrap();
        (dir, store)
    }

    #[test]
    fn first_occurrence_wins() {
        let reg = Registry::from_students(vec![
            Student::new("Jane Doe", OfficialStatus::Registered),
            Student::new("JANE DOE ", OfficialStatus::Unregistered),
            Student::new("John Smith", OfficialStatus::Unregistered),
        ]);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.names(), vec!["Jane Doe", "John Smith"]);
        assert_eq!(
            reg.get("  jane doe ").map(|s| s.status),
            Some(OfficialStatus::Registered)
        );
    }

    #[test]
    fn duplicates_stay_in_the_sheet() {
        let (_dir, mut store) = open_store();
        {
            let sheet = schema::students_sheet(&mut store);
            sheet.append_row(vec![CellValue::text("Ada"), CellValue::text("Registered")]);
            sheet.append_row(vec![CellValue::text("ada"), CellValue::text("Unregistered")]);
        }
        let reg = Registry::load(&mut store);
        assert_eq!(reg.len(), 1);
        assert_eq!(store.sheet(schema::STUDENTS_SHEET).unwrap().rows().count(), 2);
    }

    #[test]
    fn add_is_always_unregistered() {
        let (_dir, mut store) = open_store();
        let added = add_unregistered(&mut store, "  Jane Doe ").unwrap();
        assert_eq!(added, Student::new("Jane Doe", OfficialStatus::Unregistered));
        let reg = Registry::load(&mut store);
        assert_eq!(reg.get("jane doe"), Some(&added));
    }

    #[test]
    fn add_rejects_empty_and_existing_names() {
        let (_dir, mut store) = open_store();
        add_unregistered(&mut store, "Jane Doe").unwrap();
        store.save().unwrap();

        assert!(matches!(
            add_unregistered(&mut store, "   "),
            Err(AddStudentError::EmptyName {})
        ));
        match add_unregistered(&mut store, "jane DOE") {
            Err(AddStudentError::AlreadyExists { existing }) => {
                assert_eq!(existing.official_name, "Jane Doe")
            }
            x => panic!("unexpected {:?}", x),
        }
        assert_eq!(Registry::load(&mut store).len(), 1);
    }
}
