//! RestoreLastRun (spec §4.6/§6): reverses a completed run from its
//! `LastRunState`, copying each backup back over the (possibly replaced)
//! original, and deleting any output that a dangerous replace produced in
//! place of a file it removed (`BackupRecord::remove_on_restore`).

use std::fs;

use anyhow::{Context, Result};

use crate::model::LastRunState;

#[derive(Debug, Default)]
pub struct RestoreSummary {
    pub restored: usize,
    pub removed: usize,
    pub failures: Vec<(String, String)>,
}

pub fn restore(state: &LastRunState) -> RestoreSummary {
    let mut summary = RestoreSummary::default();

    for record in &state.backup_records {
        let result: Result<()> = (|| {
            if record.remove_on_restore {
                if record.original_path.exists() {
                    fs::remove_file(&record.original_path)
                        .with_context(|| format!("removing {}", record.original_path.display()))?;
                }
                summary.removed += 1;
            }
            if let Some(parent) = record.original_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&record.backup_path, &record.original_path).with_context(|| {
                format!(
                    "restoring {} from {}",
                    record.original_path.display(),
                    record.backup_path.display()
                )
            })?;
            summary.restored += 1;
            Ok(())
        })();

        if let Err(err) = result {
            summary
                .failures
                .push((record.original_path.display().to_string(), err.to_string()));
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BackupRecord;
    use assert_fs::fixture::PathChild;
    use assert_fs::TempDir;

    #[test]
    fn restore_copies_backup_over_original() {
        let temp = TempDir::new().unwrap();
        let backup = temp.child("backup/a.jpg");
        let original = temp.child("src/a.jpg");
        std::fs::create_dir_all(backup.path().parent().unwrap()).unwrap();
        std::fs::create_dir_all(original.path().parent().unwrap()).unwrap();
        std::fs::write(backup.path(), b"original bytes").unwrap();
        std::fs::write(original.path(), b"optimized bytes").unwrap();

        let state = LastRunState {
            run_id: "run-1".to_string(),
            backup_dir: temp.child("backup").path().to_path_buf(),
            backup_records: vec![BackupRecord {
                original_path: original.path().to_path_buf(),
                backup_path: backup.path().to_path_buf(),
                remove_on_restore: false,
            }],
            log_path: temp.child("run.log").path().to_path_buf(),
        };

        let summary = restore(&state);
        assert_eq!(summary.restored, 1);
        assert_eq!(std::fs::read(original.path()).unwrap(), b"original bytes");
    }

    #[test]
    fn dangerous_replace_removal_is_undone_on_restore() {
        let temp = TempDir::new().unwrap();
        let backup = temp.child("backup/a.jpg");
        let original = temp.child("src/a.jpg");
        std::fs::create_dir_all(backup.path().parent().unwrap()).unwrap();
        std::fs::create_dir_all(original.path().parent().unwrap()).unwrap();
        std::fs::write(backup.path(), b"original jpeg bytes").unwrap();
        // The dangerous-replace run deleted the original jpeg in favor of a
        // sibling webp; restoring must undo that deletion, not just copy.
        std::fs::remove_file(original.path()).ok();

        let state = LastRunState {
            run_id: "run-1".to_string(),
            backup_dir: temp.child("backup").path().to_path_buf(),
            backup_records: vec![BackupRecord {
                original_path: original.path().to_path_buf(),
                backup_path: backup.path().to_path_buf(),
                remove_on_restore: true,
            }],
            log_path: temp.child("run.log").path().to_path_buf(),
        };

        let summary = restore(&state);
        assert_eq!(summary.restored, 1);
        assert_eq!(summary.removed, 1);
        assert!(original.path().exists());
        assert_eq!(std::fs::read(original.path()).unwrap(), b"original jpeg bytes");
    }
}
