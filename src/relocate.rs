//! Relocation protocol: move a confirmed PDF to its templated destination
//! and record a hyperlink in the matched spreadsheet row, such that a crash
//! at any step leaves either the original file or the placed copy intact,
//! never neither.
//!
//! The file is staged in a scratch directory (rotation is baked in there),
//! placed at the destination, linked in the spreadsheet, and only then is
//! the source removed. Failures after placement delete the partial
//! destination so a retry starts clean.

use chrono::{Local, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::FilerError;
use crate::excel::{self, CellSnapshot};
use crate::pdf::{PdfOps, RotationState};
use crate::template::{self, RESERVED_DATE_FIELD};
use crate::types::{CellValue, Record, Task, TaskStatus};

const RETRY_ATTEMPTS: u32 = 3;

/// Characters never allowed in a rendered path component.
const ILLEGAL_PATH_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Executes relocations and reverts against one spreadsheet.
pub struct Relocator<P: PdfOps> {
    pub output_template: String,
    pub processed_folder: PathBuf,
    pub spreadsheet_path: PathBuf,
    pub sheet_name: String,
    pub link_column: String,
    /// First backoff delay; doubles on each retry of a retryable error.
    pub retry_base_delay: Duration,
    pdf_ops: P,
}

impl<P: PdfOps> Relocator<P> {
    pub fn new(config: &Config, pdf_ops: P) -> Self {
        Relocator {
            output_template: config.output_template.clone(),
            processed_folder: PathBuf::from(&config.processed_folder),
            spreadsheet_path: PathBuf::from(&config.spreadsheet_path),
            sheet_name: config.sheet_name.clone(),
            link_column: config.link_column.clone(),
            retry_base_delay: Duration::from_millis(500),
            pdf_ops,
        }
    }

    /// Run the full relocation for `task` against the matched `record`.
    ///
    /// On success the task is Completed with its new location and captured
    /// hyperlink recorded, and the document's pending rotation is cleared;
    /// on failure it is Failed with the error message, the original file is
    /// untouched, no partial destination remains and the rotation stays
    /// pending.
    pub fn relocate(
        &self,
        task: &mut Task,
        record: &Record,
        row_idx: usize,
        rotation: &mut RotationState,
    ) -> Result<(), FilerError> {
        if task.status == TaskStatus::Pending {
            task.status = TaskStatus::Processing;
        }
        task.row_idx = Some(row_idx);
        let source_path = PathBuf::from(&task.pdf_path);
        let pending_rotation = rotation.pending(&source_path);
        match self.run(task, record, row_idx, pending_rotation) {
            Ok(()) => {
                rotation.clear(&source_path);
                task.status = TaskStatus::Completed;
                task.error_msg.clear();
                task.end_time = Some(Utc::now());
                Ok(())
            }
            Err(e) => {
                task.status = TaskStatus::Failed;
                task.error_msg = e.to_string();
                task.end_time = Some(Utc::now());
                Err(e)
            }
        }
    }

    fn run(
        &self,
        task: &mut Task,
        record: &Record,
        row_idx: usize,
        pending_rotation: u16,
    ) -> Result<(), FilerError> {
        let source = PathBuf::from(&task.pdf_path);
        if !source.exists() {
            return Err(FilerError::SourceMissing(task.pdf_path.clone()));
        }

        // Replacing an existing destination is allowed; the operator
        // confirmed the move before this protocol started.
        let dest = self.destination_for(task, record)?;
        let dest_preexisted = dest.exists();
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Stage in scratch space so rotation never touches the original.
        let scratch = tempfile::tempdir().map_err(FilerError::from)?;
        let staged = scratch.path().join(
            source
                .file_name()
                .ok_or_else(|| FilerError::Relocation(format!("not a file: {}", source.display())))?,
        );
        std::fs::copy(&source, &staged)?;
        if pending_rotation != 0 {
            self.pdf_ops.rotate(&staged, pending_rotation)?;
        }

        place_file(&staged, &dest)?;
        info!(source = %source.display(), dest = %dest.display(), "PDF placed");

        // Paired spreadsheet update; on failure undo the placement so the
        // original remains the single copy.
        let target = excel::relative_link_target(&dest, &self.spreadsheet_path);
        let snapshot = self.with_retry(|| {
            excel::write_hyperlink(
                &self.spreadsheet_path,
                &self.sheet_name,
                row_idx,
                &self.link_column,
                &target,
            )
        });
        let snapshot = match snapshot {
            Ok(s) => s,
            Err(e) => {
                if !dest_preexisted {
                    let _ = std::fs::remove_file(&dest);
                }
                return Err(e);
            }
        };
        task.original_hyperlink = snapshot.hyperlink;

        // Source removal is last; a locked source gets retried, and a
        // leftover source with the copy placed is the benign failure mode.
        self.with_retry(|| std::fs::remove_file(&source).map_err(FilerError::from))?;

        task.processed_pdf_location = Some(dest.to_string_lossy().into_owned());
        task.pdf_path = dest.to_string_lossy().into_owned();
        info!(task = %task.task_id, "relocation complete");
        Ok(())
    }

    /// Render the destination path for a task from its matched row.
    pub fn destination_for(&self, task: &Task, record: &Record) -> Result<PathBuf, FilerError> {
        let mut data = record.clone();
        for (i, value) in task.selected_values.iter().enumerate() {
            data.insert(
                format!("filter{}", i + 1),
                CellValue::Text(sanitize_component(value)),
            );
        }
        data.insert(
            "processed_folder",
            CellValue::Text(self.processed_folder.to_string_lossy().into_owned()),
        );
        if template::uses_date_operations(&self.output_template)
            && data.get(RESERVED_DATE_FIELD).is_none()
        {
            data.insert(
                RESERVED_DATE_FIELD,
                CellValue::Date(Local::now().naive_local()),
            );
        }
        let rendered = template::render(&self.output_template, &data)?;
        let mut dest = PathBuf::from(rendered);
        if dest.is_relative() {
            dest = self.processed_folder.join(dest);
        }
        if dest.extension().is_none() {
            dest.set_extension("pdf");
        }
        Ok(dest)
    }

    /// Undo a completed relocation: restore the spreadsheet cell, move the
    /// PDF back to where it came from, mark the task Reverted.
    ///
    /// Only Completed tasks can be reverted. If any step fails the task
    /// stays Completed and the error surfaces.
    pub fn revert(&self, task: &mut Task) -> Result<(), FilerError> {
        if task.status != TaskStatus::Completed {
            return Err(FilerError::Relocation(format!(
                "only completed tasks can be reverted (task is {})",
                task.status
            )));
        }
        let row_idx = task.row_idx.ok_or_else(|| {
            FilerError::Relocation("task has no matched row to revert".to_string())
        })?;

        let snapshot = CellSnapshot {
            display: String::new(),
            hyperlink: task.original_hyperlink.clone(),
        };
        self.with_retry(|| {
            excel::restore_cell(
                &self.spreadsheet_path,
                &self.sheet_name,
                row_idx,
                &self.link_column,
                &snapshot,
            )
        })?;

        // Move the file back when that is still possible; a missing copy or
        // an occupied original slot leaves the cell restore standing.
        if let Some(processed) = task.processed_pdf_location.clone() {
            let processed = PathBuf::from(processed);
            let original = PathBuf::from(&task.original_pdf_location);
            if processed.exists() && !original.exists() {
                if let Some(parent) = original.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                place_file(&processed, &original)?;
                std::fs::remove_file(&processed).or_else(ignore_missing)?;
                task.pdf_path = task.original_pdf_location.clone();
            } else {
                warn!(
                    task = %task.task_id,
                    "processed copy not recoverable, reverting spreadsheet only"
                );
            }
        }

        task.status = TaskStatus::Reverted;
        task.end_time = Some(Utc::now());
        info!(task = %task.task_id, "relocation reverted");
        Ok(())
    }

    /// Retry retryable errors up to RETRY_ATTEMPTS with doubling backoff.
    fn with_retry<T>(
        &self,
        mut op: impl FnMut() -> Result<T, FilerError>,
    ) -> Result<T, FilerError> {
        let mut delay = self.retry_base_delay;
        let mut attempt = 1;
        loop {
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < RETRY_ATTEMPTS => {
                    warn!(error = %e, attempt, "retryable failure, backing off");
                    std::thread::sleep(delay);
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Move a staged file into place and verify the copy before trusting it.
/// Rename when possible; otherwise copy and compare sizes.
///
/// A file already at the destination is set aside first and restored if
/// placement fails, so only a partial copy this call created is ever
/// deleted.
fn place_file(from: &Path, to: &Path) -> Result<(), FilerError> {
    let displaced = if to.exists() {
        let aside = displaced_path(to);
        std::fs::rename(to, &aside)?;
        Some(aside)
    } else {
        None
    };
    let placed = if std::fs::rename(from, to).is_ok() {
        Ok(())
    } else {
        copy_verified(from, to)
    };
    match placed {
        Ok(()) => {
            if let Some(aside) = displaced {
                let _ = std::fs::remove_file(&aside);
            }
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::remove_file(to);
            if let Some(aside) = displaced {
                let _ = std::fs::rename(&aside, to);
            }
            Err(e)
        }
    }
}

fn displaced_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".prev");
    PathBuf::from(name)
}

fn copy_verified(from: &Path, to: &Path) -> Result<(), FilerError> {
    std::fs::copy(from, to)?;
    let src_len = std::fs::metadata(from)?.len();
    let dst_len = std::fs::metadata(to)?.len();
    if src_len != dst_len {
        return Err(FilerError::Relocation(format!(
            "size mismatch after copy to {} ({} != {})",
            to.display(),
            dst_len,
            src_len
        )));
    }
    Ok(())
}

fn ignore_missing(e: std::io::Error) -> Result<(), FilerError> {
    if e.kind() == std::io::ErrorKind::NotFound {
        Ok(())
    } else {
        Err(FilerError::from(e))
    }
}

/// Replace filesystem-hostile characters in an operator-chosen value before
/// it enters a path.
pub fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .map(|c| if ILLEGAL_PATH_CHARS.contains(&c) { '_' } else { c })
        .collect()
}
