//! Task queue and its display ordering.
//!
//! Tasks are kept in insertion order and never deleted automatically; the
//! history of an operator session stays visible, including failed and
//! reverted entries. Sorting is a display concern layered on top.

use tracing::{debug, info};

use crate::error::FilerError;
use crate::types::{Task, TaskStatus};

/// Sortable display columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    FileName,
    Values,
    Status,
    StartTime,
}

#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: Vec<Task>,
    /// Last sort request; a repeat on the same column flips the direction.
    last_sort: Option<(SortColumn, bool)>,
}

impl TaskQueue {
    pub fn new() -> Self {
        TaskQueue::default()
    }

    pub fn add(&mut self, task: Task) -> String {
        let id = task.task_id.clone();
        info!(task = %id, pdf = %task.pdf_path, "task queued");
        self.tasks.push(task);
        id
    }

    pub fn get(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    pub fn get_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.task_id == task_id)
    }

    /// Move a task to `next`, validating the transition. An error message
    /// may accompany a Failed transition; any other transition clears it.
    pub fn update_status(
        &mut self,
        task_id: &str,
        next: TaskStatus,
        error_msg: Option<&str>,
    ) -> Result<(), FilerError> {
        let task = self
            .get_mut(task_id)
            .ok_or_else(|| FilerError::InvalidTransition(format!("unknown task: {}", task_id)))?;
        if !task.status.can_transition_to(next) {
            return Err(FilerError::InvalidTransition(format!(
                "{} -> {}",
                task.status, next
            )));
        }
        debug!(task = %task_id, from = %task.status, to = %next, "status change");
        task.status = next;
        task.error_msg = error_msg.unwrap_or_default().to_string();
        if matches!(
            next,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped | TaskStatus::Reverted
        ) {
            task.end_time = Some(chrono::Utc::now());
        }
        Ok(())
    }

    /// All tasks in display order: the active sort if one is set, insertion
    /// order otherwise.
    pub fn display(&self) -> Vec<&Task> {
        let mut rows: Vec<&Task> = self.tasks.iter().collect();
        if let Some((column, descending)) = self.last_sort {
            rows.sort_by(|a, b| {
                let ord = match column {
                    SortColumn::FileName => file_name(a).cmp(&file_name(b)),
                    SortColumn::Values => a.selected_values.cmp(&b.selected_values),
                    SortColumn::Status => a.status.as_str().cmp(b.status.as_str()),
                    SortColumn::StartTime => a.start_time.cmp(&b.start_time),
                };
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        rows
    }

    /// Sort by `column`; repeating the same column toggles the direction.
    pub fn sort_by(&mut self, column: SortColumn) {
        let descending = match self.last_sort {
            Some((last, desc)) if last == column => !desc,
            _ => false,
        };
        self.last_sort = Some((column, descending));
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

fn file_name(task: &Task) -> String {
    std::path::Path::new(&task.pdf_path)
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| task.pdf_path.to_lowercase())
}
