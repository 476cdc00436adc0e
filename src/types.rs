use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Scalar cell value as read from the spreadsheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Date(NaiveDateTime),
}

impl CellValue {
    /// Stringified form used for equality matching and display.
    /// Whole numbers render without a trailing ".0" so they compare equal
    /// to what the operator sees in Excel.
    pub fn as_display(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_display())
    }
}

/// One spreadsheet row keyed by column name. Rows are immutable once loaded;
/// the index is rebuilt wholesale on reload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Record {
    pub values: HashMap<String, CellValue>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.values.get(column)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: CellValue) {
        self.values.insert(column.into(), value);
    }
}

/// Lifecycle status of one relocation unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Reverted,
    Skipped,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Reverted => "reverted",
            TaskStatus::Skipped => "skipped",
        }
    }

    /// Documented transitions only. Reverted is one-way and reachable solely
    /// from Completed; a reverted task is never re-completed.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Skipped)
                | (Pending, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Skipped)
                | (Failed, Pending)
                | (Completed, Reverted)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One PDF-relocation unit of work and everything needed to display,
/// retry and revert it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub pdf_path: String,
    /// Operator-selected filter values, in filter order.
    pub selected_values: Vec<String>,
    pub status: TaskStatus,
    pub error_msg: String,
    /// Index of the matched spreadsheet row (0-based, data rows).
    pub row_idx: Option<usize>,
    /// Cell hyperlink captured before the spreadsheet update, needed for revert.
    pub original_hyperlink: Option<String>,
    pub original_pdf_location: String,
    pub processed_pdf_location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(pdf_path: impl Into<String>, selected_values: Vec<String>) -> Self {
        let pdf_path = pdf_path.into();
        Task {
            task_id: uuid::Uuid::new_v4().to_string(),
            original_pdf_location: pdf_path.clone(),
            pdf_path,
            selected_values,
            status: TaskStatus::Pending,
            error_msg: String::new(),
            row_idx: None,
            original_hyperlink: None,
            processed_pdf_location: None,
            start_time: Utc::now(),
            end_time: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_numbers_display_without_decimal() {
        assert_eq!(CellValue::Number(42.0).as_display(), "42");
        assert_eq!(CellValue::Number(42.5).as_display(), "42.5");
    }

    #[test]
    fn reverted_is_one_way() {
        assert!(TaskStatus::Completed.can_transition_to(TaskStatus::Reverted));
        assert!(!TaskStatus::Reverted.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Reverted.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Reverted));
    }

    #[test]
    fn tasks_get_unique_ids() {
        let a = Task::new("a.pdf", vec![]);
        let b = Task::new("a.pdf", vec![]);
        assert_ne!(a.task_id, b.task_id);
    }
}
