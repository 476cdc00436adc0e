//! Debug helper: dump sheet names, columns and distinct column values from
//! a spreadsheet, the same view the filter dropdowns would get.
//!
//! Usage: dump_rows <file.xlsx> [sheet] [column]

use pdf_filer::{excel, DistinctValuesPolicy, RowIndex};
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(file) = args.first() else {
        eprintln!("usage: dump_rows <file.xlsx> [sheet] [column]");
        return ExitCode::FAILURE;
    };
    let path = Path::new(file);

    match run(path, args.get(1).map(String::as_str), args.get(2).map(String::as_str)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(path: &Path, sheet: Option<&str>, column: Option<&str>) -> Result<(), pdf_filer::FilerError> {
    let sheets = excel::sheet_names(path)?;
    println!("sheets: {}", sheets.join(", "));

    let Some(sheet) = sheet.map(str::to_string).or_else(|| sheets.first().cloned()) else {
        return Ok(());
    };
    let mut index = RowIndex::new();
    index.load(path, &sheet)?;
    println!("sheet: {}", sheet);
    println!("columns: {}", index.columns().join(", "));
    println!("rows: {}", index.rows().len());

    if let Some(column) = column {
        let values = index.distinct_values(column, &[], DistinctValuesPolicy::FullSheet);
        println!("distinct values of {} ({}):", column, values.len());
        for value in values {
            println!("  {}", value);
        }
    }
    Ok(())
}
