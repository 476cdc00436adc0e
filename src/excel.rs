//! Spreadsheet collaborator.
//!
//! Reading goes through calamine. Cell-level edits that must preserve the
//! workbook (adding a link column header) go through edit-xlsx. Hyperlinks
//! are patched at the zip level: the xlsx is rewritten part by part and only
//! the sheet XML and its relationship part are touched, so cell data, styles
//! and formulas survive untouched. Every mutation is guarded by a `.bak`
//! copy that is restored on failure and deleted on confirmed success.

use calamine::{open_workbook_auto, Data, DataType, Reader};
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use std::io::{Read as IoRead, Write as IoWrite};
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use zip::read::ZipArchive;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::FilerError;
use crate::net;
use crate::types::{CellValue, Record};

const HYPERLINK_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";

/// Displayed text and hyperlink of one cell, captured before mutation so a
/// completed task can be reverted later.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellSnapshot {
    pub display: String,
    pub hyperlink: Option<String>,
}

/// Reachability and existence check before touching a workbook.
fn preflight(path: &Path) -> Result<(), FilerError> {
    let raw = path.to_string_lossy();
    let is_network = raw.starts_with("\\\\");
    if is_network && !net::is_path_available(path, net::DEFAULT_PROBE_TIMEOUT) {
        return Err(FilerError::NetworkUnavailable(raw.into_owned()));
    }
    if !path.exists() {
        return Err(FilerError::Load(format!("File not found: {}", raw)));
    }
    Ok(())
}

/// List of sheet names in the workbook.
pub fn sheet_names(path: &Path) -> Result<Vec<String>, FilerError> {
    preflight(path)?;
    let workbook = open_workbook_auto(path)
        .map_err(|e| FilerError::Load(format!("Could not open Excel file: {}", e)))?;
    Ok(workbook.sheet_names().to_vec())
}

/// Read a sheet: header names from the first row, then one Record per data
/// row. Empty cells are omitted from the record; trailing empty header cells
/// are trimmed.
pub fn read_sheet(path: &Path, sheet: &str) -> Result<(Vec<String>, Vec<Record>), FilerError> {
    preflight(path)?;
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| FilerError::Load(format!("Could not open Excel file: {}", e)))?;
    let range = workbook
        .worksheet_range(sheet)
        .map_err(|e| FilerError::Load(format!("Sheet not found: {}", e)))?;

    let mut headers: Vec<String> = range
        .rows()
        .next()
        .map(|row| row.iter().map(|c| c.as_string().unwrap_or_default()).collect())
        .unwrap_or_default();
    while headers.last().map(|h| h.trim().is_empty()).unwrap_or(false) {
        headers.pop();
    }

    let mut records = Vec::new();
    for row in range.rows().skip(1) {
        let mut record = Record::default();
        for (col_idx, cell) in row.iter().enumerate() {
            let Some(header) = headers.get(col_idx) else {
                break;
            };
            if let Some(value) = cell_to_value(cell) {
                record.insert(header.clone(), value);
            }
        }
        records.push(record);
    }
    debug!(sheet, rows = records.len(), columns = headers.len(), "sheet loaded");
    Ok((headers, records))
}

fn cell_to_value(cell: &Data) -> Option<CellValue> {
    match cell {
        Data::Empty => None,
        Data::String(s) => {
            if s.is_empty() {
                None
            } else {
                Some(CellValue::Text(s.clone()))
            }
        }
        Data::Int(i) => Some(CellValue::Number(*i as f64)),
        Data::Float(f) => Some(CellValue::Number(*f)),
        Data::Bool(b) => Some(CellValue::Text(b.to_string())),
        Data::DateTime(dt) => Some(CellValue::Date(excel_serial_to_datetime(dt.as_f64()))),
        Data::DateTimeIso(s) => Some(parse_iso_datetime(s)),
        other => other.as_string().map(CellValue::Text),
    }
}

/// Excel serial date (days since 1899-12-30, fractional day = time of day).
fn excel_serial_to_datetime(serial: f64) -> NaiveDateTime {
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();
    base + chrono::Duration::seconds((serial * 86_400.0).round() as i64)
}

fn parse_iso_datetime(s: &str) -> CellValue {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return CellValue::Date(dt);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(dt) = d.and_hms_opt(0, 0, 0) {
            return CellValue::Date(dt);
        }
    }
    CellValue::Text(s.to_string())
}

/// Column index to Excel letter (0→A, 1→B, 25→Z, 26→AA).
pub fn col_index_to_letter(index: u32) -> String {
    let mut n = index;
    let mut s = String::new();
    loop {
        let r = (n % 26) as u8;
        s.insert(0, (b'A' + r) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    s
}

/// A1-style reference for a data cell (row_idx 0 = first row under the header).
fn data_cell_ref(row_idx: usize, col_idx: usize) -> String {
    format!("{}{}", col_index_to_letter(col_idx as u32), row_idx + 2)
}

/// Find the 0-based index of a header column.
fn find_column(headers: &[String], column: &str) -> Option<usize> {
    headers.iter().position(|h| h == column)
}

/// Ensure `column` exists in the header row, creating it after the last
/// header if absent. Returns its 0-based index.
pub fn ensure_column(path: &Path, sheet: &str, column: &str) -> Result<usize, FilerError> {
    let (headers, _) = read_sheet(path, sheet)?;
    if let Some(idx) = find_column(&headers, column) {
        return Ok(idx);
    }
    debug!(column, "link column missing, creating header cell");
    let mut workbook = edit_xlsx::Workbook::from_path(path).map_err(|e| {
        let msg = e.to_string();
        if msg.contains("permission") || msg.contains("Permission") {
            FilerError::LockedFile("Please close the file in Excel first.".to_string())
        } else {
            FilerError::Load(format!("Could not open Excel file: {}", msg))
        }
    })?;
    let worksheet = workbook
        .get_worksheet_mut_by_name(sheet)
        .map_err(|e| FilerError::Load(format!("Sheet not found: {}", e)))?;
    let new_idx = headers.len();
    let cell_ref = format!("{}1", col_index_to_letter(new_idx as u32));
    use edit_xlsx::Write;
    worksheet
        .write_string(&cell_ref, column.to_string())
        .map_err(|e| FilerError::Relocation(e.to_string()))?;
    workbook.save_as(path).map_err(|e| {
        let msg = e.to_string();
        if msg.contains("Permission denied") || msg.contains("being used") {
            FilerError::LockedFile("Please close the file in Excel first.".to_string())
        } else {
            FilerError::Relocation(format!("Cannot write to file: {}", msg))
        }
    })?;
    Ok(new_idx)
}

/// Capture the displayed text and hyperlink of the cell at (row_idx, column).
pub fn capture_cell(
    path: &Path,
    sheet: &str,
    row_idx: usize,
    column: &str,
) -> Result<CellSnapshot, FilerError> {
    preflight(path)?;
    let (headers, records) = read_sheet(path, sheet)?;
    let col_idx = find_column(&headers, column)
        .ok_or_else(|| FilerError::Load(format!("Column '{}' not found in sheet '{}'", column, sheet)))?;
    let display = records
        .get(row_idx)
        .and_then(|r| r.get(column))
        .map(|v| v.as_display())
        .unwrap_or_default();

    let parts = read_zip_parts(path)?;
    let sheet_part = sheet_part_name(&parts, sheet)?;
    let cell_ref = data_cell_ref(row_idx, col_idx);
    let hyperlink = find_hyperlink(&parts, &sheet_part, &cell_ref)?;
    Ok(CellSnapshot { display, hyperlink })
}

/// Write a hyperlink on the cell at (row_idx, column), preserving the cell's
/// displayed text, and return the snapshot captured beforehand.
///
/// The workbook is backed up before the first mutation, including the header
/// write when the link column has to be created; on any failure the backup
/// is restored and the error re-raised, on success the backup is deleted.
pub fn write_hyperlink(
    path: &Path,
    sheet: &str,
    row_idx: usize,
    column: &str,
    target: &str,
) -> Result<CellSnapshot, FilerError> {
    preflight(path)?;
    let result = with_backup(path, |p| {
        let col_idx = ensure_column(p, sheet, column)?;
        let snapshot = capture_cell(p, sheet, row_idx, column)?;
        let cell_ref = data_cell_ref(row_idx, col_idx);
        patch_sheet(p, sheet, &cell_ref, Some(target))?;
        Ok((snapshot, cell_ref))
    })?;
    let (snapshot, cell_ref) = result;
    debug!(cell = %cell_ref, target, "hyperlink written");
    Ok(snapshot)
}

/// Restore the cell to a previously captured snapshot (revert path).
pub fn restore_cell(
    path: &Path,
    sheet: &str,
    row_idx: usize,
    column: &str,
    snapshot: &CellSnapshot,
) -> Result<(), FilerError> {
    preflight(path)?;
    let (headers, _) = read_sheet(path, sheet)?;
    let col_idx = find_column(&headers, column)
        .ok_or_else(|| FilerError::Load(format!("Column '{}' not found in sheet '{}'", column, sheet)))?;
    let cell_ref = data_cell_ref(row_idx, col_idx);
    with_backup(path, |p| {
        patch_sheet(p, sheet, &cell_ref, snapshot.hyperlink.as_deref())
    })?;
    debug!(cell = %cell_ref, "cell hyperlink restored");
    Ok(())
}

/// Back up `path`, run `op`, delete the backup on success or restore it on
/// failure.
fn with_backup<T>(
    path: &Path,
    op: impl FnOnce(&Path) -> Result<T, FilerError>,
) -> Result<T, FilerError> {
    let backup = backup_path(path);
    std::fs::copy(path, &backup)?;
    match op(path) {
        Ok(v) => {
            let _ = std::fs::remove_file(&backup);
            Ok(v)
        }
        Err(e) => {
            if let Err(restore_err) = std::fs::copy(&backup, path) {
                return Err(FilerError::Relocation(format!(
                    "{} (backup restore also failed: {})",
                    e, restore_err
                )));
            }
            let _ = std::fs::remove_file(&backup);
            Err(e)
        }
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

struct XlsxPart {
    name: String,
    data: Vec<u8>,
}

fn read_zip_parts(path: &Path) -> Result<Vec<XlsxPart>, FilerError> {
    let file = std::fs::File::open(path)?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| FilerError::Load(format!("Invalid xlsx: {}", e)))?;
    let mut parts = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| FilerError::Load(format!("xlsx entry {}: {}", i, e)))?;
        let name = entry.name().replace('\\', "/");
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .map_err(|e| FilerError::Load(format!("Read {}: {}", name, e)))?;
        parts.push(XlsxPart { name, data });
    }
    Ok(parts)
}

/// Rewrite the archive with the given parts, atomically replacing the file.
fn write_zip_parts(path: &Path, parts: &[XlsxPart]) -> Result<(), FilerError> {
    let temp_path = path.with_extension("tmp.xlsx");
    let out_file = std::fs::File::create(&temp_path)?;
    let mut writer = ZipWriter::new(out_file);
    let opts = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for part in parts {
        writer
            .start_file(&part.name, opts)
            .map_err(|e| FilerError::Relocation(e.to_string()))?;
        writer
            .write_all(&part.data)
            .map_err(|e| FilerError::Relocation(e.to_string()))?;
    }
    writer
        .finish()
        .map_err(|e| FilerError::Relocation(e.to_string()))?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}

fn part_text<'a>(parts: &'a [XlsxPart], name: &str) -> Option<std::borrow::Cow<'a, str>> {
    parts
        .iter()
        .find(|p| p.name == name)
        .map(|p| String::from_utf8_lossy(&p.data))
}

/// Resolve the sheet's worksheet part name ("xl/worksheets/sheet1.xml") from
/// workbook.xml and its relationships.
fn sheet_part_name(parts: &[XlsxPart], sheet: &str) -> Result<String, FilerError> {
    let workbook = part_text(parts, "xl/workbook.xml")
        .ok_or_else(|| FilerError::Load("xlsx has no workbook.xml".to_string()))?;
    let sheet_re = Regex::new(&format!(
        r#"<sheet[^>]*name="{}"[^>]*r:id="([^"]+)""#,
        regex::escape(&xml_escape(sheet))
    ))
    .map_err(|e| FilerError::Load(e.to_string()))?;
    let rid = sheet_re
        .captures(&workbook)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| FilerError::Load(format!("Sheet not found: {}", sheet)))?;

    let rels = part_text(parts, "xl/_rels/workbook.xml.rels")
        .ok_or_else(|| FilerError::Load("xlsx has no workbook relationships".to_string()))?;
    let rel_re = Regex::new(&format!(
        r#"<Relationship[^>]*Id="{}"[^>]*Target="([^"]+)""#,
        regex::escape(&rid)
    ))
    .map_err(|e| FilerError::Load(e.to_string()))?;
    let target = rel_re
        .captures(&rels)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| FilerError::Load(format!("Worksheet part for '{}' not found", sheet)))?;
    let target = target.trim_start_matches('/');
    if target.starts_with("xl/") {
        Ok(target.to_string())
    } else {
        Ok(format!("xl/{}", target))
    }
}

fn rels_part_name(sheet_part: &str) -> String {
    // xl/worksheets/sheet1.xml -> xl/worksheets/_rels/sheet1.xml.rels
    match sheet_part.rfind('/') {
        Some(pos) => format!("{}/_rels/{}.rels", &sheet_part[..pos], &sheet_part[pos + 1..]),
        None => format!("_rels/{}.rels", sheet_part),
    }
}

/// Look up the external target of the hyperlink on `cell_ref`, if any.
fn find_hyperlink(
    parts: &[XlsxPart],
    sheet_part: &str,
    cell_ref: &str,
) -> Result<Option<String>, FilerError> {
    let Some(sheet_xml) = part_text(parts, sheet_part) else {
        return Ok(None);
    };
    let link_re = Regex::new(&format!(
        r#"<hyperlink[^>]*ref="{}"[^>]*/>"#,
        regex::escape(cell_ref)
    ))
    .map_err(|e| FilerError::Load(e.to_string()))?;
    let Some(element) = link_re.find(&sheet_xml) else {
        return Ok(None);
    };
    let rid_re = Regex::new(r#"r:id="([^"]+)""#).map_err(|e| FilerError::Load(e.to_string()))?;
    let Some(rid) = rid_re
        .captures(element.as_str())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
    else {
        // Internal (location-only) hyperlink; nothing external to capture.
        return Ok(None);
    };
    let Some(rels) = part_text(parts, &rels_part_name(sheet_part)) else {
        return Ok(None);
    };
    let target_re = Regex::new(&format!(
        r#"<Relationship[^>]*Id="{}"[^>]*Target="([^"]+)""#,
        regex::escape(&rid)
    ))
    .map_err(|e| FilerError::Load(e.to_string()))?;
    Ok(target_re
        .captures(&rels)
        .and_then(|c| c.get(1))
        .map(|m| xml_unescape(m.as_str())))
}

/// Set (`Some`) or clear (`None`) the hyperlink on one cell by rewriting the
/// sheet XML and its relationship part.
fn patch_sheet(
    path: &Path,
    sheet: &str,
    cell_ref: &str,
    target: Option<&str>,
) -> Result<(), FilerError> {
    let mut parts = read_zip_parts(path)?;
    let sheet_part = sheet_part_name(&parts, sheet)?;
    let rels_part = rels_part_name(&sheet_part);

    let sheet_xml = part_text(&parts, &sheet_part)
        .ok_or_else(|| FilerError::Load(format!("Missing worksheet part {}", sheet_part)))?
        .into_owned();
    let rels_xml = part_text(&parts, &rels_part).map(|c| c.into_owned());

    // Drop any existing hyperlink on this cell, and its relationship.
    let link_re = Regex::new(&format!(
        r#"<hyperlink[^>]*ref="{}"[^>]*/>"#,
        regex::escape(cell_ref)
    ))
    .map_err(|e| FilerError::Relocation(e.to_string()))?;
    let rid_re = Regex::new(r#"r:id="([^"]+)""#).map_err(|e| FilerError::Relocation(e.to_string()))?;
    let old_rid = link_re
        .find(&sheet_xml)
        .and_then(|m| rid_re.captures(m.as_str()))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    let mut sheet_xml = link_re.replace_all(&sheet_xml, "").into_owned();
    let mut rels_xml = rels_xml;
    if let (Some(rid), Some(xml)) = (&old_rid, rels_xml.as_mut()) {
        let old_rel_re = Regex::new(&format!(r#"<Relationship[^>]*Id="{}"[^>]*/>"#, regex::escape(rid)))
            .map_err(|e| FilerError::Relocation(e.to_string()))?;
        *xml = old_rel_re.replace_all(xml, "").into_owned();
    }

    if let Some(target) = target {
        let rid = next_rel_id(rels_xml.as_deref());
        let element = format!(r#"<hyperlink ref="{}" r:id="{}"/>"#, cell_ref, rid);
        sheet_xml = insert_hyperlink_element(&sheet_xml, &element)?;
        let rel = format!(
            r#"<Relationship Id="{}" Type="{}" Target="{}" TargetMode="External"/>"#,
            rid,
            HYPERLINK_REL_TYPE,
            xml_escape(target)
        );
        rels_xml = Some(match rels_xml {
            Some(xml) => xml.replace("</Relationships>", &format!("{}</Relationships>", rel)),
            None => format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{}</Relationships>"#,
                rel
            ),
        });
    } else {
        // Clearing: drop an emptied hyperlinks container.
        let empty_re = Regex::new(r"<hyperlinks>\s*</hyperlinks>")
            .map_err(|e| FilerError::Relocation(e.to_string()))?;
        sheet_xml = empty_re.replace_all(&sheet_xml, "").into_owned();
    }

    upsert_part(&mut parts, &sheet_part, sheet_xml.into_bytes());
    if let Some(xml) = rels_xml {
        upsert_part(&mut parts, &rels_part, xml.into_bytes());
    }
    write_zip_parts(path, &parts)
}

/// Place the hyperlink element in schema order: inside an existing
/// `<hyperlinks>` block, else a new block after `</sheetData>` (before
/// `<pageMargins` when present).
fn insert_hyperlink_element(sheet_xml: &str, element: &str) -> Result<String, FilerError> {
    if let Some(pos) = sheet_xml.find("</hyperlinks>") {
        let mut out = sheet_xml.to_string();
        out.insert_str(pos, element);
        return Ok(out);
    }
    let block = format!("<hyperlinks>{}</hyperlinks>", element);
    if let Some(pos) = sheet_xml.find("<pageMargins") {
        let mut out = sheet_xml.to_string();
        out.insert_str(pos, &block);
        return Ok(out);
    }
    if let Some(pos) = sheet_xml.find("</worksheet>") {
        let mut out = sheet_xml.to_string();
        out.insert_str(pos, &block);
        return Ok(out);
    }
    Err(FilerError::Relocation(
        "worksheet XML has no insertion point for hyperlinks".to_string(),
    ))
}

fn upsert_part(parts: &mut Vec<XlsxPart>, name: &str, data: Vec<u8>) {
    if let Some(part) = parts.iter_mut().find(|p| p.name == name) {
        part.data = data;
    } else {
        parts.push(XlsxPart {
            name: name.to_string(),
            data,
        });
    }
}

/// Next unused relationship id in a rels part (max numeric suffix + 1).
fn next_rel_id(rels_xml: Option<&str>) -> String {
    let mut max_id = 0u32;
    if let Some(xml) = rels_xml {
        if let Ok(re) = Regex::new(r#"Id="rId(\d+)""#) {
            for cap in re.captures_iter(xml) {
                if let Some(n) = cap.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) {
                    max_id = max_id.max(n);
                }
            }
        }
    }
    format!("rId{}", max_id + 1)
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn xml_unescape(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Relative path from the spreadsheet's directory to the target file, with
/// forward slashes as xlsx hyperlinks expect.
pub fn relative_link_target(target: &Path, spreadsheet: &Path) -> String {
    let base = spreadsheet.parent().unwrap_or_else(|| Path::new(""));
    let rel = relative_to(target, base).unwrap_or_else(|| target.to_path_buf());
    rel.to_string_lossy().replace('\\', "/")
}

fn relative_to(target: &Path, base: &Path) -> Option<PathBuf> {
    let target_comps: Vec<Component> = target.components().collect();
    let base_comps: Vec<Component> = base.components().collect();
    if target.is_absolute() != base.is_absolute() {
        return None;
    }
    let common = target_comps
        .iter()
        .zip(base_comps.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut out = PathBuf::new();
    for _ in common..base_comps.len() {
        out.push("..");
    }
    for comp in &target_comps[common..] {
        out.push(comp);
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    fn make_workbook(dir: &Path, sheet: &str, headers: &[&str], rows: &[&[&str]]) -> PathBuf {
        let path = dir.join("book.xlsx");
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet).unwrap();
        for (col, h) in headers.iter().enumerate() {
            worksheet.write_string(0, col as u16, *h).unwrap();
        }
        for (r, row) in rows.iter().enumerate() {
            for (c, v) in row.iter().enumerate() {
                worksheet.write_string((r + 1) as u32, c as u16, *v).unwrap();
            }
        }
        workbook.save(&path).unwrap();
        path
    }

    #[test]
    fn reads_headers_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = make_workbook(
            dir.path(),
            "Data",
            &["Client", "Month"],
            &[&["Acme", "Jan"], &["Globex", "Feb"]],
        );
        let (headers, rows) = read_sheet(&path, "Data").unwrap();
        assert_eq!(headers, vec!["Client", "Month"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("Client").unwrap().as_display(), "Acme");
        assert_eq!(rows[1].get("Month").unwrap().as_display(), "Feb");
    }

    #[test]
    fn sheet_names_listed() {
        let dir = tempfile::tempdir().unwrap();
        let path = make_workbook(dir.path(), "Facturen", &["A"], &[&["1"]]);
        assert_eq!(sheet_names(&path).unwrap(), vec!["Facturen"]);
    }

    #[test]
    fn missing_file_is_load_error() {
        let err = sheet_names(Path::new("/no/such/book.xlsx")).unwrap_err();
        assert!(matches!(err, FilerError::Load(_)));
    }

    #[test]
    fn hyperlink_roundtrip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = make_workbook(dir.path(), "Data", &["Client", "Link"], &[&["Acme", "doc"]]);

        let before = capture_cell(&path, "Data", 0, "Link").unwrap();
        assert_eq!(before.display, "doc");
        assert_eq!(before.hyperlink, None);

        let snap = write_hyperlink(&path, "Data", 0, "Link", "out/ACME - JAN.pdf").unwrap();
        assert_eq!(snap.hyperlink, None);
        let after = capture_cell(&path, "Data", 0, "Link").unwrap();
        assert_eq!(after.hyperlink.as_deref(), Some("out/ACME - JAN.pdf"));
        // Displayed text untouched.
        assert_eq!(after.display, "doc");
        // Workbook still readable after zip rewrite.
        assert!(read_sheet(&path, "Data").is_ok());
        assert!(!backup_path(&path).exists());

        // Replacing the link keeps exactly one hyperlink on the cell.
        write_hyperlink(&path, "Data", 0, "Link", "out/other.pdf").unwrap();
        let replaced = capture_cell(&path, "Data", 0, "Link").unwrap();
        assert_eq!(replaced.hyperlink.as_deref(), Some("out/other.pdf"));

        // Restoring the original snapshot clears the link again.
        restore_cell(&path, "Data", 0, "Link", &before).unwrap();
        let restored = capture_cell(&path, "Data", 0, "Link").unwrap();
        assert_eq!(restored.hyperlink, None);
        assert!(read_sheet(&path, "Data").is_ok());
    }

    #[test]
    fn ensure_column_creates_missing_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = make_workbook(dir.path(), "Data", &["Client"], &[&["Acme"]]);
        let idx = ensure_column(&path, "Data", "Link").unwrap();
        assert_eq!(idx, 1);
        let (headers, _) = read_sheet(&path, "Data").unwrap();
        assert_eq!(headers, vec!["Client", "Link"]);
        // Second call finds the existing column.
        assert_eq!(ensure_column(&path, "Data", "Link").unwrap(), 1);
    }

    #[test]
    fn backup_restores_workbook_after_failed_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");
        std::fs::write(&path, b"original bytes").unwrap();

        let err = with_backup(&path, |p| -> Result<(), FilerError> {
            std::fs::write(p, b"half-written garbage").unwrap();
            Err(FilerError::Relocation("injected".to_string()))
        })
        .unwrap_err();
        assert!(err.to_string().contains("injected"));
        assert_eq!(std::fs::read(&path).unwrap(), b"original bytes");
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn failed_hyperlink_write_leaves_workbook_untouched() {
        let dir = tempfile::tempdir().unwrap();
        // No Link column, so the write has to mutate the header row first.
        let path = make_workbook(dir.path(), "Data", &["Client"], &[&["Acme"]]);
        let before = std::fs::read(&path).unwrap();

        let err = write_hyperlink(&path, "Wrong Sheet", 0, "Link", "out/a.pdf").unwrap_err();
        assert!(matches!(err, FilerError::Load(_)));
        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn relative_link_targets() {
        let rel = relative_link_target(
            Path::new("/data/processed/ACME.pdf"),
            Path::new("/data/sheets/book.xlsx"),
        );
        assert_eq!(rel, "../processed/ACME.pdf");
        let same = relative_link_target(
            Path::new("/data/sheets/ACME.pdf"),
            Path::new("/data/sheets/book.xlsx"),
        );
        assert_eq!(same, "ACME.pdf");
    }

    #[test]
    fn column_letters() {
        assert_eq!(col_index_to_letter(0), "A");
        assert_eq!(col_index_to_letter(25), "Z");
        assert_eq!(col_index_to_letter(26), "AA");
    }
}
