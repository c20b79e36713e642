//! Spreadsheet reader for marketplace settlement files (CSV, XLSX, XLS).
//!
//! Rows come back as raw trimmed strings with no header assumption: settlement
//! exports often carry a title block above the real header row.

use calamine::{open_workbook_from_rs, Data, Range, Reader, Xls, Xlsx};
use csv::ReaderBuilder;
use sha2::{Digest, Sha256};
use std::io::Cursor;

use crate::middleware::error_handling::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Csv,
    Xlsx,
    Xls,
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileType::Csv => write!(f, "csv"),
            FileType::Xlsx => write!(f, "xlsx"),
            FileType::Xls => write!(f, "xls"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SheetRows {
    pub file_type: FileType,
    /// Non-empty rows with their 1-based line or row number in the file.
    pub rows: Vec<(usize, Vec<String>)>,
    pub empty_rows_skipped: usize,
}

pub struct FileParserService;

impl FileParserService {
    pub fn parse(data: &[u8], filename: &str) -> Result<SheetRows> {
        let file_type = Self::detect_file_type(data, filename)?;

        tracing::debug!(
            "Reading {} ({} bytes) as {}",
            filename,
            data.len(),
            file_type
        );

        let sheet = match file_type {
            FileType::Csv => Self::parse_csv(data)?,
            FileType::Xlsx => Self::parse_excel(data, FileType::Xlsx)?,
            FileType::Xls => Self::parse_excel(data, FileType::Xls)?,
        };

        if sheet.rows.is_empty() {
            return Err(AppError::InvalidInput("The file contains no data rows".to_string()));
        }
        Ok(sheet)
    }

    /// Magic bytes first, extension second; anything textual falls back to CSV.
    pub fn detect_file_type(data: &[u8], filename: &str) -> Result<FileType> {
        if data.starts_with(b"PK\x03\x04") {
            return Ok(FileType::Xlsx);
        }
        if data.starts_with(b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1") {
            return Ok(FileType::Xls);
        }

        let lower = filename.to_lowercase();
        if lower.ends_with(".xlsx") || lower.ends_with(".xls") {
            return Err(AppError::InvalidInput(
                "The spreadsheet is damaged or not a real Excel file".to_string(),
            ));
        }
        if std::str::from_utf8(data).is_ok() || lower.ends_with(".csv") || lower.ends_with(".txt") {
            return Ok(FileType::Csv);
        }

        Err(AppError::InvalidInput(
            "Unsupported file format. Upload CSV, XLSX or XLS files.".to_string(),
        ))
    }

    fn parse_csv(data: &[u8]) -> Result<SheetRows> {
        let text = decode_text(data);
        let delimiter = detect_csv_delimiter(&text);

        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter as u8)
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let mut rows = Vec::new();
        let mut empty_rows_skipped = 0;
        for (idx, record) in reader.records().enumerate() {
            let record = record.map_err(|e| {
                AppError::InvalidInput(format!("Row {} could not be read: {}", idx + 1, e))
            })?;
            let line = record
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(idx + 1);
            let row: Vec<String> = record.iter().map(|s| s.trim().to_string()).collect();
            if row.iter().all(|s| s.is_empty()) {
                empty_rows_skipped += 1;
                continue;
            }
            rows.push((line, row));
        }

        Ok(SheetRows {
            file_type: FileType::Csv,
            rows,
            empty_rows_skipped,
        })
    }

    fn parse_excel(data: &[u8], file_type: FileType) -> Result<SheetRows> {
        let range = match file_type {
            FileType::Xls => {
                let mut workbook = open_workbook_from_rs::<Xls<_>, _>(Cursor::new(data))
                    .map_err(|e| AppError::InvalidInput(format!("Failed to open Excel file: {}", e)))?;
                first_sheet(&mut workbook)?
            }
            _ => {
                let mut workbook = open_workbook_from_rs::<Xlsx<_>, _>(Cursor::new(data))
                    .map_err(|e| AppError::InvalidInput(format!("Failed to open Excel file: {}", e)))?;
                first_sheet(&mut workbook)?
            }
        };

        // Range rows are relative to the first used cell.
        let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);
        let mut rows = Vec::new();
        let mut empty_rows_skipped = 0;
        for (idx, row) in range.rows().enumerate() {
            let values: Vec<String> = row.iter().map(cell_to_string).collect();
            if values.iter().all(|s| s.is_empty()) {
                empty_rows_skipped += 1;
                continue;
            }
            rows.push((first_row + idx + 1, values));
        }

        Ok(SheetRows {
            file_type,
            rows,
            empty_rows_skipped,
        })
    }
}

fn first_sheet<RS, R>(workbook: &mut R) -> Result<Range<Data>>
where
    RS: std::io::Read + std::io::Seek,
    R: Reader<RS>,
    R::Error: std::fmt::Display,
{
    let sheet_names = workbook.sheet_names().to_owned();
    let Some(sheet_name) = sheet_names.first() else {
        return Err(AppError::InvalidInput("Excel file contains no sheets".to_string()));
    };
    workbook
        .worksheet_range(sheet_name)
        .map_err(|e| AppError::InvalidInput(format!("Failed to read sheet {}: {}", sheet_name, e)))
}

/// UTF-8 when valid, otherwise Latin-1 (Excel "CSV" exports on Windows).
fn decode_text(data: &[u8]) -> String {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    match std::str::from_utf8(data) {
        Ok(text) => text.to_string(),
        Err(_) => data.iter().map(|b| *b as char).collect(),
    }
}

/// Most frequent of `;`, `,`, tab and `|` over the first lines.
fn detect_csv_delimiter(text: &str) -> char {
    let sample: Vec<&str> = text.lines().take(20).collect();
    [';', ',', '\t', '|']
        .into_iter()
        .map(|d| (d, sample.iter().map(|line| line.matches(d).count()).sum::<usize>()))
        .max_by_key(|(_, count)| *count)
        .filter(|(_, count)| *count > 0)
        .map(|(d, _)| d)
        .unwrap_or(',')
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                format!("{}", f)
            }
        }
        Data::String(s) => s.trim().to_string(),
        Data::Bool(b) => b.to_string(),
        // Excel serial number; the date parser understands it
        Data::DateTime(dt) => format!("{}", dt),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(_) | Data::Empty => String::new(),
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semicolon_csv_keeps_title_rows() {
        let data = "Liquidacion Ripley;;\n;;\nSuborden;Monto;Comision\nRP-1;$ 12.990;1.299\n";
        let sheet = FileParserService::parse(data.as_bytes(), "liq.csv").unwrap();
        assert_eq!(sheet.file_type, FileType::Csv);
        assert_eq!(sheet.empty_rows_skipped, 1);
        assert_eq!(sheet.rows.len(), 3);
        assert_eq!(sheet.rows[1].0, 3);
        assert_eq!(sheet.rows[2].1, vec!["RP-1", "$ 12.990", "1.299"]);
    }

    #[test]
    fn test_latin1_csv_is_decoded() {
        let mut data = b"N\xfamero,Monto\n".to_vec();
        data.extend_from_slice(b"1,2\n");
        let sheet = FileParserService::parse(&data, "liq.csv").unwrap();
        assert_eq!(sheet.rows[0].1[0], "Número");
    }

    #[test]
    fn test_detects_excel_by_magic() {
        assert_eq!(
            FileParserService::detect_file_type(b"PK\x03\x04rest", "upload.bin").unwrap(),
            FileType::Xlsx
        );
        assert!(FileParserService::detect_file_type(b"not a zip", "broken.xlsx").is_err());
    }

    #[test]
    fn test_empty_file_rejected() {
        assert!(FileParserService::parse(b"\n\n", "empty.csv").is_err());
    }

    #[test]
    fn test_delimiter_detection() {
        assert_eq!(detect_csv_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_csv_delimiter("a\tb\n1\t2"), '\t');
        assert_eq!(detect_csv_delimiter("single"), ',');
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
