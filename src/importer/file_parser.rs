// ==========================================
// 固化罐装载分配系统 - 文件解析器
// ==========================================
// 支持: Excel (.xlsx/.xls) / CSV (.csv)
// 输出: 每行一个 表头 → 单元格 的映射
// 表头统一规范化: 去空白、转小写
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto, Reader};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

/// 一行原始记录
pub type RawRow = HashMap<String, String>;

/// 文件解析器接口
pub trait FileParser: Send + Sync {
    fn parse_to_raw_records(&self, file_path: &Path) -> ImportResult<Vec<RawRow>>;
}

/// 表头规范化
pub fn normalize_header(header: &str) -> String {
    header.trim().to_lowercase()
}

fn check_exists(path: &Path) -> ImportResult<()> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    Ok(())
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

// ==========================================
// CSV Parser
// ==========================================
pub struct CsvParser;

impl FileParser for CsvParser {
    fn parse_to_raw_records(&self, file_path: &Path) -> ImportResult<Vec<RawRow>> {
        check_exists(file_path)?;
        let ext = extension(file_path);
        if ext != "csv" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let file = File::open(file_path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .from_reader(file);

        let headers: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();

        let mut records = Vec::new();
        for result in reader.records() {
            let record = result?;
            let row: RawRow = headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.clone(), v.trim().to_string()))
                .collect();

            // 跳过完全空白的行
            if row.values().all(|v| v.is_empty()) {
                continue;
            }
            records.push(row);
        }
        Ok(records)
    }
}

// ==========================================
// Excel Parser
// ==========================================
pub struct ExcelParser;

impl FileParser for ExcelParser {
    fn parse_to_raw_records(&self, file_path: &Path) -> ImportResult<Vec<RawRow>> {
        check_exists(file_path)?;
        let ext = extension(file_path);
        if ext != "xlsx" && ext != "xls" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let mut workbook = open_workbook_auto(file_path)?;

        // 只读第一个 sheet
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无工作表".to_string()))?;
        let range = workbook.worksheet_range(&sheet_name)?;

        let mut rows = range.rows();
        let header_row = rows
            .next()
            .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无数据行".to_string()))?;
        let headers: Vec<String> = header_row
            .iter()
            .map(|cell| normalize_header(&cell.to_string()))
            .collect();

        let mut records = Vec::new();
        for data_row in rows {
            let row: RawRow = headers
                .iter()
                .zip(data_row.iter())
                .map(|(h, cell)| (h.clone(), cell.to_string().trim().to_string()))
                .collect();

            if row.values().all(|v| v.is_empty()) {
                continue;
            }
            records.push(row);
        }
        Ok(records)
    }
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser;

impl FileParser for UniversalFileParser {
    fn parse_to_raw_records(&self, file_path: &Path) -> ImportResult<Vec<RawRow>> {
        match extension(file_path).as_str() {
            "csv" => CsvParser.parse_to_raw_records(file_path),
            "xlsx" | "xls" => ExcelParser.parse_to_raw_records(file_path),
            other => Err(ImportError::UnsupportedFormat(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    fn csv_file(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    #[test]
    fn test_csv_parser_normalizes_headers() {
        let file = csv_file(&[" WO_ID ,Width_MM", "WO-1, 300 "]);
        let records = CsvParser.parse_to_raw_records(file.path()).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("wo_id"), Some(&"WO-1".to_string()));
        assert_eq!(records[0].get("width_mm"), Some(&"300".to_string()));
    }

    #[test]
    fn test_csv_parser_skips_blank_rows() {
        let file = csv_file(&["wo_id,width_mm", "WO-1,300", ",", "WO-2,400"]);
        let records = CsvParser.parse_to_raw_records(file.path()).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_missing_file_and_unknown_extension() {
        assert!(matches!(
            CsvParser.parse_to_raw_records(Path::new("non_existent.csv")),
            Err(ImportError::FileNotFound(_))
        ));

        let file = Builder::new().suffix(".txt").tempfile().unwrap();
        assert!(matches!(
            UniversalFileParser.parse_to_raw_records(file.path()),
            Err(ImportError::UnsupportedFormat(_))
        ));
    }
}
