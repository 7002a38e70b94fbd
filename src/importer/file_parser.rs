// ==========================================
// 抽样方案引擎 - 文件解析器实现
// ==========================================
// 支持: Excel (.xlsx/.xls) / CSV (.csv)
// 输出: 规范化表头 + 每行 表头 → 单元格文本 的映射
// 行号: 数据行从 1 开始计数（不含表头），跳过的空白行也占号
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

/// 解析后的一行原始数据
pub type RawRow = HashMap<String, String>;

/// 带原始数据行号的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRow {
    pub row: usize,
    pub cells: RawRow,
}

/// 一个工作表的解析结果
#[derive(Debug, Clone, Default)]
pub struct ParsedSheet {
    /// 规范化后的表头（与列顺序一致）
    pub headers: Vec<String>,
    /// 非空白数据行
    pub rows: Vec<ParsedRow>,
}

impl ParsedSheet {
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }
}

// ==========================================
// FileParser Trait
// ==========================================
pub trait FileParser: Send + Sync {
    fn parse_sheet(&self, file_path: &Path) -> ImportResult<ParsedSheet>;
}

/// 表头规范化: 去空白、转小写、空格转下划线
pub fn normalize_header(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}

fn ensure_exists(path: &Path) -> ImportResult<()> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    Ok(())
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

fn collect_row<I, S>(headers: &[String], cells: I) -> Option<RawRow>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut row_map = HashMap::new();
    for (col_idx, value) in cells.into_iter().enumerate() {
        if let Some(header) = headers.get(col_idx) {
            if header.is_empty() {
                continue;
            }
            row_map.insert(header.clone(), value.as_ref().trim().to_string());
        }
    }

    // 跳过完全空白的行
    if row_map.values().all(|v| v.is_empty()) {
        None
    } else {
        Some(row_map)
    }
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl FileParser for CsvParser {
    fn parse_sheet(&self, file_path: &Path) -> ImportResult<ParsedSheet> {
        ensure_exists(file_path)?;

        let ext = extension_of(file_path);
        if ext != "csv" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let file = File::open(file_path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .trim(csv::Trim::All)
            .from_reader(file);

        let headers: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();

        let mut rows = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let record = result?;
            if let Some(cells) = collect_row(&headers, record.iter()) {
                rows.push(ParsedRow { row: idx + 1, cells });
            }
        }

        Ok(ParsedSheet { headers, rows })
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

impl FileParser for ExcelParser {
    fn parse_sheet(&self, file_path: &Path) -> ImportResult<ParsedSheet> {
        ensure_exists(file_path)?;

        let ext = extension_of(file_path);
        if ext != "xlsx" && ext != "xls" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        // 按扩展名识别 xlsx / xls
        let mut workbook = open_workbook_auto(file_path)?;

        // 只读取第一个 sheet
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无工作表".to_string()))?;

        let range = workbook.worksheet_range(&sheet_name)?;

        let mut sheet_rows = range.rows();
        let header_row = sheet_rows.next().ok_or(ImportError::EmptyFile)?;
        let headers: Vec<String> = header_row
            .iter()
            .map(|cell| normalize_header(&cell.to_string()))
            .collect();

        let mut rows = Vec::new();
        for (idx, data_row) in sheet_rows.enumerate() {
            let cells: Vec<String> = data_row.iter().map(cell_text).collect();
            if let Some(cells) = collect_row(&headers, cells) {
                rows.push(ParsedRow { row: idx + 1, cells });
            }
        }

        Ok(ParsedSheet { headers, rows })
    }
}

/// 单元格文本
///
/// 整数值的数字保留一位小数（4.0 → "4.0"），与 NQA 代码的书写一致
pub fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Float(f) if f.is_finite() && f.fract() == 0.0 => format!("{:.1}", f),
        Data::Int(i) => format!("{}.0", i),
        other => other.to_string(),
    }
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser;

impl FileParser for UniversalFileParser {
    fn parse_sheet(&self, file_path: &Path) -> ImportResult<ParsedSheet> {
        match extension_of(file_path).as_str() {
            "csv" => CsvParser.parse_sheet(file_path),
            "xlsx" | "xls" => ExcelParser.parse_sheet(file_path),
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
        let mut temp_file = Builder::new().suffix(".csv").tempfile().unwrap();
        for line in lines {
            writeln!(temp_file, "{}", line).unwrap();
        }
        temp_file
    }

    #[test]
    fn test_csv_parser_valid_file() {
        let temp_file = csv_file(&["NQA_Code, Lot Min ,lot_max", "2.5,2,8", "2.5,9,15"]);

        let sheet = CsvParser.parse_sheet(temp_file.path()).unwrap();

        assert_eq!(sheet.headers, vec!["nqa_code", "lot_min", "lot_max"]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0].cells.get("nqa_code"), Some(&"2.5".to_string()));
        assert_eq!(sheet.rows[0].cells.get("lot_min"), Some(&"2".to_string()));
        assert_eq!(sheet.rows[1].cells.get("lot_max"), Some(&"15".to_string()));
    }

    #[test]
    fn test_csv_parser_file_not_found() {
        let result = CsvParser.parse_sheet(Path::new("non_existent.csv"));
        assert!(matches!(result, Err(ImportError::FileNotFound(_))));
    }

    #[test]
    fn test_csv_parser_skip_empty_rows() {
        let temp_file = csv_file(&["nqa_code,lot_min", "2.5,2", ",", "2.5,9"]);

        let sheet = CsvParser.parse_sheet(temp_file.path()).unwrap();

        // 空行被跳过，但仍占用行号
        let rows: Vec<usize> = sheet.rows.iter().map(|r| r.row).collect();
        assert_eq!(rows, vec![1, 3]);
    }

    #[test]
    fn test_csv_parser_keeps_header_for_short_rows() {
        let temp_file = csv_file(&["nqa_code,lot_min,lot_max", "2.5,2"]);

        let sheet = CsvParser.parse_sheet(temp_file.path()).unwrap();

        assert!(sheet.has_header("lot_max"));
        assert!(!sheet.rows[0].cells.contains_key("lot_max"));
    }

    #[test]
    fn test_cell_text_keeps_decimal_for_whole_numbers() {
        assert_eq!(cell_text(&Data::Float(4.0)), "4.0");
        assert_eq!(cell_text(&Data::Float(10.0)), "10.0");
        assert_eq!(cell_text(&Data::Float(2.5)), "2.5");
        assert_eq!(cell_text(&Data::Float(0.65)), "0.65");
        assert_eq!(cell_text(&Data::Int(1)), "1.0");
        assert_eq!(cell_text(&Data::String("4.0".to_string())), "4.0");
        assert_eq!(cell_text(&Data::Empty), "");
    }

    #[test]
    fn test_universal_parser_rejects_unknown_extension() {
        let temp_file = Builder::new().suffix(".txt").tempfile().unwrap();
        let result = UniversalFileParser.parse_sheet(temp_file.path());
        assert!(matches!(result, Err(ImportError::UnsupportedFormat(ref ext)) if ext == "txt"));
    }
}
