// ==========================================
// 抽样方案引擎 - 导入层
// ==========================================
// 职责: 从外部文件批量导入抽样表
// 支持: Excel, CSV
// ==========================================

pub mod error;
pub mod file_parser;
pub mod sampling_table_importer;

// 重导出核心类型
pub use error::{ImportError, ImportResult};
pub use file_parser::{CsvParser, ExcelParser, FileParser, ParsedRow, ParsedSheet, UniversalFileParser};
pub use sampling_table_importer::{
    ImportReport, ImportedRange, SamplingTableImporter, SamplingTableImporterImpl,
};
