// ==========================================
// 抽样方案引擎 - 抽样表批量导入
// ==========================================
// 职责: 从 CSV/XLSX 导入 NQA 代码 + 批量区间 + 抽样参数
// 流程: 解析 → 映射 → 字段校验 → 单事务落库（按代码解析或创建 NQA + 重叠判定）
// 红线: 整个文件是一个事务，任意一行被拒绝则文件中的 NQA 与区间全部不落库
// ==========================================

use crate::config::ConfigManager;
use crate::db::with_immediate_transaction;
use crate::domain::quality_level::QualityLevel;
use crate::domain::sampling_range::{RangeDraft, SamplingRange, ShelfLife, ValidRange};
use crate::engine::nqa_registry::{AutoLevelDefaults, LevelResolution, NqaRegistry};
use crate::engine::range_store::RangePartitionStore;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{FileParser, ParsedSheet, RawRow};
use crate::repository::error::RepositoryError;
use async_trait::async_trait;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

// ==========================================
// 列定义
// ==========================================
// 每个逻辑列接受若干表头别名（规范化后的小写形式）
const COL_NQA_CODE: (&str, &[&str]) = ("nqa_code", &["nqa_code", "nqa", "codigo_nqa"]);
const COL_LOT_MIN: (&str, &[&str]) = ("lot_min", &["lot_min", "faixa_inicial"]);
const COL_LOT_MAX: (&str, &[&str]) = ("lot_max", &["lot_max", "faixa_final"]);
const COL_SAMPLE_SIZE: (&str, &[&str]) = ("sample_size", &["sample_size", "tamanho_amostra"]);
const COL_AC: (&str, &[&str]) = ("ac", &["ac"]);
const COL_RE: (&str, &[&str]) = ("re", &["re"]);
const COL_SHELF_MONTHS: (&str, &[&str]) = ("shelf_life_months", &["shelf_life_months", "meses_validade"]);
const COL_SHELF_DAYS: (&str, &[&str]) = ("shelf_life_days", &["shelf_life_days", "dias_validade"]);
const COL_DAYS_70: (&str, &[&str]) = ("days_70", &["days_70", "dias_70"]);
const COL_NOTES: (&str, &[&str]) = ("notes", &["notes", "observacoes"]);

const REQUIRED_COLUMNS: [(&str, &[&str]); 6] =
    [COL_NQA_CODE, COL_LOT_MIN, COL_LOT_MAX, COL_SAMPLE_SIZE, COL_AC, COL_RE];

// ==========================================
// 导入行与报告
// ==========================================

/// 映射后的一行（数据行号从 1 开始，不含表头）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplingTableRow {
    pub row: usize,
    pub nqa_code: String,
    pub draft: RangeDraft,
}

/// 导入成功的区间
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedRange {
    pub row: usize,
    pub level_code: String,
    pub range: SamplingRange,
}

/// 导入报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportReport {
    pub batch_id: String,
    pub file_name: String,
    pub total_rows: usize,
    pub ranges: Vec<ImportedRange>,
    /// 本次导入自动创建的 NQA
    pub created_levels: Vec<QualityLevel>,
    pub elapsed_ms: u64,
}

impl ImportReport {
    pub fn ranges_imported(&self) -> usize {
        self.ranges.len()
    }
}

// ==========================================
// SamplingTableImporter Trait
// ==========================================
#[async_trait]
pub trait SamplingTableImporter: Send + Sync {
    /// 从文件导入抽样表（扩展名决定解析器）
    ///
    /// # 返回
    /// - Ok(ImportReport): 全部行已落库
    /// - Err: 文件问题或第一条被拒绝的行；此时未落库任何数据
    async fn import_file(&self, file_path: &Path) -> ImportResult<ImportReport>;
}

// ==========================================
// SamplingTableImporterImpl
// ==========================================
pub struct SamplingTableImporterImpl {
    conn: Arc<Mutex<Connection>>,
    config: Arc<ConfigManager>,
    file_parser: Box<dyn FileParser>,
}

impl SamplingTableImporterImpl {
    pub fn new(conn: Arc<Mutex<Connection>>, config: Arc<ConfigManager>, file_parser: Box<dyn FileParser>) -> Self {
        Self {
            conn,
            config,
            file_parser,
        }
    }

    /// 落库已映射的行（单事务）
    pub fn import_rows(&self, rows: Vec<SamplingTableRow>) -> ImportResult<(Vec<ImportedRange>, Vec<QualityLevel>)> {
        // 字段校验在事务外完成，失败时不触及存储
        let mut validated: Vec<(usize, String, ValidRange)> = Vec::with_capacity(rows.len());
        for row in rows {
            let valid = row
                .draft
                .validate()
                .map_err(|source| ImportError::RowRejected { row: row.row, source })?;
            validated.push((row.row, row.nqa_code, valid));
        }

        let defaults = AutoLevelDefaults::from_config(&self.config)?;

        let result = with_immediate_transaction(&self.conn, |tx| {
            let mut imported = Vec::with_capacity(validated.len());
            let mut created: Vec<QualityLevel> = Vec::new();
            let mut level_cache: HashMap<String, QualityLevel> = HashMap::new();

            for (row, code, valid) in validated {
                let level = match level_cache.get(&code) {
                    Some(level) => level.clone(),
                    None => {
                        let resolution = NqaRegistry::resolve_or_create_tx(tx, &code, &defaults)
                            .map_err(|e| row_rejected(row, e))?;
                        let level = match resolution {
                            LevelResolution::Created(level) => {
                                created.push(level.clone());
                                level
                            }
                            LevelResolution::Existing(level) => level,
                        };
                        level_cache.insert(code.clone(), level.clone());
                        level
                    }
                };

                if !level.active {
                    return Err(row_rejected(
                        row,
                        RepositoryError::not_found("QualityLevel", &level.level_id),
                    ));
                }

                let range = RangePartitionStore::insert_checked_tx(tx, &level.level_id, valid)
                    .map_err(|e| row_rejected(row, e))?;
                debug!(row, code = %level.code, range_id = %range.range_id, "行已写入");
                imported.push(ImportedRange {
                    row,
                    level_code: level.code.clone(),
                    range,
                });
            }

            Ok((imported, created))
        });

        result.map_err(unwrap_row_rejection)
    }
}

#[async_trait]
impl SamplingTableImporter for SamplingTableImporterImpl {
    #[instrument(skip(self, file_path), fields(batch_id = tracing::field::Empty))]
    async fn import_file(&self, file_path: &Path) -> ImportResult<ImportReport> {
        let start_time = Instant::now();
        let batch_id = uuid::Uuid::new_v4().to_string();
        tracing::Span::current().record("batch_id", batch_id.as_str());

        let file_name = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        info!(batch_id = %batch_id, file = %file_name, "开始导入抽样表");

        // === 步骤 1: 解析文件 ===
        let sheet = self.file_parser.parse_sheet(file_path)?;
        ensure_required_columns(&sheet)?;
        if sheet.rows.is_empty() {
            return Err(ImportError::EmptyFile);
        }
        let total_rows = sheet.rows.len();
        debug!(total_rows, "文件解析完成");

        // === 步骤 2: 字段映射 ===
        let rows = sheet
            .rows
            .iter()
            .map(|parsed| map_row(&parsed.cells, parsed.row))
            .collect::<ImportResult<Vec<_>>>()?;

        // === 步骤 3: 校验 + 落库 ===
        let (ranges, created_levels) = self.import_rows(rows).inspect_err(|e| {
            warn!(batch_id = %batch_id, error = %e, "抽样表导入被拒绝，已回滚");
        })?;

        let elapsed_ms = start_time.elapsed().as_millis() as u64;
        info!(
            batch_id = %batch_id,
            ranges = ranges.len(),
            created_levels = created_levels.len(),
            elapsed_ms,
            "抽样表导入完成"
        );

        Ok(ImportReport {
            batch_id,
            file_name,
            total_rows,
            ranges,
            created_levels,
            elapsed_ms,
        })
    }
}

// ==========================================
// 行映射
// ==========================================

/// 检查表头是否包含所有必需列
pub fn ensure_required_columns(sheet: &ParsedSheet) -> ImportResult<()> {
    for (name, aliases) in REQUIRED_COLUMNS {
        if !aliases.iter().any(|a| sheet.has_header(a)) {
            return Err(ImportError::MissingColumn(name.to_string()));
        }
    }
    Ok(())
}

/// 将一行原始文本映射为区间草稿
pub fn map_row(raw: &RawRow, row: usize) -> ImportResult<SamplingTableRow> {
    let nqa_code = cell(raw, COL_NQA_CODE)
        .ok_or_else(|| missing_field(row, COL_NQA_CODE.0))?
        .to_string();

    let draft = RangeDraft {
        lot_min: required_int(raw, COL_LOT_MIN, row)?,
        lot_max: required_int(raw, COL_LOT_MAX, row)?,
        sample_size: required_int(raw, COL_SAMPLE_SIZE, row)?,
        ac: required_int(raw, COL_AC, row)?,
        re: required_int(raw, COL_RE, row)?,
        shelf_life: ShelfLife {
            months: optional_int(raw, COL_SHELF_MONTHS, row)?,
            days: optional_int(raw, COL_SHELF_DAYS, row)?,
            days_70: optional_int(raw, COL_DAYS_70, row)?,
        },
        notes: cell(raw, COL_NOTES).map(str::to_string),
        active: true,
    };

    Ok(SamplingTableRow { row, nqa_code, draft })
}

fn cell<'a>(raw: &'a RawRow, column: (&str, &[&str])) -> Option<&'a str> {
    column
        .1
        .iter()
        .filter_map(|alias| raw.get(*alias))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
}

fn required_int(raw: &RawRow, column: (&str, &[&str]), row: usize) -> ImportResult<i64> {
    optional_int(raw, column, row)?.ok_or_else(|| missing_field(row, column.0))
}

fn optional_int(raw: &RawRow, column: (&str, &[&str]), row: usize) -> ImportResult<Option<i64>> {
    match cell(raw, column) {
        None => Ok(None),
        Some(text) => parse_int(text)
            .map(Some)
            .ok_or_else(|| conversion_error(row, column.0, &format!("不是整数: {}", text))),
    }
}

/// 解析整数；电子表格中的 "8.0" 视为 8
fn parse_int(text: &str) -> Option<i64> {
    if let Ok(v) = text.parse::<i64>() {
        return Some(v);
    }
    let f = text.parse::<f64>().ok()?;
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

// 表头有该列但本行单元格为空（含短行）: 按行拒绝
fn missing_field(row: usize, field: &str) -> ImportError {
    ImportError::RowRejected {
        row,
        source: RepositoryError::field(field, "必填字段为空"),
    }
}

fn conversion_error(row: usize, field: &str, message: &str) -> ImportError {
    ImportError::TypeConversionError {
        row,
        field: field.to_string(),
        message: message.to_string(),
    }
}

// 事务闭包只能返回 RepositoryError，行号借 Other 携带出来
#[derive(Debug, thiserror::Error)]
#[error("第 {row} 行: {source}")]
struct RowFailure {
    row: usize,
    source: RepositoryError,
}

fn row_rejected(row: usize, source: RepositoryError) -> RepositoryError {
    RepositoryError::Other(anyhow::Error::new(RowFailure { row, source }))
}

fn unwrap_row_rejection(err: RepositoryError) -> ImportError {
    match err {
        RepositoryError::Other(inner) => match inner.downcast::<RowFailure>() {
            Ok(RowFailure { row, source }) => ImportError::RowRejected { row, source },
            Err(other) => ImportError::Repository(RepositoryError::Other(other)),
        },
        other => ImportError::Repository(other),
    }
}
