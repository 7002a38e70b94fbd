// ==========================================
// 抽样方案引擎 - 抽样表导入 API
// ==========================================
// 职责: 封装抽样表导入；提交后为新建的 NQA 与区间记录审计
// ==========================================

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::audit::AuditTrail;
use crate::api::error::{ApiError, ApiResult};
use crate::api::nqa_api::require_actor;
use crate::domain::audit_log::{AuditAction, AuditEntity};
use crate::domain::quality_level::QualityLevel;
use crate::domain::sampling_range::SamplingRange;
use crate::importer::SamplingTableImporter;

/// 导入API响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportApiResponse {
    pub batch_id: String,
    pub file_name: String,
    pub total_rows: usize,
    /// 导入的区间数量
    pub ranges_imported: usize,
    /// 自动创建的 NQA 代码
    pub levels_created: Vec<String>,
    /// 导入耗时（毫秒）
    pub elapsed_ms: u64,
}

pub struct ImportApi {
    importer: Arc<dyn SamplingTableImporter>,
    audit: Arc<AuditTrail>,
}

impl ImportApi {
    pub fn new(importer: Arc<dyn SamplingTableImporter>, audit: Arc<AuditTrail>) -> Self {
        Self { importer, audit }
    }

    /// 导入抽样表（.csv / .xlsx）
    ///
    /// # 错误
    /// - ImportError: 文件不存在、格式不支持、缺列、类型错误
    /// - ImportRowRejected: 某行被业务规则拒绝，整个文件未落库
    pub async fn import_sampling_table(&self, file_path: &str, actor: &str) -> ApiResult<ImportApiResponse> {
        require_actor(actor)?;
        if file_path.trim().is_empty() {
            return Err(ApiError::InvalidInput("文件路径不能为空".to_string()));
        }

        let report = self.importer.import_file(Path::new(file_path)).await?;

        let detail = format!("抽样表导入 batch_id={}", report.batch_id);
        for level in &report.created_levels {
            self.audit.record::<QualityLevel>(
                AuditEntity::QualityLevel,
                &level.level_id,
                AuditAction::Create,
                actor,
                None,
                Some(level),
                Some(&detail),
            );
        }
        for imported in &report.ranges {
            self.audit.record::<SamplingRange>(
                AuditEntity::SamplingRange,
                &imported.range.range_id,
                AuditAction::Create,
                actor,
                None,
                Some(&imported.range),
                Some(&detail),
            );
        }

        Ok(ImportApiResponse {
            ranges_imported: report.ranges_imported(),
            levels_created: report.created_levels.iter().map(|l| l.code.clone()).collect(),
            batch_id: report.batch_id,
            file_name: report.file_name,
            total_rows: report.total_rows,
            elapsed_ms: report.elapsed_ms,
        })
    }
}
