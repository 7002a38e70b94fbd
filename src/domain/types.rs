// ==========================================
// 抽样方案引擎 - 领域类型定义
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 检验严格度 (Inspection Rigor)
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InspectionRigor {
    Reduced, // 放宽检验
    #[default]
    Normal, // 正常检验
    Tightened, // 加严检验
}

impl InspectionRigor {
    /// 数据库存储值
    pub fn to_db_str(&self) -> &'static str {
        match self {
            InspectionRigor::Reduced => "REDUCED",
            InspectionRigor::Normal => "NORMAL",
            InspectionRigor::Tightened => "TIGHTENED",
        }
    }

    /// 从数据库/配置值解析，大小写不敏感
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "REDUCED" => Some(InspectionRigor::Reduced),
            "NORMAL" => Some(InspectionRigor::Normal),
            "TIGHTENED" => Some(InspectionRigor::Tightened),
            _ => None,
        }
    }
}

impl fmt::Display for InspectionRigor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 时间戳格式
// ==========================================
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 当前本地时间（秒级）
pub fn now_ts() -> chrono::NaiveDateTime {
    use chrono::Timelike;
    let now = chrono::Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

/// 解析数据库时间戳，失败时回退到 UNIX 纪元
pub fn parse_ts(s: &str) -> chrono::NaiveDateTime {
    chrono::NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rigor_round_trip_through_db_str() {
        for rigor in [
            InspectionRigor::Reduced,
            InspectionRigor::Normal,
            InspectionRigor::Tightened,
        ] {
            assert_eq!(InspectionRigor::parse(rigor.to_db_str()), Some(rigor));
        }
        assert_eq!(InspectionRigor::parse(" tightened "), Some(InspectionRigor::Tightened));
        assert_eq!(InspectionRigor::parse("II"), None);
    }

    #[test]
    fn test_parse_ts_fallback() {
        assert_eq!(parse_ts("garbage"), chrono::NaiveDateTime::default());
    }
}
