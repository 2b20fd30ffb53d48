// ==========================================
// 固化罐装载分配系统 - 目录数据导入器
// ==========================================
// 流程: 解析 → 映射 → 落库（单事务批量 upsert）
// 行级错误记录后跳过，不中断整批
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::FieldMapper;
use crate::importer::file_parser::{FileParser, RawRow, UniversalFileParser};
use crate::repository::{CureCycleRepository, VesselRepository, WorkOrderRepository};
use serde::Serialize;
use std::path::Path;
use tracing::{info, instrument, warn};

/// 导入的目录类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CatalogKind {
    WorkOrders,
    Vessels,
    CureCycles,
}

impl CatalogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogKind::WorkOrders => "work_orders",
            CatalogKind::Vessels => "vessels",
            CatalogKind::CureCycles => "cure_cycles",
        }
    }
}

/// 行级错误
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowError {
    pub row_number: usize,
    pub message: String,
}

/// 导入汇总
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportSummary {
    pub kind: CatalogKind,
    pub read: usize,
    pub imported: usize,
    pub failed: usize,
    pub errors: Vec<RowError>,
}

// ==========================================
// CatalogImporter
// ==========================================
pub struct CatalogImporter {
    work_orders: WorkOrderRepository,
    vessels: VesselRepository,
    cure_cycles: CureCycleRepository,
    file_parser: Box<dyn FileParser>,
    field_mapper: FieldMapper,
}

impl CatalogImporter {
    pub fn new(
        work_orders: WorkOrderRepository,
        vessels: VesselRepository,
        cure_cycles: CureCycleRepository,
    ) -> Self {
        Self {
            work_orders,
            vessels,
            cure_cycles,
            file_parser: Box::new(UniversalFileParser),
            field_mapper: FieldMapper,
        }
    }

    #[instrument(skip(self, file_path), fields(file = %file_path.as_ref().display()))]
    pub async fn import_work_orders<P: AsRef<Path> + Send>(&self, file_path: P) -> ImportResult<ImportSummary> {
        let rows = self.file_parser.parse_to_raw_records(file_path.as_ref())?;
        let (records, mut summary) =
            self.map_rows(CatalogKind::WorkOrders, &rows, |row, n| self.field_mapper.map_work_order(row, n));
        summary.imported = self.work_orders.batch_upsert(&records)?;
        log_summary(&summary);
        Ok(summary)
    }

    #[instrument(skip(self, file_path), fields(file = %file_path.as_ref().display()))]
    pub async fn import_vessels<P: AsRef<Path> + Send>(&self, file_path: P) -> ImportResult<ImportSummary> {
        let rows = self.file_parser.parse_to_raw_records(file_path.as_ref())?;
        let (records, mut summary) =
            self.map_rows(CatalogKind::Vessels, &rows, |row, n| self.field_mapper.map_vessel(row, n));
        summary.imported = self.vessels.batch_upsert(&records)?;
        log_summary(&summary);
        Ok(summary)
    }

    #[instrument(skip(self, file_path), fields(file = %file_path.as_ref().display()))]
    pub async fn import_cure_cycles<P: AsRef<Path> + Send>(&self, file_path: P) -> ImportResult<ImportSummary> {
        let rows = self.file_parser.parse_to_raw_records(file_path.as_ref())?;
        let (records, mut summary) =
            self.map_rows(CatalogKind::CureCycles, &rows, |row, n| self.field_mapper.map_cure_cycle(row, n));
        summary.imported = self.cure_cycles.batch_upsert(&records)?;
        log_summary(&summary);
        Ok(summary)
    }

    /// 逐行映射；行号从 2 开始（第 1 行为表头）
    fn map_rows<T, F>(&self, kind: CatalogKind, rows: &[RawRow], map: F) -> (Vec<T>, ImportSummary)
    where
        F: Fn(&RawRow, usize) -> Result<T, ImportError>,
    {
        let mut records = Vec::with_capacity(rows.len());
        let mut errors = Vec::new();
        for (idx, row) in rows.iter().enumerate() {
            let row_number = idx + 2;
            match map(row, row_number) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(row = row_number, error = %e, "行映射失败，跳过");
                    errors.push(RowError {
                        row_number: e.row().unwrap_or(row_number),
                        message: e.to_string(),
                    });
                }
            }
        }

        let summary = ImportSummary {
            kind,
            read: rows.len(),
            imported: 0,
            failed: errors.len(),
            errors,
        };
        (records, summary)
    }
}

fn log_summary(summary: &ImportSummary) {
    info!(
        kind = summary.kind.as_str(),
        read = summary.read,
        imported = summary.imported,
        failed = summary.failed,
        "目录导入完成"
    );
}
