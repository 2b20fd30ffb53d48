// ==========================================
// 固化罐装载分配系统 - 导入层
// ==========================================
// 职责: 外部目录数据（工单、固化罐、固化制度）导入
// 支持: Excel, CSV
// ==========================================

pub mod catalog_importer;
pub mod error;
pub mod field_mapper;
pub mod file_parser;

// 重导出核心类型
pub use catalog_importer::{CatalogImporter, CatalogKind, ImportSummary, RowError};
pub use error::{ImportError, ImportResult};
pub use field_mapper::FieldMapper;
pub use file_parser::{CsvParser, ExcelParser, FileParser, RawRow, UniversalFileParser};
